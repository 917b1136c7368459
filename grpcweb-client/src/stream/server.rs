use std::marker::PhantomData;

use grpcweb_core::{Metadata, Status};
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{CallSpan, ResponseFrame, encode_request, finish_status, read_response_frame};
use crate::ClientError;
use crate::config::ResolvedCallOptions;
use crate::context::CallContext;
use crate::transport::{HttpTransport, ResponseBody, UnaryTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Receiving,
    Done,
}

/// A server-streaming call: one request, then a sequence of responses.
///
/// Created by [`ClientConn::new_server_stream`](crate::ClientConn::new_server_stream).
///
/// # Example
///
/// ```ignore
/// let mut stream = conn
///     .new_server_stream::<HelloRequest, HelloResponse>(&desc, "/api.Example/ServerStream", CallOptions::new())?;
/// stream.send(&ctx, &HelloRequest { name: "ktr".into() }).await?;
/// while let Some(res) = stream.receive(&ctx).await? {
///     println!("{}", res.message);
/// }
/// let trailer = stream.trailer();
/// ```
pub struct ServerStream<Req, Res, T = HttpTransport> {
    endpoint: String,
    transport: T,
    options: ResolvedCallOptions,
    span: CallSpan,
    state: State,
    body: Option<ResponseBody>,
    header: Option<Metadata>,
    trailer: Option<Metadata>,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res, T> std::fmt::Debug for ServerStream<Req, Res, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerStream")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("header", &self.header)
            .field("trailer", &self.trailer)
            .finish_non_exhaustive()
    }
}

impl<Req, Res, T> ServerStream<Req, Res, T>
where
    T: UnaryTransport,
    Req: Message + Serialize,
    Res: Message + DeserializeOwned + Default,
{
    pub(crate) fn new(
        endpoint: &str,
        transport: T,
        options: ResolvedCallOptions,
        span: CallSpan,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            transport,
            options,
            span,
            state: State::Idle,
            body: None,
            header: None,
            trailer: None,
            _marker: PhantomData,
        }
    }

    /// Send the single request. The response header is available afterwards.
    pub async fn send(&mut self, ctx: &CallContext, request: &Req) -> Result<(), ClientError> {
        match self.state {
            State::Idle => {}
            State::Receiving => {
                return Err(ClientError::InvalidState(
                    "send must be called only once on a server stream",
                ));
            }
            State::Done => return Err(ClientError::ConnectionClosed),
        }

        let codec = self.options.codec;
        let body = encode_request(codec, request)?;
        let content_type = codec.content_type();
        let send = self.transport.send(
            &self.endpoint,
            &content_type,
            ctx.metadata().clone(),
            body,
        );

        let result = self.span.run(ctx.run(send)).await;
        match result {
            Ok(Ok((header, body))) => {
                self.options.capture_header(Some(&header));
                self.header = Some(header);
                self.body = Some(body);
                self.state = State::Receiving;
                Ok(())
            }
            Ok(Err(e)) => {
                self.finish(None);
                Err(e)
            }
            Err(status) => {
                self.finish(None);
                Err(status.into())
            }
        }
    }

    /// Receive the next response.
    ///
    /// Returns `Ok(None)` once the server has finished with an OK status, and
    /// `Err(ClientError::Status(..))` for any other status. Either way the
    /// stream is then finished and [`trailer`](Self::trailer) is available.
    pub async fn receive(&mut self, ctx: &CallContext) -> Result<Option<Res>, ClientError> {
        match self.state {
            State::Idle => {
                return Err(ClientError::InvalidState(
                    "receive must be called after send",
                ));
            }
            State::Done => return Err(ClientError::ConnectionClosed),
            State::Receiving => {}
        }
        let Some(body) = self.body.as_mut() else {
            return Err(ClientError::ConnectionClosed);
        };

        let result = self.span.run(ctx.run(read_response_frame(body))).await;
        let frame = match result {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) if e.is_end_of_stream() => {
                self.finish(None);
                return Ok(None);
            }
            Ok(Err(e)) if e.is_unexpected_eof() && self.status_in_header() => {
                let header = self.header.clone().unwrap_or_default();
                let status = Status::from_headers(&header);
                self.finish(Some(header));
                return finish_status(status, None);
            }
            Ok(Err(e)) => {
                self.finish(None);
                return Err(e);
            }
            Err(status) => {
                self.finish(None);
                return Err(status.into());
            }
        };

        match frame {
            ResponseFrame::Message(payload) => {
                let message = self.options.codec.decode(&payload)?;
                Ok(Some(message))
            }
            ResponseFrame::Trailer(status, trailer) => {
                self.finish(trailer);
                finish_status(status, None)
            }
        }
    }

    /// The response header, once [`send`](Self::send) has succeeded.
    pub fn header(&self) -> Option<&Metadata> {
        self.header.as_ref()
    }

    /// The response trailer.
    ///
    /// # Panics
    ///
    /// Panics if the stream has not finished yet: call it only after
    /// [`receive`](Self::receive) returned `Ok(None)` or an error.
    pub fn trailer(&self) -> Option<&Metadata> {
        if self.state != State::Done {
            panic!("trailer must be called after the stream has finished");
        }
        self.trailer.as_ref()
    }

    /// Abandon the call and release the connection. Idempotent.
    pub fn close(&mut self) {
        if self.state != State::Done {
            self.finish(None);
        }
    }

    /// Headers-only response: the status was sent as HTTP headers.
    fn status_in_header(&self) -> bool {
        self.header
            .as_ref()
            .is_some_and(|header| header.contains("grpc-status"))
    }

    fn finish(&mut self, trailer: Option<Metadata>) {
        self.options.capture_trailer(trailer.as_ref());
        self.trailer = trailer;
        self.state = State::Done;
        self.body = None;
        self.transport.close();

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "server stream finished");
    }
}
