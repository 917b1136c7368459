use std::future::Future;
use std::marker::PhantomData;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use grpcweb_core::{Metadata, Status};
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use super::{
    CallSpan, ResponseFrame, encode_request, finish_status, read_response_frame,
    stream_request_header,
};
use crate::ClientError;
use crate::config::ResolvedCallOptions;
use crate::context::CallContext;
use crate::transport::{
    CloseSender, ConnectOptions, DefaultTransportBuilder, Receiver, Sender, StreamTransport,
    TransportBuilder,
};

/// A client-streaming call: many requests, then one response.
///
/// The WebSocket connection is dialed by the first operation that needs it.
/// Created by [`ClientConn::new_client_stream`](crate::ClientConn::new_client_stream).
///
/// # Example
///
/// ```ignore
/// let stream = conn
///     .new_client_stream::<HelloRequest, HelloResponse>(&desc, "/api.Example/ClientStream", CallOptions::new())?;
/// for name in ["m1", "m2", "m3"] {
///     stream.send(&ctx, &HelloRequest { name: name.into() }).await?;
/// }
/// let res = stream.close_and_receive(&ctx).await?;
/// let trailer = stream.trailer();
/// ```
pub struct ClientStream<Req, Res, B: TransportBuilder = DefaultTransportBuilder> {
    host: String,
    endpoint: String,
    builder: B,
    connect: ConnectOptions,
    pub(super) options: ResolvedCallOptions,
    pub(super) span: CallSpan,
    transport: OnceCell<B::Stream>,
    closed: AtomicBool,
    trailers_only: AtomicBool,
    header_captured: AtomicBool,
    trailer: OnceLock<Option<Metadata>>,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res, B: TransportBuilder> std::fmt::Debug for ClientStream<Req, Res, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStream")
            .field("host", &self.host)
            .field("endpoint", &self.endpoint)
            .field("connected", &self.transport.initialized())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<Req, Res, B> ClientStream<Req, Res, B>
where
    B: TransportBuilder,
    Req: Message + Serialize,
    Res: Message + DeserializeOwned + Default,
{
    pub(crate) fn new(
        host: &str,
        endpoint: &str,
        builder: B,
        connect: ConnectOptions,
        options: ResolvedCallOptions,
        span: CallSpan,
    ) -> Self {
        Self {
            host: host.to_string(),
            endpoint: endpoint.to_string(),
            builder,
            connect,
            options,
            span,
            transport: OnceCell::new(),
            closed: AtomicBool::new(false),
            trailers_only: AtomicBool::new(false),
            header_captured: AtomicBool::new(false),
            trailer: OnceLock::new(),
            _marker: PhantomData,
        }
    }

    /// Send one request message.
    ///
    /// The first call dials the connection and fixes the request header from
    /// the outgoing metadata in `ctx`.
    pub async fn send(&self, ctx: &CallContext, request: &Req) -> Result<(), ClientError> {
        self.check_open()?;
        let frame = encode_request(self.options.codec, request)?;
        self.guard(ctx, async {
            let transport = self.transport(ctx).await?;
            transport.send(frame).await
        })
        .await
    }

    /// Half-close the request side and wait for the single response.
    ///
    /// Returns `Ok(None)` for a trailers-only OK response.
    pub async fn close_and_receive(&self, ctx: &CallContext) -> Result<Option<Res>, ClientError> {
        self.check_open()?;
        let result = self.guard(ctx, self.close_and_receive_inner(ctx)).await;
        self.finish(None).await;
        result
    }

    async fn close_and_receive_inner(&self, ctx: &CallContext) -> Result<Option<Res>, ClientError> {
        let transport = self.transport(ctx).await?;
        transport.close_send().await?;
        self.closed.store(true, Ordering::Release);

        let mut body = match transport.receive().await {
            Err(e) if self.is_trailers_only(&e) => return self.trailers_only_status(transport),
            other => other?,
        };
        self.capture_header(transport);

        let payload = match read_response_frame(&mut body).await? {
            ResponseFrame::Trailer(status, trailer) => {
                self.record_trailer(trailer);
                return finish_status(status, None);
            }
            ResponseFrame::Message(payload) => payload,
        };
        let message: Res = self.options.codec.decode(&payload)?;

        // The trailer arrives as a separate message
        let mut body = transport.receive().await?;
        match read_response_frame(&mut body).await {
            Ok(ResponseFrame::Trailer(status, trailer)) => {
                self.record_trailer(trailer);
                finish_status(status, Some(message))
            }
            Ok(ResponseFrame::Message(_)) => Err(ClientError::Protocol(
                "expected a trailer frame after the response message".into(),
            )),
            Err(e) if e.is_end_of_stream() => {
                self.record_trailer(None);
                Ok(Some(message))
            }
            Err(e) => Err(e),
        }
    }

    /// The response header.
    ///
    /// `None` before the first response arrives and for trailers-only
    /// responses, whose headers are reported as the trailer instead.
    pub fn header(&self) -> Option<Metadata> {
        if self.trailers_only.load(Ordering::Acquire) {
            return None;
        }
        self.transport.get()?.header()
    }

    /// The response trailer.
    ///
    /// # Panics
    ///
    /// Panics if the stream has not finished yet: call it only after
    /// [`close_and_receive`](Self::close_and_receive) has returned.
    pub fn trailer(&self) -> Option<Metadata> {
        if !self.closed.load(Ordering::Acquire) {
            panic!("trailer must be called after the stream has finished");
        }
        self.trailer.get().cloned().flatten()
    }

    /// Abandon the call and close the connection. Idempotent.
    pub async fn close(&self) {
        self.finish(None).await;
    }

    pub(super) fn check_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The transport, dialed on first use.
    pub(super) async fn transport(&self, ctx: &CallContext) -> Result<&B::Stream, ClientError> {
        self.transport
            .get_or_try_init(|| async {
                let transport = self
                    .builder
                    .stream(&self.host, &self.endpoint, &self.connect)
                    .await?;
                transport.set_request_header(stream_request_header(ctx, self.options.codec));
                Ok(transport)
            })
            .await
    }

    /// Run `fut` under the call span and context. A context error aborts the call.
    pub(super) async fn guard<T, F>(&self, ctx: &CallContext, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let result = self.span.run(ctx.run(fut)).await;
        match result {
            Ok(result) => result,
            Err(status) => {
                self.finish(None).await;
                Err(status.into())
            }
        }
    }

    /// A receive failure that means the server answered with headers only.
    pub(super) fn is_trailers_only(&self, err: &ClientError) -> bool {
        (err.is_unexpected_eof() || err.is_end_of_stream()) && self.trailer.get().is_none()
    }

    /// Report the response headers as the trailer and derive the status from them.
    pub(super) fn trailers_only_status(&self, transport: &B::Stream) -> Result<Option<Res>, ClientError> {
        let header = transport.header().unwrap_or_default();
        self.trailers_only.store(true, Ordering::Release);
        if !self.header_captured.swap(true, Ordering::AcqRel) {
            self.options.capture_header(None);
        }
        let status = Status::from_headers(&header);
        self.record_trailer(Some(header));
        finish_status(status, None)
    }

    pub(super) fn capture_header(&self, transport: &B::Stream) {
        if !self.header_captured.swap(true, Ordering::AcqRel) {
            self.options.capture_header(transport.header().as_ref());
        }
    }

    /// Record the trailer. Only the first call has an effect.
    pub(super) fn record_trailer(&self, trailer: Option<Metadata>) {
        if self.trailer.set(trailer.clone()).is_ok() {
            self.options.capture_trailer(trailer.as_ref());
        }
    }

    /// Move to the terminal state and close the connection. Idempotent.
    pub(super) async fn finish(&self, trailer: Option<Metadata>) {
        self.closed.store(true, Ordering::Release);
        self.record_trailer(trailer);
        if let Some(transport) = self.transport.get() {
            if let Err(_e) = transport.close().await {
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = %self.endpoint, error = %_e, "failed to close stream transport");
            }
        }
    }
}
