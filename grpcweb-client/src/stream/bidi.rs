use std::sync::atomic::{AtomicBool, Ordering};

use grpcweb_core::Metadata;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ClientStream, ResponseFrame, finish_status, read_response_frame};
use crate::ClientError;
use crate::context::CallContext;
use crate::transport::{CloseSender, DefaultTransportBuilder, Receiver, TransportBuilder};

/// A bidirectional streaming call.
///
/// [`send`](Self::send) and [`receive`](Self::receive) take `&self`, so one
/// task can send while another receives.
///
/// # Example
///
/// ```ignore
/// let stream = conn
///     .new_bidi_stream::<HelloRequest, HelloResponse>(&desc, "/api.Example/BidiStream", CallOptions::new())?;
/// let (sent, received) = tokio::join!(
///     async {
///         for name in ["a", "b"] {
///             stream.send(&ctx, &HelloRequest { name: name.into() }).await?;
///         }
///         stream.close_send(&ctx).await
///     },
///     async {
///         let mut out = Vec::new();
///         while let Some(res) = stream.receive(&ctx).await? {
///             out.push(res);
///         }
///         Ok::<_, ClientError>(out)
///     },
/// );
/// ```
pub struct BidiStream<Req, Res, B: TransportBuilder = DefaultTransportBuilder> {
    inner: ClientStream<Req, Res, B>,
    sent_close_send: AtomicBool,
}

impl<Req, Res, B: TransportBuilder> std::fmt::Debug for BidiStream<Req, Res, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BidiStream")
            .field("inner", &self.inner)
            .field("sent_close_send", &self.sent_close_send.load(Ordering::Acquire))
            .finish()
    }
}

impl<Req, Res, B> BidiStream<Req, Res, B>
where
    B: TransportBuilder,
    Req: Message + Serialize,
    Res: Message + DeserializeOwned + Default,
{
    pub(crate) fn new(inner: ClientStream<Req, Res, B>) -> Self {
        Self {
            inner,
            sent_close_send: AtomicBool::new(false),
        }
    }

    /// Send one request message.
    pub async fn send(&self, ctx: &CallContext, request: &Req) -> Result<(), ClientError> {
        if self.sent_close_send.load(Ordering::Acquire) {
            return Err(ClientError::InvalidState("send called after close_send"));
        }
        self.inner.send(ctx, request).await
    }

    /// Tell the server that no more requests will be sent.
    pub async fn close_send(&self, ctx: &CallContext) -> Result<(), ClientError> {
        self.inner.check_open()?;
        self.inner
            .guard(ctx, async {
                let transport = self.inner.transport(ctx).await?;
                transport.close_send().await
            })
            .await?;
        self.sent_close_send.store(true, Ordering::Release);
        Ok(())
    }

    /// Receive the next response.
    ///
    /// Returns `Ok(None)` once the server has finished with an OK status.
    /// Any terminal outcome closes the connection and makes
    /// [`trailer`](Self::trailer) available.
    pub async fn receive(&self, ctx: &CallContext) -> Result<Option<Res>, ClientError> {
        if self.inner.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        let result = self.inner.guard(ctx, self.receive_inner(ctx)).await;
        match result {
            Ok(Some(message)) => Ok(Some(message)),
            other => {
                self.inner.finish(None).await;
                other
            }
        }
    }

    async fn receive_inner(&self, ctx: &CallContext) -> Result<Option<Res>, ClientError> {
        let transport = self.inner.transport(ctx).await?;

        let mut body = match transport.receive().await {
            Err(e)
                if self.sent_close_send.load(Ordering::Acquire)
                    && self.inner.is_trailers_only(&e) =>
            {
                return self.inner.trailers_only_status(transport);
            }
            other => other?,
        };
        self.inner.capture_header(transport);

        match read_response_frame(&mut body).await {
            Ok(ResponseFrame::Message(payload)) => {
                let message = self.inner.options.codec.decode(&payload)?;
                Ok(Some(message))
            }
            Ok(ResponseFrame::Trailer(status, trailer)) => {
                self.inner.record_trailer(trailer);
                finish_status(status, None)
            }
            Err(e) if e.is_end_of_stream() => {
                self.inner.record_trailer(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// The response header. See [`ClientStream::header`].
    pub fn header(&self) -> Option<Metadata> {
        self.inner.header()
    }

    /// The response trailer.
    ///
    /// # Panics
    ///
    /// Panics if the stream has not finished yet: call it only after
    /// [`receive`](Self::receive) returned `Ok(None)` or an error.
    pub fn trailer(&self) -> Option<Metadata> {
        self.inner.trailer()
    }

    /// Abandon the call and close the connection. Idempotent.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}
