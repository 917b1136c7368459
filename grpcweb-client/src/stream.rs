//! RPC-shape state machines.
//!
//! - [`unary`](self::unary): one request, one optional response
//! - [`ServerStream`]: one request over HTTP, many responses
//! - [`ClientStream`]: many requests over WebSocket, one response
//! - [`BidiStream`]: many requests and many responses over WebSocket
//!
//! Every machine ends in exactly one terminal [`Status`]: `Ok` results for an
//! OK status, [`ClientError::Status`] for anything else.

mod bidi;
mod client;
mod server;
pub(crate) mod unary;

use std::future::Future;

use bytes::Bytes;
use grpcweb_core::{
    Codec, Metadata, Status, decode_trailer, encode_frame, read_frame_header, read_message_payload,
};
use prost::Message;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::ClientError;
use crate::context::CallContext;

pub use bidi::BidiStream;
pub use client::ClientStream;
pub use server::ServerStream;

/// One decoded response frame.
#[derive(Debug)]
pub(crate) enum ResponseFrame {
    Message(Vec<u8>),
    Trailer(Status, Option<Metadata>),
}

/// Read the next frame from a response body.
pub(crate) async fn read_response_frame<R>(body: &mut R) -> Result<ResponseFrame, ClientError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let header = read_frame_header(body)
        .await
        .map_err(|e| ClientError::frame("failed to parse response header", e))?;

    if header.is_trailer() {
        let (status, trailer) = decode_trailer(body, header.length())
            .await
            .map_err(|e| ClientError::frame("failed to parse trailer", e))?;
        return Ok(ResponseFrame::Trailer(status, trailer));
    }
    if header.is_compressed() {
        return Err(ClientError::Protocol(
            "compressed response messages are not supported".into(),
        ));
    }
    if !header.is_message() {
        return Err(ClientError::Protocol(format!(
            "unexpected frame flag 0x{:02x}",
            header.flag()
        )));
    }

    let payload = read_message_payload(body, header.length())
        .await
        .map_err(|e| ClientError::frame("failed to parse the response body", e))?;
    Ok(ResponseFrame::Message(payload))
}

/// Encode a request message into a message frame.
pub(crate) fn encode_request<Req>(codec: Codec, request: &Req) -> Result<Bytes, ClientError>
where
    Req: Message + Serialize,
{
    let payload = codec.encode(request)?;
    let frame = encode_frame(&payload).map_err(|e| ClientError::Encode(e.to_string()))?;
    Ok(Bytes::from(frame))
}

/// Turn a terminal status into the call result.
pub(crate) fn finish_status<T>(status: Status, value: Option<T>) -> Result<Option<T>, ClientError> {
    if status.is_ok() {
        Ok(value)
    } else {
        Err(ClientError::Status(status))
    }
}

/// Request header for a streaming call: outgoing metadata plus content-type.
pub(crate) fn stream_request_header(ctx: &CallContext, codec: Codec) -> Metadata {
    let mut header = ctx.metadata().clone();
    header.insert("content-type", &codec.content_type());
    header
}

/// Tracing span for one RPC.
#[derive(Debug, Clone)]
pub(crate) struct CallSpan {
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl CallSpan {
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub(crate) fn new(method: &str, rpc_type: &'static str, codec: Codec) -> Self {
        Self {
            #[cfg(feature = "tracing")]
            span: tracing::info_span!(
                "rpc.call",
                rpc.method = %method,
                rpc.type = rpc_type,
                rpc.encoding = codec.name(),
                otel.kind = "client",
            ),
        }
    }

    /// Run `fut` inside the span.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> F::Output {
        #[cfg(feature = "tracing")]
        {
            use tracing::Instrument;
            fut.instrument(self.span.clone()).await
        }
        #[cfg(not(feature = "tracing"))]
        {
            fut.await
        }
    }
}
