//! Unary call: `Idle -> Sent -> Done`.

use grpcweb_core::{Metadata, Status};
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ResponseFrame, encode_request, finish_status, read_response_frame};
use crate::ClientError;
use crate::config::ResolvedCallOptions;
use crate::transport::UnaryTransport;

/// Send one request and read `(message, trailer)` or a lone trailer.
///
/// Returns `Ok(None)` for a trailers-only OK response. The response header
/// and trailer are written to the capture slots in `options`.
pub(crate) async fn invoke<T, Req, Res>(
    transport: &mut T,
    endpoint: &str,
    options: &ResolvedCallOptions,
    header: Metadata,
    request: &Req,
) -> Result<Option<Res>, ClientError>
where
    T: UnaryTransport,
    Req: Message + Serialize,
    Res: Message + DeserializeOwned + Default,
{
    let codec = options.codec;
    let body = encode_request(codec, request)?;

    let (header, mut body) = transport
        .send(endpoint, &codec.content_type(), header, body)
        .await?;
    options.capture_header(Some(&header));

    let first = match read_response_frame(&mut body).await {
        // Empty body with the status carried in the HTTP headers
        Err(e) if e.is_unexpected_eof() && header.contains("grpc-status") => {
            options.capture_trailer(Some(&header));
            return finish_status(Status::from_headers(&header), None);
        }
        other => other?,
    };

    match first {
        ResponseFrame::Message(payload) => {
            let ResponseFrame::Trailer(status, trailer) = read_response_frame(&mut body).await?
            else {
                return Err(ClientError::Protocol(
                    "expected a trailer frame after the response message".into(),
                ));
            };
            options.capture_trailer(trailer.as_ref());
            if !status.is_ok() {
                return Err(ClientError::Status(status));
            }
            let message = codec.decode(&payload)?;
            Ok(Some(message))
        }
        ResponseFrame::Trailer(status, trailer) => {
            options.capture_trailer(trailer.as_ref());
            finish_status(status, None)
        }
    }
}
