//! `grpc-status-details-bin` encoding.
//!
//! The value is a base64-encoded `google.rpc.Status` protobuf message. Servers
//! may omit base64 padding.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use prost::Message;

use crate::error::{Code, ErrorDetail, Status};

/// `google.rpc.Status`.
#[derive(Clone, PartialEq, Message)]
struct RpcStatus {
    #[prost(int32, tag = "1")]
    code: i32,
    #[prost(string, tag = "2")]
    message: String,
    #[prost(message, repeated, tag = "3")]
    details: Vec<prost_types::Any>,
}

/// Decode a `grpc-status-details-bin` value into a [`Status`].
///
/// Returns the decode error text on failure.
pub fn decode_status_details(value: &str) -> Result<Status, String> {
    let bytes = if value.len() % 4 == 0 {
        STANDARD.decode(value)
    } else {
        STANDARD_NO_PAD.decode(value)
    }
    .map_err(|e| e.to_string())?;

    let proto = RpcStatus::decode(bytes.as_slice()).map_err(|e| e.to_string())?;
    let code = u32::try_from(proto.code)
        .map(Code::from_u32)
        .unwrap_or(Code::Unknown);

    Ok(proto
        .details
        .into_iter()
        .fold(Status::new(code, proto.message), |status, any| {
            status.add_error_detail(ErrorDetail::new(any.type_url, any.value))
        }))
}

/// Encode a [`Status`] as an unpadded `grpc-status-details-bin` value.
pub fn encode_status_details(status: &Status) -> String {
    let proto = RpcStatus {
        code: status.code().as_u32() as i32,
        message: status.message().unwrap_or_default().to_string(),
        details: status
            .details()
            .iter()
            .map(|d| prost_types::Any {
                type_url: d.type_url().to_string(),
                value: d.value().to_vec(),
            })
            .collect(),
    };
    STANDARD_NO_PAD.encode(proto.encode_to_vec())
}
