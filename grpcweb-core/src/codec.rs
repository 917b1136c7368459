//! Payload codecs.
//!
//! gRPC-Web selects the payload encoding through the content-subtype of
//! `application/grpc-web+{subtype}`. Protocol Buffers is the default.

use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Content-type prefix for gRPC-Web requests.
pub const CONTENT_TYPE_PREFIX: &str = "application/grpc-web+";

/// Message codec selected by content-subtype.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codec {
    /// Protocol Buffers (`proto`).
    #[default]
    Proto,
    /// Protobuf JSON mapping via serde (`json`).
    Json,
}

impl Codec {
    /// Look up a codec by content-subtype name. An empty name selects `proto`.
    pub fn from_content_subtype(subtype: &str) -> Result<Self, CodecError> {
        match subtype.to_ascii_lowercase().as_str() {
            "" | "proto" => Ok(Codec::Proto),
            "json" => Ok(Codec::Json),
            _ => Err(CodecError::UnsupportedSubtype(subtype.to_string())),
        }
    }

    /// The content-subtype name.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Proto => "proto",
            Codec::Json => "json",
        }
    }

    /// `application/grpc-web+{name}`.
    pub fn content_type(&self) -> String {
        format!("{CONTENT_TYPE_PREFIX}{}", self.name())
    }

    /// Encode a message.
    pub fn encode<T>(&self, msg: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Message + Serialize,
    {
        match self {
            Codec::Proto => Ok(msg.encode_to_vec()),
            Codec::Json => serde_json::to_vec(msg).map_err(|e| CodecError::Encode {
                codec: self.name(),
                message: e.to_string(),
            }),
        }
    }

    /// Decode a message.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: Message + DeserializeOwned + Default,
    {
        match self {
            Codec::Proto => T::decode(bytes).map_err(|e| CodecError::Decode {
                codec: self.name(),
                message: e.to_string(),
            }),
            Codec::Json => serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
                codec: self.name(),
                message: e.to_string(),
            }),
        }
    }
}
