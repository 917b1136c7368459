//! Client-side gRPC-Web error types.
//!
//! This module provides [`ClientError`], the error type for gRPC-Web client operations.

use grpcweb_core::{Code, CodecError, ErrorDetail, FrameError, Status};

/// Client-side gRPC-Web error variants.
///
/// A non-OK terminal status is carried as [`ClientError::Status`]. Every other
/// variant describes a failure to reach or understand the server.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The call completed with a non-OK status.
    #[error("rpc error: {0}")]
    Status(Status),

    /// A frame could not be read.
    #[error("{context}: {source}")]
    Frame {
        context: &'static str,
        #[source]
        source: FrameError,
    },

    /// The connection was closed before or during the operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport-level error (dial failure, TLS setup, HTTP failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// Message encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Protocol error (unexpected frame type, compressed payload, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The operation is not valid in the current call state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl ClientError {
    /// Create a new status error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        ClientError::Status(Status::new(code, message))
    }

    /// Wrap a frame reading error with a description of the operation.
    pub fn frame(context: &'static str, source: FrameError) -> Self {
        ClientError::Frame { context, source }
    }

    /// Get the error code.
    ///
    /// For non-Status variants, returns an appropriate code:
    /// - Transport / ConnectionClosed: `Unavailable`
    /// - Frame / Encode / Decode: `Internal`
    /// - Protocol: `Internal`
    /// - InvalidState: `FailedPrecondition`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Status(status) => status.code(),
            ClientError::Transport(_) | ClientError::ConnectionClosed => Code::Unavailable,
            ClientError::Frame { .. }
            | ClientError::Encode(_)
            | ClientError::Decode(_)
            | ClientError::Protocol(_) => Code::Internal,
            ClientError::InvalidState(_) => Code::FailedPrecondition,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Status(status) => status.message(),
            ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Protocol(msg) => Some(msg),
            ClientError::Frame { context, .. } => Some(context),
            ClientError::InvalidState(msg) => Some(msg),
            ClientError::ConnectionClosed => None,
        }
    }

    /// Get the error details (only for the Status variant).
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ClientError::Status(status) => status.details(),
            _ => &[],
        }
    }

    /// The terminal status, if the call completed with one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Whether this is a clean end-of-stream signal from the transport.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(
            self,
            ClientError::Frame {
                source: FrameError::EndOfStream,
                ..
            }
        )
    }

    /// Whether the transport ended in the middle of a frame or without a close handshake.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(
            self,
            ClientError::Frame {
                source: FrameError::UnexpectedEof,
                ..
            }
        )
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Status(status)
    }
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encode { .. } | CodecError::UnsupportedSubtype(_) => {
                ClientError::Encode(err.to_string())
            }
            CodecError::Decode { .. } => ClientError::Decode(err.to_string()),
        }
    }
}
