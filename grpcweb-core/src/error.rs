//! gRPC status codes and error types.
//!
//! This module provides the core error types used by the gRPC-Web protocol:
//! - [`Code`]: Canonical gRPC status codes
//! - [`Status`]: The terminal outcome of a call
//! - [`ErrorDetail`]: Self-describing error details (`google.protobuf.Any`)
//! - [`FrameError`]: Frame reading errors
//! - [`CodecError`]: Payload encoding errors

use crate::metadata::Metadata;

/// gRPC status codes, matching the canonical codes from `google.rpc.Code`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Convert a numeric `grpc-status` value into a code.
    ///
    /// Values outside the canonical range map to [`Code::Unknown`].
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Canceled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Numeric value as sent in `grpc-status`.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// The canonical gRPC name of this code, e.g. `NotFound`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Canceled => "Canceled",
            Code::Unknown => "Unknown",
            Code::InvalidArgument => "InvalidArgument",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "AlreadyExists",
            Code::PermissionDenied => "PermissionDenied",
            Code::ResourceExhausted => "ResourceExhausted",
            Code::FailedPrecondition => "FailedPrecondition",
            Code::Aborted => "Aborted",
            Code::OutOfRange => "OutOfRange",
            Code::Unimplemented => "Unimplemented",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
            Code::DataLoss => "DataLoss",
            Code::Unauthenticated => "Unauthenticated",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error detail attached to a status.
///
/// This maps to `google.protobuf.Any` inside `grpc-status-details-bin`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Type URL (e.g., "type.googleapis.com/google.rpc.RetryInfo").
    type_url: String,
    /// Protobuf-encoded message bytes.
    value: Vec<u8>,
}

impl ErrorDetail {
    /// Create a new error detail with a type URL and protobuf-encoded bytes.
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// Get the type URL.
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// Get the protobuf-encoded value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Frame reading errors.
///
/// `EndOfStream` is the expected termination signal of a stream, not a failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The source ended before a complete frame or trailer block was read.
    #[error("unexpected EOF")]
    UnexpectedEof,

    /// A zero-length frame was read.
    #[error("end of stream")]
    EndOfStream,

    /// The underlying source failed.
    #[error("io error: {0}")]
    Io(String),

    /// A payload does not fit the 32-bit frame length.
    #[error("frame payload of {0} bytes exceeds the frame length limit")]
    TooLarge(usize),
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::UnexpectedEof,
            _ => FrameError::Io(err.to_string()),
        }
    }
}

/// Payload codec errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("failed to marshal with codec {codec}: {message}")]
    Encode { codec: &'static str, message: String },

    #[error("failed to unmarshal with codec {codec}: {message}")]
    Decode { codec: &'static str, message: String },

    #[error("unsupported content subtype: {0:?}")]
    UnsupportedSubtype(String),
}

// ============================================================================
// Status
// ============================================================================

/// RPC status representing the result of an RPC call.
///
/// Contains the code, an optional message, and optional structured details.
///
/// # Example
///
/// ```
/// use grpcweb_core::{Code, Status};
///
/// let status = Status::not_found("user not found");
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.message(), Some("user not found"));
///
/// let status = status.add_detail("google.rpc.RetryInfo", vec![1, 2, 3]);
/// assert_eq!(status.details().len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Option<String>,
    details: Vec<ErrorDetail>,
}

impl Status {
    /// Create a new status with a code and message.
    ///
    /// An empty message is stored as no message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        let message = message.into();
        Self {
            code,
            message: (!message.is_empty()).then_some(message),
            details: vec![],
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
            details: vec![],
        }
    }

    /// The OK status.
    pub fn ok() -> Self {
        Self::from_code(Code::Ok)
    }

    /// Build a status from response headers reinterpreted as trailers.
    ///
    /// Used for trailers-only responses, where the server sends `grpc-status`
    /// and `grpc-message` as headers and no trailer frame at all.
    pub fn from_headers(headers: &Metadata) -> Self {
        let Some(code) = headers.get("grpc-status") else {
            return Self::unknown("response closed without grpc-status (headers only)");
        };
        match code.trim().parse::<u32>() {
            Ok(code) => Self::new(
                Code::from_u32(code),
                headers.get("grpc-message").unwrap_or_default(),
            ),
            Err(e) => Self::unknown(e.to_string()),
        }
    }

    /// Get the code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Whether this status is [`Code::Ok`].
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Get the message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    /// Add an error detail with type URL and protobuf-encoded bytes.
    pub fn add_detail<S: Into<String>>(mut self, type_url: S, value: Vec<u8>) -> Self {
        self.details.push(ErrorDetail::new(type_url, value));
        self
    }

    /// Add a pre-constructed ErrorDetail.
    pub fn add_error_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    // Convenience constructors for the codes this client produces locally.

    /// Create a canceled status.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create an unknown status.
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a not found status.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create an internal status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.as_str())?;
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_display_uses_grpc_names() {
        assert_eq!(Code::Ok.to_string(), "OK");
        assert_eq!(Code::NotFound.to_string(), "NotFound");
        assert_eq!(Code::InvalidArgument.as_str(), "InvalidArgument");
        assert_eq!(Code::Internal.as_str(), "Internal");
    }

    #[test]
    fn test_code_from_u32() {
        assert_eq!(Code::from_u32(0), Code::Ok);
        assert_eq!(Code::from_u32(13), Code::Internal);
        assert_eq!(Code::from_u32(16), Code::Unauthenticated);
        assert_eq!(Code::from_u32(17), Code::Unknown);
        assert_eq!(Code::from_u32(u32::MAX), Code::Unknown);
        assert_eq!(Code::Internal.as_u32(), 13);
    }

    #[test]
    fn test_frame_error_from_io() {
        let eof = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert_eq!(FrameError::from(eof), FrameError::UnexpectedEof);

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(FrameError::from(reset), FrameError::Io("reset".into()));
    }

    #[test]
    fn test_status_new() {
        let status = Status::new(Code::NotFound, "resource not found");
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), Some("resource not found"));
        assert!(status.details().is_empty());
        assert!(!status.is_ok());
    }

    #[test]
    fn test_status_empty_message() {
        let status = Status::new(Code::Ok, "");
        assert!(status.is_ok());
        assert!(status.message().is_none());
        assert_eq!(status, Status::ok());
    }

    #[test]
    fn test_status_display() {
        let status = Status::internal("internal error");
        assert_eq!(status.to_string(), "Internal: internal error");

        let status = Status::from_code(Code::Unavailable);
        assert_eq!(status.to_string(), "Unavailable");
    }

    #[test]
    fn test_status_add_detail() {
        let status = Status::internal("error")
            .add_detail("test.Type1", vec![1, 2, 3])
            .add_error_detail(ErrorDetail::new("test.Type2", vec![4]));

        assert_eq!(status.details().len(), 2);
        assert_eq!(status.details()[0].type_url(), "test.Type1");
        assert_eq!(status.details()[1].value(), &[4]);
    }

    #[test]
    fn test_status_from_headers() {
        let mut headers = Metadata::empty();
        headers.append("grpc-status", "5");
        headers.append("grpc-message", "missing");
        let status = Status::from_headers(&headers);
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), Some("missing"));
    }

    #[test]
    fn test_status_from_headers_without_status() {
        let status = Status::from_headers(&Metadata::empty());
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(
            status.message(),
            Some("response closed without grpc-status (headers only)")
        );
    }

    #[test]
    fn test_status_from_headers_non_numeric() {
        let mut headers = Metadata::empty();
        headers.append("grpc-status", "abc");
        let status = Status::from_headers(&headers);
        assert_eq!(status.code(), Code::Unknown);
        assert!(status.message().is_some());
    }
}
