//! Transport layer for the gRPC-Web client.
//!
//! Two strategies sit behind small capability traits:
//!
//! - [`HttpTransport`] implements [`UnaryTransport`]: one HTTP `POST` per call,
//!   used for unary and server-streaming RPCs.
//! - [`WebSocketTransport`] implements [`StreamTransport`]: a persistent
//!   `grpc-websockets` connection, used for client-streaming and bidi RPCs.
//!
//! A [`TransportBuilder`] creates both kinds. [`ClientConn`](crate::ClientConn)
//! is generic over it, so tests can inject in-memory fakes.
//!
//! # Feature Flags
//!
//! TLS support requires the appropriate features:
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

mod http;
mod tls;
mod websocket;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use grpcweb_core::Metadata;
use tokio::io::AsyncRead;

use crate::ClientError;
use crate::config::TlsOptions;

pub use self::http::HttpTransport;
pub use self::tls::{client_config, has_tls_support};
pub use self::websocket::{WebSocketTransport, WEBSOCKET_PROTOCOL};

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;

/// A response body: the raw frame bytes as an async reader.
pub type ResponseBody = Pin<Box<dyn AsyncRead + Send>>;

/// Connection settings handed to a [`TransportBuilder`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Use `http`/`ws` instead of `https`/`wss`.
    pub insecure: bool,
    /// TLS material; `None` means default roots and no client identity.
    pub tls: Option<TlsOptions>,
}

impl ConnectOptions {
    pub(crate) fn http_scheme(&self) -> &'static str {
        if self.insecure { "http" } else { "https" }
    }

    pub(crate) fn ws_scheme(&self) -> &'static str {
        if self.insecure { "ws" } else { "wss" }
    }
}

/// Single-shot request/response transport.
pub trait UnaryTransport: Send {
    /// Send one request and return the response header and body.
    ///
    /// Must be called at most once per transport.
    fn send(
        &mut self,
        endpoint: &str,
        content_type: &str,
        header: Metadata,
        body: Bytes,
    ) -> impl Future<Output = Result<(Metadata, ResponseBody), ClientError>> + Send;

    /// Release the connection. Idempotent.
    fn close(&mut self);
}

/// Writes frames to a stream transport.
pub trait Sender: Send + Sync {
    /// Send one encoded frame.
    fn send(&self, frame: Bytes) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Reads frames from a stream transport.
pub trait Receiver: Send + Sync {
    /// Receive the next complete frame.
    ///
    /// A clean close is reported as a frame error with `EndOfStream`, an
    /// abrupt one as `UnexpectedEof`.
    fn receive(&self) -> impl Future<Output = Result<ResponseBody, ClientError>> + Send;

    /// The response header, once the first [`receive`](Self::receive) has parsed it.
    fn header(&self) -> Option<Metadata>;
}

/// Half-closes the sending side of a stream transport.
pub trait CloseSender: Send + Sync {
    /// Tell the server that no more messages will be sent.
    fn close_send(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Full-duplex framed transport.
pub trait StreamTransport: Sender + Receiver + CloseSender {
    /// Set the request header. Must be called before the first send.
    fn set_request_header(&self, header: Metadata);

    /// Close the connection. Idempotent.
    fn close(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Creates transports for a [`ClientConn`](crate::ClientConn).
pub trait TransportBuilder: Clone + Send + Sync + 'static {
    type Unary: UnaryTransport + 'static;
    type Stream: StreamTransport + 'static;

    /// Create a unary transport for `host`.
    fn unary(&self, host: &str, options: &ConnectOptions) -> Result<Self::Unary, ClientError>;

    /// Dial a stream transport for `endpoint` on `host`.
    fn stream(
        &self,
        host: &str,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> impl Future<Output = Result<Self::Stream, ClientError>> + Send;
}

/// Creates [`HttpTransport`] and [`WebSocketTransport`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportBuilder;

impl TransportBuilder for DefaultTransportBuilder {
    type Unary = HttpTransport;
    type Stream = WebSocketTransport;

    fn unary(&self, host: &str, options: &ConnectOptions) -> Result<HttpTransport, ClientError> {
        HttpTransport::new(host, options)
    }

    async fn stream(
        &self,
        host: &str,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> Result<WebSocketTransport, ClientError> {
        WebSocketTransport::connect(host, endpoint, options).await
    }
}

/// Join `host` and `endpoint` into a URL with `scheme`.
pub(crate) fn endpoint_url(scheme: &str, host: &str, endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        format!("{scheme}://{host}{endpoint}")
    } else {
        format!("{scheme}://{host}/{endpoint}")
    }
}
