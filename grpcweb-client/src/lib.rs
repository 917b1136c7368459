//! gRPC-Web client for Rust.
//!
//! This crate speaks the gRPC-Web wire protocol to a gRPC-Web server or proxy:
//!
//! - Unary and server-streaming RPCs over a plain HTTP `POST`
//! - Client-streaming and bidirectional RPCs over a WebSocket negotiated with
//!   the `grpc-websockets` subprotocol
//! - Protobuf and JSON payloads, selected by content-subtype
//! - TLS and mutual TLS through rustls
//!
//! ## Example
//!
//! ```ignore
//! use grpcweb_client::{CallContext, CallOptions, ClientConn, MetadataSlot};
//!
//! let conn = ClientConn::builder("localhost:50051").insecure().build()?;
//!
//! let trailer = MetadataSlot::new();
//! let ctx = CallContext::new().with_metadata("authorization", "Bearer token123");
//! let res: Option<HelloResponse> = conn
//!     .invoke(&ctx, "/api.Example/Unary", &req, CallOptions::new().trailer(trailer.clone()))
//!     .await?;
//! ```
//!
//! ## Streaming
//!
//! ```ignore
//! use grpcweb_client::{CallContext, CallOptions, StreamDesc};
//!
//! let stream = conn.new_client_stream::<HelloRequest, HelloResponse>(
//!     &StreamDesc::CLIENT_STREAMING,
//!     "/api.Example/ClientStream",
//!     CallOptions::new(),
//! )?;
//! for name in ["m1", "m2", "m3"] {
//!     stream.send(&ctx, &HelloRequest { name: name.into() }).await?;
//! }
//! let res = stream.close_and_receive(&ctx).await?;
//! println!("trailer: {:?}", stream.trailer());
//! ```
//!
//! ## Status and Errors
//!
//! Every call ends in one gRPC status. An OK status is an `Ok(..)` result;
//! anything else is [`ClientError::Status`]. Transport and framing failures
//! have their own [`ClientError`] variants, each mapped to a [`Code`] by
//! [`ClientError::code`].
//!
//! Deadlines and cancellation come from the [`CallContext`] and surface as
//! [`Code::DeadlineExceeded`] and [`Code::Canceled`].
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` |
//! | `tls-ring` / `tls-aws-lc` | rustls crypto provider |
//! | `tls-native-roots` / `tls-webpki-roots` | Root certificates |
//! | `tracing` (default) | Tracing spans for RPC calls |
//!
//! When `tracing` is enabled, each RPC call creates a span with:
//! - `rpc.method`: Full method path (e.g., "/api.Example/Unary")
//! - `rpc.type`: Call type ("unary", "server_stream", "client_stream", "bidi_stream")
//! - `rpc.encoding`: Message encoding ("proto" or "json")
//! - `otel.kind`: "client"

mod builder;
mod client;
mod config;
mod context;
mod error;
mod stream;
#[cfg(test)]
mod testing;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder};
pub use client::{ClientConn, StreamDesc};
pub use config::{CallOptions, MetadataSlot, TlsOptions};
pub use context::CallContext;
pub use error::ClientError;
pub use stream::{BidiStream, ClientStream, ServerStream};

// Re-export core types
pub use grpcweb_core::{Code, Codec, ErrorDetail, Metadata, Status};

// Re-export for cancellation support
pub use tokio_util::sync::CancellationToken;
