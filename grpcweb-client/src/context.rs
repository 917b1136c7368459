//! Per-call context: outgoing metadata, deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use grpcweb_core::{Metadata, Status};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context carried by every suspending client operation.
///
/// Outgoing metadata becomes the request headers (HTTP) or the request header
/// block (WebSocket). When the deadline passes, the operation fails with
/// `DeadlineExceeded`; when the token is cancelled, it fails with `Canceled`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use grpcweb_client::CallContext;
///
/// let ctx = CallContext::new()
///     .with_metadata("authorization", "Bearer token123")
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(ctx.metadata().get("authorization"), Some("Bearer token123"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: Metadata,
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
}

impl CallContext {
    /// Create a context with no metadata, deadline or cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outgoing metadata value. Invalid keys or values are ignored.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.append(key, value);
        self
    }

    /// Replace the outgoing metadata.
    pub fn with_outgoing_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Fail operations that are still running after `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Fail operations that are still running at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail operations with `Canceled` once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Outgoing metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run `fut` until it completes, the deadline passes, or the call is cancelled.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Status> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(Status::cancelled("context canceled")),
            _ = deadline => Err(Status::deadline_exceeded("client timeout exceeded")),
            output = fut => Ok(output),
        }
    }
}
