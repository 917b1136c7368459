//! Dial options for a gRPC-Web client.
//!
//! Provides a fluent API for configuring and building a [`ClientConn`].

use crate::client::ClientConn;
use crate::config::{CallOptions, TlsOptions};
use crate::transport::{DefaultTransportBuilder, TransportBuilder};

/// Builder for creating a [`ClientConn`].
///
/// # Example
///
/// ```ignore
/// use grpcweb_client::{CallOptions, ClientBuilder};
///
/// let conn = ClientBuilder::new("localhost:50051")
///     .insecure()
///     .default_call_options(CallOptions::new().content_subtype("json"))
///     .build()?;
/// ```
pub struct ClientBuilder<B = DefaultTransportBuilder> {
    /// Target `host:port`, without a scheme.
    host: String,
    /// Use `http`/`ws` instead of `https`/`wss`.
    insecure: bool,
    /// Default TLS material, overridden by per-call TLS options.
    tls: Option<TlsOptions>,
    /// Merged underneath every call's own options.
    default_options: CallOptions,
    builder: B,
}

impl<B> std::fmt::Debug for ClientBuilder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("host", &self.host)
            .field("insecure", &self.insecure)
            .field("tls", &self.tls)
            .field("default_options", &self.default_options)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder<DefaultTransportBuilder> {
    /// Create a builder for `host` (`host:port`, no scheme).
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            insecure: false,
            tls: None,
            default_options: CallOptions::default(),
            builder: DefaultTransportBuilder,
        }
    }
}

impl<B: TransportBuilder> ClientBuilder<B> {
    /// Options applied to every call before its own options.
    ///
    /// Calling this again replaces the earlier defaults.
    pub fn default_call_options(mut self, options: CallOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Dial with `http`/`ws` instead of `https`/`wss`.
    pub fn insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    /// Default TLS material for HTTPS and WSS.
    ///
    /// TLS options passed with [`CallOptions::tls`] or [`CallOptions::mtls`]
    /// take precedence for that call.
    pub fn transport_credentials(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Replace the transport factory, e.g. with an in-memory fake in tests.
    pub fn transport_builder<T: TransportBuilder>(self, builder: T) -> ClientBuilder<T> {
        ClientBuilder {
            host: self.host,
            insecure: self.insecure,
            tls: self.tls,
            default_options: self.default_options,
            builder,
        }
    }

    /// Build the [`ClientConn`].
    ///
    /// No connection is opened here; every call dials its own transport.
    pub fn build(self) -> Result<ClientConn<B>, ClientBuildError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ClientBuildError::EmptyHost);
        }
        if host.contains("://") {
            return Err(ClientBuildError::InvalidHost(host.to_string()));
        }
        let host = host.trim_end_matches('/').to_string();

        Ok(ClientConn::new(
            host,
            self.insecure,
            self.tls,
            self.default_options,
            self.builder,
        ))
    }
}

/// Error when building a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientBuildError {
    /// No host was given.
    #[error("host must not be empty")]
    EmptyHost,
    /// The host carries a scheme; the scheme is chosen by [`ClientBuilder::insecure`].
    #[error("host must not include a scheme: {0}")]
    InvalidHost(String),
}
