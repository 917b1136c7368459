//! gRPC-Web client connection.
//!
//! [`ClientConn`] holds the target host and dial options and starts calls:
//! [`invoke`](ClientConn::invoke) for unary RPCs and the `new_*_stream`
//! constructors for the streaming shapes.

use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ClientError;
use crate::builder::ClientBuilder;
use crate::config::{CallOptions, ResolvedCallOptions, TlsOptions};
use crate::context::CallContext;
use crate::stream::{BidiStream, CallSpan, ClientStream, ServerStream, unary};
use crate::transport::{ConnectOptions, DefaultTransportBuilder, TransportBuilder, UnaryTransport};

/// The streaming shape of an RPC, as declared by its service definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamDesc {
    /// The client sends a stream of requests.
    pub client_streams: bool,
    /// The server sends a stream of responses.
    pub server_streams: bool,
}

impl StreamDesc {
    pub const CLIENT_STREAMING: StreamDesc = StreamDesc {
        client_streams: true,
        server_streams: false,
    };

    pub const SERVER_STREAMING: StreamDesc = StreamDesc {
        client_streams: false,
        server_streams: true,
    };

    pub const BIDI_STREAMING: StreamDesc = StreamDesc {
        client_streams: true,
        server_streams: true,
    };
}

/// A gRPC-Web client bound to one host.
///
/// `ClientConn` is cheap to clone; it opens a fresh transport for every call.
///
/// # Example
///
/// ```ignore
/// use grpcweb_client::{CallContext, CallOptions, ClientConn};
///
/// let conn = ClientConn::builder("localhost:50051").insecure().build()?;
/// let res: Option<HelloResponse> = conn
///     .invoke(&CallContext::new(), "/api.Example/Unary", &req, CallOptions::new())
///     .await?;
/// ```
#[derive(Clone)]
pub struct ClientConn<B = DefaultTransportBuilder> {
    host: String,
    insecure: bool,
    tls: Option<TlsOptions>,
    default_options: CallOptions,
    builder: B,
}

impl<B> std::fmt::Debug for ClientConn<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConn")
            .field("host", &self.host)
            .field("insecure", &self.insecure)
            .field("tls", &self.tls)
            .field("default_options", &self.default_options)
            .finish_non_exhaustive()
    }
}

impl ClientConn<DefaultTransportBuilder> {
    /// Create a [`ClientBuilder`] for `host` (`host:port`, no scheme).
    pub fn builder<S: Into<String>>(host: S) -> ClientBuilder<DefaultTransportBuilder> {
        ClientBuilder::new(host)
    }
}

impl<B: TransportBuilder> ClientConn<B> {
    /// Called by [`ClientBuilder::build`].
    pub(crate) fn new(
        host: String,
        insecure: bool,
        tls: Option<TlsOptions>,
        default_options: CallOptions,
        builder: B,
    ) -> Self {
        Self {
            host,
            insecure,
            tls,
            default_options,
            builder,
        }
    }

    /// The target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether calls use `http`/`ws` instead of `https`/`wss`.
    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// Perform a unary RPC.
    ///
    /// Returns `Ok(Some(response))` for a response message with an OK status,
    /// `Ok(None)` for a trailers-only OK response, and
    /// [`ClientError::Status`] for any other status.
    pub async fn invoke<Req, Res>(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<Option<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let options = self.resolve(options)?;
        let connect = self.connect_options(&options);
        let mut transport = self.builder.unary(&self.host, &connect)?;
        let span = CallSpan::new(method, "unary", options.codec);

        let call = unary::invoke(
            &mut transport,
            method,
            &options,
            ctx.metadata().clone(),
            request,
        );
        let result = span.run(ctx.run(call)).await;
        transport.close();

        let result = result.unwrap_or_else(|status| Err(status.into()));
        #[cfg(feature = "tracing")]
        {
            if let Err(e) = &result {
                tracing::debug!(method = %method, code = ?e.code(), error = %e, "unary call failed");
            }
        }
        result
    }

    /// Start a server-streaming RPC.
    ///
    /// Fails with [`ClientError::InvalidState`] unless `desc.server_streams` is set.
    pub fn new_server_stream<Req, Res>(
        &self,
        desc: &StreamDesc,
        method: &str,
        options: CallOptions,
    ) -> Result<ServerStream<Req, Res, B::Unary>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        if !desc.server_streams {
            return Err(ClientError::InvalidState("not a server stream RPC"));
        }
        let options = self.resolve(options)?;
        let connect = self.connect_options(&options);
        let transport = self.builder.unary(&self.host, &connect)?;
        let span = CallSpan::new(method, "server_stream", options.codec);
        Ok(ServerStream::new(method, transport, options, span))
    }

    /// Start a client-streaming RPC. The connection is dialed by the first send.
    ///
    /// Fails with [`ClientError::InvalidState`] unless `desc.client_streams` is set.
    pub fn new_client_stream<Req, Res>(
        &self,
        desc: &StreamDesc,
        method: &str,
        options: CallOptions,
    ) -> Result<ClientStream<Req, Res, B>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        if !desc.client_streams {
            return Err(ClientError::InvalidState("not a client stream RPC"));
        }
        self.client_stream(method, options, "client_stream")
    }

    /// Start a bidirectional streaming RPC.
    ///
    /// Fails with [`ClientError::InvalidState`] unless both stream flags are set.
    pub fn new_bidi_stream<Req, Res>(
        &self,
        desc: &StreamDesc,
        method: &str,
        options: CallOptions,
    ) -> Result<BidiStream<Req, Res, B>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        if !desc.client_streams || !desc.server_streams {
            return Err(ClientError::InvalidState("not a bidi stream RPC"));
        }
        let inner = self.client_stream(method, options, "bidi_stream")?;
        Ok(BidiStream::new(inner))
    }

    fn client_stream<Req, Res>(
        &self,
        method: &str,
        options: CallOptions,
        rpc_type: &'static str,
    ) -> Result<ClientStream<Req, Res, B>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let options = self.resolve(options)?;
        let connect = self.connect_options(&options);
        let span = CallSpan::new(method, rpc_type, options.codec);
        Ok(ClientStream::new(
            &self.host,
            method,
            self.builder.clone(),
            connect,
            options,
            span,
        ))
    }

    /// Dial-level defaults first, then the per-call options.
    fn resolve(&self, options: CallOptions) -> Result<ResolvedCallOptions, ClientError> {
        self.default_options.clone().merge(options).resolve()
    }

    /// Per-call TLS material overrides the dial-level credentials.
    fn connect_options(&self, options: &ResolvedCallOptions) -> ConnectOptions {
        ConnectOptions {
            insecure: self.insecure,
            tls: options.tls.clone().or_else(|| self.tls.clone()),
        }
    }
}
