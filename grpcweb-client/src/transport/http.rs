//! Hyper-based HTTP transport for unary and server-streaming calls.
//!
//! This module provides [`HttpTransport`], a single-shot transport built on
//! hyper_util's legacy client.

use bytes::Bytes;
use futures::TryStreamExt;
use grpcweb_core::{Code, Metadata, Status};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio_util::io::StreamReader;

use super::tls::{client_config, https_connector};
use super::{ConnectOptions, ResponseBody, UnaryTransport, endpoint_url};
use crate::ClientError;

/// Plain clients need no TLS provider at all.
#[derive(Clone)]
enum HttpClient {
    Plain(Client<HttpConnector, Full<Bytes>>),
    Tls(Client<HttpsConnector<HttpConnector>, Full<Bytes>>),
}

impl HttpClient {
    async fn request(
        &self,
        request: http::Request<Full<Bytes>>,
    ) -> Result<http::Response<hyper::body::Incoming>, ClientError> {
        let result = match self {
            HttpClient::Plain(client) => client.request(request).await,
            HttpClient::Tls(client) => client.request(request).await,
        };
        result.map_err(|e| ClientError::Transport(format!("failed to send the request: {e}")))
    }
}

/// HTTP transport that issues exactly one `POST` per instance.
///
/// # Example
///
/// ```ignore
/// use grpcweb_client::transport::{ConnectOptions, HttpTransport, UnaryTransport};
///
/// let mut transport = HttpTransport::new("localhost:8080", &ConnectOptions::default())?;
/// let (header, body) = transport
///     .send("/api.Example/Unary", "application/grpc-web+proto", Metadata::empty(), frame)
///     .await?;
/// ```
pub struct HttpTransport {
    host: String,
    scheme: &'static str,
    client: Option<HttpClient>,
    sent: bool,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("host", &self.host)
            .field("scheme", &self.scheme)
            .field("closed", &self.client.is_none())
            .field("sent", &self.sent)
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for `host` (`host:port`, no scheme).
    pub fn new(host: &str, options: &ConnectOptions) -> Result<Self, ClientError> {
        let mut builder = Client::builder(TokioExecutor::new());
        // Required for idle connections to be reaped
        builder.pool_timer(TokioTimer::new());

        let client = if options.insecure {
            HttpClient::Plain(builder.build(HttpConnector::new()))
        } else {
            let config = client_config(options.tls.as_ref())?;
            HttpClient::Tls(builder.build(https_connector(config)))
        };

        Ok(Self {
            host: host.to_string(),
            scheme: options.http_scheme(),
            client: Some(client),
            sent: false,
        })
    }
}

impl UnaryTransport for HttpTransport {
    async fn send(
        &mut self,
        endpoint: &str,
        content_type: &str,
        header: Metadata,
        body: Bytes,
    ) -> Result<(Metadata, ResponseBody), ClientError> {
        let client = self.client.clone().ok_or(ClientError::ConnectionClosed)?;
        if self.sent {
            return Err(ClientError::InvalidState(
                "send must be called only once per request",
            ));
        }
        self.sent = true;

        let url = endpoint_url(self.scheme, &self.host, endpoint);
        let mut request = http::Request::post(&url)
            .body(Full::new(body))
            .map_err(|e| ClientError::Transport(format!("failed to build the request: {e}")))?;

        let headers = request.headers_mut();
        headers.extend(header.into_headers());
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|e| ClientError::Transport(format!("invalid content-type: {e}")))?;
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(
            HeaderName::from_static("x-grpc-web"),
            HeaderValue::from_static("1"),
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %url, "sending gRPC-Web request");

        let response = client.request(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();
            return Err(http_status_error(status, &body).into());
        }

        let (parts, body) = response.into_parts();
        let stream = body
            .into_data_stream()
            .map_err(|e| std::io::Error::other(e.to_string()));
        let reader: ResponseBody = Box::pin(StreamReader::new(stream));

        Ok((Metadata::new(parts.headers), reader))
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!(host = %self.host, "http transport closed");
        }
    }
}

/// Map a non-2xx HTTP response to a gRPC status.
fn http_status_error(status: http::StatusCode, body: &[u8]) -> Status {
    let mut message = format!("unexpected HTTP status code {}", status.as_u16());
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        message.push_str(": ");
        message.push_str(text);
    }
    Status::new(http_status_to_code(status), message)
}

/// Map HTTP status codes to gRPC codes.
///
/// See: <https://github.com/grpc/grpc/blob/master/doc/http-grpc-status-mapping.md>
fn http_status_to_code(status: http::StatusCode) -> Code {
    match status.as_u16() {
        400 => Code::Internal,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::Unimplemented,
        429 | 502 | 503 | 504 => Code::Unavailable,
        _ => Code::Unknown,
    }
}
