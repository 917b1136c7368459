//! WebSocket transport for client-streaming and bidi calls.
//!
//! Plain gRPC-Web cannot stream requests, so streaming calls are tunnelled
//! over a WebSocket negotiated with the `grpc-websockets` subprotocol:
//!
//! - The first client message is the request header block (`key: value\r\n` lines).
//! - Every request frame is sent as `0x00` followed by the frame bytes.
//! - A single `0x01` byte half-closes the request side.
//! - The server answers with two header messages (the first is ignored, the
//!   second holds the response header block), then the response frames. A
//!   frame may be split over several messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use grpcweb_core::{FRAME_HEADER_SIZE, FrameError, Metadata};
use http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use super::{CloseSender, ConnectOptions, Receiver, ResponseBody, Sender, StreamTransport, endpoint_url};
use crate::ClientError;

/// WebSocket subprotocol spoken by gRPC-Web streaming servers.
pub const WEBSOCKET_PROTOCOL: &str = "grpc-websockets";

const DEFAULT_CONTENT_TYPE: &str = "application/grpc-web+proto";
const DATA_PREFIX: u8 = 0x00;
const FINISH_SEND: u8 = 0x01;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct ReadHalf {
    stream: SplitStream<WsStream>,
    header_read: bool,
    /// Bytes received past the end of the last returned frame.
    pending: BytesMut,
}

/// Stream transport over a `grpc-websockets` connection.
///
/// One writer and one reader may run concurrently: the sink and the stream
/// sit behind separate locks.
pub struct WebSocketTransport {
    url: String,
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    read: tokio::sync::Mutex<ReadHalf>,
    request_header: Mutex<Option<Metadata>>,
    header_sent: tokio::sync::OnceCell<()>,
    response_header: OnceLock<Metadata>,
    closed: AtomicBool,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("header_sent", &self.header_sent.initialized())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Dial `ws(s)://{host}{endpoint}` and negotiate `grpc-websockets`.
    pub async fn connect(
        host: &str,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> Result<Self, ClientError> {
        let url = endpoint_url(options.ws_scheme(), host, endpoint);
        let dial_error = |e: &dyn std::fmt::Display| {
            ClientError::Transport(format!("failed to dial to '{url}': {e}"))
        };

        let mut request = url.as_str().into_client_request().map_err(|e| dial_error(&e))?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(WEBSOCKET_PROTOCOL),
        );

        let connector = connector(options)?;
        let (ws, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await
                .map_err(|e| dial_error(&e))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %url, "websocket connected");

        let (sink, stream) = ws.split();
        Ok(Self {
            url,
            sink: tokio::sync::Mutex::new(sink),
            read: tokio::sync::Mutex::new(ReadHalf {
                stream,
                header_read: false,
                pending: BytesMut::new(),
            }),
            request_header: Mutex::new(None),
            header_sent: tokio::sync::OnceCell::new(),
            response_header: OnceLock::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn take_request_header(&self) -> Metadata {
        self.request_header
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default()
    }

    /// Write the request header block exactly once, before any other message.
    async fn ensure_header_sent(&self) -> Result<(), ClientError> {
        self.header_sent
            .get_or_try_init(|| async {
                let mut header = self.take_request_header();
                if !header.contains("content-type") {
                    header.insert("content-type", DEFAULT_CONTENT_TYPE);
                }
                header.insert("x-grpc-web", "1");

                #[cfg(feature = "tracing")]
                tracing::debug!(url = %self.url, "sending request header block");

                self.write(Message::Binary(header.to_header_block().into()))
                    .await
            })
            .await
            .map(|_| ())
    }

    async fn write(&self, message: Message) -> Result<(), ClientError> {
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(write_error)
    }

    fn check_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }
}

impl Sender for WebSocketTransport {
    async fn send(&self, frame: Bytes) -> Result<(), ClientError> {
        self.check_open()?;
        self.ensure_header_sent().await?;

        let mut message = BytesMut::with_capacity(1 + frame.len());
        message.put_u8(DATA_PREFIX);
        message.extend_from_slice(&frame);
        self.write(Message::Binary(message.freeze())).await
    }
}

impl Receiver for WebSocketTransport {
    async fn receive(&self) -> Result<ResponseBody, ClientError> {
        self.check_open()?;

        let mut guard = self.read.lock().await;
        let read = &mut *guard;

        if !read.header_read {
            read.header_read = true;
            next_message(&mut read.stream, "failed to read response header").await?;
            let block = next_message(&mut read.stream, "failed to read response header").await?;
            let header = Metadata::from_header_block(&block);

            #[cfg(feature = "tracing")]
            tracing::debug!(url = %self.url, header_len = header.len(), "received response header");

            let _ = self.response_header.set(header);
        }

        let frame = read_frame(read).await?;
        Ok(Box::pin(std::io::Cursor::new(frame)))
    }

    fn header(&self) -> Option<Metadata> {
        self.response_header.get().cloned()
    }
}

impl CloseSender for WebSocketTransport {
    async fn close_send(&self) -> Result<(), ClientError> {
        self.check_open()?;
        // The server expects the header block before the finish-send marker
        self.ensure_header_sent().await?;
        self.write(Message::Binary(Bytes::from_static(&[FINISH_SEND])))
            .await
    }
}

impl StreamTransport for WebSocketTransport {
    fn set_request_header(&self, header: Metadata) {
        *self.request_header.lock().unwrap_or_else(|e| e.into_inner()) = Some(header);
    }

    async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.url, "closing websocket");

        let mut sink = self.sink.lock().await;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Utf8Bytes::from_static(""),
        };
        match sink.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
            Err(e) => return Err(write_error(e)),
        }
        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(write_error(e)),
        }
    }
}

fn connector(options: &ConnectOptions) -> Result<Option<Connector>, ClientError> {
    if options.insecure {
        return Ok(Some(Connector::Plain));
    }
    tls_connector(options)
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn tls_connector(options: &ConnectOptions) -> Result<Option<Connector>, ClientError> {
    let config = super::tls::client_config(options.tls.as_ref())?;
    Ok(Some(Connector::Rustls(std::sync::Arc::new(config))))
}

#[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
fn tls_connector(_options: &ConnectOptions) -> Result<Option<Connector>, ClientError> {
    Err(ClientError::Transport(
        "wss requires the `tls-native-roots` or `tls-webpki-roots` feature".into(),
    ))
}

/// Read one complete frame, joining continuation messages until the declared
/// length is covered. Bytes past the frame are kept for the next call.
async fn read_frame(read: &mut ReadHalf) -> Result<Bytes, ClientError> {
    if read.pending.is_empty() {
        let first = next_message(&mut read.stream, "failed to read response body").await?;
        read.pending.extend_from_slice(&first);
    }

    loop {
        if let Some(len) = complete_frame_len(&read.pending) {
            return Ok(read.pending.split_to(len).freeze());
        }
        let more = next_message(&mut read.stream, "failed to read continuation")
            .await
            .map_err(|e| {
                if e.is_end_of_stream() {
                    ClientError::frame("failed to read continuation", FrameError::UnexpectedEof)
                } else {
                    e
                }
            })?;
        read.pending.extend_from_slice(&more);
    }
}

/// Total length of the frame at the start of `buf`, once all of it has arrived.
fn complete_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < FRAME_HEADER_SIZE {
        return None;
    }
    let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let total = FRAME_HEADER_SIZE + length;
    (buf.len() >= total).then_some(total)
}

/// Next data message. Control messages are skipped.
async fn next_message(
    stream: &mut SplitStream<WsStream>,
    context: &'static str,
) -> Result<Bytes, ClientError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(data))) => return Ok(data),
            Some(Ok(Message::Text(text))) => {
                return Ok(Bytes::copy_from_slice(text.as_str().as_bytes()));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(frame))) => return Err(close_error(frame, context)),
            Some(Err(e)) => return Err(read_error(e, context)),
            None => return Err(ClientError::frame(context, FrameError::UnexpectedEof)),
        }
    }
}

fn close_error(frame: Option<CloseFrame>, context: &'static str) -> ClientError {
    match frame.map(|f| f.code) {
        None | Some(CloseCode::Normal) => ClientError::frame(context, FrameError::EndOfStream),
        Some(CloseCode::Abnormal) => ClientError::frame(context, FrameError::UnexpectedEof),
        Some(code) => ClientError::Transport(format!(
            "{context}: connection closed with code {}",
            u16::from(code)
        )),
    }
}

fn read_error(err: WsError, context: &'static str) -> ClientError {
    match err {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            ClientError::frame(context, FrameError::UnexpectedEof)
        }
        other => write_error(other),
    }
}

fn write_error(err: WsError) -> ClientError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => ClientError::ConnectionClosed,
        WsError::Io(e) if !is_temporary(&e) => ClientError::ConnectionClosed,
        other => ClientError::Transport(other.to_string()),
    }
}

fn is_temporary(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::TimedOut
    )
}
