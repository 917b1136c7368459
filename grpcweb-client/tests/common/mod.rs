//! In-process gRPC-Web servers for the integration tests.
//!
//! - An axum HTTP server for unary and server-streaming calls.
//! - A tokio-tungstenite server speaking `grpc-websockets` for client and
//!   bidi streaming calls.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::{SinkExt, StreamExt};
use grpcweb_core::{Code, Codec, Metadata, Status, encode_frame, encode_trailer_frame};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response as WsResponse};

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct HelloResponse {
    #[prost(string, tag = "1")]
    pub message: String,
}

pub fn hello(name: &str) -> HelloRequest {
    HelloRequest { name: name.into() }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub const ERROR_DETAIL_TYPE: &str = "type.googleapis.com/google.rpc.BadRequest";

fn codec_from_content_type(content_type: Option<&str>) -> Codec {
    content_type
        .and_then(|ct| ct.strip_prefix(grpcweb_core::CONTENT_TYPE_PREFIX))
        .and_then(|subtype| Codec::from_content_subtype(subtype).ok())
        .unwrap_or_default()
}

fn message_frame(codec: Codec, message: String) -> Vec<u8> {
    let payload = codec.encode(&HelloResponse { message }).unwrap();
    encode_frame(&payload).unwrap()
}

fn ok_trailer() -> Vec<u8> {
    let trailer: Metadata = [("trailer_key1", "trailer_val1")].into_iter().collect();
    encode_trailer_frame(&Status::ok(), Some(&trailer)).unwrap()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Serve the unary and server-streaming methods on an ephemeral port.
pub async fn spawn_http_server() -> SocketAddr {
    let app = Router::new()
        .route("/api.Example/Unary", post(unary))
        .route("/api.Example/UnaryError", post(unary_error))
        .route("/api.Example/UnaryHeadersOnly", post(unary_headers_only))
        .route("/api.Example/UnaryDetails", post(unary_details))
        .route("/api.Example/ServerStream", post(server_stream))
        .route("/api.Example/Slow", post(slow));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct GrpcWebRequest {
    codec: Codec,
    message: HelloRequest,
    authorization: Option<String>,
}

fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<GrpcWebRequest, Response> {
    if headers.get("x-grpc-web").and_then(|v| v.to_str().ok()) != Some("1") {
        return Err((StatusCode::BAD_REQUEST, "missing x-grpc-web").into_response());
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let codec = codec_from_content_type(content_type);
    if body.len() < 5 {
        return Err((StatusCode::BAD_REQUEST, "short frame").into_response());
    }
    let message = codec
        .decode(&body[5..])
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok(GrpcWebRequest {
        codec,
        message,
        authorization,
    })
}

fn grpc_web_response(codec: Codec, extra: &[(&str, &str)], body: Vec<u8>) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&codec.content_type()).unwrap(),
    );
    for (key, value) in extra {
        headers.insert(
            HeaderName::try_from(*key).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    response
}

async fn unary(headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_request(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut body = message_frame(request.codec, format!("hello, {}", request.message.name));
    body.extend(ok_trailer());

    let authorization = request.authorization.unwrap_or_default();
    grpc_web_response(
        request.codec,
        &[("hakase", "shinonome"), ("x-echo-authorization", &authorization)],
        body,
    )
}

async fn unary_error(headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_request(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let body = encode_trailer_frame(&Status::internal("internal error"), None).unwrap();
    grpc_web_response(request.codec, &[], body)
}

async fn unary_headers_only(headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_request(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    grpc_web_response(
        request.codec,
        &[("grpc-status", "5"), ("grpc-message", "no such greeting")],
        Vec::new(),
    )
}

async fn unary_details(headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_request(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let status = Status::new(Code::InvalidArgument, "name is required")
        .add_detail(ERROR_DETAIL_TYPE, vec![0x0a, 0x04, b'n', b'a', b'm', b'e']);
    grpc_web_response(request.codec, &[], encode_trailer_frame(&status, None).unwrap())
}

async fn server_stream(headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_request(&headers, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut body = Vec::new();
    for i in 1..=3 {
        body.extend(message_frame(
            request.codec,
            format!("hello, {} {i}", request.message.name),
        ));
    }
    body.extend(ok_trailer());
    grpc_web_response(request.codec, &[("hakase", "shinonome")], body)
}

async fn slow(headers: HeaderMap, body: Bytes) -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    unary(headers, body).await
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

type ServerSocket = WebSocketStream<TcpStream>;

/// Serve the client-streaming and bidi methods on an ephemeral port.
pub async fn spawn_ws_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle_socket(stream));
        }
    });
    addr
}

async fn handle_socket(stream: TcpStream) {
    let mut path = String::new();
    let callback = |request: &Request, mut response: WsResponse| -> Result<WsResponse, ErrorResponse> {
        path = request.uri().path().to_string();
        response.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static("grpc-websockets"),
        );
        Ok(response)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    // The client opens with its request header block
    let Some(Ok(Message::Binary(block))) = ws.next().await else {
        return;
    };
    let request_header = Metadata::from_header_block(&block);
    if request_header.get("x-grpc-web") != Some("1") {
        close(ws).await;
        return;
    }
    let codec = codec_from_content_type(request_header.get("content-type"));

    match path.as_str() {
        "/api.Example/ClientStream" => client_stream(ws, codec, &request_header).await,
        "/api.Example/ClientStreamAudit" => client_stream_audit(ws, codec, &request_header).await,
        "/api.Example/ClientStreamError" => trailers_only(ws, Code::Internal, "internal error").await,
        "/api.Example/BidiStream" => bidi_echo(ws, codec, &request_header).await,
        "/api.Example/BidiStreamError" => trailers_only(ws, Code::PermissionDenied, "denied").await,
        _ => close(ws).await,
    }
}

enum Incoming {
    Request(HelloRequest),
    Finish,
    Closed,
}

async fn next_request(ws: &mut ServerSocket, codec: Codec) -> Incoming {
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => match data.first() {
                // 0x00 marker, then the 5 byte frame header
                Some(0x00) if data.len() >= 6 => {
                    let message = codec.decode(&data[6..]).unwrap_or_default();
                    return Incoming::Request(message);
                }
                Some(0x01) => return Incoming::Finish,
                _ => continue,
            },
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Incoming::Closed,
            Some(Ok(_)) => continue,
        }
    }
}

fn response_header(codec: Codec, request_header: &Metadata) -> Metadata {
    let mut header = Metadata::empty();
    header.insert("content-type", &codec.content_type());
    header.insert("hakase", "shinonome");
    if let Some(auth) = request_header.get("authorization") {
        header.insert("x-echo-authorization", auth);
    }
    header
}

async fn send_header(ws: &mut ServerSocket, header: &Metadata) {
    // The first header message is ignored by clients
    let _ = ws.send(Message::Binary(Bytes::new())).await;
    let _ = ws
        .send(Message::Binary(Bytes::from(header.to_header_block())))
        .await;
}

async fn send_frame(ws: &mut ServerSocket, frame: Vec<u8>) {
    let _ = ws.send(Message::Binary(Bytes::from(frame))).await;
}

async fn close(mut ws: ServerSocket) {
    let _ = ws.close(None).await;
    while let Some(Ok(_)) = ws.next().await {}
}

async fn client_stream(mut ws: ServerSocket, codec: Codec, request_header: &Metadata) {
    let mut names = Vec::new();
    loop {
        match next_request(&mut ws, codec).await {
            Incoming::Request(request) => names.push(request.name),
            Incoming::Finish => break,
            Incoming::Closed => return,
        }
    }

    send_header(&mut ws, &response_header(codec, request_header)).await;
    send_frame(&mut ws, message_frame(codec, format!("hello, {}", names.join(" ")))).await;
    send_frame(&mut ws, ok_trailer()).await;
    close(ws).await;
}

/// Count what followed the request header block: well-formed `0x00` frames,
/// and any other message (a second header block, a torn frame).
async fn client_stream_audit(mut ws: ServerSocket, codec: Codec, request_header: &Metadata) {
    let mut frames = 0;
    let mut stray = 0;
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => match data.first() {
                Some(0x00) if is_whole_frame(&data[1..]) => frames += 1,
                Some(0x01) if data.len() == 1 => break,
                _ => stray += 1,
            },
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        }
    }

    send_header(&mut ws, &response_header(codec, request_header)).await;
    send_frame(&mut ws, message_frame(codec, format!("frames={frames} stray={stray}"))).await;
    send_frame(&mut ws, ok_trailer()).await;
    close(ws).await;
}

fn is_whole_frame(frame: &[u8]) -> bool {
    frame.len() >= 5
        && u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize == frame.len() - 5
}

async fn bidi_echo(mut ws: ServerSocket, codec: Codec, request_header: &Metadata) {
    send_header(&mut ws, &response_header(codec, request_header)).await;
    loop {
        match next_request(&mut ws, codec).await {
            Incoming::Request(request) => {
                let frame = message_frame(codec, format!("hello, {}", request.name));
                if request.name == "split" {
                    // One frame over two messages
                    let (head, tail) = frame.split_at(3);
                    send_frame(&mut ws, head.to_vec()).await;
                    send_frame(&mut ws, tail.to_vec()).await;
                } else {
                    send_frame(&mut ws, frame).await;
                }
            }
            Incoming::Finish => break,
            Incoming::Closed => return,
        }
    }
    send_frame(&mut ws, ok_trailer()).await;
    close(ws).await;
}

/// Wait for the client to finish sending, then answer with headers only.
async fn trailers_only(mut ws: ServerSocket, code: Code, message: &str) {
    loop {
        match next_request(&mut ws, Codec::Proto).await {
            Incoming::Request(_) => continue,
            Incoming::Finish => break,
            Incoming::Closed => return,
        }
    }
    let mut header = Metadata::empty();
    header.insert("grpc-status", &code.as_u32().to_string());
    header.insert("grpc-message", message);
    send_header(&mut ws, &header).await;
    close(ws).await;
}
