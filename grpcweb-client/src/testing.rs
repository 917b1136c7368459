//! In-memory transports and messages shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use grpcweb_core::{FrameError, Metadata, Status, encode_frame, encode_trailer_frame};
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::ClientError;
use crate::transport::{
    CloseSender, ConnectOptions, Receiver, ResponseBody, Sender, StreamTransport,
    TransportBuilder, UnaryTransport,
};

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub(crate) struct HelloRequest {
    #[prost(string, tag = "1")]
    pub(crate) name: String,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub(crate) struct HelloResponse {
    #[prost(string, tag = "1")]
    pub(crate) message: String,
}

pub(crate) fn hello(name: &str) -> HelloRequest {
    HelloRequest { name: name.into() }
}

/// A proto message frame carrying `HelloResponse { message }`.
pub(crate) fn message_frame(message: &str) -> Vec<u8> {
    let payload = HelloResponse {
        message: message.into(),
    }
    .encode_to_vec();
    encode_frame(&payload).unwrap()
}

pub(crate) fn trailer_frame(status: &Status, trailer: &[(&str, &str)]) -> Vec<u8> {
    let trailer: Metadata = trailer.iter().copied().collect();
    encode_trailer_frame(status, Some(&trailer)).unwrap()
}

pub(crate) fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs.iter().copied().collect()
}

/// One request observed by a [`FakeUnary`].
#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub(crate) endpoint: String,
    pub(crate) content_type: String,
    pub(crate) header: Metadata,
    pub(crate) body: Bytes,
}

#[derive(Debug, Default)]
pub(crate) struct UnaryLog {
    pub(crate) requests: Mutex<Vec<SentRequest>>,
    pub(crate) closed: AtomicBool,
}

/// Replays a canned HTTP response.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeUnary {
    pub(crate) header: Metadata,
    pub(crate) body: Vec<u8>,
    /// Never answer, to exercise deadlines.
    pub(crate) hang: bool,
    pub(crate) log: Arc<UnaryLog>,
}

impl FakeUnary {
    pub(crate) fn new(header: Metadata, body: Vec<u8>) -> Self {
        Self {
            header,
            body,
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<SentRequest> {
        self.log.requests.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.log.closed.load(Ordering::SeqCst)
    }
}

impl UnaryTransport for FakeUnary {
    async fn send(
        &mut self,
        endpoint: &str,
        content_type: &str,
        header: Metadata,
        body: Bytes,
    ) -> Result<(Metadata, ResponseBody), ClientError> {
        self.log.requests.lock().unwrap().push(SentRequest {
            endpoint: endpoint.into(),
            content_type: content_type.into(),
            header,
            body,
        });
        if self.hang {
            std::future::pending::<()>().await;
        }
        let body: ResponseBody = Box::pin(std::io::Cursor::new(self.body.clone()));
        Ok((self.header.clone(), body))
    }

    fn close(&mut self) {
        self.log.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub(crate) struct StreamState {
    pub(crate) request_header: Mutex<Option<Metadata>>,
    pub(crate) sent: Mutex<Vec<Bytes>>,
    pub(crate) responses: Mutex<VecDeque<Result<Vec<u8>, ClientError>>>,
    pub(crate) header: Mutex<Option<Metadata>>,
    pub(crate) hang: AtomicBool,
    pub(crate) close_sent: AtomicBool,
    pub(crate) closed: AtomicBool,
}

/// A stream transport fed from a queue of response messages.
///
/// An empty queue reports a clean end of stream.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeStream {
    pub(crate) state: Arc<StreamState>,
}

impl FakeStream {
    pub(crate) fn with_header(header: Metadata) -> Self {
        let stream = Self::default();
        *stream.state.header.lock().unwrap() = Some(header);
        stream
    }

    pub(crate) fn push(&self, message: Vec<u8>) -> &Self {
        self.state.responses.lock().unwrap().push_back(Ok(message));
        self
    }

    pub(crate) fn push_err(&self, err: ClientError) -> &Self {
        self.state.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub(crate) fn hang(&self) {
        self.state.hang.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<Bytes> {
        self.state.sent.lock().unwrap().clone()
    }

    pub(crate) fn request_header(&self) -> Option<Metadata> {
        self.state.request_header.lock().unwrap().clone()
    }

    pub(crate) fn close_sent(&self) -> bool {
        self.state.close_sent.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl Sender for FakeStream {
    async fn send(&self, frame: Bytes) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        self.state.sent.lock().unwrap().push(frame);
        Ok(())
    }
}

impl Receiver for FakeStream {
    async fn receive(&self) -> Result<ResponseBody, ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        if self.state.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let next = self.state.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(message)) => Ok(Box::pin(std::io::Cursor::new(message))),
            Some(Err(err)) => Err(err),
            None => Err(ClientError::frame(
                "failed to read response",
                FrameError::EndOfStream,
            )),
        }
    }

    fn header(&self) -> Option<Metadata> {
        self.state.header.lock().unwrap().clone()
    }
}

impl CloseSender for FakeStream {
    async fn close_send(&self) -> Result<(), ClientError> {
        self.state.close_sent.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl StreamTransport for FakeStream {
    fn set_request_header(&self, header: Metadata) {
        *self.state.request_header.lock().unwrap() = Some(header);
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One dial observed by a [`FakeBuilder`].
#[derive(Debug, Clone)]
pub(crate) struct Dial {
    pub(crate) host: String,
    pub(crate) endpoint: Option<String>,
    pub(crate) options: ConnectOptions,
}

/// Hands out clones of the same fake transports and records every dial.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBuilder {
    pub(crate) unary: FakeUnary,
    pub(crate) stream: FakeStream,
    pub(crate) dials: Arc<Mutex<Vec<Dial>>>,
    pub(crate) stream_dials: Arc<AtomicUsize>,
}

impl FakeBuilder {
    pub(crate) fn dials(&self) -> Vec<Dial> {
        self.dials.lock().unwrap().clone()
    }
}

impl TransportBuilder for FakeBuilder {
    type Unary = FakeUnary;
    type Stream = FakeStream;

    fn unary(&self, host: &str, options: &ConnectOptions) -> Result<FakeUnary, ClientError> {
        self.dials.lock().unwrap().push(Dial {
            host: host.into(),
            endpoint: None,
            options: options.clone(),
        });
        Ok(self.unary.clone())
    }

    async fn stream(
        &self,
        host: &str,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> Result<FakeStream, ClientError> {
        self.stream_dials.fetch_add(1, Ordering::SeqCst);
        self.dials.lock().unwrap().push(Dial {
            host: host.into(),
            endpoint: Some(endpoint.into()),
            options: options.clone(),
        });
        Ok(self.stream.clone())
    }
}
