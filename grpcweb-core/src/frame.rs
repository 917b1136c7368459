//! gRPC-Web frame codec.
//!
//! Every response body (and every streamed request) is a sequence of frames:
//!
//! ```text
//! [flag:1][length:4 big-endian][payload:length]
//! ```
//!
//! A flag of `0x00` or `0x01` marks a message frame (`0x01` = compressed).
//! A flag with the high bit set marks a trailer frame whose payload is an
//! HTTP-style `key: value` text block carrying the final status.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::details::{decode_status_details, encode_status_details};
use crate::error::{Code, FrameError, Status};
use crate::metadata::Metadata;

/// gRPC-Web frame flags.
pub mod frame_flags {
    /// Uncompressed message.
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
    /// Trailer frame (high bit).
    pub const TRAILER: u8 = 0x80;
}

/// Frame header size (flag + length).
pub const FRAME_HEADER_SIZE: usize = 5;

/// A parsed frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    flag: u8,
    length: u32,
}

impl FrameHeader {
    /// Parse a frame header from its first [`FRAME_HEADER_SIZE`] bytes.
    ///
    /// # Errors
    /// - [`FrameError::UnexpectedEof`] if fewer than 5 bytes are given.
    /// - [`FrameError::EndOfStream`] if the declared length is zero.
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::UnexpectedEof);
        }
        let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        if length == 0 {
            return Err(FrameError::EndOfStream);
        }
        Ok(Self {
            flag: data[0],
            length,
        })
    }

    pub fn flag(&self) -> u8 {
        self.flag
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Whether this is a message frame (flag `0x00` or `0x01`).
    pub fn is_message(&self) -> bool {
        self.flag == frame_flags::MESSAGE || self.flag == frame_flags::COMPRESSED
    }

    /// Whether the message payload is compressed.
    pub fn is_compressed(&self) -> bool {
        self.flag == frame_flags::COMPRESSED
    }

    /// Whether this is a trailer frame (high bit of the flag set).
    pub fn is_trailer(&self) -> bool {
        self.flag & frame_flags::TRAILER != 0
    }
}

/// Read exactly one frame header from `source`.
pub async fn read_frame_header<R>(source: &mut R) -> Result<FrameHeader, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    source.read_exact(&mut header).await?;
    FrameHeader::parse(&header)
}

/// Read exactly `length` payload bytes from `source`.
///
/// A short read is [`FrameError::UnexpectedEof`], never a partial payload.
pub async fn read_message_payload<R>(source: &mut R, length: u32) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut payload = Vec::new();
    (&mut *source)
        .take(u64::from(length))
        .read_to_end(&mut payload)
        .await?;
    if payload.len() != length as usize {
        return Err(FrameError::UnexpectedEof);
    }
    Ok(payload)
}

/// Read and decode a trailer block of `length` bytes from `source`.
///
/// Returns the final status and the non-reserved trailer metadata, or `None`
/// when only reserved keys were present.
pub async fn decode_trailer<R>(
    source: &mut R,
    length: u32,
) -> Result<(Status, Option<Metadata>), FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let block = read_message_payload(source, length).await?;
    if !block.ends_with(b"\n") {
        // The last line must end within the declared length.
        let mut probe = [0u8; 1];
        if source.read(&mut probe).await? != 0 {
            return Err(FrameError::UnexpectedEof);
        }
    }
    parse_trailer_block(&block)
}

/// Decode a complete trailer block.
///
/// Lines are separated by `\r\n` or `\n`. Keys are case-insensitive. A
/// non-empty line without a `:` separator is [`FrameError::UnexpectedEof`].
pub fn parse_trailer_block(block: &[u8]) -> Result<(Status, Option<Metadata>), FrameError> {
    let text = String::from_utf8_lossy(block);

    let mut code = Code::Ok;
    let mut message = String::new();
    let mut details_status = None;
    let mut metadata = Metadata::empty();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(FrameError::UnexpectedEof);
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "grpc-status" => {
                code = value
                    .parse::<u32>()
                    .map(Code::from_u32)
                    .unwrap_or(Code::Unknown);
            }
            "grpc-message" => message = decode_grpc_message(value),
            "grpc-status-details-bin" => {
                details_status = Some(decode_status_details(value).unwrap_or_else(|e| {
                    Status::internal(format!("transport: malformed grpc-status-details-bin: {e}"))
                }));
            }
            _ => {
                metadata.append(&key, value);
            }
        }
    }

    let status = details_status.unwrap_or_else(|| Status::new(code, message));
    let metadata = (!metadata.is_empty()).then_some(metadata);
    Ok((status, metadata))
}

/// Wrap `payload` in an uncompressed message frame.
///
/// Fails with [`FrameError::TooLarge`] if the payload length does not fit in a u32.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    frame(frame_flags::MESSAGE, payload)
}

/// Build a trailer frame carrying `status` and optional extra trailer metadata.
pub fn encode_trailer_frame(
    status: &Status,
    metadata: Option<&Metadata>,
) -> Result<Vec<u8>, FrameError> {
    let mut block = format!("grpc-status: {}\r\n", status.code().as_u32());
    if let Some(message) = status.message() {
        block.push_str(&format!("grpc-message: {}\r\n", encode_grpc_message(message)));
    }
    if !status.details().is_empty() {
        block.push_str(&format!(
            "grpc-status-details-bin: {}\r\n",
            encode_status_details(status)
        ));
    }
    let mut block = block.into_bytes();
    if let Some(metadata) = metadata {
        block.extend_from_slice(&metadata.to_header_block());
    }
    frame(frame_flags::TRAILER, &block)
}

fn frame(flag: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let length = frame_length(payload.len())?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.push(flag);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn frame_length(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len).map_err(|_| FrameError::TooLarge(len))
}

/// Percent-decode a `grpc-message` value. Malformed escapes are kept verbatim.
fn decode_grpc_message(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or_default();
            if let Ok(b) = u8::from_str_radix(hex, 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Percent-encode a `grpc-message` value: bytes outside printable ASCII, and `%`.
fn encode_grpc_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for &b in message.as_bytes() {
        if (0x20..=0x7e).contains(&b) && b != b'%' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
