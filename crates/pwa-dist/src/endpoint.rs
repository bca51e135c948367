//! Point-to-point endpoints: in-process channels and length-prefixed frames
//! over a byte stream.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crossbeam_channel::{unbounded, Receiver, Sender};
use pwa_core::{ErrorInfo, PwaError};

use crate::message::{decode, encode, Message};

/// Largest accepted frame payload.
pub const MAX_FRAME_BYTES: usize = 1 << 28;

/// One side of a reliable, ordered, blocking link.
pub trait Endpoint: Send {
    /// Sends `message`, blocking until it is handed to the transport.
    fn send(&mut self, message: &Message) -> Result<(), PwaError>;

    /// Blocks until the next message arrives.
    fn recv(&mut self) -> Result<Message, PwaError>;
}

fn disconnected(direction: &str) -> PwaError {
    PwaError::Protocol(
        ErrorInfo::new("disconnected", "peer endpoint is gone")
            .with_context("direction", direction),
    )
}

/// In-process endpoint over a pair of unbounded channels.
#[derive(Debug)]
pub struct ChannelEndpoint {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl ChannelEndpoint {
    /// Two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        (Self { tx: a_tx, rx: b_rx }, Self { tx: b_tx, rx: a_rx })
    }
}

impl Endpoint for ChannelEndpoint {
    fn send(&mut self, message: &Message) -> Result<(), PwaError> {
        self.tx
            .send(message.clone())
            .map_err(|_| disconnected("send"))
    }

    fn recv(&mut self) -> Result<Message, PwaError> {
        self.rx.recv().map_err(|_| disconnected("recv"))
    }
}

/// Endpoint over a byte stream: every message is a little-endian `u32`
/// length followed by its bincode payload.
#[derive(Debug)]
pub struct StreamEndpoint<S> {
    stream: S,
}

impl<S: Read + Write + Send> StreamEndpoint<S> {
    /// Wraps `stream`.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl StreamEndpoint<TcpStream> {
    /// Connects to a master listening on `addr`.
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self, PwaError> {
        let stream = TcpStream::connect(&addr).map_err(|err| {
            PwaError::Protocol(
                ErrorInfo::new("connect", err.to_string()).with_context("addr", addr.to_string()),
            )
        })?;
        stream
            .set_nodelay(true)
            .map_err(|err| PwaError::Protocol(ErrorInfo::new("connect", err.to_string())))?;
        Ok(Self::new(stream))
    }
}

fn stream_error(code: &str, err: std::io::Error) -> PwaError {
    if err.kind() == ErrorKind::UnexpectedEof {
        return disconnected("recv");
    }
    PwaError::Protocol(ErrorInfo::new(code, err.to_string()))
}

impl<S: Read + Write + Send> Endpoint for StreamEndpoint<S> {
    fn send(&mut self, message: &Message) -> Result<(), PwaError> {
        let payload = encode(message)?;
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| (*len as usize) <= MAX_FRAME_BYTES)
            .ok_or_else(|| {
                PwaError::Protocol(
                    ErrorInfo::new("frame-size", "message too large")
                        .with_context("bytes", payload.len().to_string()),
                )
            })?;
        self.stream
            .write_all(&len.to_le_bytes())
            .and_then(|_| self.stream.write_all(&payload))
            .and_then(|_| self.stream.flush())
            .map_err(|err| stream_error("send", err))
    }

    fn recv(&mut self) -> Result<Message, PwaError> {
        let mut header = [0u8; 4];
        self.stream
            .read_exact(&mut header)
            .map_err(|err| stream_error("recv", err))?;
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(PwaError::Protocol(
                ErrorInfo::new("frame-size", "incoming frame too large")
                    .with_context("bytes", len.to_string()),
            ));
        }
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .map_err(|err| stream_error("recv", err))?;
        decode(&payload)
    }
}
