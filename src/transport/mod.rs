// Transport seam: WebSocket in production, channel-backed mocks in tests

mod ws;

pub use ws::WsTransport;

use crate::stomp::Frame;
use async_trait::async_trait;
use std::fmt;

/// Transport-level failures. Handled by the reconnect loop, never surfaced
/// to feed consumers.
#[derive(Debug)]
pub enum TransportError {
    Connect(String),
    Send(String),
    Recv(String),
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(reason) => write!(f, "connect failed: {}", reason),
            TransportError::Send(reason) => write!(f, "send failed: {}", reason),
            TransportError::Recv(reason) => write!(f, "receive failed: {}", reason),
            TransportError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// One unit on the wire: a STOMP frame or a bare-EOL heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Frame(Frame),
    Heartbeat,
}

/// Factory for broker sessions. One `connect` call per (re)connection attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// A live broker session carrying wire messages in both directions.
///
/// `recv` returning `None` means the peer closed the session; an `Err` item
/// is a transport fault and also ends the session.
#[async_trait]
pub trait TransportSession: Send {
    async fn send(&mut self, msg: WireMessage) -> Result<(), TransportError>;

    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>>;

    async fn close(&mut self);
}
