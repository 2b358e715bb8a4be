// Channel-backed mock broker for driving the client without a live STOMP
// server. Each `connect()` hands the test a `BrokerSide` to script.
#![allow(dead_code)]

use async_trait::async_trait;
use marketfeed::stomp::{Frame, FrameCommand};
use marketfeed::transport::{Transport, TransportError, TransportSession, WireMessage};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct MockTransport {
    announce: Mutex<mpsc::UnboundedSender<BrokerSide>>,
}

impl MockTransport {
    /// Returns the transport plus the stream of broker-side handles, one per
    /// accepted connection.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BrokerSide>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                announce: Mutex::new(tx),
            },
            rx,
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError> {
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();

        let announce = self.announce.lock().expect("announce lock poisoned");
        announce
            .send(BrokerSide {
                to_client: to_client_tx,
                from_client: from_client_rx,
            })
            .map_err(|_| TransportError::Connect("broker gone".to_string()))?;

        Ok(Box::new(MockSession {
            rx: to_client_rx,
            tx: from_client_tx,
        }))
    }
}

struct MockSession {
    rx: mpsc::UnboundedReceiver<Result<WireMessage, TransportError>>,
    tx: mpsc::UnboundedSender<WireMessage>,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn send(&mut self, msg: WireMessage) -> Result<(), TransportError> {
        self.tx.send(msg).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// The broker's end of one mock connection.
pub struct BrokerSide {
    to_client: mpsc::UnboundedSender<Result<WireMessage, TransportError>>,
    from_client: mpsc::UnboundedReceiver<WireMessage>,
}

impl BrokerSide {
    pub fn send_frame(&self, frame: Frame) {
        let _ = self.to_client.send(Ok(WireMessage::Frame(frame)));
    }

    pub fn send_heartbeat(&self) {
        let _ = self.to_client.send(Ok(WireMessage::Heartbeat));
    }

    /// Severs the connection from the broker side.
    pub fn drop_connection(self) {
        drop(self.to_client);
    }

    /// Next frame from the client, skipping heartbeats. Panics after two
    /// seconds of silence.
    pub async fn next_frame(&mut self) -> Frame {
        let deadline = Duration::from_secs(2);
        loop {
            let msg = tokio::time::timeout(deadline, self.from_client.recv())
                .await
                .expect("timed out waiting for client frame")
                .expect("client side closed");
            match msg {
                WireMessage::Frame(frame) => return frame,
                WireMessage::Heartbeat => continue,
            }
        }
    }

    /// Next wire message of any kind, heartbeats included.
    pub async fn next_message(&mut self) -> WireMessage {
        tokio::time::timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client side closed")
    }

    /// Consumes the client's CONNECT and replies CONNECTED with the given
    /// heart-beat header.
    pub async fn complete_handshake(&mut self, heartbeat: &str) -> Frame {
        let connect = self.next_frame().await;
        assert_eq!(connect.command, FrameCommand::Connect);
        self.send_frame(
            Frame::new(FrameCommand::Connected)
                .header("version", "1.2")
                .header("heart-beat", heartbeat),
        );
        connect
    }

    /// Completes the handshake with heartbeats disabled.
    pub async fn accept(&mut self) -> Frame {
        self.complete_handshake("0,0").await
    }
}

/// Waits for the next connection attempt.
pub async fn accept_connection(rx: &mut mpsc::UnboundedReceiver<BrokerSide>) -> BrokerSide {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("transport dropped")
}
