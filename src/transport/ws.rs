use super::{Transport, TransportError, TransportSession, WireMessage};
use crate::stomp::Frame;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// WebSocket transport against the broker endpoint (e.g.
/// `ws://localhost:8080/ws-stock`).
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url = %self.url, "WebSocket connected");
        Ok(Box::new(WsSession { stream }))
    }
}

struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportSession for WsSession {
    async fn send(&mut self, msg: WireMessage) -> Result<(), TransportError> {
        let text = match msg {
            WireMessage::Frame(frame) => frame.serialize(),
            WireMessage::Heartbeat => "\n".to_string(),
        };
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match Frame::parse(text.as_str()) {
                    Ok(Some(frame)) => return Some(Ok(WireMessage::Frame(frame))),
                    Ok(None) => return Some(Ok(WireMessage::Heartbeat)),
                    Err(e) => {
                        // Unframeable text is dropped per-message, not fatal
                        warn!(error = %e, "Dropping unparseable frame");
                    }
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(TransportError::Send(e.to_string())));
                    }
                }
                Ok(Message::Pong(_)) => {}
                Ok(Message::Binary(data)) => {
                    warn!(len = data.len(), "Ignoring unexpected binary frame");
                }
                Ok(Message::Close(_)) => {
                    debug!("WebSocket close frame received");
                    return None;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::Recv(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
