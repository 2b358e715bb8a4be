use super::backoff::ReconnectBackoff;
use super::registry::{Handler, Subscription, SubscriptionTables};
use super::state::ConnectionState;
use crate::config::{BrokerConfig, ReconnectConfig};
use crate::feed::decode_payload;
use crate::stomp::{negotiate_heartbeats, Frame, FrameCommand, HeartbeatPlan};
use crate::transport::{Transport, TransportSession, WireMessage};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// State shared between the facade and the connection task: the lifecycle
/// atom, the subscription tables, and the writer into the live session.
pub(crate) struct ClientShared {
    state: AtomicU8,
    pub tables: Mutex<SubscriptionTables>,
    writer: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
}

impl ClientShared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            tables: Mutex::new(SubscriptionTables::default()),
            writer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_atomic(&self.state)
    }

    pub(super) fn set_state(&self, state: ConnectionState) {
        state.store(&self.state);
    }

    /// Queues a frame onto the live session, if there is one. Frames sent
    /// while disconnected are dropped; the registry replay covers them on
    /// the next connect.
    pub fn send_frame(&self, frame: Frame) {
        let writer = self.writer.lock().expect("writer lock poisoned");
        if let Some(tx) = writer.as_ref() {
            let _ = tx.send(frame);
        }
    }

    fn install_writer(&self, tx: mpsc::UnboundedSender<Frame>) {
        *self.writer.lock().expect("writer lock poisoned") = Some(tx);
    }

    fn clear_writer(&self) {
        *self.writer.lock().expect("writer lock poisoned") = None;
    }

    /// Registers `topic` and issues the transport-level SUBSCRIBE.
    ///
    /// Guarded: a second subscribe for a registered topic keeps the existing
    /// handler (first subscriber wins) and never opens a duplicate
    /// transport subscription.
    pub fn do_subscribe(&self, tables: &mut SubscriptionTables, topic: &str, handler: Handler) {
        if tables.is_registered(topic) {
            warn!(topic = %topic, "Duplicate subscription ignored; existing handler stays");
            return;
        }
        let id = format!("sub-{}", Uuid::new_v4());
        debug!(topic = %topic, id = %id, "Subscribing");
        tables.register(
            topic,
            Subscription {
                id: id.clone(),
                handler,
            },
        );
        self.send_frame(Frame::subscribe(&id, topic));
    }

    /// Routes one MESSAGE frame to the handler registered for its topic.
    ///
    /// Decode failures drop the message with a warning; a panicking handler
    /// is caught here so other topics keep receiving.
    pub fn dispatch(&self, frame: &Frame) {
        let topic = match frame.destination() {
            Some(topic) => topic,
            None => {
                warn!("MESSAGE frame without destination header dropped");
                return;
            }
        };

        let handler = {
            let tables = self.tables.lock().expect("tables lock poisoned");
            tables.handler_for(topic)
        };
        let handler = match handler {
            Some(handler) => handler,
            None => {
                debug!(topic = %topic, "No subscription for topic, message dropped");
                return;
            }
        };

        let payload = match decode_payload(topic, &frame.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Dropping undecodable message");
                return;
            }
        };

        if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
            error!(topic = %topic, "Handler panicked; topic delivery continues");
        }
    }
}

/// Why a session ended.
enum SessionEnd {
    /// `disconnect()` was called; stop retrying.
    Shutdown,
    /// Transport closed or failed; the retry loop takes over.
    Closed,
}

/// Owns the single transport connection: connects, handshakes, replays the
/// registry, drains the pending queue, pumps frames, and reconnects after
/// the configured delay until shut down.
pub(crate) struct ConnectionManager {
    shared: Arc<ClientShared>,
    transport: Arc<dyn Transport>,
    broker: BrokerConfig,
    reconnect: ReconnectConfig,
}

impl ConnectionManager {
    pub fn new(
        shared: Arc<ClientShared>,
        transport: Arc<dyn Transport>,
        broker: BrokerConfig,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            shared,
            transport,
            broker,
            reconnect,
        }
    }

    /// Connect/retry loop. Runs until `shutdown_rx` flips to true.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut backoff = ReconnectBackoff::new(&self.reconnect);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.shared.set_state(ConnectionState::Connecting);
            debug!(url = %self.broker.url, "Connecting to broker");

            let connected = tokio::select! {
                result = self.transport.connect() => result,
                _ = shutdown_rx.changed() => break,
            };

            match connected {
                Ok(mut session) => {
                    let end = self.run_session(session.as_mut(), &mut backoff, &mut shutdown_rx).await;
                    session.close().await;
                    self.shared.clear_writer();
                    self.shared.set_state(ConnectionState::Disconnected);
                    if matches!(end, SessionEnd::Shutdown) {
                        break;
                    }
                    info!("Connection lost");
                }
                Err(e) => {
                    self.shared.set_state(ConnectionState::Disconnected);
                    warn!(error = %e, "Broker connect failed");
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }

            let delay = backoff.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "Retrying connection");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        self.shared.clear_writer();
        self.shared.set_state(ConnectionState::Disconnected);
        debug!("Connection task stopped");
    }

    /// One broker session: STOMP handshake, subscription replay, pending
    /// drain, then the frame pump.
    async fn run_session(
        &self,
        session: &mut dyn TransportSession,
        backoff: &mut ReconnectBackoff,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        // STOMP handshake
        let connect = Frame::connect(
            &host_of(&self.broker.url),
            self.broker.heartbeat_out_ms,
            self.broker.heartbeat_in_ms,
        );
        if let Err(e) = session.send(WireMessage::Frame(connect)).await {
            warn!(error = %e, "Failed to send CONNECT");
            return SessionEnd::Closed;
        }

        let connect_timeout = Duration::from_millis(self.broker.connect_timeout_ms);
        let connected = match tokio::time::timeout(connect_timeout, wait_connected(session)).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return SessionEnd::Closed,
            Err(_) => {
                warn!(timeout_ms = self.broker.connect_timeout_ms, "CONNECTED frame timed out");
                return SessionEnd::Closed;
            }
        };

        let plan = negotiate_heartbeats(
            self.broker.heartbeat_out_ms,
            self.broker.heartbeat_in_ms,
            connected.header_value("heart-beat"),
        );
        backoff.reset();

        // Fresh writer for this session; frames queued before the pump
        // starts are flushed in order.
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Frame>();
        self.shared.install_writer(writer_tx);

        // Flip to CONNECTED before draining so a subscribe arriving during
        // the drain takes the connected path and serializes on the tables
        // lock behind it.
        self.shared.set_state(ConnectionState::Connected);
        let active = {
            let mut tables = self.shared.tables.lock().expect("tables lock poisoned");

            // Replay everything registered before the disconnect
            let registered = tables.registered();
            if !registered.is_empty() {
                info!(count = registered.len(), "Replaying subscriptions");
                for (topic, id) in registered {
                    self.shared.send_frame(Frame::subscribe(&id, &topic));
                }
            }

            // Drain queued requests in submission order
            let pending = tables.take_pending();
            if !pending.is_empty() {
                info!(count = pending.len(), "Draining pending subscriptions");
                for request in pending {
                    self.shared
                        .do_subscribe(&mut tables, &request.topic, request.handler);
                }
            }

            tables.registered_count()
        };
        info!(subscriptions = active, "Broker session established");

        // Frame pump
        let mut send_beat = plan
            .send_interval
            .map(|interval| tokio::time::interval_at(tokio::time::Instant::now() + interval, interval));
        let liveness_window = liveness_window(&plan);
        let mut liveness_deadline = liveness_window.map(|w| tokio::time::Instant::now() + w);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("Shutdown requested, closing session");
                    let _ = session.send(WireMessage::Frame(Frame::disconnect())).await;
                    return SessionEnd::Shutdown;
                }

                Some(frame) = writer_rx.recv() => {
                    if let Err(e) = session.send(WireMessage::Frame(frame)).await {
                        warn!(error = %e, "Send failed, dropping session");
                        return SessionEnd::Closed;
                    }
                }

                received = session.recv() => {
                    match received {
                        Some(Ok(msg)) => {
                            if let Some(window) = liveness_window {
                                liveness_deadline = Some(tokio::time::Instant::now() + window);
                            }
                            match msg {
                                WireMessage::Frame(frame) => {
                                    if !self.handle_frame(&frame) {
                                        return SessionEnd::Closed;
                                    }
                                }
                                WireMessage::Heartbeat => {}
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Transport error");
                            return SessionEnd::Closed;
                        }
                        None => {
                            debug!("Transport closed by peer");
                            return SessionEnd::Closed;
                        }
                    }
                }

                _ = tick(&mut send_beat) => {
                    if let Err(e) = session.send(WireMessage::Heartbeat).await {
                        warn!(error = %e, "Heartbeat send failed, dropping session");
                        return SessionEnd::Closed;
                    }
                }

                _ = sleep_until_deadline(liveness_deadline) => {
                    warn!("No broker activity within heartbeat window, dropping session");
                    return SessionEnd::Closed;
                }
            }
        }
    }

    /// Handles one inbound frame; returns false when the session must end.
    fn handle_frame(&self, frame: &Frame) -> bool {
        match frame.command {
            FrameCommand::Message => {
                self.shared.dispatch(frame);
                true
            }
            FrameCommand::Receipt => {
                debug!(receipt = ?frame.header_value("receipt-id"), "Receipt");
                true
            }
            FrameCommand::Error => {
                // Per STOMP the server closes after ERROR; don't wait for it
                error!(
                    message = ?frame.header_value("message"),
                    body = %frame.body,
                    "Broker ERROR frame"
                );
                false
            }
            other => {
                debug!(command = %other, "Ignoring unexpected frame");
                true
            }
        }
    }
}

/// Waits for the broker's CONNECTED frame, skipping heartbeats.
async fn wait_connected(session: &mut dyn TransportSession) -> Option<Frame> {
    loop {
        match session.recv().await {
            Some(Ok(WireMessage::Frame(frame))) => match frame.command {
                FrameCommand::Connected => return Some(frame),
                FrameCommand::Error => {
                    error!(
                        message = ?frame.header_value("message"),
                        "Broker rejected CONNECT"
                    );
                    return None;
                }
                other => {
                    debug!(command = %other, "Ignoring frame before CONNECTED");
                }
            },
            Some(Ok(WireMessage::Heartbeat)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "Transport error during handshake");
                return None;
            }
            None => {
                debug!("Transport closed during handshake");
                return None;
            }
        }
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Missed-heartbeat window: twice the negotiated incoming interval, the
/// tolerance stompjs applies before declaring the connection dead.
fn liveness_window(plan: &HeartbeatPlan) -> Option<Duration> {
    plan.expect_interval.map(|interval| interval * 2)
}

/// Host portion of a ws:// or wss:// URL, for the CONNECT `host` header.
fn host_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    host_port
        .split(':')
        .next()
        .unwrap_or(host_port)
        .to_string()
}
