// Core market-data client: connection lifecycle, subscription registry,
// pending queue, and the public facade

mod backoff;
mod manager;
mod registry;
mod state;

pub use registry::Handler;
pub use state::ConnectionState;

use crate::config::{BrokerConfig, FeedConfig, ReconnectConfig};
use crate::feed::FeedPayload;
use crate::stomp::Frame;
use crate::transport::Transport;
use manager::{ClientShared, ConnectionManager};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct RunHandle {
    task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// The market-data distribution client.
///
/// Owns one broker connection and multiplexes it across every topic
/// consumer. Consumers only use `activate` / `subscribe` / `unsubscribe` /
/// `disconnect`; connection drops, retries and replays are internal.
///
/// Construct one per application and share it (`Arc`) — there is no global
/// instance.
///
/// Failure semantics: transport failures are retried transparently,
/// undecodable messages are dropped with a warning, and a panicking handler
/// is isolated to its own topic. None of these surface to callers; a
/// consumer that stops receiving simply sees no further handler calls.
pub struct TopicClient {
    shared: Arc<ClientShared>,
    transport: Arc<dyn Transport>,
    broker: BrokerConfig,
    reconnect: ReconnectConfig,
    run: Mutex<Option<RunHandle>>,
}

impl TopicClient {
    pub fn new(transport: Arc<dyn Transport>, config: &FeedConfig) -> Self {
        Self {
            shared: Arc::new(ClientShared::new()),
            transport,
            broker: config.broker.clone(),
            reconnect: config.reconnect.clone(),
            run: Mutex::new(None),
        }
    }

    /// Ensures a connection attempt is in progress or established.
    ///
    /// Idempotent; calling while already connecting or connected does
    /// nothing. Must run inside a tokio runtime (spawns the connection
    /// task).
    pub fn activate(&self) {
        let mut run = self.run.lock().expect("run lock poisoned");
        if let Some(handle) = run.as_ref() {
            if !handle.task.is_finished() {
                debug!("Client already active");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = ConnectionManager::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            self.broker.clone(),
            self.reconnect.clone(),
        );
        let task = tokio::spawn(manager.run(shutdown_rx));
        *run = Some(RunHandle { task, shutdown_tx });
        info!(url = %self.broker.url, "Client activated");
    }

    /// Subscribes `on_message` to `topic`.
    ///
    /// Activates the connection if needed. While disconnected the request
    /// queues and is drained, in submission order, once the broker session
    /// is up. One handler per topic: if the topic is already registered the
    /// call is a logged no-op and the existing handler stays authoritative.
    pub fn subscribe<F>(&self, topic: &str, on_message: F)
    where
        F: Fn(FeedPayload) + Send + Sync + 'static,
    {
        self.activate();

        let handler: Handler = Arc::new(on_message);
        let mut tables = self.shared.tables.lock().expect("tables lock poisoned");
        if self.shared.state().is_connected() {
            self.shared.do_subscribe(&mut tables, topic, handler);
        } else {
            if tables.is_registered(topic) || tables.is_pending(topic) {
                warn!(topic = %topic, "Duplicate subscription ignored; existing handler stays");
                return;
            }
            tables.enqueue_pending(topic, handler);
            debug!(topic = %topic, queued = tables.pending_count(), "Not connected, subscribe queued");
        }
    }

    /// Cancels the subscription for `topic`, wherever it currently lives.
    ///
    /// Bookkeeping is immediate: a `subscribe` for the same topic right
    /// after this call is never shadowed by the old entry. Unknown topics
    /// are a no-op.
    pub fn unsubscribe(&self, topic: &str) {
        let mut tables = self.shared.tables.lock().expect("tables lock poisoned");

        if let Some(subscription) = tables.unregister(topic) {
            debug!(topic = %topic, id = %subscription.id, "Unsubscribed");
            self.shared.send_frame(Frame::unsubscribe(&subscription.id));
            return;
        }

        let removed = tables.remove_pending(topic);
        if removed > 0 {
            debug!(topic = %topic, removed = removed, "Pending subscribe cancelled");
        } else {
            debug!(topic = %topic, "Unsubscribe for unknown topic ignored");
        }
    }

    /// Full shutdown: tears down every subscription, stops the retry loop
    /// and closes the transport. The client can be re-activated afterwards,
    /// starting empty.
    pub async fn disconnect(&self) {
        {
            let mut tables = self.shared.tables.lock().expect("tables lock poisoned");
            for (topic, subscription) in tables.clear() {
                debug!(topic = %topic, "Unsubscribing on disconnect");
                self.shared.send_frame(Frame::unsubscribe(&subscription.id));
            }
        }

        let handle = self.run.lock().expect("run lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(true);
            let _ = handle.task.await;
        }
        self.shared.set_state(ConnectionState::Disconnected);
        info!("Client disconnected");
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }
}

impl Drop for TopicClient {
    fn drop(&mut self) {
        if let Ok(mut run) = self.run.lock() {
            if let Some(handle) = run.take() {
                handle.task.abort();
            }
        }
    }
}
