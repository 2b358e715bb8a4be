use crate::feed::FeedPayload;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Callback invoked with each successfully decoded payload for a topic.
pub type Handler = Arc<dyn Fn(FeedPayload) + Send + Sync>;

/// An active topic subscription: transport-level id plus consumer handler.
#[derive(Clone)]
pub(crate) struct Subscription {
    pub id: String,
    pub handler: Handler,
}

/// A subscribe request issued while the connection was not yet up.
#[derive(Clone)]
pub(crate) struct PendingRequest {
    pub topic: String,
    pub handler: Handler,
}

/// Registry of active subscriptions plus the FIFO queue of requests waiting
/// for a connection.
///
/// Both live behind one lock because the core invariant spans them: a topic
/// is never simultaneously registered and pending.
#[derive(Default)]
pub(crate) struct SubscriptionTables {
    registry: HashMap<String, Subscription>,
    pending: VecDeque<PendingRequest>,
}

impl SubscriptionTables {
    pub fn is_registered(&self, topic: &str) -> bool {
        self.registry.contains_key(topic)
    }

    /// Stores the subscription for `topic`. Any pending request for the same
    /// topic is dropped so the two tables never both hold it.
    pub fn register(&mut self, topic: &str, subscription: Subscription) {
        self.pending.retain(|p| p.topic != topic);
        self.registry.insert(topic.to_string(), subscription);
    }

    pub fn unregister(&mut self, topic: &str) -> Option<Subscription> {
        self.registry.remove(topic)
    }

    pub fn handler_for(&self, topic: &str) -> Option<Handler> {
        self.registry.get(topic).map(|s| Arc::clone(&s.handler))
    }

    /// Subscription ids of every registered topic, for replay on reconnect.
    pub fn registered(&self) -> Vec<(String, String)> {
        self.registry
            .iter()
            .map(|(topic, sub)| (topic.clone(), sub.id.clone()))
            .collect()
    }

    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    pub fn enqueue_pending(&mut self, topic: &str, handler: Handler) {
        self.pending.push_back(PendingRequest {
            topic: topic.to_string(),
            handler,
        });
    }

    pub fn is_pending(&self, topic: &str) -> bool {
        self.pending.iter().any(|p| p.topic == topic)
    }

    /// Drops every pending request for `topic`; returns how many were removed.
    pub fn remove_pending(&mut self, topic: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| p.topic != topic);
        before - self.pending.len()
    }

    /// Empties the pending queue, preserving submission order.
    pub fn take_pending(&mut self) -> VecDeque<PendingRequest> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Tears down both tables; returns the subscriptions that were active.
    pub fn clear(&mut self) -> Vec<(String, Subscription)> {
        self.pending.clear();
        self.registry.drain().collect()
    }
}
