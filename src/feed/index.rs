use super::{FeedPayload, INDEX_TOPIC};
use crate::client::TopicClient;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// BIST 100 index snapshot as published on `/topic/bist100`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub current: f64,
    pub changerate: f64,
}

/// Index widget feed adapter.
///
/// `None` until the first snapshot arrives, which consumers render as a
/// loading state.
pub struct IndexFeed {
    rx: watch::Receiver<Option<IndexSnapshot>>,
}

impl IndexFeed {
    pub fn attach(client: &TopicClient) -> Self {
        let (tx, rx) = watch::channel(None);
        client.subscribe(INDEX_TOPIC, move |payload| {
            if let FeedPayload::Index(snapshot) = payload {
                let _ = tx.send(Some(snapshot));
            }
        });
        Self { rx }
    }

    pub fn watch(&self) -> watch::Receiver<Option<IndexSnapshot>> {
        self.rx.clone()
    }

    pub fn latest(&self) -> Option<IndexSnapshot> {
        *self.rx.borrow()
    }

    /// Cancels the underlying topic subscription.
    pub fn detach(client: &TopicClient) {
        client.unsubscribe(INDEX_TOPIC);
    }
}
