use super::{FeedPayload, PRICES_TOPIC};
use crate::client::TopicClient;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// One stock record from the price feed.
///
/// Mirrors the broker's combined payload; only `code` is guaranteed, the
/// upstream price providers omit fields freely. Unknown fields are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuote {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Traded volume ("hacim" upstream)
    #[serde(default, rename = "hacim", skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, rename = "hacimStr", skip_serializing_if = "Option::is_none")]
    pub volume_str: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Price-list feed adapter.
///
/// Subscribes `/topic/prices` through the facade and republishes the latest
/// decoded list on a watch channel, so any number of consumers can observe
/// it without holding a second bus subscription.
pub struct PriceFeed {
    rx: watch::Receiver<Vec<StockQuote>>,
}

impl PriceFeed {
    pub fn attach(client: &TopicClient) -> Self {
        let (tx, rx) = watch::channel(Vec::new());
        client.subscribe(PRICES_TOPIC, move |payload| {
            if let FeedPayload::Prices(quotes) = payload {
                let _ = tx.send(quotes);
            }
        });
        Self { rx }
    }

    /// Receiver tracking the latest price list. Starts empty.
    pub fn watch(&self) -> watch::Receiver<Vec<StockQuote>> {
        self.rx.clone()
    }

    pub fn latest(&self) -> Vec<StockQuote> {
        self.rx.borrow().clone()
    }

    /// Cancels the underlying topic subscription.
    pub fn detach(client: &TopicClient) {
        client.unsubscribe(PRICES_TOPIC);
    }
}
