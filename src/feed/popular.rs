use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Configuration for the popular-stocks REST poller.
///
/// Popularity ranking is served over plain REST, not the message bus.
#[derive(Clone, Debug, Deserialize)]
pub struct PopularStocksConfig {
    pub base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for PopularStocksConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PopularEnvelope {
    #[serde(default)]
    data: Value,
}

/// Latest popularity ranking with its fetch time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopularRanking {
    pub codes: Vec<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Periodic poller for `GET {base_url}/order/popular`.
///
/// Publishes the ranked stock codes on a watch channel. Fetch failures keep
/// the previous ranking; consumers only ever see successfully decoded lists.
pub struct PopularStocks {
    rx: watch::Receiver<PopularRanking>,
    task: JoinHandle<()>,
}

impl PopularStocks {
    pub fn spawn(config: PopularStocksConfig) -> Self {
        let (tx, rx) = watch::channel(PopularRanking::default());
        let task = tokio::spawn(poll_loop(config, tx));
        Self { rx, task }
    }

    pub fn watch(&self) -> watch::Receiver<PopularRanking> {
        self.rx.clone()
    }

    pub fn latest(&self) -> PopularRanking {
        self.rx.borrow().clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

async fn poll_loop(config: PopularStocksConfig, tx: watch::Sender<PopularRanking>) {
    let client = reqwest::Client::new();
    let url = format!("{}/order/popular", config.base_url.trim_end_matches('/'));
    let mut interval = tokio::time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));

    loop {
        interval.tick().await;
        match fetch_codes(&client, &url).await {
            Ok(codes) => {
                debug!(count = codes.len(), "Popular stock codes refreshed");
                let _ = tx.send(PopularRanking {
                    codes,
                    fetched_at: Some(Utc::now()),
                });
            }
            Err(e) => {
                warn!(error = %e, url = %url, "Popular stocks poll failed");
            }
        }
    }
}

async fn fetch_codes(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<String>> {
    let envelope: PopularEnvelope = client.get(url).send().await?.error_for_status()?.json().await?;

    let items = envelope
        .data
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("response 'data' is not an array"))?;

    let codes = items
        .iter()
        .filter_map(|item| item.get("stockCode"))
        .filter_map(|code| code.as_str())
        .map(str::to_string)
        .collect();

    Ok(codes)
}
