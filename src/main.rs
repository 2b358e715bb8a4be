use anyhow::Result;
use marketfeed::feed::{IndexFeed, PopularStocks, PriceFeed};
use marketfeed::transport::WsTransport;
use marketfeed::{FeedConfig, TopicClient};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketfeed=info".into()),
        )
        .init();

    info!("Marketfeed starting...");

    // Configuration file is optional; defaults target a local broker
    let config = match std::env::var("MARKETFEED_CONFIG") {
        Ok(path) => match marketfeed::load_config(&path) {
            Ok(config) => {
                info!(path = %path, "Configuration loaded");
                config
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Config load failed, using defaults");
                FeedConfig::default()
            }
        },
        Err(_) => FeedConfig::default(),
    };

    info!(
        broker_url = %config.broker.url,
        rest_base_url = %config.rest.base_url,
        reconnect_delay_ms = config.reconnect.initial_delay_ms,
        "Configuration resolved"
    );

    let transport = Arc::new(WsTransport::new(config.broker.url.clone()));
    let client = Arc::new(TopicClient::new(transport, &config));

    // Bus-backed feeds
    let prices = PriceFeed::attach(&client);
    let index = IndexFeed::attach(&client);

    // Popularity ranking comes over REST, not the bus
    let popular = PopularStocks::spawn(config.rest.clone());

    let mut price_rx = prices.watch();
    tokio::spawn(async move {
        while price_rx.changed().await.is_ok() {
            let quotes = price_rx.borrow_and_update().clone();
            info!(count = quotes.len(), "Price list updated");
        }
    });

    let mut index_rx = index.watch();
    tokio::spawn(async move {
        while index_rx.changed().await.is_ok() {
            if let Some(snapshot) = *index_rx.borrow_and_update() {
                info!(
                    current = snapshot.current,
                    changerate = snapshot.changerate,
                    "BIST 100 updated"
                );
            }
        }
    });

    let mut popular_rx = popular.watch();
    tokio::spawn(async move {
        while popular_rx.changed().await.is_ok() {
            let ranking = popular_rx.borrow_and_update().clone();
            info!(codes = ?ranking.codes, "Popular stocks updated");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    popular.stop();
    client.disconnect().await;

    Ok(())
}
