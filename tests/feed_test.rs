// Integration tests for the feed adapters: typed decode into watch channels
// over the shared client connection.

mod common;

use common::{accept_connection, MockTransport};
use marketfeed::config::{FeedConfig, ReconnectConfig};
use marketfeed::feed::{IndexFeed, PriceFeed, INDEX_TOPIC, PRICES_TOPIC};
use marketfeed::stomp::{Frame, FrameCommand};
use marketfeed::TopicClient;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> FeedConfig {
    FeedConfig {
        reconnect: ReconnectConfig {
            initial_delay_ms: 10,
            max_delay_ms: 10,
            multiplier: 1.0,
            jitter_ms: 0,
        },
        ..FeedConfig::default()
    }
}

fn message_frame(topic: &str, body: &str) -> Frame {
    let mut frame = Frame::new(FrameCommand::Message)
        .header("destination", topic)
        .header("message-id", "m-1")
        .header("subscription", "sub-x");
    frame.body = body.to_string();
    frame
}

#[tokio::test]
async fn test_price_feed_publishes_latest_list() {
    let (transport, mut connections) = MockTransport::new();
    let client = Arc::new(TopicClient::new(Arc::new(transport), &test_config()));

    let prices = PriceFeed::attach(&client);
    assert!(prices.latest().is_empty());

    let mut broker = accept_connection(&mut connections).await;
    broker.accept().await;
    let subscribe = broker.next_frame().await;
    assert_eq!(subscribe.destination(), Some(PRICES_TOPIC));

    broker.send_frame(message_frame(
        PRICES_TOPIC,
        r#"[
            {"code":"THYAO","lastPrice":312.5,"changePrice":4.25,"rate":1.38,"hacim":120000.0},
            {"code":"GARAN","lastPrice":128.9,"changePrice":-0.6,"rate":-0.46}
        ]"#,
    ));

    let mut rx = prices.watch();
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("price update missing")
        .unwrap();

    let quotes = rx.borrow().clone();
    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0].code, "THYAO");
    assert_eq!(quotes[0].volume, Some(120000.0));
    assert_eq!(quotes[1].change_price, Some(-0.6));
}

#[tokio::test]
async fn test_price_feed_ignores_non_array_payload() {
    let (transport, mut connections) = MockTransport::new();
    let client = Arc::new(TopicClient::new(Arc::new(transport), &test_config()));

    let prices = PriceFeed::attach(&client);
    let mut broker = accept_connection(&mut connections).await;
    broker.accept().await;
    broker.next_frame().await;

    broker.send_frame(message_frame(PRICES_TOPIC, r#"{"code":"THYAO"}"#));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(prices.latest().is_empty());

    broker.send_frame(message_frame(PRICES_TOPIC, r#"[{"code":"THYAO"}]"#));
    let mut rx = prices.watch();
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("valid payload should still flow")
        .unwrap();
    assert_eq!(prices.latest().len(), 1);
}

#[tokio::test]
async fn test_index_feed_starts_loading_then_updates() {
    let (transport, mut connections) = MockTransport::new();
    let client = Arc::new(TopicClient::new(Arc::new(transport), &test_config()));

    let index = IndexFeed::attach(&client);
    assert!(index.latest().is_none(), "loading state until first snapshot");

    let mut broker = accept_connection(&mut connections).await;
    broker.accept().await;
    let subscribe = broker.next_frame().await;
    assert_eq!(subscribe.destination(), Some(INDEX_TOPIC));

    broker.send_frame(message_frame(
        INDEX_TOPIC,
        r#"{"current":9845.3,"changerate":-1.37}"#,
    ));

    let mut rx = index.watch();
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("index update missing")
        .unwrap();

    let snapshot = index.latest().unwrap();
    assert_eq!(snapshot.current, 9845.3);
    assert_eq!(snapshot.changerate, -1.37);
}

#[tokio::test]
async fn test_both_feeds_share_one_connection() {
    let (transport, mut connections) = MockTransport::new();
    let client = Arc::new(TopicClient::new(Arc::new(transport), &test_config()));

    let _prices = PriceFeed::attach(&client);
    let _index = IndexFeed::attach(&client);

    let mut broker = accept_connection(&mut connections).await;
    broker.accept().await;
    broker.next_frame().await;
    broker.next_frame().await;

    // Two topics, one transport connection
    assert!(connections.try_recv().is_err());
}

#[tokio::test]
async fn test_detach_cancels_topic_subscription() {
    let (transport, mut connections) = MockTransport::new();
    let client = Arc::new(TopicClient::new(Arc::new(transport), &test_config()));

    let _prices = PriceFeed::attach(&client);
    let mut broker = accept_connection(&mut connections).await;
    broker.accept().await;
    let subscribe = broker.next_frame().await;
    let sub_id = subscribe.header_value("id").unwrap().to_string();

    PriceFeed::detach(&client);
    let unsubscribe = broker.next_frame().await;
    assert_eq!(unsubscribe.command, FrameCommand::Unsubscribe);
    assert_eq!(unsubscribe.header_value("id"), Some(sub_id.as_str()));
}
