// Typed per-topic payload schemas and thin feed adapters

mod index;
mod popular;
mod prices;

pub use index::{IndexFeed, IndexSnapshot};
pub use popular::{PopularRanking, PopularStocks, PopularStocksConfig};
pub use prices::{PriceFeed, StockQuote};

use serde_json::Value;
use std::fmt;

/// Topic carrying the full price list.
pub const PRICES_TOPIC: &str = "/topic/prices";

/// Topic carrying the BIST 100 index snapshot.
pub const INDEX_TOPIC: &str = "/topic/bist100";

/// Payload decode failures. The offending message is dropped; delivery for
/// the topic continues with the next frame.
#[derive(Debug)]
pub enum DecodeError {
    InvalidJson(String),
    SchemaMismatch {
        topic: String,
        reason: String,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidJson(reason) => write!(f, "payload is not valid JSON: {}", reason),
            DecodeError::SchemaMismatch { topic, reason } => {
                write!(f, "payload does not match schema for '{}': {}", topic, reason)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// One decoded inbound payload, tagged by the topic it arrived on.
///
/// Topics without a registered schema decode to `Other` so ad-hoc consumers
/// still get structured JSON rather than raw frame bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    Prices(Vec<StockQuote>),
    Index(IndexSnapshot),
    Other(Value),
}

/// Decodes a frame body against the schema registered for `topic`.
pub fn decode_payload(topic: &str, body: &str) -> Result<FeedPayload, DecodeError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    match topic {
        PRICES_TOPIC => {
            if !value.is_array() {
                return Err(DecodeError::SchemaMismatch {
                    topic: topic.to_string(),
                    reason: "expected an array of stock records".to_string(),
                });
            }
            let quotes: Vec<StockQuote> =
                serde_json::from_value(value).map_err(|e| DecodeError::SchemaMismatch {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(FeedPayload::Prices(quotes))
        }
        INDEX_TOPIC => {
            let snapshot: IndexSnapshot =
                serde_json::from_value(value).map_err(|e| DecodeError::SchemaMismatch {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(FeedPayload::Index(snapshot))
        }
        _ => Ok(FeedPayload::Other(value)),
    }
}
