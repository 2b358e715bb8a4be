// Core client: connection lifecycle, registry, pending queue, facade
pub mod client;

// Configuration
pub mod config;

// Typed feed payloads and adapters
pub mod feed;

// STOMP framing
pub mod stomp;

// Transport seam (WebSocket + test mocks)
pub mod transport;

pub use client::{ConnectionState, TopicClient};
pub use config::{load_config, FeedConfig};
