use serde::Deserialize;

// Re-export feed-level config so callers can build everything from one place
pub use crate::feed::PopularStocksConfig;

/// Complete marketfeed configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub rest: PopularStocksConfig,
}

/// Broker connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// WebSocket endpoint of the stock message broker
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Heartbeats this client emits (milliseconds, 0 disables)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_out_ms: u64,
    /// Heartbeats this client expects from the broker (milliseconds, 0 disables)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_in_ms: u64,
    /// How long to wait for the broker's CONNECTED frame
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_broker_url() -> String {
    "ws://localhost:8080/ws-stock".to_string()
}

fn default_heartbeat_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            heartbeat_out_ms: default_heartbeat_ms(),
            heartbeat_in_ms: default_heartbeat_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Reconnect delay policy.
///
/// Defaults reproduce the original fixed 5-second retry. Growth and jitter
/// are deliberate configuration, not built-in policy: set `multiplier` above
/// 1.0 to get exponential backoff up to `max_delay_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub jitter_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_reconnect_delay_ms(),
            max_delay_ms: default_reconnect_delay_ms(),
            multiplier: default_multiplier(),
            jitter_ms: 0,
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FeedConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: FeedConfig = toml::from_str(&contents)?;
    Ok(config)
}
