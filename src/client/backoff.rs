use crate::config::ReconnectConfig;
use rand::Rng;
use std::time::Duration;

/// Reconnect delay schedule driven entirely by [`ReconnectConfig`].
///
/// With the default config this is a fixed delay (multiplier 1.0, no
/// jitter). A multiplier above 1.0 grows the delay toward `max_delay_ms`;
/// the schedule resets after every successful connection.
#[derive(Clone, Debug)]
pub(crate) struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    multiplier: f64,
    jitter_ms: u64,
}

impl ReconnectBackoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        let max = Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms));
        Self {
            initial,
            max,
            current: initial,
            multiplier: config.multiplier.max(1.0),
            jitter_ms: config.jitter_ms,
        }
    }

    /// Next delay to wait before a reconnect attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms))
        } else {
            Duration::ZERO
        };
        let delay = self.current + jitter;

        let next_ms = (self.current.as_millis() as f64 * self.multiplier) as u64;
        self.current = Duration::from_millis(next_ms).min(self.max);

        delay
    }

    /// Restart the schedule after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
