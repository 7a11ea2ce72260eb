//! Configuration for the dispatch queue.

use std::time::Duration;

/// Configuration for the dispatch queue
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minimum gap between two consecutive task starts
    pub min_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            // One upstream call per second
            min_interval: Duration::from_millis(1000),
        }
    }
}

impl DispatchConfig {
    /// Config with the given minimum interval
    pub fn with_interval(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// No throttling; tasks still run one at a time
    pub fn unthrottled() -> Self {
        Self { min_interval: Duration::ZERO }
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MUNCHER_MIN_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                config.min_interval = Duration::from_millis(n);
            }
        }

        config
    }
}
