//! Configuration for the admission limiter.

use std::time::Duration;

use tracing::warn;

/// Configuration for per-caller admission control
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Points each caller gets per window
    pub capacity: u32,

    /// Length of a window; the budget refills completely once it has passed
    pub window: Duration,

    /// Points charged for one inbound request
    pub cost_per_request: u32,

    /// How often idle buckets are swept out of memory
    pub sweep_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            window: Duration::from_secs(3),
            cost_per_request: 1,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl AdmissionConfig {
    /// Tight budget for public deployments under load
    pub fn strict() -> Self {
        Self {
            capacity: 5,
            window: Duration::from_secs(10),
            cost_per_request: 1,
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Generous budget for private or development deployments
    pub fn relaxed() -> Self {
        Self {
            capacity: 60,
            window: Duration::from_secs(60),
            cost_per_request: 1,
            sweep_interval: Duration::from_secs(300),
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup
    ///
    /// Unparseable values are ignored. A zero window or sweep interval is
    /// rejected with a warning and the default kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(n) = lookup("MUNCHER_ADMISSION_POINTS").and_then(|v| v.parse().ok()) {
            config.capacity = n;
        }

        if let Some(secs) = positive_secs(&lookup, "MUNCHER_ADMISSION_WINDOW_SECS") {
            config.window = Duration::from_secs(secs);
        }

        if let Some(secs) = positive_secs(&lookup, "MUNCHER_ADMISSION_SWEEP_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }

        config
    }
}

fn positive_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key)?.parse::<u64>() {
        Ok(0) => {
            warn!(key, "Zero is not a valid duration, keeping the default");
            None
        }
        Ok(secs) => Some(secs),
        Err(_) => None,
    }
}
