//! Proxy configuration and command-line parsing.

use std::time::Duration;

use clap::Parser;
use muncher_core::{AdmissionConfig, DispatchConfig};

use crate::upstream::{DEFAULT_API_URL, DEFAULT_CHANNEL_URL};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing TETRIO_USERNAME and/or TETRIO_PASSWORD (use a bot account)")]
    MissingCredentials,
}

/// Command-line arguments, each with an environment fallback
#[derive(Parser, Debug, Clone)]
#[command(name = "muncher-proxy")]
#[command(version)]
#[command(about = "Rate-limited gateway for the TETR.IO API", long_about = None)]
pub struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "MUNCHER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// TETR.IO bot account username
    #[arg(long, env = "TETRIO_USERNAME")]
    pub username: Option<String>,

    /// TETR.IO bot account password
    #[arg(long, env = "TETRIO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Base URL of the authenticated API
    #[arg(long, env = "TETRIO_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Base URL of the public channel API
    #[arg(long, env = "TETRIO_CHANNEL_URL", default_value = DEFAULT_CHANNEL_URL)]
    pub channel_url: String,

    /// Keys granting supporter priority (comma separated)
    #[arg(long, env = "MUNCHER_SUPPORTER_KEYS", value_delimiter = ',', hide_env_values = true)]
    pub supporter_keys: Vec<String>,

    /// Timeout for a single upstream call, in seconds
    #[arg(long, env = "MUNCHER_UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,
}

impl Cli {
    /// Validate arguments and build the proxy configuration
    ///
    /// Queue and admission settings come from their own environment
    /// variables (see [`DispatchConfig::from_env`] and
    /// [`AdmissionConfig::from_env`]).
    pub fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let (username, password) = match (self.username, self.password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
            _ => return Err(ConfigError::MissingCredentials),
        };

        Ok(ProxyConfig {
            port: self.port,
            api_url: self.api_url,
            channel_url: self.channel_url,
            credentials: Some(Credentials { username, password }),
            supporter_keys: self.supporter_keys,
            upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
            dispatch: DispatchConfig::from_env(),
            admission: AdmissionConfig::from_env(),
        })
    }
}

/// TETR.IO login
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Port to listen on
    pub port: u16,

    /// Base URL of the authenticated API
    pub api_url: String,

    /// Base URL of the public channel API
    pub channel_url: String,

    /// Login used at startup; `None` skips authentication
    pub credentials: Option<Credentials>,

    /// Keys granting supporter priority
    pub supporter_keys: Vec<String>,

    /// Timeout for a single upstream call
    pub upstream_timeout: Duration,

    /// Dispatch queue settings
    pub dispatch: DispatchConfig,

    /// Admission limiter settings
    pub admission: AdmissionConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            api_url: DEFAULT_API_URL.to_string(),
            channel_url: DEFAULT_CHANNEL_URL.to_string(),
            credentials: None,
            supporter_keys: Vec::new(),
            upstream_timeout: Duration::from_secs(30),
            dispatch: DispatchConfig::default(),
            admission: AdmissionConfig::default(),
        }
    }
}
