//! Muncher Proxy - rate-limited gateway for the TETR.IO API.
//!
//! ## Quick Start
//!
//! ```bash
//! # Start with defaults (port 3000, one upstream call per second)
//! TETRIO_USERNAME=bot TETRIO_PASSWORD=secret muncher-proxy
//!
//! # Custom configuration
//! MUNCHER_PORT=9000 MUNCHER_MIN_INTERVAL_MS=500 MUNCHER_SUPPORTER_KEYS=k1,k2 \
//!     TETRIO_USERNAME=bot TETRIO_PASSWORD=secret muncher-proxy
//! ```

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use muncher_proxy::{run_server, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("muncher_proxy=info,muncher_core=info,tower_http=info")
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load configuration
    let config = cli.into_config()?;

    run_server(config).await
}
