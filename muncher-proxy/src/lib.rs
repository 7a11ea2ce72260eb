//! Muncher Proxy Library
//!
//! Rate-limited gateway in front of the TETR.IO API.
//!
//! Inbound requests are charged against a per-caller admission budget.
//! Admitted requests that need the upstream are turned into tasks and
//! submitted to a single priority dispatch queue, so TETR.IO sees at most one
//! call at a time with a minimum gap between calls. Supporters jump the queue.

use axum::{
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

pub mod analyzer;
pub mod caller;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod upstream;

pub use config::{Cli, ConfigError, Credentials, ProxyConfig};
pub use error::ProxyError;
pub use state::AppState;
pub use upstream::{TetrioClient, UpstreamError};

use analyzer::PassthroughAnalyzer;
use muncher_core::TokioClock;

/// Initialize Prometheus metrics registry.
/// Should be called once before starting the server.
pub fn init_metrics() {
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register Prometheus metrics: {}", e);
    }
}

/// Build the router for the given state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/status", get(routes::status))
        .route("/health", get(routes::health))
        .route("/live", get(routes::live))
        .route("/metrics", get(routes::metrics))
        .route("/metrics/prometheus", get(routes::metrics_prometheus))
        // TETR.IO endpoints
        .route("/replay", get(routes::replay_get_hint).post(routes::replay_upload))
        .route("/replay/:id", get(routes::replay_by_id))
        .route("/league/:id", get(routes::league))
        .route("/user/:username", get(routes::user))
        .route("/user/:username/id", get(routes::user_id))
        .route("/api", any(routes::api_not_found))
        .route("/api/*rest", any(routes::api_not_found))
        // Middleware
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drop admission buckets whose window has passed
pub fn spawn_admission_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    // tokio intervals reject a zero period
    let period = state
        .limiter
        .config()
        .sweep_interval
        .max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = state.limiter.evict_idle();
            metrics::set_tracked_callers(state.limiter.len());
            debug!(evicted, tracked = state.limiter.len(), "Admission sweep");
        }
    })
}

/// Run the muncher proxy server.
///
/// Logs in, then serves until the listener fails. A failed login is logged
/// and the server starts anyway; authenticated routes answer 503 until a
/// token is available.
///
/// # Example
/// ```no_run
/// use muncher_proxy::{run_server, Credentials, ProxyConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ProxyConfig {
///         credentials: Some(Credentials {
///             username: "bot".to_string(),
///             password: "secret".to_string(),
///         }),
///         ..Default::default()
///     };
///     run_server(config).await
/// }
/// ```
pub async fn run_server(config: ProxyConfig) -> anyhow::Result<()> {
    // Initialize Prometheus metrics
    init_metrics();

    info!(
        port = config.port,
        api_url = %config.api_url,
        channel_url = %config.channel_url,
        min_interval_ms = config.dispatch.min_interval.as_millis() as u64,
        admission_points = config.admission.capacity,
        admission_window_secs = config.admission.window.as_secs_f64(),
        supporters = config.supporter_keys.len(),
        "Starting muncher proxy v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = TetrioClient::new(&config.api_url, &config.channel_url, config.upstream_timeout)?;
    let port = config.port;

    // Create application state
    let state = Arc::new(AppState::new(
        config,
        TokioClock::shared(),
        client,
        Arc::new(PassthroughAnalyzer),
    ));

    match state.login().await {
        Ok(()) => info!("Authenticated with TETR.IO"),
        Err(e) => warn!(
            error = %e,
            "Could not log in to TETR.IO. Replay downloads will fail until restart."
        ),
    }

    spawn_admission_sweeper(state.clone());

    let app = build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Muncher proxy listening on http://{}", addr);
    info!("Replays: http://{}/replay/:id", addr);
    info!("Health:  http://{}/health", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
