//! Health check and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::state::AppState;

/// Plain status probe
///
/// GET /status
pub async fn status() -> &'static str {
    "OK"
}

/// Health check endpoint
///
/// GET /health
///
/// Reports whether a token is held; never calls upstream, since that would
/// spend the shared request budget.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let authenticated = state.bearer_token().await.is_ok();

    Json(json!({
        "status": if authenticated { "healthy" } else { "degraded" },
        "authenticated": authenticated,
        "queue_depth": state.queue.depth(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Metrics endpoint with proxy, queue, and admission statistics
///
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.stats.lock().await.clone();
    let dispatch = state.queue.metrics().snapshot();
    let admission = state.limiter.metrics().snapshot();
    let by_priority: Vec<_> = state
        .queue
        .depth_by_priority()
        .into_iter()
        .map(|(priority, depth)| json!({ "priority": priority, "depth": depth }))
        .collect();

    Json(json!({
        "proxy": {
            "requests_total": stats.requests_total,
            "requests_denied": stats.requests_denied,
            "upstream_success": stats.upstream_success,
            "upstream_failed": stats.upstream_failed,
            "denial_rate": stats.denial_rate(),
            "upstream_success_rate": stats.upstream_success_rate()
        },
        "dispatch": {
            "config": {
                "min_interval_ms": state.queue.config().min_interval.as_millis() as u64
            },
            "current": {
                "queue_depth": state.queue.depth(),
                "by_priority": by_priority,
                "active": state.queue.is_active()
            },
            "totals": dispatch
        },
        "admission": {
            "config": {
                "capacity": state.limiter.config().capacity,
                "window_secs": state.limiter.config().window.as_secs_f64(),
                "cost_per_request": state.limiter.config().cost_per_request
            },
            "current": {
                "tracked_callers": state.limiter.len()
            },
            "totals": admission
        },
        "supporters": state.priority_policy.supporter_count()
    }))
}

/// Prometheus scrape endpoint
///
/// GET /metrics/prometheus
pub async fn metrics_prometheus(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::set_queue_size(state.queue.depth());
    metrics::set_tracked_callers(state.limiter.len());

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

/// Live check (for Kubernetes)
///
/// GET /live
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}
