//! Error types for the muncher proxy.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use muncher_core::{AdmissionDenied, DispatchError};
use serde_json::json;

use crate::upstream::UpstreamError;

/// Proxy error types
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Caller exceeded its admission budget
    #[error(transparent)]
    RateLimited(#[from] AdmissionDenied),

    /// An upstream call failed
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The replay payload could not be analyzed
    #[error("Error parsing replay: {0}")]
    Analysis(String),

    /// No bearer token is available for authenticated calls
    #[error("Not authenticated with TETR.IO")]
    NotAuthenticated,

    /// The dispatch queue is gone
    #[error("Upstream queue unavailable")]
    QueueShutdown,

    /// The queued task panicked
    #[error("Internal error: upstream task panicked")]
    TaskPanicked,
}

impl From<DispatchError<UpstreamError>> for ProxyError {
    fn from(err: DispatchError<UpstreamError>) -> Self {
        match err {
            DispatchError::Task(e) => ProxyError::Upstream(e),
            DispatchError::Panicked => ProxyError::TaskPanicked,
            DispatchError::Shutdown => ProxyError::QueueShutdown,
        }
    }
}

impl ProxyError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::RateLimited(denied) if !denied.is_retryable() => "exceeds_capacity",
            ProxyError::RateLimited(_) => "rate_limited",
            ProxyError::Upstream(UpstreamError::Unreachable(_)) => "upstream_unreachable",
            ProxyError::Upstream(UpstreamError::Rejected(_)) => "upstream_rejected",
            ProxyError::Upstream(UpstreamError::Malformed(_)) => "malformed_response",
            ProxyError::Analysis(_) => "analysis_failed",
            ProxyError::NotAuthenticated => "not_authenticated",
            ProxyError::QueueShutdown => "queue_shutdown",
            ProxyError::TaskPanicked => "internal",
        }
    }

    /// HTTP status returned to the caller
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Upstream(UpstreamError::Unreachable(_)) => StatusCode::BAD_GATEWAY,
            // Pass the upstream status through when it is an error status
            ProxyError::Upstream(UpstreamError::Rejected(code)) => StatusCode::from_u16(*code)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ProxyError::Upstream(UpstreamError::Malformed(_)) => StatusCode::BAD_GATEWAY,
            ProxyError::Analysis(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotAuthenticated => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::QueueShutdown => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::TaskPanicked => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        }));

        let mut response = (self.status(), body).into_response();
        if let ProxyError::RateLimited(denied) = &self {
            // Waiting never helps a request larger than the whole window
            if !denied.is_retryable() {
                return response;
            }
            if let Ok(value) = HeaderValue::from_str(&denied.retry_after_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
