//! Client for the TETR.IO API.
//!
//! Each method performs exactly one outbound call and classifies the outcome.
//! Callers never invoke these directly from a handler: they wrap them in a
//! task and submit it to the dispatch queue so the upstream sees one request
//! at a time.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

/// Default base URL of the authenticated API
pub const DEFAULT_API_URL: &str = "https://tetr.io/api";

/// Default base URL of the public channel API
pub const DEFAULT_CHANNEL_URL: &str = "https://ch.tetr.io/api";

/// Failure of a single upstream call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Transport-level failure reaching the API
    #[error("Unable to reach TETR.IO: {0}")]
    Unreachable(String),

    /// The API answered with a non-2xx status
    #[error("TETR.IO rejected the request with status {0}")]
    Rejected(u16),

    /// The API answered 2xx without the expected structure
    #[error("Malformed TETR.IO response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Label used in logs and exported metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Unreachable(_) => "unreachable",
            UpstreamError::Rejected(_) => "rejected",
            UpstreamError::Malformed(_) => "malformed",
        }
    }

    fn malformed(msg: impl Into<String>) -> Self {
        UpstreamError::Malformed(msg.into())
    }
}

/// TETR.IO API client
#[derive(Clone)]
pub struct TetrioClient {
    client: Client,
    api_url: String,
    channel_url: String,
}

impl TetrioClient {
    /// Create a client for the given base URLs
    pub fn new(
        api_url: impl Into<String>,
        channel_url: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let api_url = api_url.into();
        let channel_url = channel_url.into();
        debug!(api = %api_url, channel = %channel_url, "Creating TETR.IO client");

        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("muncher-proxy/", env!("CARGO_PKG_VERSION")))
                .build()?,
            api_url,
            channel_url,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn channel_url(&self) -> &str {
        &self.channel_url
    }

    /// Log in and return a bearer token
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, UpstreamError> {
        let url = endpoint(&self.api_url, &["users", "authenticate"])?;
        let request = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(&json!({ "username": username, "password": password }));

        let body = self.send_json(request).await?;
        match body.get("token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => {
                debug!("Authenticated with TETR.IO");
                Ok(token.to_string())
            }
            _ => Err(UpstreamError::malformed("token not found in response")),
        }
    }

    /// Download a replay and return its `game` object
    #[instrument(skip(self, token))]
    pub async fn download_replay(&self, id: &str, token: &str) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.api_url, &["games", id])?;
        let request = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .bearer_auth(token);

        let mut body = self.send_json(request).await?;
        require_success(&body)?;

        match body.get_mut("game") {
            Some(game) if game.is_object() => Ok(game.take()),
            _ => Err(UpstreamError::malformed("no game in response")),
        }
    }

    /// Resolve a username to its user ID
    #[instrument(skip(self))]
    pub async fn get_user_id(&self, username: &str) -> Result<String, UpstreamError> {
        let url = endpoint(&self.channel_url, &["users", username])?;
        let body = self.send_json(self.client.get(url)).await?;
        require_success(&body)?;

        match body.pointer("/data/_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(UpstreamError::malformed("no user ID in response")),
        }
    }

    /// Public profile of a user
    pub async fn user(&self, username: &str) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.channel_url, &["users", username])?;
        self.fetch_json(url).await
    }

    /// Recent league records of a user
    pub async fn league_recent(&self, user: &str) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.channel_url, &["users", user, "records", "league", "recent"])?;
        self.fetch_json(url).await
    }

    /// Pass-through GET; the body is returned as-is
    #[instrument(skip(self, url), fields(url = %url))]
    pub async fn fetch_json(&self, url: Url) -> Result<Value, UpstreamError> {
        self.send_json(self.client.get(url)).await
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value, UpstreamError> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Failed to reach TETR.IO");
            UpstreamError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "TETR.IO returned error status");
            return Err(UpstreamError::Rejected(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|_| UpstreamError::malformed("response is not JSON"))
    }
}

/// Append path segments to a base URL, percent-encoding each one
pub fn endpoint(base: &str, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = Url::parse(base)
        .map_err(|e| UpstreamError::Unreachable(format!("invalid upstream URL {base}: {e}")))?;

    url.path_segments_mut()
        .map_err(|_| UpstreamError::Unreachable(format!("upstream URL {base} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

/// Reject bodies whose top-level `success` is not literally `true`
pub fn require_success(body: &Value) -> Result<(), UpstreamError> {
    match body.get("success") {
        Some(Value::Bool(true)) => Ok(()),
        Some(Value::Bool(false)) => Err(UpstreamError::malformed("response unsuccessful")),
        _ => Err(UpstreamError::malformed("no success flag in response")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TetrioClient::new(DEFAULT_API_URL, DEFAULT_CHANNEL_URL, Duration::from_secs(5))
            .unwrap();
        assert_eq!(client.api_url(), "https://tetr.io/api");
        assert_eq!(client.channel_url(), "https://ch.tetr.io/api");
    }

    #[test]
    fn test_endpoint_joins_and_encodes_segments() {
        let url = endpoint("https://ch.tetr.io/api", &["users", "osk", "records", "league", "recent"])
            .unwrap();
        assert_eq!(url.as_str(), "https://ch.tetr.io/api/users/osk/records/league/recent");

        let url = endpoint("http://127.0.0.1:9000/", &["games", "a/b?c"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/games/a%2Fb%3Fc");
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        let err = endpoint("not a url", &["users"]).unwrap_err();
        assert_eq!(err.kind(), "unreachable");
    }

    #[test]
    fn test_require_success() {
        assert!(require_success(&json!({ "success": true })).is_ok());
        assert_eq!(
            require_success(&json!({ "success": false })),
            Err(UpstreamError::Malformed("response unsuccessful".to_string()))
        );
        assert!(require_success(&json!({ "success": "true" })).is_err());
        assert!(require_success(&json!({ "data": {} })).is_err());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            UpstreamError::Rejected(404).to_string(),
            "TETR.IO rejected the request with status 404"
        );
        assert_eq!(UpstreamError::Malformed("x".into()).kind(), "malformed");
    }
}
