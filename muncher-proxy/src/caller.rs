//! Who is calling, and how urgently they are served.

use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use muncher_core::Priority;
use uuid::Uuid;

use crate::state::AppState;

/// Header carrying a supporter key
pub const SUPPORTER_KEY_HEADER: &str = "x-supporter-key";

/// Identity and priority of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Key used by the admission limiter
    pub identity: String,
    /// Priority of any upstream work done for this request
    pub priority: Priority,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        Ok(Caller {
            identity: client_identity(&parts.headers, peer),
            priority: state.priority_policy.priority_for(&parts.headers),
        })
    }
}

/// Best-effort caller identity
///
/// First entry of `X-Forwarded-For`, then the peer IP, then a random
/// placeholder. Not a security boundary: the header is caller-controlled.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => format!("anonymous-{}", Uuid::new_v4()),
    }
}

/// Maps supporter status to dispatch priority
#[derive(Debug, Clone, Default)]
pub struct PriorityPolicy {
    supporter_keys: HashSet<String>,
}

impl PriorityPolicy {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let supporter_keys = keys
            .into_iter()
            .map(Into::into)
            .map(|k: String| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { supporter_keys }
    }

    /// Supporter priority for a known key, standard otherwise
    pub fn priority_for(&self, headers: &HeaderMap) -> Priority {
        let is_supporter = headers
            .get(SUPPORTER_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .is_some_and(|key| self.supporter_keys.contains(key));

        if is_supporter {
            Priority::SUPPORTER
        } else {
            Priority::STANDARD
        }
    }

    pub fn supporter_count(&self) -> usize {
        self.supporter_keys.len()
    }
}
