//! Application state for the muncher proxy.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use muncher_core::{
    AdmissionLimiter, Admitted, DispatchError, DispatchQueue, Priority, SharedClock,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::analyzer::ReplayAnalyzer;
use crate::caller::{Caller, PriorityPolicy};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::metrics;
use crate::upstream::{TetrioClient, UpstreamError};

/// Application state shared across all handlers
pub struct AppState {
    /// Configuration
    pub config: ProxyConfig,

    /// Serializes every outbound call to TETR.IO
    pub queue: DispatchQueue,

    /// Per-caller request budget
    pub limiter: AdmissionLimiter,

    /// TETR.IO client
    pub client: TetrioClient,

    /// Turns replays into the response body
    pub analyzer: Arc<dyn ReplayAnalyzer>,

    /// Supporter key lookup
    pub priority_policy: PriorityPolicy,

    /// Bearer token from the last successful login
    token: RwLock<Option<String>>,

    /// Runtime statistics
    pub stats: Mutex<ProxyStats>,
}

impl AppState {
    /// Create new application state
    ///
    /// Spawns the dispatch worker, so this must run inside a tokio runtime.
    pub fn new(
        config: ProxyConfig,
        clock: SharedClock,
        client: TetrioClient,
        analyzer: Arc<dyn ReplayAnalyzer>,
    ) -> Self {
        Self {
            queue: DispatchQueue::new(config.dispatch.clone(), clock.clone()),
            limiter: AdmissionLimiter::new(config.admission.clone(), clock),
            priority_policy: PriorityPolicy::new(config.supporter_keys.iter().cloned()),
            client,
            analyzer,
            token: RwLock::new(None),
            stats: Mutex::new(ProxyStats::default()),
            config,
        }
    }

    /// Charge the caller for one request
    pub async fn admit(&self, caller: &Caller) -> Result<Admitted, ProxyError> {
        let decision = self.limiter.admit(&caller.identity);

        metrics::record_admission(decision.is_ok());
        metrics::set_tracked_callers(self.limiter.len());

        {
            let mut stats = self.stats.lock().await;
            stats.requests_total += 1;
            if decision.is_err() {
                stats.requests_denied += 1;
            }
        }

        Ok(decision?)
    }

    /// Run an upstream call through the dispatch queue and wait for it
    ///
    /// `call` labels the outcome in metrics and logs.
    pub async fn dispatch<F, Fut, T>(
        &self,
        call: &'static str,
        priority: Priority,
        task: F,
    ) -> Result<T, ProxyError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
        T: Send + 'static,
    {
        let submitted = Instant::now();
        let completion = self.queue.submit(
            move || async move {
                metrics::record_queue_wait(submitted.elapsed().as_secs_f64());
                task().await
            },
            priority,
        );
        metrics::set_queue_size(self.queue.depth());

        let result = completion.await;
        metrics::set_queue_size(self.queue.depth());

        let outcome = match &result {
            Ok(_) => "success",
            Err(DispatchError::Task(e)) => {
                warn!(call, error = %e, "Upstream call failed");
                e.kind()
            }
            Err(DispatchError::Panicked) => "panicked",
            Err(DispatchError::Shutdown) => "shutdown",
        };
        metrics::record_upstream(call, outcome);

        {
            let mut stats = self.stats.lock().await;
            if result.is_ok() {
                stats.upstream_success += 1;
            } else {
                stats.upstream_failed += 1;
            }
        }

        Ok(result?)
    }

    /// Log in with the configured credentials and keep the token
    ///
    /// The login goes through the queue like any other call, ahead of
    /// standard traffic.
    pub async fn login(&self) -> Result<(), ProxyError> {
        let credentials = self
            .config
            .credentials
            .clone()
            .ok_or(ProxyError::NotAuthenticated)?;
        let client = self.client.clone();

        let token = self
            .dispatch("authenticate", Priority::SUPPORTER, move || async move {
                client
                    .authenticate(&credentials.username, &credentials.password)
                    .await
            })
            .await?;

        self.set_token(token).await;
        info!("Logged in to TETR.IO");
        Ok(())
    }

    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Token for authenticated calls
    pub async fn bearer_token(&self) -> Result<String, ProxyError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(ProxyError::NotAuthenticated)
    }
}

/// Runtime statistics
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ProxyStats {
    /// Requests that reached admission
    pub requests_total: u64,

    /// Requests refused by the admission limiter
    pub requests_denied: u64,

    /// Upstream calls that succeeded
    pub upstream_success: u64,

    /// Upstream calls that failed for any reason
    pub upstream_failed: u64,
}

impl ProxyStats {
    /// Fraction of requests refused at admission
    pub fn denial_rate(&self) -> f64 {
        if self.requests_total == 0 {
            0.0
        } else {
            self.requests_denied as f64 / self.requests_total as f64
        }
    }

    /// Calculate upstream success rate
    pub fn upstream_success_rate(&self) -> f64 {
        let total = self.upstream_success + self.upstream_failed;
        if total == 0 {
            1.0
        } else {
            self.upstream_success as f64 / total as f64
        }
    }
}
