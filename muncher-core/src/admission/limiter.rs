//! Fixed-window admission limiter keyed by caller identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::AdmissionConfig;
use crate::clock::SharedClock;
use crate::error::AdmissionDenied;

/// Points left for one identity in its current window
#[derive(Debug, Clone, Copy)]
struct Bucket {
    remaining: u32,
    window_start: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self { remaining: capacity, window_start: now }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }

    /// Start a fresh window if the current one has run out
    fn refresh(&mut self, now: Instant, capacity: u32, window: Duration) {
        if self.is_expired(now, window) {
            *self = Bucket::full(capacity, now);
        }
    }

    fn resets_in(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}

/// A successful consume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// Points left in the current window
    pub remaining: u32,
    /// Time until the window refills
    pub resets_in: Duration,
}

/// Admission counters
#[derive(Debug, Default)]
pub struct AdmissionMetrics {
    pub admitted: AtomicU64,
    pub denied: AtomicU64,
    pub buckets_evicted: AtomicU64,
}

impl AdmissionMetrics {
    pub fn snapshot(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            buckets_evicted: self.buckets_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of admission counters
#[derive(Debug, Clone, serde::Serialize)]
pub struct AdmissionSnapshot {
    pub admitted: u64,
    pub denied: u64,
    pub buckets_evicted: u64,
}

/// Per-identity fixed-window limiter
///
/// Each identity owns `capacity` points that refill completely once `window`
/// has passed since the window opened. A window opens on the first consume
/// after the previous one expired. Buckets are updated under their map entry
/// lock, so concurrent requests from one identity cannot both spend the same
/// point.
pub struct AdmissionLimiter {
    config: AdmissionConfig,
    clock: SharedClock,
    buckets: DashMap<String, Bucket>,
    metrics: AdmissionMetrics,
}

impl AdmissionLimiter {
    pub fn new(config: AdmissionConfig, clock: SharedClock) -> Self {
        Self { config, clock, buckets: DashMap::new(), metrics: AdmissionMetrics::default() }
    }

    /// Charge `cost` points to `identity`
    ///
    /// On denial the bucket is left untouched. A cost of zero always passes;
    /// a cost above `capacity` never does.
    pub fn try_consume(&self, identity: &str, cost: u32) -> Result<Admitted, AdmissionDenied> {
        let now = self.clock.now();
        let capacity = self.config.capacity;
        let window = self.config.window;

        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| Bucket::full(capacity, now));
        bucket.refresh(now, capacity, window);

        let resets_in = bucket.resets_in(now, window);
        if cost > bucket.remaining {
            let remaining = bucket.remaining;
            drop(bucket);
            self.metrics.denied.fetch_add(1, Ordering::Relaxed);
            warn!(identity, cost, remaining, "Admission denied");
            return Err(AdmissionDenied {
                requested: cost,
                remaining,
                retry_after: resets_in,
                capacity,
            });
        }

        bucket.remaining -= cost;
        let remaining = bucket.remaining;
        drop(bucket);

        self.metrics.admitted.fetch_add(1, Ordering::Relaxed);
        debug!(identity, cost, remaining, "Admitted");
        Ok(Admitted { remaining, resets_in })
    }

    /// Charge the configured per-request cost
    pub fn admit(&self, identity: &str) -> Result<Admitted, AdmissionDenied> {
        self.try_consume(identity, self.config.cost_per_request)
    }

    /// Points `identity` could spend right now
    pub fn remaining(&self, identity: &str) -> u32 {
        let now = self.clock.now();
        match self.buckets.get(identity) {
            Some(bucket) if !bucket.is_expired(now, self.config.window) => bucket.remaining,
            _ => self.config.capacity,
        }
    }

    /// Drop buckets whose window has passed; returns how many were removed
    ///
    /// An expired bucket would be refilled on its next use anyway, so this
    /// never changes an admission decision.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window;
        let before = self.buckets.len();

        self.buckets.retain(|_, bucket| !bucket.is_expired(now, window));

        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            self.metrics
                .buckets_evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, "Evicted idle admission buckets");
        }
        evicted
    }

    /// Identities currently tracked
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }
}
