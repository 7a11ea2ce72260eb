//! Injectable time source.
//!
//! Both the dispatch queue and the admission limiter read time through the
//! [`Clock`] trait so tests can drive elapsed time without sleeping for real.
//!
//! - [`TokioClock`] delegates to `tokio::time`, which means it also honours
//!   `tokio::time::pause()` / `#[tokio::test(start_paused = true)]`.
//! - [`ManualClock`] only moves when told to. Its `sleep` advances the clock
//!   by the requested duration and completes immediately.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Source of the current instant and of timed suspension
pub trait Clock: Send + Sync + 'static {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspend for `duration`
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    /// Shared handle to the tokio clock
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Deterministic clock for tests
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self { origin: Instant::now(), elapsed: Mutex::new(Duration::ZERO) }
    }

    /// Create a shared manual clock
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    /// Total time advanced since creation
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.advance(duration);
        future::ready(()).boxed()
    }
}
