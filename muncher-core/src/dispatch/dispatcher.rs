//! Single-flight, interval-throttled dispatch of queued tasks.
//!
//! One worker task owns execution. `submit` only inserts into the pending
//! sequence and wakes the worker; the worker pops the head, waits out the
//! remainder of the minimum interval, stamps the dispatch time and runs the
//! task to completion before looking at the queue again.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::DispatchConfig;
use super::metrics::{DispatchMetrics, TaskOutcome};
use super::queue::{Pending, PendingQueue, Priority};
use crate::clock::SharedClock;
use crate::error::DispatchError;

/// Type-erased task: runs the caller's work and reports how it went
type Job = Box<dyn FnOnce() -> BoxFuture<'static, TaskOutcome> + Send>;

struct SchedulerState {
    pending: PendingQueue<Job>,
    /// A task is between dequeue and completion
    active: bool,
    /// Start time of the most recent task
    last_dispatch: Option<Instant>,
    /// Every queue handle has been dropped
    closed: bool,
}

struct Shared {
    config: DispatchConfig,
    clock: SharedClock,
    state: Mutex<SchedulerState>,
    wake: Notify,
    metrics: Arc<DispatchMetrics>,
}

/// Closes the queue when the last handle goes away
struct HandleGuard {
    shared: Arc<Shared>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

/// Priority dispatch queue serializing all upstream calls
///
/// Cloning yields another handle to the same queue. When the last handle is
/// dropped the worker finishes whatever is still queued and exits.
#[derive(Clone)]
pub struct DispatchQueue {
    shared: Arc<Shared>,
    _guard: Arc<HandleGuard>,
}

impl DispatchQueue {
    /// Create a queue and spawn its worker on the current tokio runtime
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new(config: DispatchConfig, clock: SharedClock) -> Self {
        Self::with_metrics(config, clock, Arc::new(DispatchMetrics::new()))
    }

    /// Same as [`DispatchQueue::new`], recording into existing metrics
    pub fn with_metrics(
        config: DispatchConfig,
        clock: SharedClock,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        let shared = Arc::new(Shared {
            config,
            clock,
            state: Mutex::new(SchedulerState {
                pending: PendingQueue::new(),
                active: false,
                last_dispatch: None,
                closed: false,
            }),
            wake: Notify::new(),
            metrics,
        });

        tokio::spawn(run_worker(shared.clone()));

        Self { _guard: Arc::new(HandleGuard { shared: shared.clone() }), shared }
    }

    /// Queue `task` and return a future for its result
    ///
    /// Returns immediately. The task runs once everything ahead of it has run
    /// and the minimum interval since the previous start has passed. Dropping
    /// the returned [`Completion`] does not withdraw the task.
    pub fn submit<F, Fut, T, E>(&self, task: F, priority: Priority) -> Completion<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            async move {
                let result = AssertUnwindSafe(async move { task().await }).catch_unwind().await;
                let (outcome, delivered) = match result {
                    Ok(Ok(value)) => (TaskOutcome::Succeeded, Ok(value)),
                    Ok(Err(e)) => (TaskOutcome::Failed, Err(DispatchError::Task(e))),
                    Err(_) => (TaskOutcome::Panicked, Err(DispatchError::Panicked)),
                };
                // The caller may have stopped waiting
                let _ = tx.send(delivered);
                outcome
            }
            .boxed()
        });

        let now = self.shared.clock.now();
        let (seq, depth) = {
            let mut state = self.shared.state.lock();
            let seq = state.pending.push(job, priority, now);
            // Counted before the worker can see the entry
            self.shared.metrics.record_submitted();
            (seq, state.pending.len())
        };
        self.shared.wake.notify_one();

        debug!(seq, priority = %priority, queue_depth = depth, "Task enqueued");

        Completion { rx, seq }
    }

    /// Tasks waiting to start (the running one is not counted)
    pub fn depth(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Waiting tasks per priority, highest first
    pub fn depth_by_priority(&self) -> Vec<(Priority, usize)> {
        self.shared.state.lock().pending.depth_by_priority()
    }

    /// Whether a task is currently running
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.shared.metrics
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.shared.config
    }
}

/// Result of a submitted task
///
/// Resolves to the task's value, its error wrapped in
/// [`DispatchError::Task`], or a queue-level failure.
#[must_use = "the task runs regardless, but its result is lost unless awaited"]
pub struct Completion<T, E> {
    rx: oneshot::Receiver<Result<T, DispatchError<E>>>,
    seq: u64,
}

impl<T, E> Completion<T, E> {
    /// Arrival sequence number assigned at submission
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl<T, E> Future for Completion<T, E> {
    type Output = Result<T, DispatchError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Shutdown)))
    }
}

impl Shared {
    /// Wait for the next entry, marking the scheduler active when one is taken
    async fn next_entry(&self) -> Option<Pending<Job>> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(entry) = state.pending.pop_front() {
                    state.active = true;
                    return Some(entry);
                }
                if state.closed {
                    return None;
                }
            }
            self.wake.notified().await;
        }
    }

    /// Time left before the minimum interval since the last start has passed
    fn throttle_delay(&self) -> Duration {
        let last = self.state.lock().last_dispatch;
        match last {
            Some(last) => {
                let since = self.clock.now().saturating_duration_since(last);
                self.config.min_interval.saturating_sub(since)
            }
            None => Duration::ZERO,
        }
    }
}

async fn run_worker(shared: Arc<Shared>) {
    debug!(min_interval_ms = shared.config.min_interval.as_millis() as u64, "Dispatch worker started");

    while let Some(entry) = shared.next_entry().await {
        let Pending { priority, seq, enqueued_at, job } = entry;

        let wait = shared.throttle_delay();
        if !wait.is_zero() {
            debug!(seq, wait_ms = wait.as_millis() as u64, "Throttling before dispatch");
            shared.clock.sleep(wait).await;
        }

        let started = shared.clock.now();
        shared.state.lock().last_dispatch = Some(started);
        shared
            .metrics
            .record_dispatched(started.saturating_duration_since(enqueued_at));

        debug!(seq, priority = %priority, "Dispatching task");
        let outcome = job().await;
        let ran_for = shared.clock.now().saturating_duration_since(started);
        shared.metrics.record_finished(outcome, ran_for);

        match outcome {
            TaskOutcome::Succeeded => {
                debug!(seq, run_ms = ran_for.as_millis() as u64, "Task completed")
            }
            TaskOutcome::Failed => warn!(seq, priority = %priority, "Task failed"),
            TaskOutcome::Panicked => warn!(seq, priority = %priority, "Task panicked"),
        }

        shared.state.lock().active = false;
    }

    debug!("Dispatch worker stopped");
}
