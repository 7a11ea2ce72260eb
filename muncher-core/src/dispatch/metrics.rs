//! Metrics for the dispatch queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters describing queue activity
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Tasks accepted by `submit`
    pub tasks_submitted: AtomicU64,

    /// Tasks currently waiting in the queue
    pub tasks_queued: AtomicU64,

    /// Tasks that have been started
    pub tasks_dispatched: AtomicU64,

    /// Tasks that returned `Ok`
    pub tasks_succeeded: AtomicU64,

    /// Tasks that returned `Err`
    pub tasks_failed: AtomicU64,

    /// Tasks that panicked
    pub tasks_panicked: AtomicU64,

    /// Sum of time spent queued, in milliseconds
    pub total_queue_wait_ms: AtomicU64,

    /// Sum of task run time, in milliseconds
    pub total_run_ms: AtomicU64,

    /// Deepest queue observed
    pub max_queue_depth: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task entering the queue
    pub fn record_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        let queued = self.tasks_queued.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_queue_depth.fetch_max(queued, Ordering::Relaxed);
    }

    /// Record a task leaving the queue and starting
    pub fn record_dispatched(&self, waited: Duration) {
        let _ = self
            .tasks_queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
        self.total_queue_wait_ms
            .fetch_add(waited.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record how a started task ended
    pub fn record_finished(&self, outcome: TaskOutcome, ran_for: Duration) {
        let counter = match outcome {
            TaskOutcome::Succeeded => &self.tasks_succeeded,
            TaskOutcome::Failed => &self.tasks_failed,
            TaskOutcome::Panicked => &self.tasks_panicked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_run_ms
            .fetch_add(ran_for.as_millis() as u64, Ordering::Relaxed);
    }

    /// Tasks waiting right now
    pub fn queue_depth(&self) -> u64 {
        self.tasks_queued.load(Ordering::Relaxed)
    }

    /// Tasks that have finished, whatever the outcome
    pub fn tasks_finished(&self) -> u64 {
        self.tasks_succeeded.load(Ordering::Relaxed)
            + self.tasks_failed.load(Ordering::Relaxed)
            + self.tasks_panicked.load(Ordering::Relaxed)
    }

    /// Average time between submit and start
    pub fn avg_queue_wait_ms(&self) -> f64 {
        let dispatched = self.tasks_dispatched.load(Ordering::Relaxed);
        if dispatched == 0 {
            return 0.0;
        }
        self.total_queue_wait_ms.load(Ordering::Relaxed) as f64 / dispatched as f64
    }

    /// Average task run time
    pub fn avg_run_ms(&self) -> f64 {
        let finished = self.tasks_finished();
        if finished == 0 {
            return 0.0;
        }
        self.total_run_ms.load(Ordering::Relaxed) as f64 / finished as f64
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_queued: self.tasks_queued.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            avg_queue_wait_ms: self.avg_queue_wait_ms(),
            avg_run_ms: self.avg_run_ms(),
        }
    }
}

/// How a dispatched task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Panicked,
}

impl TaskOutcome {
    /// Label used in logs and exported metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded => "success",
            TaskOutcome::Failed => "error",
            TaskOutcome::Panicked => "panic",
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchSnapshot {
    pub tasks_submitted: u64,
    pub tasks_queued: u64,
    pub tasks_dispatched: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_panicked: u64,
    pub max_queue_depth: u64,
    pub avg_queue_wait_ms: f64,
    pub avg_run_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = DispatchMetrics::new();

        metrics.record_submitted();
        assert_eq!(metrics.queue_depth(), 1);

        metrics.record_dispatched(Duration::from_millis(100));
        assert_eq!(metrics.queue_depth(), 0);

        metrics.record_finished(TaskOutcome::Succeeded, Duration::from_millis(500));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_submitted, 1);
        assert_eq!(snapshot.tasks_succeeded, 1);
        assert_eq!(snapshot.avg_queue_wait_ms, 100.0);
        assert_eq!(snapshot.avg_run_ms, 500.0);
    }

    #[test]
    fn test_max_queue_depth() {
        let metrics = DispatchMetrics::new();

        for _ in 0..5 {
            metrics.record_submitted();
        }
        for _ in 0..3 {
            metrics.record_dispatched(Duration::ZERO);
            metrics.record_finished(TaskOutcome::Failed, Duration::ZERO);
        }

        // Max should still be 5
        assert_eq!(metrics.max_queue_depth.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.queue_depth(), 2);
        assert_eq!(metrics.tasks_finished(), 3);
    }

    #[test]
    fn test_dispatch_without_submit_does_not_underflow() {
        let metrics = DispatchMetrics::new();

        metrics.record_dispatched(Duration::ZERO);
        assert_eq!(metrics.queue_depth(), 0);

        metrics.record_submitted();
        assert_eq!(metrics.queue_depth(), 1);
        assert_eq!(metrics.max_queue_depth.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_outcome_counters() {
        let metrics = DispatchMetrics::new();

        metrics.record_finished(TaskOutcome::Succeeded, Duration::ZERO);
        metrics.record_finished(TaskOutcome::Failed, Duration::ZERO);
        metrics.record_finished(TaskOutcome::Panicked, Duration::ZERO);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_succeeded, 1);
        assert_eq!(snapshot.tasks_failed, 1);
        assert_eq!(snapshot.tasks_panicked, 1);
        assert_eq!(TaskOutcome::Panicked.as_str(), "panic");
    }
}
