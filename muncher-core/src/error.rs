//! Error types for the muncher core library
//!
//! # Error Hierarchy
//!
//! ```text
//! DispatchError<E>   - outcome of a task submitted to the dispatch queue
//! ├── Task(E)        - the task's own error, delivered verbatim
//! ├── Panicked       - the task panicked while running
//! └── Shutdown       - the worker went away before the task completed
//!
//! AdmissionDenied    - a caller exceeded its admission budget
//! ```
//!
//! Admission denial is resolved before a task is created, so the two
//! families never mix: a denied request never reaches the queue.

use std::time::Duration;

use thiserror::Error;

/// Failure of a task submitted to the dispatch queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError<E> {
    /// The task ran and failed
    #[error("{0}")]
    Task(E),

    /// The task panicked; the queue kept running
    #[error("Task panicked while running")]
    Panicked,

    /// The queue worker stopped before the task could complete
    #[error("Dispatch queue shut down before the task completed")]
    Shutdown,
}

impl<E> DispatchError<E> {
    /// The task's own error, if that is what this is
    pub fn into_task_error(self) -> Option<E> {
        match self {
            DispatchError::Task(e) => Some(e),
            _ => None,
        }
    }

    /// Map the task error, keeping queue-level failures as they are
    pub fn map_task<F, O>(self, f: O) -> DispatchError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            DispatchError::Task(e) => DispatchError::Task(f(e)),
            DispatchError::Panicked => DispatchError::Panicked,
            DispatchError::Shutdown => DispatchError::Shutdown,
        }
    }
}

/// A caller exhausted its points for the current window
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limited: requested {requested} points with {remaining} remaining, retry in {retry_after:?}")]
pub struct AdmissionDenied {
    /// Points the rejected call asked for
    pub requested: u32,

    /// Points left in the current window (unchanged by the rejection)
    pub remaining: u32,

    /// Time until the window resets
    pub retry_after: Duration,

    /// Points a full window holds
    pub capacity: u32,
}

impl AdmissionDenied {
    /// Whether waiting for the window to reset can ever admit this request
    ///
    /// A request costing more than `capacity` is refused in every window,
    /// so `retry_after` does not apply to it.
    pub fn is_retryable(&self) -> bool {
        self.requested <= self.capacity
    }

    /// Whole seconds to advertise in a `Retry-After` header, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}
