//! Outbound dispatch scheduling.
//!
//! Every call toward the upstream API goes through a single
//! [`DispatchQueue`]. The queue orders work by priority, releases one task at
//! a time and keeps a minimum interval between consecutive task starts.
//!
//! # Architecture
//!
//! ```text
//!   submit(task, priority)          submit(task, priority)
//!            │                               │
//!            └──────────────┬────────────────┘
//!                           ▼
//!                ┌─────────────────────┐
//!                │    PendingQueue     │ ← (priority desc, arrival asc)
//!                └──────────┬──────────┘
//!                           │ pop head
//!                ┌──────────▼──────────┐
//!                │       Worker        │ ← wait out min_interval,
//!                │   (single-flight)   │   run, deliver result
//!                └──────────┬──────────┘
//!                           ▼
//!                  Completion<T, E> resolved
//! ```
//!
//! # Known limitation
//!
//! There is no aging: a steady stream of higher-priority work can keep a
//! lower-priority entry waiting indefinitely.

mod config;
mod dispatcher;
mod metrics;
mod queue;

pub use config::DispatchConfig;
pub use dispatcher::{Completion, DispatchQueue};
pub use metrics::{DispatchMetrics, DispatchSnapshot, TaskOutcome};
pub use queue::{Pending, PendingQueue, Priority};
