//! Per-caller admission control.
//!
//! The limiter is checked once per inbound request, before anything is
//! submitted to the dispatch queue. A denied request never creates a task.

mod config;
mod limiter;

pub use config::AdmissionConfig;
pub use limiter::{AdmissionLimiter, AdmissionMetrics, AdmissionSnapshot, Admitted};
