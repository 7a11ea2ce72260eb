//! Metrics module for the muncher proxy
//!
//! Provides Prometheus metrics for monitoring and observability.

pub mod prometheus;

// Re-export commonly used items
pub use prometheus::{
    encode_metrics, record_admission, record_queue_wait, record_upstream, register_metrics,
    set_queue_size, set_tracked_callers, RequestTimer,
};
