//! HTTP route handlers for the muncher proxy.
//!
//! This module organizes all route handlers:
//! - `health`: Status, health check and metrics endpoints
//! - `tetrio`: Replay, league and user routes backed by TETR.IO

pub mod health;
pub mod tetrio;

// Re-export handlers for convenience
pub use health::{health, live, metrics, metrics_prometheus, status};
pub use tetrio::{api_not_found, league, replay_by_id, replay_get_hint, replay_upload, user, user_id};
