// muncher core library
//
// Scheduling primitives for the muncher gateway: the priority dispatch queue
// that serializes upstream calls and the per-caller admission limiter.

pub mod admission;
pub mod clock;
pub mod dispatch;
pub mod error;

pub use admission::{AdmissionConfig, AdmissionLimiter, Admitted};
pub use clock::{Clock, ManualClock, SharedClock, TokioClock};
pub use dispatch::{Completion, DispatchConfig, DispatchQueue, Priority};
pub use error::{AdmissionDenied, DispatchError};
