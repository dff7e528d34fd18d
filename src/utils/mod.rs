//! Utility modules

pub mod clock;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::{retry_with_backoff, BackoffPolicy};
