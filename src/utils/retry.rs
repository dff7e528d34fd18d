//! Retry utilities for resilient exchange calls
//! Exponential backoff with a cap, driven by an injectable clock

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::utils::clock::Clock;

/// Backoff policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Create new policy with doubling delays
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms: 8000,
            backoff_multiplier: 2.0,
        }
    }

    /// No retry policy
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (0-based), capped at `max_delay_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry as i32);
        let delay = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// Total number of attempts, including the first
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Retry an operation with backoff
///
/// `operation` receives the 0-based attempt number. Errors for which
/// `should_retry` returns false are returned immediately.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    operation_name: &str,
    policy: &BackoffPolicy,
    clock: &dyn Clock,
    should_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }

                if attempt >= policy.max_retries {
                    error!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    operation_name,
                    attempt + 1,
                    policy.attempts(),
                    delay.as_millis(),
                    e
                );
                clock.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = BackoffPolicy {
            max_retries: 6,
            initial_delay_ms: 500,
            max_delay_ms: 3000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let clock = ManualClock::new(0);
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(
            "test",
            &BackoffPolicy::new(3, 100),
            &clock,
            |_: &&str| true,
            |_| async {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err::<&str, &str>("fail")
                } else {
                    Ok("success")
                }
            },
        ).await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // 100 + 200
        assert_eq!(clock.total_slept_ms(), 300);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let clock = ManualClock::new(0);
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(
            "test",
            &BackoffPolicy::new(2, 10),
            &clock,
            |_: &&str| true,
            |_| async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<&str, &str>("always fail")
            },
        ).await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3); // initial + 2 retries
        assert_eq!(clock.sleep_count(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let clock = ManualClock::new(0);
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(
            "test",
            &BackoffPolicy::new(5, 10),
            &clock,
            |e: &&str| *e != "fatal",
            |_| async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), &str>("fatal")
            },
        ).await;

        assert_eq!(result.unwrap_err(), "fatal");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_attempt_number_is_passed_through() {
        let clock = ManualClock::new(0);
        let seen = std::sync::Mutex::new(Vec::new());

        let _ = retry_with_backoff(
            "test",
            &BackoffPolicy::new(2, 1),
            &clock,
            |_: &&str| true,
            |attempt| {
                seen.lock().unwrap().push(attempt);
                async { Err::<(), &str>("fail") }
            },
        ).await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }
}
