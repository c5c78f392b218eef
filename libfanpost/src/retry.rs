//! Retry policy for platform calls
//!
//! Adapters disagree on how hard to try: blob uploads get a second attempt
//! after a pause, media-attachment uploads get exactly one. Each adapter owns a
//! [`RetryPolicy`] built from its config section instead of a hand-written
//! attempt loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Attempt count and pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// Final error of an exhausted [`RetryPolicy::run`], with the attempts spent
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub error: E,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least one
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no pause
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or the attempts are used up
    ///
    /// Every error is retried; the pause is taken only between attempts.
    /// `label` names the operation in log output.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(error) if attempt < self.max_attempts => {
                    warn!(
                        "Attempt {}/{} failed for {}: {}. Retrying in {:?}...",
                        attempt, self.max_attempts, label, error, self.delay
                    );
                    if !self.delay.is_zero() {
                        sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => {
                    warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        label, attempt, error
                    );
                    return Err(RetryExhausted {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn flaky(counter: &AtomicU32, failures: u32) -> Result<&'static str, String> {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            Err(format!("failure {}", call))
        } else {
            Ok("done")
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result = policy.run("op", || flaky(&calls, 0)).await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result = policy.run("op", || flaky(&calls, 1)).await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_error_and_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let exhausted = policy.run("op", || flaky(&calls, 10)).await.unwrap_err();

        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.error, "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_once_never_retries() {
        let calls = AtomicU32::new(0);

        let exhausted = RetryPolicy::once()
            .run("op", || flaky(&calls, 10))
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pause_between_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(30));

        let start = std::time::Instant::now();
        let _ = policy.run("op", || flaky(&calls, 10)).await;

        // Two pauses for three attempts
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
