use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::ExponentialBackoff;

/// Errors that tell the retry loop whether another attempt makes sense
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after every failed attempt
    pub backoff_factor: f64,

    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            attempts,
            initial_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial_delay, self.max_delay)
            .with_multiplier(self.backoff_factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. The last error is returned as is.
pub async fn retry_server_errors<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let attempts = policy.attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = backoff.next_delay();
                warn!(
                    operation = %operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Server error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("server error {0}")]
        Server(u16),
        #[error("client error {0}")]
        Client(u16),
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Server(_))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(4, Duration::from_secs(1), 2.0);

        let result = retry_server_errors(&policy, "status", || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(TestError::Server(503))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10), 2.0);
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = retry_server_errors(&policy, "details", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Server(500)) }
        })
        .await;

        assert!(matches!(result, Err(TestError::Server(500))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10ms + 20ms of backoff between the three attempts
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(started.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = retry_server_errors(&policy, "create", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Client(404)) }
        })
        .await;

        assert!(matches!(result, Err(TestError::Client(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_server_errors(&RetryPolicy::no_retry(), "status", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Server(502)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
