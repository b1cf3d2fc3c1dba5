use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// Errors that can tell whether trying again might succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for Error {
    fn is_transient(&self) -> bool {
        Error::is_transient(self)
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each retry after it.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Delay after the failed attempt `attempt` (0-based): `initial * 2^attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` is used up.
///
/// Errors that carry an HTTP response are returned on first occurrence; only
/// failures where no response arrived are retried. After the last attempt the
/// last error is returned without a further delay.
pub async fn with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut call: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_transient() {
            return Err(err);
        }
        if attempt + 1 >= max_attempts {
            tracing::warn!(attempts = max_attempts, error = %err, "Retries exhausted");
            return Err(err);
        }
        let delay = policy.delay_for(attempt);
        attempt += 1;
        tracing::info!(attempt, ?delay, error = %err, "Attempt failed, retrying");
        tokio::time::sleep(delay).await;
    }
}
