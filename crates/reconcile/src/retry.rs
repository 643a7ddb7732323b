//! Retry logic with exponential backoff for transient provider errors.
//!
//! Retries belong at the provider adapter boundary: adapters wrap each
//! remote call with [`with_retry`], the engine itself never retries.

use crate::cancel::CancelToken;
use crate::error::TaskError;
use std::fmt::Display;
use std::time::Duration;

/// Errors that know whether another attempt may succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Backoff settings for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Callback trait for retry notifications.
pub trait RetryCallback {
    /// Called before sleeping ahead of attempt `attempt + 1`.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn Display, delay: Duration);
}

/// Callback that logs retries at warn level.
pub struct LogRetry<'a> {
    pub operation: &'a str,
}

impl RetryCallback for LogRetry<'_> {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn Display, delay: Duration) {
        log::warn!(
            "{} attempt {}/{} failed: {}. Retrying in {:?}",
            self.operation,
            attempt,
            max_attempts,
            error,
            delay
        );
    }
}

/// Execute an operation, retrying retryable errors with backoff.
///
/// Non-retryable errors return immediately. Cancellation before an attempt
/// or during a backoff sleep returns the cancellation error.
pub fn with_retry<T, E, F>(
    config: &RetryConfig,
    cancel: &CancelToken,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + Display + From<TaskError>,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        cancel.check()?;
        let err = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt + 1 >= max_attempts {
            return Err(err);
        }

        let delay = config.delay_for_attempt(attempt);
        if let Some(cb) = callback {
            cb.on_retry(attempt + 1, max_attempts, &err, delay);
        }
        cancel.sleep(delay)?;
        attempt += 1;
    }
}
