//! Bounded retry with exponential backoff and jitter.
//!
//! Used for the post-commit side effects only (cache and publish). Store
//! writes are never retried here.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f32,
    /// Randomize each delay so concurrent callers spread out
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Builds the backoff schedule for these settings.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.multiplier)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Failure of a single attempt bounded by a timeout.
#[derive(Debug)]
pub enum AttemptError<E> {
    TimedOut(Duration),
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::TimedOut(limit) => write!(f, "timed out after {}ms", limit.as_millis()),
            AttemptError::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Runs `operation` with a time limit.
pub async fn within<T, E, Fut>(limit: Duration, operation: Fut) -> Result<T, AttemptError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(AttemptError::Failed),
        Err(_) => Err(AttemptError::TimedOut(limit)),
    }
}

/// Executes an operation with exponential backoff retry.
///
/// Returns the last error once `max_attempts` attempts have failed.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    operation
        .retry(config.backoff())
        .notify(|error: &E, delay: Duration| {
            tracing::debug!(
                operation = operation_name,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Operation failed, retrying after delay"
            );
        })
        .await
        .inspect_err(|error| {
            tracing::warn!(
                operation = operation_name,
                attempts = config.max_attempts.max(1),
                error = %error,
                "Operation failed after all retries"
            );
        })
}
