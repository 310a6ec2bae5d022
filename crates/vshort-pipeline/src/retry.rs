//! Rate-limit aware retry with exponential backoff.
//!
//! Remote services signal overload with HTTP 429. Only that signal is
//! retried: any other failure is returned after the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics;

/// Errors that can report a transient rate-limit condition.
pub trait RateLimitClassify {
    fn is_rate_limited(&self) -> bool;
}

impl RateLimitClassify for PipelineError {
    fn is_rate_limited(&self) -> bool {
        PipelineError::is_rate_limited(self)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait after the 0-based `attempt` failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success(T),
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }

    /// Attempts used by a failed outcome, `None` on success.
    pub fn failed_attempts(&self) -> Option<u32> {
        match self {
            RetryOutcome::Success(_) => None,
            RetryOutcome::Failed { attempts, .. } => Some(*attempts),
        }
    }
}

impl<T> RetryOutcome<T, PipelineError> {
    /// Exhausted rate limits become [`PipelineError::RateLimitExceeded`];
    /// other failures are returned unchanged.
    pub fn into_result(self) -> PipelineResult<T> {
        match self {
            RetryOutcome::Success(value) => Ok(value),
            RetryOutcome::Failed { error, attempts } if error.is_rate_limited() => {
                Err(PipelineError::RateLimitExceeded {
                    attempts,
                    message: error.to_string(),
                })
            }
            RetryOutcome::Failed { error, .. } => Err(error),
        }
    }
}

/// Wraps remote calls in the rate-limit retry policy.
#[derive(Debug, Clone, Default)]
pub struct RateLimitedExecutor {
    policy: RetryPolicy,
}

impl RateLimitedExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails with a non-rate-limit error, or
    /// uses up `max_attempts`. There is no wait after the final attempt.
    pub async fn execute<F, Fut, T, E>(&self, operation: &str, op: F) -> RetryOutcome<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitClassify + Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            match op().await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(e) if e.is_rate_limited() && attempt + 1 < max_attempts => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off: {}",
                        e
                    );
                    metrics::record_rate_limit_retry(operation);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let attempts = attempt + 1;
                    if e.is_rate_limited() {
                        error!(operation, attempts, "Rate limit retries exhausted: {}", e);
                    }
                    return RetryOutcome::Failed { error: e, attempts };
                }
            }
        }
    }

    /// [`execute`](Self::execute) folded into a [`PipelineResult`].
    pub async fn execute_with_retry<F, Fut, T>(&self, operation: &str, op: F) -> PipelineResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        self.execute(operation, op).await.into_result()
    }
}
