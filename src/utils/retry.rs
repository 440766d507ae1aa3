//! Retry utilities with exponential backoff for resilient API calls.

use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::sources::{RemoteServiceError, SourceError};

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// A configuration that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1`, given that `attempt` has failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powf(attempt.saturating_sub(1) as f64);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()).max(0.0))
    }
}

/// Execute an async operation, retrying failures that are marked retryable.
///
/// Each attempt runs under `config.attempt_timeout`; an attempt that exceeds
/// it counts as a retryable timeout of `service`. Non-retryable errors are
/// returned immediately.
pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    service: &str,
    operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        let error = match timeout(config.attempt_timeout, operation()).await {
            Ok(Ok(result)) => {
                if attempts > 1 {
                    tracing::info!(
                        "{} succeeded on attempt {} after {} transient failures",
                        service,
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Ok(Err(error)) => error,
            Err(_) => RemoteServiceError::timeout(
                service,
                format!("no response within {:?}", config.attempt_timeout),
            )
            .into(),
        };

        if !error.is_retryable() {
            return Err(error);
        }

        if attempts >= max_attempts {
            tracing::warn!(
                "{} failed after {} attempts: {}",
                service,
                attempts,
                error
            );
            return Err(error);
        }

        let delay = config.delay_after(attempts);
        tracing::debug!(
            "Transient error from {} on attempt {}: {}, retrying in {:?}",
            service,
            attempts,
            error,
            delay
        );
        sleep(delay).await;
    }
}
