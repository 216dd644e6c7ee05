//! Bounded retry with exponential backoff for remote provider calls.
//!
//! Only retryable failures (rate limits, timeouts, network and 5xx errors)
//! are retried; authentication and malformed-request errors surface
//! immediately. The last error is returned unchanged so callers see the
//! original provider message.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::core::errors::ProviderError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

pub async fn with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut schedule = config.schedule();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = schedule.next_backoff().unwrap_or(config.max_delay);
                tracing::warn!(
                    "attempt {attempt}/{max_attempts} failed ({err}), retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::core::errors::ProviderErrorKind;

    fn quick(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = with_retry(&quick(3), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(ProviderError::new(
                        "openai",
                        ProviderErrorKind::RateLimited,
                        "slow down",
                    ))
                } else {
                    Ok("answer")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = with_retry(&quick(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::new(
                    "anthropic",
                    ProviderErrorKind::Auth,
                    "bad key",
                ))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Auth);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_timeout_is_attempted_exactly_max_times() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = with_retry(&quick(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::new(
                    "openai",
                    ProviderErrorKind::Timeout,
                    "deadline exceeded",
                ))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert!(err.to_string().contains("deadline exceeded"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
