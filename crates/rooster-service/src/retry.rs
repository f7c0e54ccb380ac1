//! Retry logic for astronomy fetches.
//!
//! # Example
//!
//! ```
//! use rooster_service::retry::{RetryConfig, with_retry};
//! use rooster_service::FetchError;
//!
//! # async fn example() -> Result<(), FetchError> {
//! let config = RetryConfig::new(2).linear();
//! let value = with_retry(&config, "lookup", || async { Ok::<_, FetchError>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::FetchError;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial_delay * multiplier^attempt`.
    Exponential(f64),
    /// `initial_delay * (attempt + 1)`.
    Linear,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries).
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    pub backoff: Backoff,
    /// Whether to add up to 25% jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff: Backoff::Exponential(2.0),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Exponential backoff with the given multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff = Backoff::Exponential(multiplier);
        self
    }

    /// Grow the delay by `initial_delay` on every attempt.
    #[must_use]
    pub fn linear(mut self) -> Self {
        self.backoff = Backoff::Linear;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let base_delay = match self.backoff {
            Backoff::Exponential(multiplier) => initial * multiplier.powi(attempt as i32),
            Backoff::Linear => initial * f64::from(attempt + 1),
        };
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Execute an async operation, retrying transient failures.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once the retry budget is spent.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is worth another attempt.
fn is_retryable(error: &FetchError) -> bool {
    match error {
        // Connect failures and timeouts are usually transient
        FetchError::Http(_) => true,
        // Server-side trouble and rate limiting
        FetchError::Status(code) => *code >= 500 || *code == 429,
        // The API answered; asking again gives the same answer
        FetchError::Api(_) => false,
        FetchError::Malformed(_) => false,
        FetchError::Invalid(_) => false,
        FetchError::NoLocation => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> RetryConfig {
        RetryConfig::new(max_retries)
            .initial_delay(Duration::from_millis(1))
            .jitter(false)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.jitter);
        assert_eq!(RetryConfig::none().max_retries, 0);
    }

    #[test]
    fn test_exponential_delay() {
        let config = RetryConfig::new(5)
            .initial_delay(Duration::from_millis(250))
            .max_delay(Duration::from_millis(750))
            .jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(750));
    }

    #[test]
    fn test_linear_delay() {
        let config = RetryConfig::new(3)
            .initial_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(60))
            .linear()
            .jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(6));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig::new(1).initial_delay(Duration::from_millis(250));
        for _ in 0..50 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(313));
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&FetchError::Status(503)));
        assert!(is_retryable(&FetchError::Status(429)));
        assert!(!is_retryable(&FetchError::Status(404)));
        assert!(!is_retryable(&FetchError::Api("INVALID_REQUEST".to_string())));
        assert!(!is_retryable(&FetchError::Malformed("eof".to_string())));
        assert!(!is_retryable(&FetchError::NoLocation));
    }

    #[tokio::test]
    async fn test_with_retry_eventual_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = with_retry(&quick(3), "test", || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Status(502))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_all_fail() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result: Result<i32, _> = with_retry(&quick(2), "test", || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Status(500))
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status(500))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result: Result<i32, _> = with_retry(&quick(3), "test", || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Api("INVALID_REQUEST".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
