//! Retry configuration and dead letter entries.

use std::time::Duration;

use rewear_common::config::FanOutConfig;

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Per-batch retries inside one fan-out dispatch.
    #[must_use]
    pub fn for_batches(config: &FanOutConfig) -> Self {
        Self {
            max_attempts: config.max_batch_attempts,
            initial_delay: config.initial_retry_delay(),
            max_delay: config.max_retry_delay(),
            ..Self::default()
        }
    }

    /// Job-level retries of a whole fan-out.
    #[must_use]
    pub fn for_jobs(config: &FanOutConfig) -> Self {
        Self {
            max_attempts: config.max_job_attempts,
            initial_delay: config.initial_retry_delay(),
            max_delay: config.max_retry_delay(),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry.min(31) as i32);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay);

        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// A job that exhausted its retries.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry<T> {
    /// The failed job.
    pub job: T,
    /// Number of attempts made.
    pub attempts: u32,
    /// Last error message.
    pub last_error: String,
    /// Timestamp of last failure.
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

impl<T> DeadLetterEntry<T> {
    pub fn new(job: T, attempts: u32, error: String) -> Self {
        Self {
            job,
            attempts,
            last_error: error,
            failed_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_max_delay() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_should_retry_counts_first_attempt() {
        let config = RetryConfig::for_batches(&FanOutConfig::default());

        assert!(config.should_retry(1));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }
}
