//! Retry policy with fixed / linear / exponential backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Always `retry_delay`
    Fixed,
    /// `retry_delay * attempt`
    Linear,
    /// `retry_delay * 2^(attempt - 1)`
    Exponential,
}

impl Default for BackoffKind {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the first run)
    pub max_retries: u32,

    /// Base delay between retries
    #[serde(with = "plugrun_foundation::serde_ext::duration_ms")]
    pub retry_delay: Duration,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Upper bound for any computed delay
    #[serde(with = "plugrun_foundation::serde_ext::duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            backoff: BackoffKind::Exponential,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn new(max_retries: u32, retry_delay: Duration, backoff: BackoffKind) -> Self {
        Self {
            max_retries,
            retry_delay,
            backoff,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Whether another attempt is allowed after `retries_done` retries
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Calculate delay before retry number `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);

        let delay = match self.backoff {
            BackoffKind::Fixed => self.retry_delay,
            BackoffKind::Linear => self.retry_delay.saturating_mul(attempt),
            BackoffKind::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                self.retry_delay.saturating_mul(factor)
            }
        };

        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(backoff: BackoffKind) -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(100), backoff)
            .with_max_delay(Duration::from_millis(500))
    }

    #[test]
    fn test_fixed_backoff() {
        let p = policy(BackoffKind::Fixed);
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(4), Duration::from_millis(100));
    }

    #[test]
    fn test_linear_backoff() {
        let p = policy(BackoffKind::Linear);
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(p.delay_for_attempt(9), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let p = policy(BackoffKind::Exponential);
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(p.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(p.delay_for_attempt(40), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry() {
        let p = RetryPolicy::new(2, Duration::ZERO, BackoffKind::Fixed);
        assert!(p.should_retry(0));
        assert!(p.should_retry(1));
        assert!(!p.should_retry(2));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }
}
