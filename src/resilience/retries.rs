//! Retry logic.
//!
//! # Responsibilities
//! - Bound the number of attempts per call (`max_retries + 1`)
//! - Decide whether a failure is retryable
//! - Compute the backoff delay between attempts
//!
//! # Design Decisions
//! - Transport, timeout, protocol and no-healthy-host failures are retryable
//! - Authentication and circuit-open failures are never retried
//! - The policy does not touch circuit state; the orchestrator reports
//!   each attempt's outcome to the breaker

use std::time::Duration;

use crate::config::{BackoffStrategy, RetryConfig};
use crate::error::ConnectorError;
use crate::resilience::backoff::calculate_backoff;

/// Bounded-attempt backoff controller.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff: BackoffStrategy,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        let base_delay_ms = base_delay.as_millis() as u64;
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: base_delay_ms.saturating_mul(u64::from(max_retries.max(1))),
            backoff: BackoffStrategy::Linear,
            jitter: false,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            backoff: config.backoff,
            jitter: config.jitter,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed for one call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether to retry after `attempts` attempts ended with `error`.
    pub fn should_retry(&self, attempts: u32, error: &ConnectorError) -> bool {
        attempts < self.max_attempts() && error.is_retryable()
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            self.backoff,
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let transient = ConnectorError::Transport("connection refused".into());

        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry(1, &transient));
        assert!(policy.should_retry(2, &transient));
        assert!(!policy.should_retry(3, &transient));
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(1, &ConnectorError::Timeout(Duration::from_secs(1))));
    }

    #[test]
    fn test_non_retryable_errors() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert!(!policy.should_retry(1, &ConnectorError::CircuitOpen));
        assert!(!policy.should_retry(
            1,
            &ConnectorError::Authentication(AuthError::EmptyToken)
        ));
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(150));
    }
}
