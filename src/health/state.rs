//! Per-host health record.
//!
//! # Transitions
//! ```text
//! probe succeeds → healthy, response_time = elapsed, success_count += 1
//! probe fails    → unhealthy, error_count += 1
//! ```
//!
//! # Design Decisions
//! - A host that was never probed counts as healthy
//! - Counters only grow; `reset` is the single way back to zero
//! - Staleness is judged against `last_check` so selection can re-probe

use std::time::Duration;

use tokio::time::Instant;

/// Dynamic health of one target host.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    pub is_healthy: bool,
    pub last_check: Option<Instant>,
    pub response_time: Duration,
    pub success_count: u64,
    pub error_count: u64,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self {
            is_healthy: true,
            last_check: None,
            response_time: Duration::ZERO,
            success_count: 0,
            error_count: 0,
        }
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        self.is_healthy = true;
        self.response_time = elapsed;
        self.success_count = self.success_count.saturating_add(1);
        self.last_check = Some(Instant::now());
    }

    pub fn record_failure(&mut self) {
        self.is_healthy = false;
        self.error_count = self.error_count.saturating_add(1);
        self.last_check = Some(Instant::now());
    }

    /// Never checked, or last checked longer than `max_age` ago.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.last_check.map_or(true, |at| at.elapsed() > max_age)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_healthy_and_stale() {
        let record = HealthRecord::new();
        assert!(record.is_healthy);
        assert!(record.is_stale(Duration::from_secs(3600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_and_staleness() {
        let mut record = HealthRecord::new();
        record.record_success(Duration::from_millis(40));
        assert!(record.is_healthy);
        assert_eq!(record.response_time, Duration::from_millis(40));
        assert!(!record.is_stale(Duration::from_secs(10)));

        record.record_failure();
        assert!(!record.is_healthy);
        assert_eq!(record.success_count, 1);
        assert_eq!(record.error_count, 1);
        // Failure keeps the last measured latency
        assert_eq!(record.response_time, Duration::from_millis(40));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(record.is_stale(Duration::from_secs(10)));

        record.reset();
        assert_eq!(record, HealthRecord::new());
    }
}
