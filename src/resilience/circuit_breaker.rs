//! Circuit breaker for Data-Provider protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: DP assumed down, requests fail fast
//! - Half-Open: a single probe request tests whether the DP recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: try_acquire() after the open timeout elapsed
//! Half-Open → Closed: probe request succeeds (failure_count reset to 0)
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Design Decisions
//! - One breaker per connector instance, owned by `DpConnector`
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open, claimed with compare-and-swap on a flag
//! - The probe flag is released by the permit's `Drop`, so a cancelled
//!   probe never leaves the circuit wedged

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

/// Circuit breaker states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct BreakerCounters {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Point-in-time view of the breaker for stats.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub threshold: u32,
    pub timeout_ms: u64,
    pub probe_in_flight: bool,
    /// Milliseconds until an open circuit admits a probe.
    pub retry_after_ms: Option<u64>,
}

/// Failure-isolation state machine shared by all callers of a connector.
#[derive(Debug)]
pub struct CircuitBreaker {
    counters: Mutex<BreakerCounters>,
    probe_in_flight: AtomicBool,
    threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures
    /// and stays open for `timeout`.
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            counters: Mutex::new(BreakerCounters {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
            probe_in_flight: AtomicBool::new(false),
            threshold: threshold.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.open_timeout())
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cooled_down(&self, counters: &BreakerCounters) -> bool {
        counters
            .last_failure_time
            .map_or(true, |at| at.elapsed() >= self.timeout)
    }

    /// Whether a call would currently be admitted. Pure read.
    pub fn can_execute(&self) -> bool {
        let counters = self.lock();
        match counters.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                self.cooled_down(&counters) && !self.probe_in_flight.load(Ordering::Acquire)
            }
            CircuitState::HalfOpen => !self.probe_in_flight.load(Ordering::Acquire),
        }
    }

    /// Admit a call, moving Open → Half-Open once the timeout has elapsed.
    ///
    /// Returns `None` when the circuit refuses the call. In Half-Open only
    /// one permit (the probe) is outstanding at a time.
    pub fn try_acquire(&self) -> Option<CircuitPermit<'_>> {
        let mut counters = self.lock();
        match counters.state {
            CircuitState::Closed => Some(CircuitPermit {
                breaker: self,
                probe: false,
            }),
            CircuitState::Open if !self.cooled_down(&counters) => None,
            CircuitState::Open | CircuitState::HalfOpen => {
                if self
                    .probe_in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return None;
                }
                if counters.state == CircuitState::Open {
                    counters.state = CircuitState::HalfOpen;
                    tracing::info!(
                        failure_count = counters.failure_count,
                        "Circuit half-open, admitting probe request"
                    );
                }
                Some(CircuitPermit {
                    breaker: self,
                    probe: true,
                })
            }
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        let mut counters = self.lock();
        counters.failure_count = counters.failure_count.saturating_add(1);

        if counters.failure_count >= self.threshold {
            if counters.state != CircuitState::Open {
                tracing::warn!(
                    failure_count = counters.failure_count,
                    threshold = self.threshold,
                    timeout_ms = self.timeout.as_millis() as u64,
                    from = %counters.state,
                    "Circuit opened"
                );
            }
            counters.state = CircuitState::Open;
            counters.last_failure_time = Some(Instant::now());
        }
    }

    /// Report a successful call. Closes the circuit and resets the counter.
    pub fn record_success(&self) {
        let mut counters = self.lock();
        if counters.state != CircuitState::Closed {
            tracing::info!(from = %counters.state, "Circuit closed");
        }
        counters.state = CircuitState::Closed;
        counters.failure_count = 0;
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let counters = self.lock();
        let retry_after_ms = match (counters.state, counters.last_failure_time) {
            (CircuitState::Open, Some(at)) => {
                Some(self.timeout.saturating_sub(at.elapsed()).as_millis() as u64)
            }
            _ => None,
        };
        BreakerSnapshot {
            state: counters.state,
            failure_count: counters.failure_count,
            threshold: self.threshold,
            timeout_ms: self.timeout.as_millis() as u64,
            probe_in_flight: self.probe_in_flight.load(Ordering::Acquire),
            retry_after_ms,
        }
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
}

impl CircuitPermit<'_> {
    /// Whether this permit is the Half-Open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.probe {
            self.breaker.probe_in_flight.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_stays_open_until_timeout() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));

        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert!(!breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.can_execute());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.can_execute());
        // Pure read: no transition happened
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_resets_counter() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(5));
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.can_execute());

        tokio::time::advance(Duration::from_secs(6)).await;
        let permit = breaker.try_acquire().expect("probe admitted");
        assert!(permit.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        drop(permit);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_in_half_open() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(1));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(2)).await;

        let probe = breaker.try_acquire().expect("probe admitted");
        assert!(breaker.try_acquire().is_none());
        assert!(!breaker.can_execute());

        // A cancelled probe releases the slot
        drop(probe);
        assert!(breaker.can_execute());
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(10));
        breaker.record_failure();
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;

        let probe = breaker.try_acquire().expect("probe admitted");
        breaker.record_failure();
        drop(probe);

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_success_in_closed_resets_partial_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 1);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_concurrent_failures_are_counted() {
        let breaker = std::sync::Arc::new(CircuitBreaker::new(1000, Duration::from_secs(30)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = breaker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        breaker.record_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(breaker.failure_count(), 800);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_retry_after() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.retry_after_ms, Some(20_000));
        assert_eq!(snapshot.threshold, 1);
    }
}
