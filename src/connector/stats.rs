//! Read-only connector statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;

use crate::load_balancer::PoolStats;
use crate::resilience::{BreakerSnapshot, RetryPolicy};

/// Call counters shared by all callers of a connector.
#[derive(Debug, Default)]
pub struct RetryCounters {
    calls: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    short_circuits: AtomicU64,
}

impl RetryCounters {
    pub fn call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn short_circuit(&self) {
        self.short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, policy: &RetryPolicy) -> RetryStats {
        RetryStats {
            max_retries: policy.max_retries(),
            total_calls: self.calls.load(Ordering::Relaxed),
            total_attempts: self.attempts.load(Ordering::Relaxed),
            total_retries: self.retries.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RetryStats {
    pub max_retries: u32,
    pub total_calls: u64,
    pub total_attempts: u64,
    pub total_retries: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls refused by the circuit breaker (failures include these).
    pub short_circuits: u64,
}

/// Snapshot returned by `DpConnector::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct DpStats {
    pub circuit_breaker: BreakerSnapshot,
    pub connection_pool: PoolStats,
    pub retry_stats: RetryStats,
}

impl DpStats {
    /// The snapshot as a JSON map of maps.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
