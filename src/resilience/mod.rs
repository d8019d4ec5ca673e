//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the DP:
//!     → circuit_breaker.rs (admission; fail fast when open)
//!     → timeouts.rs (overall deadline, per-operation timeouts)
//!     → On failure: retries.rs (check if retryable, wait backoff.rs delay)
//!     → circuit_breaker.rs (track failures, open circuit if threshold exceeded)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Circuit breaker prevents cascading failures
//! - Retry policy and breaker are independent; the orchestrator composes them

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitPermit, CircuitState};
pub use retries::RetryPolicy;
