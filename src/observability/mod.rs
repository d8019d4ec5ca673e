//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connector, pool and breaker produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every attempt of a call
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
