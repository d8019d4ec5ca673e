//! Data-Provider connector.
//!
//! # Data Flow
//! ```text
//! verify_with_dp(request)
//!     → breaker admission (refused → CircuitOpen)
//!     → pool selects a host and leases its connection
//!     → adapter connect → authenticate → send
//!     → success: breaker success, parse DpResponse
//!     → failure: breaker failure, backoff, retry while allowed
//! ```

pub mod events;
pub mod orchestrator;
pub mod stats;
pub mod types;

pub use events::{ChannelSink, ConnectorEvent, EventKind, EventSink, NoopSink, TracingSink};
pub use orchestrator::{DpConnector, HealthReport};
pub use stats::{DpStats, RetryStats};
pub use types::{DpResponse, OutboundRequest, VerificationRequest, VerificationResult};
