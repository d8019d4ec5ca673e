//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! On-demand probes (load_balancer::pool):
//!     HealthCheck selection finds a stale record
//!     → Probe the host
//!     → Update state.rs
//!
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every known host
//!     → Update state.rs, evict idle connections
//! ```
//!
//! # Design Decisions
//! - Health state is per-host and owned by the connection pool
//! - Records are cached until they go stale, then re-probed before selection
//! - Probes are bounded by their own timeout

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::HealthRecord;
