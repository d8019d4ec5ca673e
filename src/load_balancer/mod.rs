//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator attempt → candidate hosts
//!     → pool.rs (snapshot health + active leases per host;
//!                re-probe stale hosts under HealthCheck)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through hosts, health ignored)
//!         - least_conn.rs (fewest active leases, ties rotate)
//!         - health_aware.rs (healthy hosts only, lowest response time)
//!     → connection.rs (lease the pooled connection)
//!     → Return lease or error
//! ```
//!
//! # Design Decisions
//! - Load balancer is stateless apart from rotation counters; the pool
//!   tracks connections and health
//! - Handles are shared, never checked out exclusively
//! - No healthy host under HealthCheck is a hard error, not a fallback

use crate::health::HealthRecord;

pub mod connection;
pub mod health_aware;
pub mod least_conn;
pub mod pool;
pub mod round_robin;

pub use crate::config::LoadBalancingStrategy;
pub use connection::{ConnectionLease, ConnectionSettings, PooledConnection};
pub use pool::{ConnectionPool, HostHealth, PoolStats};

/// A host as seen by a load balancing algorithm.
#[derive(Debug, Clone)]
pub struct HostCandidate {
    pub host: String,
    pub active_leases: usize,
    pub health: HealthRecord,
}

/// Host selection algorithm.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Index of the chosen candidate, or `None` if none is eligible.
    fn next_host(&self, hosts: &[HostCandidate]) -> Option<usize>;
}

/// Build the balancer for a strategy.
pub fn balancer_for(strategy: LoadBalancingStrategy) -> Box<dyn LoadBalancer> {
    match strategy {
        LoadBalancingStrategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        LoadBalancingStrategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        LoadBalancingStrategy::HealthCheck => Box::new(health_aware::HealthAware::new()),
    }
}

#[cfg(test)]
pub(crate) fn candidate(host: &str, active_leases: usize) -> HostCandidate {
    HostCandidate {
        host: host.to_string(),
        active_leases,
        health: HealthRecord::new(),
    }
}
