//! Least Connections load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{HostCandidate, LoadBalancer};

/// Least connections selector.
/// Selects the host with the fewest active leases; ties rotate round-robin.
#[derive(Debug, Default)]
pub struct LeastConnections {
    tie_breaker: AtomicUsize,
}

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for LeastConnections {
    fn next_host(&self, hosts: &[HostCandidate]) -> Option<usize> {
        let fewest = hosts.iter().map(|h| h.active_leases).min()?;
        let tied: Vec<usize> = hosts
            .iter()
            .enumerate()
            .filter(|(_, h)| h.active_leases == fewest)
            .map(|(i, _)| i)
            .collect();

        let turn = self.tie_breaker.fetch_add(1, Ordering::Relaxed);
        tied.get(turn % tied.len()).copied()
    }
}
