//! Health-aware load balancing strategy.

use crate::load_balancer::{HostCandidate, LoadBalancer};

/// Picks the healthy host with the lowest measured response time.
/// Returns `None` when every host is unhealthy.
#[derive(Debug, Default)]
pub struct HealthAware;

impl HealthAware {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for HealthAware {
    fn next_host(&self, hosts: &[HostCandidate]) -> Option<usize> {
        // min_by_key keeps the first of equal keys (stability)
        hosts
            .iter()
            .enumerate()
            .filter(|(_, h)| h.health.is_healthy)
            .min_by_key(|(_, h)| h.health.response_time)
            .map(|(i, _)| i)
    }
}
