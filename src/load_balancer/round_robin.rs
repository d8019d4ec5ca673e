//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{HostCandidate, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through hosts. Health is not
/// consulted, which keeps the distribution even and deterministic.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_host(&self, hosts: &[HostCandidate]) -> Option<usize> {
        if hosts.is_empty() {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % hosts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::candidate;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let hosts = vec![candidate("x", 0), candidate("y", 0), candidate("z", 0)];

        let picks: Vec<_> = (0..4).map(|_| lb.next_host(&hosts).unwrap()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_ignores_health() {
        let lb = RoundRobin::new();
        let mut down = candidate("a", 0);
        down.health.record_failure();
        let hosts = vec![down, candidate("b", 0)];

        assert_eq!(lb.next_host(&hosts), Some(0));
        assert_eq!(lb.next_host(&hosts), Some(1));
    }

    #[test]
    fn test_empty() {
        assert_eq!(RoundRobin::new().next_host(&[]), None);
    }
}
