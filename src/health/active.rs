//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every host the pool knows about
//! - Evict idle pooled connections
//! - Stop cleanly on the shutdown broadcast

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::load_balancer::pool::ConnectionPool;

/// Background task keeping health records fresh between calls.
pub struct HealthMonitor {
    pool: Arc<ConnectionPool>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(pool: Arc<ConnectionPool>, interval: Duration) -> Self {
        Self { pool, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        let healthy = self.pool.check_all().await;
        let evicted = self.pool.evict_idle();
        tracing::debug!(
            healthy,
            known_hosts = self.pool.known_hosts().len(),
            evicted,
            "Health sweep complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::load_balancer::connection::ConnectionSettings;
    use crate::config::LoadBalancingStrategy;

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let pool = Arc::new(ConnectionPool::new(
            LoadBalancingStrategy::HealthCheck,
            ConnectionSettings::default(),
            Duration::from_secs(10),
        ));
        let shutdown = Shutdown::new();
        let monitor = HealthMonitor::new(pool, Duration::from_millis(20));
        let handle = tokio::spawn(monitor.run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor exits")
            .unwrap();
    }
}
