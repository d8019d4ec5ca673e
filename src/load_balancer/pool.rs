//! Connection pool management.
//!
//! # Responsibilities
//! - Cache one pooled connection per host, created lazily and idempotently
//! - Own the per-host health records and probe hosts on demand
//! - Apply the configured load balancing algorithm to select a host
//! - Evict idle handles and report pool statistics

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;

use crate::config::{ConnectorConfig, LoadBalancingStrategy};
use crate::error::{ConnectorError, ConnectorResult};
use crate::health::HealthRecord;
use crate::load_balancer::connection::{
    host_key, ConnectionLease, ConnectionSettings, PooledConnection,
};
use crate::load_balancer::{balancer_for, HostCandidate, LoadBalancer};
use crate::observability::metrics;

/// Health view of one host, as exposed in stats.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostHealth {
    pub is_healthy: bool,
    /// `None` if the host was never probed.
    pub last_check_ms_ago: Option<u64>,
    pub response_time_ms: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub active_leases: usize,
    /// Whether a transport handle is currently cached.
    pub pooled: bool,
}

/// Read-only pool snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub strategy: String,
    pub total_connections: usize,
    pub healthy_connections: usize,
    pub hosts: BTreeMap<String, HostHealth>,
}

/// Pool of per-host transport handles and their health.
#[derive(Debug)]
pub struct ConnectionPool {
    connections: DashMap<String, Arc<PooledConnection>>,
    health: DashMap<String, HealthRecord>,
    balancer: Box<dyn LoadBalancer>,
    strategy: LoadBalancingStrategy,
    settings: Arc<ConnectionSettings>,
    staleness: Duration,
}

impl ConnectionPool {
    pub fn new(
        strategy: LoadBalancingStrategy,
        settings: ConnectionSettings,
        staleness: Duration,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            health: DashMap::new(),
            balancer: balancer_for(strategy),
            strategy,
            settings: Arc::new(settings),
            staleness,
        }
    }

    pub fn from_config(config: &ConnectorConfig, settings: ConnectionSettings) -> Self {
        Self::new(
            config.pool.strategy,
            settings,
            Duration::from_secs(config.pool.health_staleness_secs),
        )
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// Cached handle for `host`, created on first use.
    ///
    /// Two racing callers always end up with the same handle: the insert
    /// goes through the shard-locked entry API and the loser's handle is
    /// discarded.
    pub fn get_connection(&self, host: &str) -> ConnectorResult<Arc<PooledConnection>> {
        let (key, _) = host_key(host)?;
        if let Some(existing) = self.connections.get(&key) {
            return Ok(existing.value().clone());
        }

        let created = Arc::new(PooledConnection::new(&key, self.settings.clone())?);
        let connection = self
            .connections
            .entry(key.clone())
            .or_insert(created)
            .value()
            .clone();
        self.health.entry(key).or_default();
        Ok(connection)
    }

    /// Probe `host` and record the outcome.
    pub async fn perform_health_check(&self, host: &str) -> ConnectorResult<Duration> {
        let connection = self.get_connection(host)?;
        let result = connection.probe().await;

        match &result {
            Ok(elapsed) => {
                self.record_health_success(connection.host(), *elapsed);
                tracing::debug!(
                    host = %connection.host(),
                    response_time_ms = elapsed.as_millis() as u64,
                    "Health check passed"
                );
            }
            Err(e) => {
                self.record_health_failure(connection.host());
                tracing::warn!(host = %connection.host(), error = %e, "Health check failed");
            }
        }
        result
    }

    pub fn record_health_success(&self, host: &str, elapsed: Duration) {
        let key = Self::key_for(host);
        self.health.entry(key.clone()).or_default().record_success(elapsed);
        metrics::record_host_health(&key, true);
    }

    pub fn record_health_failure(&self, host: &str) {
        let key = Self::key_for(host);
        self.health.entry(key.clone()).or_default().record_failure();
        metrics::record_host_health(&key, false);
    }

    /// Forget everything known about `host`'s health.
    pub fn reset_health(&self, host: &str) {
        if let Some(mut record) = self.health.get_mut(&Self::key_for(host)) {
            record.reset();
        }
    }

    pub fn health_of(&self, host: &str) -> Option<HealthRecord> {
        self.health.get(&Self::key_for(host)).map(|r| r.value().clone())
    }

    /// Select a host among `hosts` and lease its connection.
    pub async fn get_healthy_connection(
        &self,
        hosts: &[String],
    ) -> ConnectorResult<ConnectionLease> {
        if hosts.is_empty() {
            return Err(ConnectorError::NoTargets);
        }

        let connections = hosts
            .iter()
            .map(|h| self.get_connection(h))
            .collect::<ConnectorResult<Vec<_>>>()?;

        if self.strategy == LoadBalancingStrategy::HealthCheck {
            let stale: Vec<&str> = connections
                .iter()
                .filter(|c| {
                    self.health
                        .get(c.host())
                        .map_or(true, |r| r.is_stale(self.staleness))
                })
                .map(|c| c.host())
                .collect();
            if !stale.is_empty() {
                tracing::debug!(stale = stale.len(), "Refreshing stale health records");
                join_all(stale.into_iter().map(|h| self.perform_health_check(h))).await;
            }
        }

        let candidates: Vec<HostCandidate> = connections
            .iter()
            .map(|c| HostCandidate {
                host: c.host().to_string(),
                active_leases: c.active_leases(),
                health: self
                    .health
                    .get(c.host())
                    .map(|r| r.value().clone())
                    .unwrap_or_default(),
            })
            .collect();

        match self.balancer.next_host(&candidates) {
            Some(index) => {
                let connection = connections[index].clone();
                tracing::trace!(
                    host = %connection.host(),
                    strategy = self.strategy.as_str(),
                    "Host selected"
                );
                Ok(ConnectionLease::new(connection))
            }
            None => {
                tracing::warn!(candidates = hosts.len(), "No healthy hosts available");
                Err(ConnectorError::NoHealthyHosts(hosts.len()))
            }
        }
    }

    /// Probe every pooled host concurrently. Returns how many are healthy.
    pub async fn check_all(&self) -> usize {
        let hosts = self.known_hosts();
        join_all(hosts.iter().map(|h| self.perform_health_check(h)))
            .await
            .into_iter()
            .filter(|r| r.is_ok())
            .count()
    }

    /// Drop handles that are unleased and idle past the idle timeout.
    pub fn evict_idle(&self) -> usize {
        let before = self.connections.len();
        self.connections.retain(|host, connection| {
            let expired = connection.is_idle_expired();
            if expired {
                tracing::debug!(host = %host, "Evicting idle connection");
            }
            !expired
        });
        before.saturating_sub(self.connections.len())
    }

    /// Hosts with a cached handle, sorted.
    pub fn known_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        hosts.sort();
        hosts
    }

    pub fn connection_health_stats(&self) -> BTreeMap<String, HostHealth> {
        self.health
            .iter()
            .map(|entry| {
                let record = entry.value();
                let connection = self.connections.get(entry.key());
                let health = HostHealth {
                    is_healthy: record.is_healthy,
                    last_check_ms_ago: record.last_check.map(|at| at.elapsed().as_millis() as u64),
                    response_time_ms: record.response_time.as_millis() as u64,
                    success_count: record.success_count,
                    error_count: record.error_count,
                    active_leases: connection.as_ref().map_or(0, |c| c.active_leases()),
                    pooled: connection.is_some(),
                };
                (entry.key().clone(), health)
            })
            .collect()
    }

    pub fn connection_pool_stats(&self) -> PoolStats {
        let hosts = self.connection_health_stats();
        let healthy_connections = hosts.values().filter(|h| h.pooled && h.is_healthy).count();
        PoolStats {
            strategy: self.strategy.as_str().to_string(),
            total_connections: self.connections.len(),
            healthy_connections,
            hosts,
        }
    }

    fn key_for(host: &str) -> String {
        host_key(host)
            .map(|(key, _)| key)
            .unwrap_or_else(|_| host.to_string())
    }
}
