//! Connector orchestrator.
//!
//! # Responsibilities
//! - Gate every attempt through the circuit breaker
//! - Select a host, authenticate and send through the configured adapter
//! - Retry retryable failures with backoff inside the call deadline
//! - Keep call statistics and emit events regardless of outcome
//!
//! # Design Decisions
//! - Each attempt's outcome is reported to the breaker, not each call's
//! - A refused admission consumes no attempt
//! - An attempt cut short by the call deadline counts as a breaker failure
//! - A credential refused by the DP drops the cached token and is not retried

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::adapters::{AdapterFactory, DpAdapter, ProtocolAdapter};
use crate::auth::Authenticator;
use crate::config::{validate_config, ConnectorConfig};
use crate::connector::events::{ConnectorEvent, EventKind, EventSink, TracingSink};
use crate::connector::stats::{DpStats, RetryCounters};
use crate::connector::types::{DpResponse, OutboundRequest, VerificationRequest};
use crate::error::{ConnectorError, ConnectorResult};
use crate::health::HealthMonitor;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{ConnectionLease, ConnectionPool, ConnectionSettings};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::resilience::{CircuitBreaker, CircuitState, RetryPolicy};

/// Result of [`DpConnector::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy_hosts: usize,
    pub total_hosts: usize,
    pub hosts: BTreeMap<String, bool>,
    pub authentication: &'static str,
    pub circuit_state: CircuitState,
}

/// Where a call stands, visible to the deadline handler after the call
/// future has been dropped.
#[derive(Debug, Default)]
struct CallProgress {
    attempts: AtomicU32,
    in_flight: AtomicBool,
}

/// Metadata shared by all events of one call.
struct CallContext<'a> {
    request_id: Uuid,
    job_id: Option<&'a str>,
    started: Instant,
}

/// Resilient client for one Data-Provider integration.
#[derive(Debug)]
pub struct DpConnector {
    config: ConnectorConfig,
    targets: Vec<String>,
    breaker: CircuitBreaker,
    pool: Arc<ConnectionPool>,
    authenticator: Authenticator,
    retry: RetryPolicy,
    counters: RetryCounters,
    events: Arc<dyn EventSink>,
}

impl DpConnector {
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        Self::with_event_sink(config, Arc::new(TracingSink))
    }

    pub fn with_event_sink(
        config: ConnectorConfig,
        events: Arc<dyn EventSink>,
    ) -> ConnectorResult<Self> {
        validate_config(&config).map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ConnectorError::InvalidConfig(joined.join("; "))
        })?;

        let mut settings = ConnectionSettings::from(&config);
        let token_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()
            .map_err(|e| {
                ConnectorError::InvalidConfig(format!("failed to build token client: {}", e))
            })?;
        let authenticator = Authenticator::new(config.auth.clone(), token_client);

        if let Some(certificate) = authenticator.client_certificate()? {
            settings.identity = Some(certificate.reqwest_identity()?);
            settings.root_ca = certificate.root_certificate()?;
            settings.client_tls = Some(certificate.rustls_config()?);
        }

        let targets = config.resolved_targets();
        tracing::info!(
            targets = targets.len(),
            adapter = %config.adapter.adapter_type,
            auth = config.auth.method(),
            strategy = config.pool.strategy.as_str(),
            max_retries = config.retries.max_retries,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "DP connector initialized"
        );

        Ok(Self {
            pool: Arc::new(ConnectionPool::from_config(&config, settings)),
            breaker: CircuitBreaker::from_config(&config.circuit_breaker),
            retry: RetryPolicy::from_config(&config.retries),
            counters: RetryCounters::default(),
            targets,
            authenticator,
            events,
            config,
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Verify `request` against the DP under the configured call deadline.
    pub async fn verify_with_dp(
        &self,
        request: &VerificationRequest,
    ) -> ConnectorResult<DpResponse> {
        self.verify_with_deadline(request, self.config.timeouts.call()).await
    }

    pub async fn verify_with_deadline(
        &self,
        request: &VerificationRequest,
        deadline: Duration,
    ) -> ConnectorResult<DpResponse> {
        let ctx = CallContext {
            request_id: Uuid::new_v4(),
            job_id: request.job_id.as_deref(),
            started: Instant::now(),
        };
        self.counters.call();
        self.emit(&ctx, EventKind::Submitted, None, None, 0, "pending", None);

        let progress = CallProgress::default();
        let result = match request.to_payload() {
            Ok(payload) => {
                with_deadline(deadline, self.run_attempts(&ctx, payload, &progress)).await
            }
            Err(e) => Err(e),
        };

        if matches!(result, Err(ConnectorError::DeadlineExceeded(_)))
            && progress.in_flight.load(Ordering::Acquire)
        {
            self.breaker.record_failure();
        }

        let attempts = progress.attempts.load(Ordering::Acquire);
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        match &result {
            Ok(response) => {
                self.counters.success();
                let job_id = Some(response.job_id.as_str());
                self.emit(&ctx, EventKind::Succeeded, job_id, None, attempts, outcome, None);
            }
            Err(ConnectorError::CircuitOpen) => {
                self.counters.failure();
                self.emit(&ctx, EventKind::ShortCircuited, None, None, attempts, outcome, None);
            }
            Err(e) => {
                self.counters.failure();
                let error = Some(e.to_string());
                self.emit(&ctx, EventKind::Failed, None, None, attempts, outcome, error);
            }
        }
        metrics::record_call(outcome, ctx.started.elapsed());
        metrics::record_circuit_state(self.breaker.state());

        result
    }

    async fn run_attempts(
        &self,
        ctx: &CallContext<'_>,
        payload: Value,
        progress: &CallProgress,
    ) -> ConnectorResult<DpResponse> {
        let mut attempt = 0u32;
        loop {
            let Some(permit) = self.breaker.try_acquire() else {
                self.counters.short_circuit();
                return Err(ConnectorError::CircuitOpen);
            };

            attempt += 1;
            self.counters.attempt();
            progress.attempts.store(attempt, Ordering::Release);
            progress.in_flight.store(true, Ordering::Release);

            let (host, result) = self.attempt(ctx.request_id, payload.clone()).await;
            progress.in_flight.store(false, Ordering::Release);
            let host_label = host.as_deref().unwrap_or("none");

            let error = match result {
                Ok(response) => {
                    self.breaker.record_success();
                    metrics::record_attempt(host_label, "success");
                    return Ok(response);
                }
                Err(error) => error,
            };

            if error.counts_as_breaker_failure() {
                self.breaker.record_failure();
            }
            metrics::record_attempt(host_label, error.kind());
            drop(permit);

            if error.is_credential_rejection() {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    host = host_label,
                    error = %error,
                    "DP refused the credential, dropping cached credentials"
                );
                self.authenticator.invalidate_credentials();
            }

            if !self.retry.should_retry(attempt, &error) {
                return Err(error);
            }

            let delay = self.retry.delay_for(attempt);
            self.counters.retry();
            self.emit(
                ctx,
                EventKind::Retried,
                None,
                host.as_deref(),
                attempt,
                error.kind(),
                Some(format!("{} (next attempt in {:?})", error, delay)),
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt: lease, connect, authenticate, send. Returns the host used.
    async fn attempt(
        &self,
        request_id: Uuid,
        payload: Value,
    ) -> (Option<String>, ConnectorResult<DpResponse>) {
        let lease = match self.pool.get_healthy_connection(&self.targets).await {
            Ok(lease) => lease,
            Err(e) => return (None, Err(e)),
        };
        let host = lease.host().to_string();

        let mut adapter = AdapterFactory::create(&self.config.adapter);
        let result = self.exchange(&mut adapter, &lease, request_id, payload).await;
        adapter.close().await;

        (Some(host), result)
    }

    async fn exchange(
        &self,
        adapter: &mut DpAdapter,
        lease: &ConnectionLease,
        request_id: Uuid,
        payload: Value,
    ) -> ConnectorResult<DpResponse> {
        adapter.connect(lease.connection()).await?;

        let mut outbound = OutboundRequest::new(payload);
        outbound.request_id = request_id;
        self.authenticator.authenticate_request(&mut outbound).await?;

        let reply = adapter.send_request(outbound).await?;
        DpResponse::from_value(reply)
    }

    /// Probe every target and run the authentication self-test.
    ///
    /// Fails if no target is healthy or the credential does not validate.
    pub async fn health_check(&self) -> ConnectorResult<HealthReport> {
        let checks = self.targets.iter().map(|t| self.pool.perform_health_check(t));
        let results = join_all(checks).await;
        let hosts: BTreeMap<String, bool> = self
            .targets
            .iter()
            .zip(&results)
            .map(|(target, result)| (target.clone(), result.is_ok()))
            .collect();
        let healthy_hosts = hosts.values().filter(|ok| **ok).count();

        if healthy_hosts == 0 {
            tracing::warn!(targets = self.targets.len(), "DP health check found no healthy host");
            return Err(ConnectorError::NoHealthyHosts(self.targets.len()));
        }
        self.authenticator.test_authentication_flow().await?;

        Ok(HealthReport {
            healthy_hosts,
            total_hosts: self.targets.len(),
            hosts,
            authentication: self.authenticator.method(),
            circuit_state: self.breaker.state(),
        })
    }

    pub fn stats(&self) -> DpStats {
        DpStats {
            circuit_breaker: self.breaker.snapshot(),
            connection_pool: self.pool.connection_pool_stats(),
            retry_stats: self.counters.snapshot(&self.retry),
        }
    }

    /// Run the periodic health monitor until `shutdown` triggers.
    pub fn spawn_health_monitor(&self, shutdown: &Shutdown) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.pool.monitor_interval_secs);
        let monitor = HealthMonitor::new(self.pool.clone(), interval);
        let rx = shutdown.subscribe();

        // Seed the pool so the monitor has hosts to probe
        for target in &self.targets {
            if let Err(e) = self.pool.get_connection(target) {
                tracing::warn!(target = %target, error = %e, "Skipping unusable target");
            }
        }
        tokio::spawn(monitor.run(rx))
    }

    /// Like [`spawn_health_monitor`](Self::spawn_health_monitor), but only
    /// when `pool.monitor_enabled` is set.
    pub fn spawn_health_monitor_if_enabled(&self, shutdown: &Shutdown) -> Option<JoinHandle<()>> {
        if !self.config.pool.monitor_enabled {
            tracing::info!("Background health monitor disabled by configuration");
            return None;
        }
        Some(self.spawn_health_monitor(shutdown))
    }

    fn emit(
        &self,
        ctx: &CallContext<'_>,
        kind: EventKind,
        job_id: Option<&str>,
        host: Option<&str>,
        attempt: u32,
        outcome: &'static str,
        error: Option<String>,
    ) {
        self.events.emit(ConnectorEvent {
            kind,
            request_id: ctx.request_id,
            job_id: job_id.or(ctx.job_id).map(str::to_string),
            host: host.map(str::to_string),
            attempt,
            duration_ms: ctx.started.elapsed().as_millis() as u64,
            outcome,
            error,
        });
    }
}
