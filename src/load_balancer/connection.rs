//! Pooled transport handles.
//!
//! # Responsibilities
//! - Hold the reusable HTTP client for one host, built with fixed timeouts
//! - Lazily build the HTTP/2 channel used for RPC-style calls
//! - Track active leases (for Least Connections LB) and idle time
//! - Probe the host's health path

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::time::Instant;
use url::Url;

use crate::config::{ConnectorConfig, PoolConfig, TimeoutConfig};
use crate::error::{ConnectorError, ConnectorResult};
use crate::resilience::timeouts::with_timeout;

/// HTTP/2 (prior knowledge) client used by the gRPC adapter.
pub type H2Channel = Client<HttpConnector, Full<Bytes>>;

/// Fixed transport settings applied to every pooled connection.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
    pub keep_alive: Duration,
    pub health_path: String,
    pub probe_timeout: Duration,
    /// Client identity presented during the TLS handshake (mTLS).
    pub identity: Option<reqwest::Identity>,
    /// Extra trust anchor for the DP's server certificate.
    pub root_ca: Option<reqwest::Certificate>,
    /// Same identity and trust anchors for sockets opened outside reqwest.
    pub client_tls: Option<Arc<rustls::ClientConfig>>,
}

impl ConnectionSettings {
    pub fn from_config(timeouts: &TimeoutConfig, pool: &PoolConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(timeouts.connect_ms),
            read_timeout: Duration::from_millis(timeouts.read_ms),
            idle_timeout: Duration::from_secs(timeouts.idle_secs),
            keep_alive: Duration::from_secs(timeouts.keep_alive_secs),
            health_path: pool.health_path.clone(),
            probe_timeout: Duration::from_millis(pool.health_timeout_ms),
            identity: None,
            root_ca: None,
            client_tls: None,
        }
    }
}

impl From<&ConnectorConfig> for ConnectionSettings {
    fn from(config: &ConnectorConfig) -> Self {
        Self::from_config(&config.timeouts, &config.pool)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default(), &PoolConfig::default())
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("health_path", &self.health_path)
            .field("probe_timeout", &self.probe_timeout)
            .field("client_identity", &self.identity.is_some())
            .field("client_tls", &self.client_tls.is_some())
            .finish()
    }
}

/// Normalize a host into the pool key: parsed URL without trailing slash.
pub fn host_key(host: &str) -> ConnectorResult<(String, Url)> {
    let raw = host.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| ConnectorError::InvalidConfig(format!("invalid target '{}': {}", host, e)))?;
    if url.host_str().is_none() {
        return Err(ConnectorError::InvalidConfig(format!(
            "target '{}' has no host",
            host
        )));
    }
    let key = url.as_str().trim_end_matches('/').to_string();
    Ok((key, url))
}

/// A reusable transport handle for one host.
pub struct PooledConnection {
    host: String,
    base_url: Url,
    http: reqwest::Client,
    h2: OnceLock<H2Channel>,
    settings: Arc<ConnectionSettings>,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last lease activity.
    last_used_ms: AtomicU64,
    active: AtomicUsize,
}

impl PooledConnection {
    pub fn new(host: &str, settings: Arc<ConnectionSettings>) -> ConnectorResult<Self> {
        let (key, base_url) = host_key(host)?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .pool_idle_timeout(settings.idle_timeout)
            .tcp_keepalive(settings.keep_alive)
            .user_agent(concat!("dp-connector/", env!("CARGO_PKG_VERSION")));
        if let Some(identity) = &settings.identity {
            builder = builder.identity(identity.clone());
        }
        if let Some(ca) = &settings.root_ca {
            builder = builder.add_root_certificate(ca.clone());
        }
        let http = builder.build().map_err(|e| {
            ConnectorError::InvalidConfig(format!("failed to build HTTP client for {}: {}", key, e))
        })?;

        tracing::debug!(host = %key, "Pooled connection created");

        Ok(Self {
            host: key,
            base_url,
            http,
            h2: OnceLock::new(),
            settings,
            created_at: Instant::now(),
            last_used_ms: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn has_client_identity(&self) -> bool {
        self.settings.identity.is_some()
    }

    pub fn client_tls(&self) -> Option<&Arc<rustls::ClientConfig>> {
        self.settings.client_tls.as_ref()
    }

    /// Persistent HTTP/2 channel, built on first use.
    pub fn h2_channel(&self) -> &H2Channel {
        self.h2.get_or_init(|| {
            let mut connector = HttpConnector::new();
            connector.set_connect_timeout(Some(self.settings.connect_timeout));
            connector.set_keepalive(Some(self.settings.keep_alive));
            connector.set_nodelay(true);

            tracing::debug!(host = %self.host, "Opening HTTP/2 channel");
            Client::builder(TokioExecutor::new())
                .http2_only(true)
                .pool_timer(TokioTimer::new())
                .pool_idle_timeout(self.settings.idle_timeout)
                .build(connector)
        })
    }

    /// Resolve a request path against the host, keeping any base path prefix.
    pub fn url_for(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{}/{}", prefix, path.trim_start_matches('/')));
        url
    }

    /// GET the health path; returns the response time on success.
    pub async fn probe(&self) -> ConnectorResult<Duration> {
        let url = self.url_for(&self.settings.health_path);
        let limit = self.settings.probe_timeout;
        let started = Instant::now();

        let response = with_timeout(limit, async {
            self.http
                .get(url)
                .header("user-agent", "dp-connector-health-check")
                .timeout(limit)
                .send()
                .await
                .map_err(|e| ConnectorError::from_reqwest(e, limit))
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::protocol(
                Some(status.as_u16()),
                "health probe returned non-success status",
            ));
        }
        Ok(started.elapsed())
    }

    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    fn touch(&self) {
        let offset = self.created_at.elapsed().as_millis() as u64;
        self.last_used_ms.store(offset, Ordering::Relaxed);
    }

    /// Time since the last lease was taken or returned.
    pub fn idle_for(&self) -> Duration {
        let idle_since = Duration::from_millis(self.last_used_ms.load(Ordering::Relaxed));
        let last_used = self.created_at + idle_since;
        last_used.elapsed()
    }

    /// Instant after which an unused connection becomes evictable.
    pub fn idle_deadline(&self) -> Instant {
        self.created_at
            + Duration::from_millis(self.last_used_ms.load(Ordering::Relaxed))
            + self.settings.idle_timeout
    }

    pub fn is_idle_expired(&self) -> bool {
        self.active_leases() == 0 && Instant::now() >= self.idle_deadline()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("host", &self.host)
            .field("active", &self.active_leases())
            .field("idle_for", &self.idle_for())
            .finish()
    }
}

/// A RAII guard that counts one caller's use of a pooled connection.
///
/// Dropping the lease (success, failure or cancellation) returns the
/// connection to the pool.
#[derive(Debug)]
pub struct ConnectionLease {
    connection: Arc<PooledConnection>,
}

impl ConnectionLease {
    pub fn new(connection: Arc<PooledConnection>) -> Self {
        connection.active.fetch_add(1, Ordering::Relaxed);
        connection.touch();
        Self { connection }
    }

    /// Shared handle to the leased connection.
    pub fn connection(&self) -> Arc<PooledConnection> {
        self.connection.clone()
    }
}

impl Deref for ConnectionLease {
    type Target = PooledConnection;
    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.connection.active.fetch_sub(1, Ordering::Relaxed);
        self.connection.touch();
    }
}
