//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the connector.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the Data-Provider connector.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Target host base URLs (e.g., "http://dp-1.internal:8080").
    /// When empty, `adapter.url` is the single target.
    pub targets: Vec<String>,

    /// Protocol adapter settings.
    pub adapter: AdapterConfig,

    /// Credentials attached to every outbound call.
    pub auth: AuthenticationConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Circuit breaker configuration.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Connection pool and load balancing settings.
    pub pool: PoolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ConnectorConfig {
    /// Targets the connector balances across.
    pub fn resolved_targets(&self) -> Vec<String> {
        if self.targets.is_empty() {
            vec![self.adapter.url.clone()]
        } else {
            self.targets.clone()
        }
    }
}

/// Wire protocol spoken by a Data Provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum AdapterType {
    #[default]
    Rest,
    GraphQl,
    Grpc,
    WebSocket,
}

impl AdapterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Rest => "rest",
            AdapterType::GraphQl => "graphql",
            AdapterType::Grpc => "grpc",
            AdapterType::WebSocket => "websocket",
        }
    }
}

/// Unknown names map to REST; this permissive default is intentional.
impl From<&str> for AdapterType {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "graphql" => AdapterType::GraphQl,
            "grpc" => AdapterType::Grpc,
            "websocket" | "ws" => AdapterType::WebSocket,
            _ => AdapterType::Rest,
        }
    }
}

impl From<String> for AdapterType {
    fn from(name: String) -> Self {
        AdapterType::from(name.as_str())
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter configuration, one per logical DP integration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Primary DP URL, used when no explicit target list is configured.
    pub url: String,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Protocol adapter to use.
    pub adapter_type: AdapterType,

    /// Request path for REST, GraphQL and WebSocket adapters.
    pub path: String,

    /// GraphQL document posted by the GraphQL adapter.
    pub graphql_query: String,

    /// Fully-qualified gRPC method path for unary calls.
    pub grpc_method: String,
}

impl AdapterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            timeout_ms: 10_000,
            adapter_type: AdapterType::Rest,
            path: "/verify".to_string(),
            graphql_query: concat!(
                "mutation Verify($input: VerificationInput!) { verify(input: $input) ",
                "{ job_id status verification_result { verified confidence } error } }"
            )
            .to_string(),
            grpc_method: "/dp.v1.VerificationService/Verify".to_string(),
        }
    }
}

/// Authentication method and its credentials.
///
/// Exactly one method is active; its fields are only reachable through
/// the matching variant.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthenticationConfig {
    #[default]
    None,
    ApiKey {
        key: String,
        #[serde(default = "default_api_key_header")]
        header: String,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        client_id: String,
        client_secret: String,
        token_url: String,
        #[serde(default)]
        scopes: Vec<String>,
    },
    Mtls {
        cert_file: PathBuf,
        key_file: PathBuf,
        #[serde(default)]
        ca_file: Option<PathBuf>,
    },
    Jwt {
        secret: String,
        issuer: String,
        audience: String,
        #[serde(default = "default_jwt_expiration")]
        expiration_secs: u64,
    },
}

impl AuthenticationConfig {
    pub fn method(&self) -> &'static str {
        match self {
            AuthenticationConfig::None => "none",
            AuthenticationConfig::ApiKey { .. } => "api_key",
            AuthenticationConfig::OAuth2 { .. } => "oauth2",
            AuthenticationConfig::Mtls { .. } => "mtls",
            AuthenticationConfig::Jwt { .. } => "jwt",
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for AuthenticationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationConfig::None => f.write_str("None"),
            AuthenticationConfig::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("key", &"<redacted>")
                .field("header", header)
                .finish(),
            AuthenticationConfig::OAuth2 {
                client_id,
                token_url,
                scopes,
                ..
            } => f
                .debug_struct("OAuth2")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .field("token_url", token_url)
                .field("scopes", scopes)
                .finish(),
            AuthenticationConfig::Mtls {
                cert_file,
                key_file,
                ca_file,
            } => f
                .debug_struct("Mtls")
                .field("cert_file", cert_file)
                .field("key_file", key_file)
                .field("ca_file", ca_file)
                .finish(),
            AuthenticationConfig::Jwt {
                issuer,
                audience,
                expiration_secs,
                ..
            } => f
                .debug_struct("Jwt")
                .field("secret", &"<redacted>")
                .field("issuer", issuer)
                .field("audience", audience)
                .field("expiration_secs", expiration_secs)
                .finish(),
        }
    }
}

fn default_api_key_header() -> String {
    "authorization".to_string()
}

fn default_jwt_expiration() -> u64 {
    300
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Overall deadline for one `verify_with_dp` call, retries included.
    pub call_ms: u64,

    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Read/write timeout of pooled transports in milliseconds.
    pub read_ms: u64,

    /// Idle timeout before a pooled connection is evicted, in seconds.
    pub idle_secs: u64,

    /// TCP keep-alive interval in seconds.
    pub keep_alive_secs: u64,
}

impl TimeoutConfig {
    pub fn call(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_ms: 30_000,
            connect_ms: 5_000,
            read_ms: 15_000,
            idle_secs: 90,
            keep_alive_secs: 60,
        }
    }
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base_delay * attempt`
    #[default]
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    Exponential,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; a call makes at most `max_retries + 1` attempts.
    pub max_retries: u32,

    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Backoff growth.
    pub backoff: BackoffStrategy,

    /// Add up to 10% random jitter to every delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            backoff: BackoffStrategy::Linear,
            jitter: true,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays open before admitting a probe, in milliseconds.
    pub open_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 30_000,
        }
    }
}

/// Host selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    LeastConnections,
    #[default]
    HealthCheck,
}

impl LoadBalancingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::LeastConnections => "least_connections",
            LoadBalancingStrategy::HealthCheck => "health_check",
        }
    }
}

/// Connection pool and health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Host selection algorithm.
    pub strategy: LoadBalancingStrategy,

    /// Path probed by health checks.
    pub health_path: String,

    /// Health probe timeout in milliseconds.
    pub health_timeout_ms: u64,

    /// Age after which a health record is re-probed before selection, in seconds.
    pub health_staleness_secs: u64,

    /// Run the periodic health monitor.
    pub monitor_enabled: bool,

    /// Health monitor interval in seconds.
    pub monitor_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::HealthCheck,
            health_path: "/health".to_string(),
            health_timeout_ms: 2_000,
            health_staleness_secs: 10,
            monitor_enabled: false,
            monitor_interval_secs: 15,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
