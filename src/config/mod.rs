//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ConnectorConfig (validated, immutable)
//!     → consumed once by DpConnector::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the connector never reloads mid-call
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdapterConfig, AdapterType, AuthenticationConfig, BackoffStrategy, CircuitBreakerConfig,
    ConnectorConfig, LoadBalancingStrategy, LogFormat, ObservabilityConfig, PoolConfig,
    RetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
