//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate target URLs and value ranges (timeouts > 0, thresholds >= 1)
//! - Check that the selected authentication method has its required fields
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConnectorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{AuthenticationConfig, ConnectorConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ConnectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, target) in config.resolved_targets().iter().enumerate() {
        if let Err(message) = check_target(target) {
            errors.push(ValidationError::new(format!("targets[{}]", i), message));
        }
    }

    let positive = [
        ("adapter.timeout_ms", config.adapter.timeout_ms),
        ("timeouts.call_ms", config.timeouts.call_ms),
        ("timeouts.connect_ms", config.timeouts.connect_ms),
        ("timeouts.read_ms", config.timeouts.read_ms),
        ("pool.health_timeout_ms", config.pool.health_timeout_ms),
        ("pool.monitor_interval_secs", config.pool.monitor_interval_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if !config.adapter.path.starts_with('/') {
        errors.push(ValidationError::new("adapter.path", "must start with '/'"));
    }
    if !config.adapter.grpc_method.starts_with('/') {
        errors.push(ValidationError::new("adapter.grpc_method", "must start with '/'"));
    }
    if !config.pool.health_path.starts_with('/') {
        errors.push(ValidationError::new("pool.health_path", "must start with '/'"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be at least 1",
        ));
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    check_auth(&config.auth, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(target: &str) -> Result<(), String> {
    let url = Url::parse(target).map_err(|e| format!("invalid URL '{}': {}", target, e))?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", target));
    }
    Ok(())
}

fn check_auth(auth: &AuthenticationConfig, errors: &mut Vec<ValidationError>) {
    let mut require = |field: &str, value: &str| {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(format!("auth.{}", field), "must not be empty"));
        }
    };

    match auth {
        AuthenticationConfig::None => {}
        AuthenticationConfig::ApiKey { key, header } => {
            require("key", key);
            require("header", header);
        }
        AuthenticationConfig::OAuth2 {
            client_id,
            client_secret,
            token_url,
            ..
        } => {
            require("client_id", client_id);
            require("client_secret", client_secret);
            require("token_url", token_url);
            if !token_url.is_empty() && Url::parse(token_url).is_err() {
                errors.push(ValidationError::new("auth.token_url", "invalid URL"));
            }
        }
        AuthenticationConfig::Mtls {
            cert_file,
            key_file,
            ..
        } => {
            require("cert_file", &cert_file.to_string_lossy());
            require("key_file", &key_file.to_string_lossy());
        }
        AuthenticationConfig::Jwt {
            secret,
            issuer,
            audience,
            expiration_secs,
        } => {
            require("secret", secret);
            require("issuer", issuer);
            require("audience", audience);
            if *expiration_secs == 0 {
                errors.push(ValidationError::new(
                    "auth.expiration_secs",
                    "must be greater than zero",
                ));
            }
        }
    }
}
