//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ConnectorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ConnectorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ConnectorConfig, ConfigError> {
    let config: ConnectorConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(
        targets = config.resolved_targets().len(),
        adapter = %config.adapter.adapter_type,
        auth = config.auth.method(),
        "Configuration parsed"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AdapterType, LoadBalancingStrategy};
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            targets = ["http://dp-1:8080", "http://dp-2:8080"]

            [adapter]
            adapter_type = "graphql"
            timeout_ms = 2500

            [pool]
            strategy = "round_robin"

            [retries]
            max_retries = 2
            backoff = "exponential"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.adapter.adapter_type, AdapterType::GraphQl);
        assert_eq!(config.adapter.timeout_ms, 2500);
        assert_eq!(config.pool.strategy, LoadBalancingStrategy::RoundRobin);
        assert_eq!(config.retries.max_retries, 2);
        // Untouched sections keep their defaults
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_unknown_adapter_type_loads_as_rest() {
        let config = parse_config("[adapter]\nadapter_type = \"soap\"\n").unwrap();
        assert_eq!(config.adapter.adapter_type, AdapterType::Rest);
    }

    #[test]
    fn test_validation_errors_are_reported() {
        let err = parse_config(
            r#"
            targets = ["not a url"]
            [circuit_breaker]
            failure_threshold = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/nonexistent/dp-connector.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
