//! Connector error taxonomy.
//!
//! # Categories
//! - Admission: `CircuitOpen` (never retried, no attempt consumed)
//! - Routing: `NoTargets`, `NoHealthyHosts`
//! - Transport: `Transport`, `Timeout` (retryable)
//! - Protocol: `Protocol` (non-success status, undecodable body; retryable)
//! - Credentials: `Authentication` (not retried, still a breaker failure)
//! - Call level: `DeadlineExceeded`, `InvalidConfig`, `Serialization`

use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthError;

/// Message the outward verification API shows when the DP cannot be reached.
pub const VERIFICATION_UNAVAILABLE: &str = "verification unavailable";

/// Errors returned by the Data-Provider connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The circuit breaker refused admission.
    #[error("circuit open: data provider temporarily unavailable")]
    CircuitOpen,

    /// No target hosts were supplied.
    #[error("no target hosts configured")]
    NoTargets,

    /// Load balancing found no eligible host.
    #[error("no healthy hosts among {0} candidates")]
    NoHealthyHosts(usize),

    /// Connection refused, reset, TLS failure and similar.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single network operation exceeded its timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status or malformed body.
    #[error("protocol error (status {status:?}): {message}")]
    Protocol { status: Option<u16>, message: String },

    /// Credentials could not be attached or were rejected.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// The caller's overall deadline elapsed.
    #[error("call deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Request payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConnectorError {
    pub(crate) fn protocol(status: Option<u16>, message: impl Into<String>) -> Self {
        ConnectorError::Protocol {
            status,
            message: message.into(),
        }
    }

    /// The DP refused our credential.
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        ConnectorError::Authentication(AuthError::Rejected(message.into()))
    }

    /// Map an HTTP error status onto the taxonomy. 401/403 mean the
    /// credential was refused, everything else is a protocol failure.
    pub(crate) fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => ConnectorError::rejected(message),
            _ => ConnectorError::protocol(Some(status), message),
        }
    }

    /// Map a reqwest failure onto the taxonomy.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ConnectorError::Timeout(timeout)
        } else if err.is_decode() {
            ConnectorError::protocol(err.status().map(|s| s.as_u16()), err.to_string())
        } else if let Some(status) = err.status() {
            ConnectorError::from_status(status.as_u16(), err.to_string())
        } else {
            ConnectorError::Transport(err.to_string())
        }
    }

    /// Whether another attempt may succeed. Host health is cached, so
    /// `NoHealthyHosts` would only repeat until the records go stale.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::Transport(_)
                | ConnectorError::Timeout(_)
                | ConnectorError::Protocol { .. }
        )
    }

    /// Whether the DP refused the credential we presented.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, ConnectorError::Authentication(AuthError::Rejected(_)))
    }

    /// Whether the failure counts against the circuit breaker.
    pub fn counts_as_breaker_failure(&self) -> bool {
        !matches!(
            self,
            ConnectorError::CircuitOpen
                | ConnectorError::NoTargets
                | ConnectorError::Serialization(_)
                | ConnectorError::InvalidConfig(_)
        )
    }

    /// Whether callers should see the generic "verification unavailable" response.
    pub fn is_unavailable(&self) -> bool {
        !matches!(
            self,
            ConnectorError::Serialization(_) | ConnectorError::InvalidConfig(_)
        )
    }

    /// Caller-facing message; hides downstream details.
    pub fn user_message(&self) -> String {
        if self.is_unavailable() {
            VERIFICATION_UNAVAILABLE.to_string()
        } else {
            self.to_string()
        }
    }

    /// Short label used for metrics and events.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorError::CircuitOpen => "circuit_open",
            ConnectorError::NoTargets => "no_targets",
            ConnectorError::NoHealthyHosts(_) => "no_healthy_hosts",
            ConnectorError::Transport(_) => "transport",
            ConnectorError::Timeout(_) => "timeout",
            ConnectorError::Protocol { .. } => "protocol",
            ConnectorError::Authentication(_) => "authentication",
            ConnectorError::DeadlineExceeded(_) => "deadline_exceeded",
            ConnectorError::Serialization(_) => "serialization",
            ConnectorError::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
