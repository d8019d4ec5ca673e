//! Request and response types exchanged with Data Providers.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ConnectorError, ConnectorResult};

/// A privacy-transformed verification request.
///
/// The connector treats the contents as opaque and only serializes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub rp_id: String,
    pub user_hash: String,
    pub claim_type: String,
    #[serde(default)]
    pub hashed_identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub bloom_filters: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl VerificationRequest {
    pub fn to_payload(&self) -> ConnectorResult<Value> {
        serde_json::to_value(self).map_err(|e| ConnectorError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Parsed Data-Provider reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl DpResponse {
    /// Decode an adapter's JSON result. An undecodable body is a protocol failure.
    pub fn from_value(value: Value) -> ConnectorResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            ConnectorError::protocol(None, format!("undecodable DP response: {}", e))
        })
    }

    pub fn is_verified(&self) -> bool {
        self.verification_result.as_ref().is_some_and(|r| r.verified)
    }
}

/// One outbound call as seen by the authenticator and the adapters.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub request_id: Uuid,
    pub headers: HeaderMap,
    pub payload: Value,
    /// Set by mTLS authentication; the transport must present a client identity.
    pub requires_client_cert: bool,
}

impl OutboundRequest {
    pub fn new(payload: Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            headers: HeaderMap::new(),
            payload,
            requires_client_cert: false,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Headers as plain strings, for protocols that carry them in-band.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_dp_response() {
        let response = DpResponse::from_value(json!({
            "job_id": "job_123456",
            "status": "completed",
            "verification_result": {"verified": true, "confidence": 0.95}
        }))
        .unwrap();

        assert_eq!(response.job_id, "job_123456");
        assert!(response.is_verified());
        assert!(response.metadata.is_empty());
    }

    #[test]
    fn test_undecodable_response_is_protocol_error() {
        let err = DpResponse::from_value(json!({"unexpected": true})).unwrap_err();
        assert!(matches!(err, ConnectorError::Protocol { status: None, .. }));
    }

    #[test]
    fn test_request_payload_omits_missing_job_id() {
        let request = VerificationRequest {
            rp_id: "rp-1".into(),
            user_hash: "abc".into(),
            claim_type: "age_over_18".into(),
            ..Default::default()
        };
        let payload = request.to_payload().unwrap();
        assert!(payload.get("job_id").is_none());
        assert_eq!(payload["claim_type"], "age_over_18");
    }
}
