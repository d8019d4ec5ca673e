//! Protocol adapter tests against mock GraphQL, gRPC and WebSocket servers.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dp_connector::adapters::{AdapterFactory, ProtocolAdapter};
use dp_connector::config::{
    AdapterConfig, AdapterType, AuthenticationConfig, ConnectorConfig, LoadBalancingStrategy,
};
use dp_connector::connector::OutboundRequest;
use dp_connector::load_balancer::{ConnectionSettings, PooledConnection};
use dp_connector::{ConnectorError, DpConnector};

mod common;

fn pooled(addr: &str) -> Arc<PooledConnection> {
    Arc::new(PooledConnection::new(addr, Arc::new(ConnectionSettings::default())).unwrap())
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Connector for `target` presenting the test client certificate.
fn mtls_connector(target: &str, adapter_type: AdapterType) -> DpConnector {
    let mut config: ConnectorConfig = common::config_for(target);
    config.adapter.adapter_type = adapter_type;
    config.pool.strategy = LoadBalancingStrategy::RoundRobin;
    config.auth = AuthenticationConfig::Mtls {
        cert_file: fixture("client.crt"),
        key_file: fixture("client.key"),
        ca_file: Some(fixture("client.crt")),
    };
    DpConnector::new(config).unwrap()
}

#[tokio::test]
async fn test_graphql_wraps_payload_and_unwraps_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": {"input": {"claim_type": "age_over_18"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"verify": common::dp_success_body()}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = common::config_for(&server.uri());
    config.adapter.adapter_type = AdapterType::GraphQl;
    config.adapter.path = "/graphql".into();
    let connector = DpConnector::new(config).unwrap();

    let response = connector
        .verify_with_dp(&common::verification_request())
        .await
        .unwrap();
    assert_eq!(response.job_id, "job_123456");
    assert!(response.is_verified());
}

#[tokio::test]
async fn test_connect_leaves_health_to_the_pool() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::dp_success_body()))
        .expect(2)
        .mount(&server)
        .await;

    // One health check from the pool; later calls reuse the fresh record
    let connector = DpConnector::new(common::config_for(&server.uri())).unwrap();
    for _ in 0..2 {
        connector
            .verify_with_dp(&common::verification_request())
            .await
            .unwrap();
    }

    // A bare adapter never touches the health path
    let mut adapter = AdapterFactory::create(&AdapterConfig::default());
    adapter.connect(pooled(&server.uri())).await.unwrap();
    adapter.close().await;
}

#[tokio::test]
async fn test_graphql_errors_fail_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "unknown claim"}]
        })))
        .mount(&server)
        .await;

    let config = AdapterConfig {
        adapter_type: AdapterType::GraphQl,
        ..Default::default()
    };
    let mut adapter = AdapterFactory::create(&config);
    adapter.connect(pooled(&server.uri())).await.unwrap();

    let err = adapter
        .send_request(OutboundRequest::new(json!({"claim_type": "x"})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown claim"));
    adapter.close().await;
}

#[tokio::test]
async fn test_grpc_unary_call() {
    let addr = common::start_grpc_backend("0").await;
    let mut config = common::config_for(&format!("http://{}", addr));
    config.adapter.adapter_type = AdapterType::Grpc;
    let connector = DpConnector::new(config).unwrap();

    let response = connector
        .verify_with_dp(&common::verification_request())
        .await
        .unwrap();
    assert_eq!(response.job_id, "job_123456");
    assert_eq!(response.metadata["content_type"], "application/grpc+json");
    assert!(response.is_verified());
}

#[tokio::test]
async fn test_grpc_status_error_is_protocol_failure() {
    let addr = common::start_grpc_backend("14").await;
    let config = AdapterConfig {
        adapter_type: AdapterType::Grpc,
        ..Default::default()
    };
    let mut adapter = AdapterFactory::create(&config);
    adapter.connect(pooled(&format!("http://{}", addr))).await.unwrap();

    let err = adapter
        .send_request(OutboundRequest::new(json!({"job_id": "j1"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Protocol { .. }));
    assert!(err.to_string().contains("grpc-status 14"));
}

#[tokio::test]
async fn test_grpc_unauthenticated_is_refused_credential() {
    for code in ["16", "7"] {
        let addr = common::start_grpc_backend(code).await;
        let config = AdapterConfig {
            adapter_type: AdapterType::Grpc,
            ..Default::default()
        };
        let mut adapter = AdapterFactory::create(&config);
        adapter.connect(pooled(&format!("http://{}", addr))).await.unwrap();

        let err = adapter
            .send_request(OutboundRequest::new(json!({"job_id": "j1"})))
            .await
            .unwrap_err();
        assert!(err.is_credential_rejection(), "grpc-status {}: {}", code, err);
        assert!(!err.is_retryable());
    }
}

#[tokio::test]
async fn test_grpc_refuses_mtls_over_plaintext() {
    let addr = common::start_grpc_backend("0").await;
    let connector = mtls_connector(&format!("http://{}", addr), AdapterType::Grpc);

    let err = connector
        .verify_with_dp(&common::verification_request())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Authentication(_)));
    assert!(err.to_string().contains("plaintext h2c"));
    assert_eq!(connector.stats().retry_stats.total_attempts, 1);
}

#[tokio::test]
async fn test_grpc_reuses_channel_across_calls() {
    let addr = common::start_grpc_backend("0").await;
    let connection = pooled(&format!("http://{}", addr));
    let config = AdapterConfig {
        adapter_type: AdapterType::Grpc,
        ..Default::default()
    };

    for i in 0..3 {
        let mut adapter = AdapterFactory::create(&config);
        adapter.connect(connection.clone()).await.unwrap();
        let reply = adapter
            .send_request(OutboundRequest::new(json!({"job_id": format!("job-{}", i)})))
            .await
            .unwrap();
        assert_eq!(reply["job_id"], format!("job-{}", i));
        adapter.close().await;
    }
}

#[tokio::test]
async fn test_websocket_correlates_replies() {
    let addr = common::start_ws_backend().await;
    let mut config = common::config_for(&format!("http://{}", addr));
    config.adapter.adapter_type = AdapterType::WebSocket;
    config.pool.strategy = LoadBalancingStrategy::RoundRobin;
    config.auth = AuthenticationConfig::ApiKey {
        key: "ws-key".into(),
        header: "authorization".into(),
    };
    let connector = DpConnector::new(config).unwrap();

    let response = connector
        .verify_with_dp(&common::verification_request())
        .await
        .unwrap();
    assert_eq!(response.job_id, "job_123456");
    assert_eq!(response.metadata["authorization"], "Bearer ws-key");
}

#[tokio::test]
async fn test_websocket_error_reply() {
    let addr = common::start_ws_backend().await;
    let config = AdapterConfig {
        adapter_type: AdapterType::WebSocket,
        ..Default::default()
    };
    let mut adapter = AdapterFactory::from_name("websocket", &config);
    adapter.connect(pooled(&format!("http://{}", addr))).await.unwrap();

    // The socket stays usable for several requests
    let ok = adapter
        .send_request(OutboundRequest::new(json!({"job_id": "j1", "claim_type": "age"})))
        .await
        .unwrap();
    assert_eq!(ok["status"], "completed");

    let err = adapter
        .send_request(OutboundRequest::new(json!({"job_id": "j2", "claim_type": "deny_me"})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("claim not supported"));
    adapter.close().await;
}

#[tokio::test]
async fn test_websocket_refuses_mtls_without_tls() {
    let addr = common::start_ws_backend().await;
    let connector = mtls_connector(&format!("http://{}", addr), AdapterType::WebSocket);

    let err = connector
        .verify_with_dp(&common::verification_request())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Authentication(_)));
    assert!(err.to_string().contains("without a client identity"));
    assert_eq!(connector.stats().retry_stats.total_attempts, 1);
}

#[tokio::test]
async fn test_websocket_error_status_is_refused_credential() {
    let addr = common::start_ws_backend().await;
    let config = AdapterConfig {
        adapter_type: AdapterType::WebSocket,
        ..Default::default()
    };
    let mut adapter = AdapterFactory::create(&config);
    adapter.connect(pooled(&format!("http://{}", addr))).await.unwrap();

    let err = adapter
        .send_request(OutboundRequest::new(json!({"job_id": "j1", "claim_type": "revoked"})))
        .await
        .unwrap_err();
    assert!(err.is_credential_rejection());
    adapter.close().await;
}

#[tokio::test]
async fn test_send_without_connect_fails() {
    let mut adapter = AdapterFactory::from_name("rest", &AdapterConfig::default());
    let err = adapter
        .send_request(OutboundRequest::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Transport(_)));
}

#[tokio::test]
async fn test_mtls_request_needs_client_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut adapter = AdapterFactory::create(&AdapterConfig::default());
    adapter.connect(pooled(&server.uri())).await.unwrap();

    let mut request = OutboundRequest::new(json!({}));
    request.requires_client_cert = true;
    let err = adapter.send_request(request).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Authentication(_)));
}
