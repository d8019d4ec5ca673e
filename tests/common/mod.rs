//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use dp_connector::config::{BackoffStrategy, ConnectorConfig, LoadBalancingStrategy, RetryConfig};

pub fn dp_success_body() -> Value {
    json!({
        "job_id": "job_123456",
        "status": "completed",
        "verification_result": {"verified": true, "confidence": 0.95}
    })
}

pub fn verification_request() -> dp_connector::VerificationRequest {
    serde_json::from_value(json!({
        "job_id": "job_123456",
        "rp_id": "rp-acme",
        "user_hash": "9f86d081884c7d65",
        "claim_type": "age_over_18",
        "hashed_identifiers": {"email": "a1b2c3"},
        "bloom_filters": {"dob": "AAECAw=="}
    }))
    .unwrap()
}

/// Connector config for one target with fast, deterministic retries.
pub fn config_for(target: &str) -> ConnectorConfig {
    let mut config = ConnectorConfig::default();
    config.targets = vec![target.to_string()];
    config.retries = RetryConfig {
        max_retries: 2,
        base_delay_ms: 10,
        max_delay_ms: 50,
        backoff: BackoffStrategy::Linear,
        jitter: false,
    };
    config.circuit_breaker.failure_threshold = 3;
    config.pool.strategy = LoadBalancingStrategy::HealthCheck;
    config.pool.health_timeout_ms = 500;
    config
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a programmable HTTP/1.1 backend.
///
/// `f` receives the request line (e.g. "GET /health HTTP/1.1") and
/// returns the status and body to send back.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let request_line = request.lines().next().unwrap_or_default().to_string();

                let (status, body) = f(request_line).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    502 => "502 Bad Gateway",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn grpc_frame(message: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8];
    frame.extend_from_slice(&(message.len() as u32).to_be_bytes());
    frame.extend_from_slice(message);
    frame
}

/// gRPC-over-JSON mock. Echoes the request's `job_id` and answers with
/// `grpc_status` in the response headers.
pub async fn start_grpc_backend(grpc_status: &'static str) -> SocketAddr {
    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/dp.v1.VerificationService/Verify",
            post(move |headers: HeaderMap, body: Bytes| async move {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let request: Value = serde_json::from_slice(&body[5..]).unwrap_or(Value::Null);

                let reply = json!({
                    "job_id": request["job_id"].as_str().unwrap_or("unknown"),
                    "status": "completed",
                    "verification_result": {"verified": true, "confidence": 0.9},
                    "metadata": {"content_type": content_type}
                });
                let frame = grpc_frame(reply.to_string().as_bytes());
                (
                    [
                        ("content-type", "application/grpc+json"),
                        ("grpc-status", grpc_status),
                        ("grpc-message", "mock"),
                    ],
                    frame,
                )
            }),
        );
    serve(router).await
}

async fn ws_session(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else { continue };
        let envelope: Value = match serde_json::from_str(text.as_str()) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let request_id = envelope["request_id"].as_str().unwrap_or_default().to_string();

        // Noise the client must skip
        let _ = socket.send(Message::Ping(Bytes::from_static(b"hi"))).await;
        let unrelated = json!({"request_id": "someone-else", "response": {"status": "wrong"}});
        let _ = socket.send(Message::Text(unrelated.to_string().into())).await;

        let claim_type = &envelope["payload"]["claim_type"];
        let reply = if claim_type == "deny_me" {
            json!({"request_id": request_id, "error": "claim not supported"})
        } else if claim_type == "revoked" {
            json!({"request_id": request_id, "error": "token revoked", "status": 401})
        } else {
            json!({
                "request_id": request_id,
                "response": {
                    "job_id": envelope["payload"]["job_id"],
                    "status": "completed",
                    "verification_result": {"verified": true, "confidence": 0.8},
                    "metadata": {"authorization": envelope["headers"]["authorization"]}
                }
            })
        };
        if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
            break;
        }
    }
}

/// WebSocket mock speaking the request/reply envelope on `/verify`.
pub async fn start_ws_backend() -> SocketAddr {
    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/verify",
            any(|ws: WebSocketUpgrade| async move { ws.on_upgrade(ws_session).into_response() }),
        );
    serve(router).await
}
