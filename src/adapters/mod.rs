//! Protocol adapters.
//!
//! # Data Flow
//! ```text
//! AdapterFactory::create(adapter config) → DpAdapter
//!     → connect(pooled connection)      (bind / open channel / open socket)
//!     → send_request(outbound request)  (encode, send, decode)
//!     → close()
//! ```
//!
//! # Design Decisions
//! - Closed set of protocols, dispatched through the `DpAdapter` enum
//! - One adapter per attempt; transport handles come from the pool
//! - Every adapter returns the DP reply as raw JSON, parsing happens upstream
//! - Host health is the pool's job; adapters never run health checks
//! - A refused credential (401/403, UNAUTHENTICATED) surfaces as
//!   `AuthError::Rejected`, never as a retryable protocol error

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::AuthError;
use crate::config::AdapterType;
use crate::connector::types::OutboundRequest;
use crate::error::{ConnectorError, ConnectorResult};
use crate::load_balancer::PooledConnection;

pub mod factory;
pub mod graphql;
pub mod grpc;
pub mod rest;
pub mod websocket;

pub use factory::AdapterFactory;
pub use graphql::GraphQlAdapter;
pub use grpc::GrpcAdapter;
pub use rest::RestAdapter;
pub use websocket::WebSocketAdapter;

/// Contract shared by every wire protocol.
#[async_trait]
pub trait ProtocolAdapter: Send {
    /// Bind to a pooled connection and make it ready for requests.
    async fn connect(&mut self, connection: Arc<PooledConnection>) -> ConnectorResult<()>;

    async fn send_request(&mut self, request: OutboundRequest) -> ConnectorResult<Value>;

    /// Release protocol resources. The pooled connection stays in the pool.
    async fn close(&mut self);

    fn adapter_type(&self) -> AdapterType;
}

#[derive(Debug)]
pub enum DpAdapter {
    Rest(RestAdapter),
    GraphQl(GraphQlAdapter),
    Grpc(GrpcAdapter),
    WebSocket(WebSocketAdapter),
}

#[async_trait]
impl ProtocolAdapter for DpAdapter {
    async fn connect(&mut self, connection: Arc<PooledConnection>) -> ConnectorResult<()> {
        match self {
            DpAdapter::Rest(a) => a.connect(connection).await,
            DpAdapter::GraphQl(a) => a.connect(connection).await,
            DpAdapter::Grpc(a) => a.connect(connection).await,
            DpAdapter::WebSocket(a) => a.connect(connection).await,
        }
    }

    async fn send_request(&mut self, request: OutboundRequest) -> ConnectorResult<Value> {
        match self {
            DpAdapter::Rest(a) => a.send_request(request).await,
            DpAdapter::GraphQl(a) => a.send_request(request).await,
            DpAdapter::Grpc(a) => a.send_request(request).await,
            DpAdapter::WebSocket(a) => a.send_request(request).await,
        }
    }

    async fn close(&mut self) {
        match self {
            DpAdapter::Rest(a) => a.close().await,
            DpAdapter::GraphQl(a) => a.close().await,
            DpAdapter::Grpc(a) => a.close().await,
            DpAdapter::WebSocket(a) => a.close().await,
        }
    }

    fn adapter_type(&self) -> AdapterType {
        match self {
            DpAdapter::Rest(_) => AdapterType::Rest,
            DpAdapter::GraphQl(_) => AdapterType::GraphQl,
            DpAdapter::Grpc(_) => AdapterType::Grpc,
            DpAdapter::WebSocket(_) => AdapterType::WebSocket,
        }
    }
}

pub(crate) fn connected(
    connection: &Option<Arc<PooledConnection>>,
) -> ConnectorResult<&Arc<PooledConnection>> {
    connection
        .as_ref()
        .ok_or_else(|| ConnectorError::Transport("adapter is not connected".into()))
}

/// mTLS requests must go out over TLS on a client that carries the identity.
pub(crate) fn ensure_client_identity(
    request: &OutboundRequest,
    connection: &PooledConnection,
    protocol: AdapterType,
) -> ConnectorResult<()> {
    if !request.requires_client_cert {
        return Ok(());
    }
    if connection.base_url().scheme() != "https" {
        return Err(refuse_client_cert(protocol, connection, "is not TLS"));
    }
    if !connection.has_client_identity() {
        return Err(refuse_client_cert(protocol, connection, "has no client identity"));
    }
    Ok(())
}

pub(crate) fn refuse_client_cert(
    protocol: AdapterType,
    connection: &PooledConnection,
    reason: &str,
) -> ConnectorError {
    AuthError::Certificate(format!(
        "{} transport to {} {}, refusing to send an mTLS request",
        protocol,
        connection.host(),
        reason
    ))
    .into()
}

/// POST a JSON body and decode a JSON reply. Shared by REST and GraphQL.
pub(crate) async fn post_json(
    connection: &PooledConnection,
    path: &str,
    request: &OutboundRequest,
    body: &Value,
    timeout: Duration,
) -> ConnectorResult<Value> {
    let url = connection.url_for(path);
    let response = connection
        .http()
        .post(url)
        .headers(request.headers.clone())
        .header("x-request-id", request.request_id.to_string())
        .json(body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ConnectorError::from_reqwest(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ConnectorError::from_status(
            status.as_u16(),
            format!("DP returned {}", status),
        ));
    }

    response.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            ConnectorError::Timeout(timeout)
        } else {
            ConnectorError::protocol(Some(status.as_u16()), format!("undecodable body: {}", e))
        }
    })
}
