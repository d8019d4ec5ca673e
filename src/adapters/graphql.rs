//! GraphQL: the payload travels as the `input` variable of a configured document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapters::{connected, ensure_client_identity, post_json, ProtocolAdapter};
use crate::config::{AdapterConfig, AdapterType};
use crate::connector::types::OutboundRequest;
use crate::error::{ConnectorError, ConnectorResult};
use crate::load_balancer::PooledConnection;

#[derive(Debug)]
pub struct GraphQlAdapter {
    path: String,
    query: String,
    timeout: Duration,
    connection: Option<Arc<PooledConnection>>,
}

impl GraphQlAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            path: config.path.clone(),
            query: config.graphql_query.clone(),
            timeout: config.timeout(),
            connection: None,
        }
    }
}

/// Extract the first field of `data`; an `errors` array fails the call.
pub(crate) fn unwrap_graphql_response(body: Value) -> ConnectorResult<Value> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(ConnectorError::protocol(
                None,
                format!("GraphQL errors: {}", messages.join("; ")),
            ));
        }
    }

    body.get("data")
        .and_then(Value::as_object)
        .and_then(|data| data.values().next().cloned())
        .filter(|v| !v.is_null())
        .ok_or_else(|| ConnectorError::protocol(None, "GraphQL response has no data"))
}

#[async_trait]
impl ProtocolAdapter for GraphQlAdapter {
    async fn connect(&mut self, connection: Arc<PooledConnection>) -> ConnectorResult<()> {
        self.connection = Some(connection);
        Ok(())
    }

    async fn send_request(&mut self, request: OutboundRequest) -> ConnectorResult<Value> {
        let connection = connected(&self.connection)?;
        ensure_client_identity(&request, connection, AdapterType::GraphQl)?;

        let body = json!({
            "query": self.query,
            "variables": { "input": request.payload },
        });
        let reply = post_json(connection, &self.path, &request, &body, self.timeout).await?;
        unwrap_graphql_response(reply)
    }

    async fn close(&mut self) {
        self.connection = None;
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::GraphQl
    }
}
