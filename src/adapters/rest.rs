//! REST: JSON over HTTP POST.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::{connected, ensure_client_identity, post_json, ProtocolAdapter};
use crate::config::{AdapterConfig, AdapterType};
use crate::connector::types::OutboundRequest;
use crate::error::ConnectorResult;
use crate::load_balancer::PooledConnection;

#[derive(Debug)]
pub struct RestAdapter {
    path: String,
    timeout: Duration,
    connection: Option<Arc<PooledConnection>>,
}

impl RestAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            path: config.path.clone(),
            timeout: config.timeout(),
            connection: None,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for RestAdapter {
    async fn connect(&mut self, connection: Arc<PooledConnection>) -> ConnectorResult<()> {
        self.connection = Some(connection);
        Ok(())
    }

    async fn send_request(&mut self, request: OutboundRequest) -> ConnectorResult<Value> {
        let connection = connected(&self.connection)?;
        ensure_client_identity(&request, connection, AdapterType::Rest)?;
        post_json(connection, &self.path, &request, &request.payload, self.timeout).await
    }

    async fn close(&mut self) {
        self.connection = None;
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Rest
    }
}
