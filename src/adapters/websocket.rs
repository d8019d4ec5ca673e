//! WebSocket: request/reply envelopes over a persistent socket.
//!
//! # Envelope
//! ```text
//! → {"request_id": "<uuid>", "headers": {...}, "payload": {...}}
//! ← {"request_id": "<uuid>", "response": {...}}
//! ← {"request_id": "<uuid>", "error": "...", "status": 401}
//! ```
//! Replies for other request ids are skipped. An error reply with status
//! 401 or 403 means the credential was refused.
//!
//! `wss` sockets present the mTLS identity through a rustls connector;
//! requests needing a client certificate are refused on any other socket.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::adapters::{connected, refuse_client_cert, ProtocolAdapter};
use crate::config::{AdapterConfig, AdapterType};
use crate::connector::types::OutboundRequest;
use crate::error::{ConnectorError, ConnectorResult};
use crate::load_balancer::PooledConnection;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketAdapter {
    path: String,
    timeout: Duration,
    connection: Option<Arc<PooledConnection>>,
    stream: Option<WsStream>,
    /// The socket was opened over TLS with the client identity.
    client_authenticated: bool,
}

impl fmt::Debug for WebSocketAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketAdapter")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .field("connected", &self.stream.is_some())
            .field("client_authenticated", &self.client_authenticated)
            .finish()
    }
}

/// `http` becomes `ws`, `https` becomes `wss`.
pub fn socket_url(connection: &PooledConnection, path: &str) -> ConnectorResult<Url> {
    let mut url = connection.url_for(path);
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectorError::InvalidConfig(format!(
                "cannot derive a WebSocket URL from scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| {
            ConnectorError::InvalidConfig(format!("cannot switch {} to {}", url, scheme))
        })?;
    Ok(url)
}

/// Match a reply against the pending request id.
fn parse_reply(text: &str, request_id: &str) -> Option<ConnectorResult<Value>> {
    let reply: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping non-JSON WebSocket message");
            return None;
        }
    };
    if reply.get("request_id").and_then(Value::as_str) != Some(request_id) {
        return None;
    }

    if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        let status = reply
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok());
        return Some(Err(match status {
            Some(status) => ConnectorError::from_status(status, message),
            None => ConnectorError::protocol(None, message),
        }));
    }
    Some(
        reply
            .get("response")
            .cloned()
            .ok_or_else(|| ConnectorError::protocol(None, "WebSocket reply has no response")),
    )
}

async fn await_reply(stream: &mut WsStream, request_id: &str) -> ConnectorResult<Value> {
    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| ConnectorError::Transport(e.to_string()))?;
        let parsed = match &message {
            Message::Text(text) => parse_reply(text.as_str(), request_id),
            Message::Binary(data) => std::str::from_utf8(data)
                .ok()
                .and_then(|text| parse_reply(text, request_id)),
            Message::Close(frame) => {
                return Err(ConnectorError::Transport(format!(
                    "socket closed by peer: {:?}",
                    frame
                )))
            }
            // Pongs for incoming pings are queued by tungstenite
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        };
        if let Some(result) = parsed {
            return result;
        }
    }
    Err(ConnectorError::Transport("socket closed before reply".into()))
}

impl WebSocketAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            path: config.path.clone(),
            timeout: config.timeout(),
            connection: None,
            stream: None,
            client_authenticated: false,
        }
    }
}

fn handshake_error(url: &Url, err: tungstenite::Error) -> ConnectorError {
    let message = format!("WebSocket connect to {} failed: {}", url, err);
    match &err {
        tungstenite::Error::Http(response) => {
            ConnectorError::from_status(response.status().as_u16(), message)
        }
        _ => ConnectorError::Transport(message),
    }
}

#[async_trait]
impl ProtocolAdapter for WebSocketAdapter {
    async fn connect(&mut self, connection: Arc<PooledConnection>) -> ConnectorResult<()> {
        let url = socket_url(&connection, &self.path)?;
        let connector = connection
            .client_tls()
            .filter(|_| url.scheme() == "wss")
            .map(|config| Connector::Rustls(config.clone()));
        let client_authenticated = connector.is_some();

        let handshake = connect_async_tls_with_config(url.as_str(), None, false, connector);
        let (stream, _) = tokio::time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| ConnectorError::Timeout(self.timeout))?
            .map_err(|e| handshake_error(&url, e))?;

        tracing::debug!(url = %url, client_authenticated, "WebSocket connected");
        self.stream = Some(stream);
        self.client_authenticated = client_authenticated;
        self.connection = Some(connection);
        Ok(())
    }

    async fn send_request(&mut self, request: OutboundRequest) -> ConnectorResult<Value> {
        let connection = connected(&self.connection)?;
        if request.requires_client_cert && !self.client_authenticated {
            return Err(refuse_client_cert(
                AdapterType::WebSocket,
                connection,
                "was opened without a client identity",
            ));
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ConnectorError::Transport("WebSocket is not open".into()))?;

        let request_id = request.request_id.to_string();
        let envelope = json!({
            "request_id": request_id,
            "headers": request.header_map(),
            "payload": request.payload,
        });

        let timeout = self.timeout;
        tokio::time::timeout(timeout, async {
            stream
                .send(Message::Text(envelope.to_string().into()))
                .await
                .map_err(|e| ConnectorError::Transport(e.to_string()))?;
            await_reply(stream, &request_id).await
        })
        .await
        .map_err(|_| ConnectorError::Timeout(timeout))?
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                tracing::debug!(error = %e, "WebSocket close failed");
            }
        }
        self.connection = None;
        self.client_authenticated = false;
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::WebSocket
    }
}
