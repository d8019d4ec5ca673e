//! gRPC unary calls over a persistent HTTP/2 channel.
//!
//! Messages use the gRPC length-prefixed framing with a JSON codec
//! (`application/grpc+json`), so no generated stubs are involved.
//! Only plaintext (h2c) channels are supported, so requests that need a
//! client certificate are refused.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode, Uri};
use serde_json::Value;

use crate::adapters::{connected, refuse_client_cert, ProtocolAdapter};
use crate::config::{AdapterConfig, AdapterType};
use crate::connector::types::OutboundRequest;
use crate::error::{ConnectorError, ConnectorResult};
use crate::load_balancer::PooledConnection;

pub const GRPC_JSON_CONTENT_TYPE: &str = "application/grpc+json";
const FRAME_HEADER_LEN: usize = 5;

const GRPC_PERMISSION_DENIED: u32 = 7;
const GRPC_UNAUTHENTICATED: u32 = 16;

/// Prefix `message` with the uncompressed flag and its big-endian length.
pub fn encode_frame(message: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + message.len());
    frame.put_u8(0);
    frame.put_u32(message.len() as u32);
    frame.put_slice(message);
    frame.freeze()
}

/// Extract the single message of a unary response body.
pub fn decode_frame(body: &[u8]) -> ConnectorResult<&[u8]> {
    if body.len() < FRAME_HEADER_LEN {
        return Err(ConnectorError::protocol(None, "truncated gRPC frame"));
    }
    if body[0] != 0 {
        return Err(ConnectorError::protocol(None, "compressed gRPC messages are not supported"));
    }
    let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    body.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)
        .ok_or_else(|| ConnectorError::protocol(None, "gRPC frame shorter than its length prefix"))
}

/// `grpc-status` and `grpc-message`, looked up in trailers first.
fn grpc_status(headers: &HeaderMap, trailers: Option<&HeaderMap>) -> Option<(u32, String)> {
    let source = trailers
        .filter(|t| t.contains_key("grpc-status"))
        .unwrap_or(headers);
    let code = source.get("grpc-status")?.to_str().ok()?.trim().parse().ok()?;
    let message = source
        .get("grpc-message")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}

#[derive(Debug)]
pub struct GrpcAdapter {
    method: String,
    timeout: Duration,
    connection: Option<Arc<PooledConnection>>,
}

impl GrpcAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            method: config.grpc_method.clone(),
            timeout: config.timeout(),
            connection: None,
        }
    }

    async fn call(
        &self,
        connection: &PooledConnection,
        request: OutboundRequest,
    ) -> ConnectorResult<Value> {
        let message = serde_json::to_vec(&request.payload)
            .map_err(|e| ConnectorError::Serialization(e.to_string()))?;
        let uri: Uri = connection
            .url_for(&self.method)
            .as_str()
            .parse()
            .map_err(|e| ConnectorError::InvalidConfig(format!("invalid gRPC URI: {}", e)))?;

        let mut http_request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, GRPC_JSON_CONTENT_TYPE)
            .header("te", "trailers")
            .header("grpc-timeout", format!("{}m", self.timeout.as_millis()))
            .header("x-request-id", request.request_id.to_string())
            .body(Full::new(encode_frame(&message)))
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        http_request.headers_mut().extend(request.headers);

        let response = connection
            .h2_channel()
            .request(http_request)
            .await
            .map_err(|e| ConnectorError::Transport(format!("gRPC channel error: {}", e)))?;

        let status = response.status();
        let (parts, body) = response.into_parts();
        if status != StatusCode::OK {
            return Err(ConnectorError::from_status(
                status.as_u16(),
                format!("gRPC endpoint returned HTTP {}", status),
            ));
        }

        let collected = body
            .collect()
            .await
            .map_err(|e| ConnectorError::Transport(format!("gRPC body error: {}", e)))?;
        let trailers = collected.trailers().cloned();

        match grpc_status(&parts.headers, trailers.as_ref()) {
            Some((0, _)) => {}
            Some((code @ (GRPC_UNAUTHENTICATED | GRPC_PERMISSION_DENIED), message)) => {
                return Err(ConnectorError::rejected(format!("grpc-status {}: {}", code, message)))
            }
            Some((code, message)) => {
                return Err(ConnectorError::protocol(
                    Some(status.as_u16()),
                    format!("grpc-status {}: {}", code, message),
                ))
            }
            None => {
                return Err(ConnectorError::protocol(Some(status.as_u16()), "missing grpc-status"))
            }
        }

        let bytes = collected.to_bytes();
        let message = decode_frame(&bytes)?;
        serde_json::from_slice(message)
            .map_err(|e| ConnectorError::protocol(None, format!("undecodable gRPC message: {}", e)))
    }
}

#[async_trait]
impl ProtocolAdapter for GrpcAdapter {
    async fn connect(&mut self, connection: Arc<PooledConnection>) -> ConnectorResult<()> {
        if connection.base_url().scheme() != "http" {
            return Err(ConnectorError::InvalidConfig(format!(
                "gRPC adapter supports plaintext HTTP/2 only, got {}",
                connection.host()
            )));
        }
        connection.h2_channel();
        self.connection = Some(connection);
        Ok(())
    }

    async fn send_request(&mut self, request: OutboundRequest) -> ConnectorResult<Value> {
        let connection = connected(&self.connection)?.clone();
        if request.requires_client_cert {
            return Err(refuse_client_cert(AdapterType::Grpc, &connection, "is plaintext h2c"));
        }

        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.call(&connection, request))
            .await
            .map_err(|_| ConnectorError::Timeout(timeout))?
    }

    async fn close(&mut self) {
        self.connection = None;
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Grpc
    }
}
