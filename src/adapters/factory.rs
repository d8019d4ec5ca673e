//! Adapter construction.

use crate::adapters::{DpAdapter, GraphQlAdapter, GrpcAdapter, RestAdapter, WebSocketAdapter};
use crate::config::{AdapterConfig, AdapterType};

pub struct AdapterFactory;

impl AdapterFactory {
    /// Build the adapter selected by `config.adapter_type`.
    pub fn create(config: &AdapterConfig) -> DpAdapter {
        Self::for_type(config.adapter_type, config)
    }

    /// Build an adapter from a type name. Unknown names get the REST adapter.
    pub fn from_name(name: &str, config: &AdapterConfig) -> DpAdapter {
        Self::for_type(AdapterType::from(name), config)
    }

    fn for_type(adapter_type: AdapterType, config: &AdapterConfig) -> DpAdapter {
        match adapter_type {
            AdapterType::Rest => DpAdapter::Rest(RestAdapter::new(config)),
            AdapterType::GraphQl => DpAdapter::GraphQl(GraphQlAdapter::new(config)),
            AdapterType::Grpc => DpAdapter::Grpc(GrpcAdapter::new(config)),
            AdapterType::WebSocket => DpAdapter::WebSocket(WebSocketAdapter::new(config)),
        }
    }
}
