//! Resilient Data-Provider connector.
//!
//! # Architecture Overview
//!
//! ```text
//!   VerificationRequest
//!          │
//!          ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                        DpConnector                           │
//!   │                                                              │
//!   │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//!   │  │   circuit    │──▶│ retry policy │──▶│ connection pool  │  │
//!   │  │   breaker    │   │  + backoff   │   │ + load balancer  │  │
//!   │  └──────────────┘   └──────────────┘   └────────┬─────────┘  │
//!   │                                                 │            │
//!   │                                                 ▼            │
//!   │                     ┌──────────────┐   ┌──────────────────┐  │
//!   │                     │authenticator │──▶│ protocol adapter │──┼──▶ Data Provider
//!   │                     └──────────────┘   │ REST/GraphQL/    │  │
//!   │                                        │ gRPC/WebSocket   │  │
//!   │                                        └──────────────────┘  │
//!   │                                                              │
//!   │  Cross-cutting: config, health, observability, lifecycle     │
//!   └──────────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//!   DpResponse / ConnectorError
//! ```

// Core subsystems
pub mod adapters;
pub mod auth;
pub mod config;
pub mod connector;
pub mod error;

// Traffic management
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ConnectorConfig;
pub use connector::{DpConnector, DpResponse, DpStats, HealthReport, VerificationRequest};
pub use error::{ConnectorError, ConnectorResult};
pub use lifecycle::Shutdown;
