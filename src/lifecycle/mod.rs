//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast → health monitor and other background tasks exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → resolve shutdown_signal() → caller triggers Shutdown
//! ```
//!
//! # Design Decisions
//! - Background tasks never outlive their coordinator's broadcast
//! - Signal handling stays in the binary; the library only sees the broadcast

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
