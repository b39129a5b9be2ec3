//! Reconnecting WebSocket client.
//!
//! This module provides a connection manager that keeps one message-oriented socket alive:
//! it opens the transport, detects loss, and re-establishes it with bounded exponential
//! backoff, while running heartbeats and dispatching to interceptors.
//!
//! # Architecture
//!
//! - [`Client`]: Cloneable handle; the public API
//! - `connection`: Background task owning the transport, timers and interceptors
//! - [`Connector`]: Trait for opening transports, with [`TungsteniteConnector`] as the
//!   default implementation
//! - [`ConnectionInterceptor`] / [`MessageInterceptor`]: Single-slot lifecycle and message
//!   callbacks
//!
//! # Example
//!
//! ```ignore
//! let client = Client::new(config, TungsteniteConnector)?;
//! client.use_connection_interceptor(|open: &OpenEvent| println!("open: {open:?}"));
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
#[cfg(feature = "ws")]
pub mod socket;
mod timer;
pub mod traits;
pub mod transport;

pub use client::Client;
pub use connection::ConnectionState;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
#[cfg(feature = "ws")]
pub use socket::TungsteniteConnector;
pub use traits::*;
