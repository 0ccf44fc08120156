//! # praxis-realtime
//!
//! Session-gated streaming connection lifecycle:
//!
//! - [`Transport`]: one-handshake-per-call connection contract, with the
//!   production WebSocket implementation [`WsTransport`]
//! - [`ConnectionHandle`]: one live connection plus its supervised
//!   bounded reconnect loop
//! - [`ConnectionRegistry`]: the process's single connection slot, with
//!   request coalescing for concurrent acquires
//! - [`LifecycleController`]: keeps the connection in lock-step with the
//!   current session and publishes a consistent [`ConnectionView`]
//!
//! [`testutil`] provides the scripted in-memory transport used by this
//! crate's own tests and by downstream integration tests.

#![deny(unsafe_code)]

pub mod controller;
pub mod errors;
pub mod handle;
pub mod registry;
pub mod testutil;
pub mod transport;

pub use controller::{ConnectionView, LifecycleController, LinkState};
pub use errors::ConnectError;
pub use handle::{ConnectionHandle, TransportPhase};
pub use registry::{ConnectionRegistry, RealtimeConfig};
pub use transport::{LinkEvent, Transport, TransportLink, WsTransport};
