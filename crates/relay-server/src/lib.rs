//! # relay-server
//!
//! Axum HTTP surface for the relay.
//!
//! - `GET <sse_path>`: opens an event stream owned by a stream-owner transport
//! - `POST <message_path>?sessionId=…`: publishes one inbound message through a
//!   forwarder transport, then dispatches it to the method registry
//! - `GET /health` and `GET /metrics`
//! - Graceful shutdown via `CancellationToken`: live streams are closed and the
//!   listener drains

#![deny(unsafe_code)]

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod streams;

pub use errors::ApiError;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
pub use streams::StreamRegistry;
