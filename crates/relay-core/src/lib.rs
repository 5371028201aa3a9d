//! # relay-core
//!
//! Shared vocabulary for the relay crates:
//!
//! - **Branded IDs**: [`SessionId`] (the routing key between the stream-owner and
//!   forwarder roles) and [`ForwarderId`] (one per inbound request)
//! - **Logging**: `tracing` subscriber bootstrap and in-memory capture for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{ForwarderId, IdError, SessionId};
