//! # relay-transport
//!
//! The two transport roles that route JSON-RPC messages between an event
//! stream and inbound HTTP requests through a pub/sub broker:
//!
//! - [`StreamOwnerTransport`]: owns the outbound event stream, mints the
//!   session id, subscribes to the session channel and forwards what arrives
//! - [`ForwarderTransport`]: decodes one inbound message and publishes it on
//!   the session channel, then releases its broker connection
//!
//! Supporting pieces: the [`sse`] events, the [`EventSink`] stream handle,
//! and inbound body decoding in [`decode`].

#![deny(unsafe_code)]

pub mod decode;
pub mod errors;
pub mod forwarder;
pub mod sink;
pub mod sse;
pub mod stream_owner;

pub use decode::{decode_body, decode_value};
pub use errors::{DecodeError, SinkError, TransportError};
pub use forwarder::{ForwarderState, ForwarderTransport};
pub use sink::{ChannelSink, EventSink, STREAM_HEADERS, SinkReceiver};
pub use sse::{endpoint_event, message_event};
pub use stream_owner::{ErrorCallback, StreamHandle, StreamOwnerTransport, StreamState};
