//! # relay-broker
//!
//! Publish/subscribe plumbing shared by both transport roles:
//!
//! - [`Broker`]: the capability every broker client provides
//! - [`BrokerConnectionManager`]: idempotent connect/disconnect around one client
//! - [`channel_name`]: the session-to-channel mapping
//! - [`MemoryBroker`]: in-process hub, used by default and in tests
//! - `RedisBroker`: Redis pub/sub (feature `redis`)

#![deny(unsafe_code)]

pub mod broker;
pub mod errors;
pub mod manager;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_broker;

pub use broker::{Broker, CHANNEL_PREFIX, Subscription, channel_name};
pub use errors::BrokerError;
pub use manager::BrokerConnectionManager;
pub use memory::{MemoryBroker, MemoryBrokerStats};
#[cfg(feature = "redis")]
pub use redis_broker::RedisBroker;
