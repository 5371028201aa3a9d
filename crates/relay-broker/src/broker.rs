//! The broker capability and channel naming.

use async_trait::async_trait;
use futures::stream::BoxStream;
use relay_core::SessionId;

use crate::errors::BrokerError;

/// Prefix of every session channel.
pub const CHANNEL_PREFIX: &str = "sse:channel:";

/// Ordered stream of raw payloads received on one channel.
///
/// The stream ending before `unsubscribe` was called means the broker
/// dropped the connection.
pub type Subscription = BoxStream<'static, String>;

/// Channel carrying messages for `session_id`.
///
/// Both roles derive the channel with this function, so the mapping must
/// stay a pure function of the identifier.
pub fn channel_name(session_id: &SessionId) -> String {
    format!("{CHANNEL_PREFIX}{session_id}")
}

/// A pub/sub broker client.
///
/// One value is one logical connection. A client that has subscribed may
/// not be usable for publishing on every backend, which is why the stream
/// owner subscribes on a [`duplicate`](Broker::duplicate).
#[async_trait]
pub trait Broker: Send + Sync + Sized + 'static {
    /// Open the connection.
    async fn connect(&mut self) -> Result<(), BrokerError>;

    /// Open a connection that will only be used to subscribe.
    ///
    /// Backends whose subscriptions need a different kind of connection
    /// than publishing override this; the default is [`connect`](Broker::connect).
    async fn connect_subscriber(&mut self) -> Result<(), BrokerError> {
        self.connect().await
    }

    /// Close the connection, ending every subscription made through it.
    async fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// A new, unconnected client with the same configuration.
    fn duplicate(&self) -> Self;

    /// Subscribe to `channel`; payloads arrive in publish order.
    async fn subscribe(&mut self, channel: &str) -> Result<Subscription, BrokerError>;

    /// Stop receiving on `channel`. The matching [`Subscription`] ends.
    async fn unsubscribe(&mut self, channel: &str) -> Result<(), BrokerError>;

    /// Publish one payload. Succeeds even when nobody is subscribed.
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<(), BrokerError>;
}
