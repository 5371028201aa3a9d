//! Broker error type.

/// Failure reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The operation needs a connection that has not been established.
    #[error("broker client is not connected")]
    NotConnected,

    /// Establishing the connection failed.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// Subscribing to a channel failed.
    #[error("subscribe to {channel} failed: {message}")]
    Subscribe {
        /// Channel name.
        channel: String,
        /// Underlying cause.
        message: String,
    },

    /// Publishing to a channel failed.
    #[error("publish to {channel} failed: {message}")]
    Publish {
        /// Channel name.
        channel: String,
        /// Underlying cause.
        message: String,
    },

    /// The broker ended a subscription that was never unsubscribed.
    #[error("subscription to {channel} lost")]
    SubscriptionLost {
        /// Channel name.
        channel: String,
    },

    /// Disconnecting failed.
    #[error("broker disconnect failed: {0}")]
    Disconnect(String),
}
