//! Publish-role transport.
//!
//! One [`ForwarderTransport`] serves exactly one inbound request: it decodes
//! the body, connects, publishes on the session channel, and disconnects.
//! Delivery is fire-and-forget; publishing to a channel nobody listens on
//! succeeds.
//!
//! Lifecycle: `Created → Started → Published → Closed`.

use metrics::counter;
use relay_broker::{Broker, BrokerConnectionManager, channel_name};
use relay_core::SessionId;
use relay_rpc::{JsonRpcMessage, MessageError};
use serde_json::Value;
use tracing::{Instrument, Span, debug, info_span, warn};

use crate::decode::{decode_body, decode_value};
use crate::errors::{DecodeError, TransportError};

/// Lifecycle state of a [`ForwarderTransport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwarderState {
    /// Constructed, no connection.
    Created,
    /// Broker connection established.
    Started,
    /// Message handed to the broker.
    Published,
    /// Connection released; the instance is spent.
    Closed,
}

impl ForwarderState {
    /// Lowercase name, for errors and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Published => "published",
            Self::Closed => "closed",
        }
    }
}

/// Transport publishing one inbound message to a session channel.
pub struct ForwarderTransport<B: Broker> {
    session_id: SessionId,
    channel: String,
    manager: BrokerConnectionManager<B>,
    state: ForwarderState,
    span: Span,
}

impl<B: Broker> ForwarderTransport<B> {
    /// Create a forwarder for `session_id` over an unstarted manager.
    pub fn new(manager: BrokerConnectionManager<B>, session_id: SessionId) -> Self {
        let channel = channel_name(&session_id);
        let span = info_span!("forwarder", session_id = %session_id);
        Self {
            session_id,
            channel,
            manager,
            state: ForwarderState::Created,
            span,
        }
    }

    /// Emit diagnostics inside `span` instead of the default `forwarder` span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Target session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Target channel.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ForwarderState {
        self.state
    }

    /// Decode a raw body and publish it.
    ///
    /// Decode failures return before any broker connection is opened. The
    /// decoded message is returned for dispatch.
    pub async fn handle_post(
        &mut self,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<JsonRpcMessage, TransportError> {
        let decoded = decode_body(content_type, body);
        self.publish_decoded(decoded).await
    }

    /// Validate a pre-parsed body and publish it.
    pub async fn handle_value(&mut self, value: Value) -> Result<JsonRpcMessage, TransportError> {
        let decoded = decode_value(value);
        self.publish_decoded(decoded).await
    }

    async fn publish_decoded(
        &mut self,
        decoded: Result<JsonRpcMessage, DecodeError>,
    ) -> Result<JsonRpcMessage, TransportError> {
        let message = match decoded {
            Ok(message) => message,
            Err(err) => {
                let _enter = self.span.enter();
                debug!(error = %err, "rejecting inbound message");
                counter!("relay_decode_errors_total").increment(1);
                return Err(err.into());
            }
        };
        self.send(&message).await?;
        Ok(message)
    }

    /// Connect if needed, publish, then close.
    ///
    /// The connection is closed whether or not the publish succeeded. A
    /// forwarder publishes at most once; later calls are lifecycle errors.
    pub async fn send(&mut self, message: &JsonRpcMessage) -> Result<(), TransportError> {
        let span = self.span.clone();
        self.send_inner(message).instrument(span).await
    }

    async fn send_inner(&mut self, message: &JsonRpcMessage) -> Result<(), TransportError> {
        if self.state != ForwarderState::Created {
            return Err(TransportError::lifecycle("send", self.state.as_str()));
        }
        let payload = message
            .to_json()
            .map_err(|e| TransportError::Decode(MessageError::from(e).into()))?;

        let published = self.publish(&payload).await;
        if let Err(err) = &published {
            warn!(channel = %self.channel, error = %err, "publish failed");
        }
        let closed = self.close_inner().await;
        published.and(closed)
    }

    async fn publish(&mut self, payload: &str) -> Result<(), TransportError> {
        self.manager.start().await?;
        self.state = ForwarderState::Started;
        self.manager
            .broker_mut()
            .publish(&self.channel, payload)
            .await?;
        self.state = ForwarderState::Published;
        counter!("relay_messages_published_total").increment(1);
        debug!(channel = %self.channel, bytes = payload.len(), "message published");
        Ok(())
    }

    /// Release the broker connection. Closing twice does nothing.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let span = self.span.clone();
        self.close_inner().instrument(span).await
    }

    async fn close_inner(&mut self) -> Result<(), TransportError> {
        if self.state == ForwarderState::Closed {
            return Ok(());
        }
        self.state = ForwarderState::Closed;
        self.manager.close().await?;
        Ok(())
    }
}
