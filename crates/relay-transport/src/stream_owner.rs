//! Subscribe-role transport.
//!
//! A [`StreamOwnerTransport`] owns one outbound event stream. It mints the
//! session id, subscribes to the session channel on a dedicated broker
//! connection, announces the message endpoint, then forwards every valid
//! message published on the channel to the stream in broker order.
//!
//! Lifecycle: `Created → Connected → Subscribed → Streaming → Closed`.

use std::sync::Arc;

use axum::response::sse::Event;
use futures::StreamExt;
use metrics::counter;
use relay_broker::{Broker, BrokerConnectionManager, BrokerError, Subscription, channel_name};
use relay_core::SessionId;
use relay_rpc::{JsonRpcMessage, MessageError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::errors::TransportError;
use crate::sink::{EventSink, STREAM_HEADERS};
use crate::sse::{endpoint_event, message_event};

/// Callback invoked on broker-level failures.
pub type ErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Messages a [`StreamHandle`] can queue before `send` suspends.
const OUTBOX_CAPACITY: usize = 32;

/// Lifecycle state of a [`StreamOwnerTransport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed, nothing opened yet.
    Created,
    /// Base broker connection established.
    Connected,
    /// Dedicated connection subscribed to the session channel.
    Subscribed,
    /// Handshake written; messages flow.
    Streaming,
    /// Torn down.
    Closed,
}

impl StreamState {
    /// Lowercase name, for errors and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        }
    }
}

/// Cloneable handle to a running transport, usable from other tasks.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    session_id: SessionId,
    cancel: CancellationToken,
    outbox: mpsc::Sender<JsonRpcMessage>,
}

impl StreamHandle {
    /// Session served by the transport.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Ask the transport to close. Its delivery loop exits and releases the
    /// broker connections.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether close has been requested or has happened.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue a message for direct delivery to the stream, bypassing the
    /// broker. Delivered by the running delivery loop.
    pub async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::lifecycle("send", StreamState::Closed.as_str()));
        }
        self.outbox
            .send(message)
            .await
            .map_err(|_| TransportError::lifecycle("send", StreamState::Closed.as_str()))
    }
}

/// Transport owning one outbound event stream.
pub struct StreamOwnerTransport<B: Broker, S: EventSink> {
    session_id: SessionId,
    channel: String,
    message_path: String,
    base: BrokerConnectionManager<B>,
    subscriber: BrokerConnectionManager<B>,
    subscription: Option<Subscription>,
    subscribed: bool,
    sink: S,
    state: StreamState,
    on_error: Option<ErrorCallback>,
    cancel: CancellationToken,
    outbox_tx: mpsc::Sender<JsonRpcMessage>,
    outbox_rx: Option<mpsc::Receiver<JsonRpcMessage>>,
    span: Span,
}

impl<B: Broker, S: EventSink> StreamOwnerTransport<B, S> {
    /// Create a transport writing to `sink` and announcing `message_path`.
    ///
    /// The session id is minted here. The subscription uses a subscribe-only
    /// duplicate of `base`, so the two connections never share a handle.
    pub fn new(base: BrokerConnectionManager<B>, sink: S, message_path: impl Into<String>) -> Self {
        let session_id = SessionId::new();
        let channel = channel_name(&session_id);
        let span = info_span!("stream_owner", session_id = %session_id);
        let subscriber = base.duplicate_for_subscribe();
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        Self {
            session_id,
            channel,
            message_path: message_path.into(),
            base,
            subscriber,
            subscription: None,
            subscribed: false,
            sink,
            state: StreamState::Created,
            on_error: None,
            cancel: CancellationToken::new(),
            outbox_tx,
            outbox_rx: Some(outbox_rx),
            span,
        }
    }

    /// Emit diagnostics inside `span` instead of the default
    /// `stream_owner` span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Register the callback invoked on broker-level failures.
    pub fn on_error(&mut self, callback: impl Fn(&TransportError) + Send + Sync + 'static) {
        self.on_error = Some(Arc::new(callback));
    }

    /// The minted session id.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The subscribed channel.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// A handle for closing or messaging this transport from elsewhere.
    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            session_id: self.session_id.clone(),
            cancel: self.cancel.clone(),
            outbox: self.outbox_tx.clone(),
        }
    }

    /// Connect, subscribe, and write the stream handshake.
    ///
    /// On failure everything opened so far is released, the error callback
    /// runs for broker failures, and the transport ends up closed.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        let span = self.span.clone();
        self.start_inner().instrument(span).await
    }

    async fn start_inner(&mut self) -> Result<(), TransportError> {
        if self.state != StreamState::Created {
            return Err(TransportError::lifecycle("start", self.state.as_str()));
        }
        if let Err(err) = self.open().await {
            error!(error = %err, "stream start failed");
            self.report(&err);
            if let Err(close_err) = self.close_inner().await {
                warn!(error = %close_err, "cleanup after failed start also failed");
            }
            return Err(err);
        }
        info!(channel = %self.channel, "stream open");
        Ok(())
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.base.start().await?;
        self.state = StreamState::Connected;

        self.subscriber.start().await?;
        let subscription = self.subscriber.broker_mut().subscribe(&self.channel).await?;
        self.subscription = Some(subscription);
        self.subscribed = true;
        self.state = StreamState::Subscribed;

        self.sink.open(&STREAM_HEADERS).await?;
        let announce = endpoint_event(&self.message_path, &self.session_id);
        self.write_event(announce).await?;
        self.state = StreamState::Streaming;
        Ok(())
    }

    /// Deliver until the peer disconnects, the broker drops the
    /// subscription, or close is requested; then close.
    ///
    /// Returns the broker error when the subscription was lost.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<(), TransportError> {
        if self.state != StreamState::Streaming {
            return Err(TransportError::lifecycle("run", self.state.as_str()));
        }
        let (Some(mut subscription), Some(mut outbox)) =
            (self.subscription.take(), self.outbox_rx.take())
        else {
            return Err(TransportError::lifecycle("run", "running"));
        };
        let cancel = self.cancel.clone();

        let outcome = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("close requested");
                    break Ok(());
                }
                () = self.sink.closed() => {
                    debug!("peer disconnected");
                    break Ok(());
                }
                payload = subscription.next() => {
                    let Some(payload) = payload else {
                        let err = TransportError::Connection(BrokerError::SubscriptionLost {
                            channel: self.channel.clone(),
                        });
                        error!(error = %err, "broker dropped subscription");
                        self.report(&err);
                        break Err(err);
                    };
                    if let Err(err) = self.deliver(&payload).await {
                        debug!(error = %err, "stream write failed");
                        break Ok(());
                    }
                }
                Some(message) = outbox.recv() => {
                    if let Err(err) = self.write_message(&message).await {
                        debug!(error = %err, "stream write failed");
                        break Ok(());
                    }
                }
            }
        };

        drop(subscription);
        let closed = self.close_inner().await;
        outcome.and(closed)
    }

    async fn deliver(&mut self, payload: &str) -> Result<(), TransportError> {
        match JsonRpcMessage::from_json(payload) {
            Ok(message) => {
                self.write_message(&message).await?;
                counter!("relay_messages_delivered_total").increment(1);
                Ok(())
            }
            Err(err) => {
                warn!(channel = %self.channel, error = %err, "dropping malformed broker payload");
                counter!("relay_messages_dropped_total", "reason" => "malformed").increment(1);
                Ok(())
            }
        }
    }

    /// Write `message` straight to the stream without the broker.
    pub async fn send(&mut self, message: &JsonRpcMessage) -> Result<(), TransportError> {
        if self.state != StreamState::Streaming {
            return Err(TransportError::lifecycle("send", self.state.as_str()));
        }
        let span = self.span.clone();
        self.write_message(message).instrument(span).await
    }

    async fn write_message(&mut self, message: &JsonRpcMessage) -> Result<(), TransportError> {
        let json = message
            .to_json()
            .map_err(|e| TransportError::Decode(MessageError::from(e).into()))?;
        self.write_event(message_event(&json)).await
    }

    async fn write_event(&mut self, event: Event) -> Result<(), TransportError> {
        self.sink.write(event).await?;
        Ok(())
    }

    /// Unsubscribe, release the dedicated connection, then the base one.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned and reported. Closing a closed transport does nothing.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let span = self.span.clone();
        self.close_inner().instrument(span).await
    }

    async fn close_inner(&mut self) -> Result<(), TransportError> {
        if self.state == StreamState::Closed {
            return Ok(());
        }
        self.state = StreamState::Closed;
        self.cancel.cancel();
        self.subscription = None;

        let unsubscribed = if std::mem::take(&mut self.subscribed) {
            self.subscriber.broker_mut().unsubscribe(&self.channel).await
        } else {
            Ok(())
        };
        let released = self.subscriber.close().await;
        let disconnected = self.base.close().await;

        match unsubscribed.and(released).and(disconnected) {
            Ok(()) => {
                info!("stream closed");
                Ok(())
            }
            Err(err) => {
                let err = TransportError::Connection(err);
                warn!(error = %err, "stream closed with errors");
                self.report(&err);
                Err(err)
            }
        }
    }

    fn report(&self, err: &TransportError) {
        if !matches!(err, TransportError::Connection(_)) {
            return;
        }
        if let Some(callback) = &self.on_error {
            callback(err);
        }
    }
}
