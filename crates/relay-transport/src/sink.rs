//! Outbound event-stream handle.

use async_trait::async_trait;
use axum::response::sse::Event;
use tokio::sync::{mpsc, oneshot};

use crate::errors::SinkError;

/// Response headers that establish a persistent event stream.
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];

/// Write side of one outbound event stream.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Complete the handshake by handing over the response headers.
    async fn open(&mut self, headers: &[(&'static str, &'static str)]) -> Result<(), SinkError>;

    /// Write one event. May suspend while the peer is slow.
    async fn write(&mut self, event: Event) -> Result<(), SinkError>;

    /// Resolves once the peer has gone away.
    async fn closed(&self);
}

/// [`EventSink`] feeding an `Sse` response through a bounded channel.
pub struct ChannelSink {
    headers: Option<oneshot::Sender<Vec<(&'static str, &'static str)>>>,
    events: mpsc::Sender<Event>,
}

/// HTTP side of a [`ChannelSink`].
pub struct SinkReceiver {
    /// Headers, delivered once the stream is opened.
    pub headers: oneshot::Receiver<Vec<(&'static str, &'static str)>>,
    /// Events in write order; ends when the sink is dropped.
    pub events: mpsc::Receiver<Event>,
}

impl ChannelSink {
    /// Create a sink buffering at most `buffer` events.
    pub fn new(buffer: usize) -> (Self, SinkReceiver) {
        let (headers_tx, headers_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                headers: Some(headers_tx),
                events: events_tx,
            },
            SinkReceiver {
                headers: headers_rx,
                events: events_rx,
            },
        )
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn open(&mut self, headers: &[(&'static str, &'static str)]) -> Result<(), SinkError> {
        let tx = self.headers.take().ok_or(SinkError::AlreadyOpen)?;
        tx.send(headers.to_vec()).map_err(|_| SinkError::Disconnected)
    }

    async fn write(&mut self, event: Event) -> Result<(), SinkError> {
        if self.headers.is_some() {
            return Err(SinkError::NotOpen);
        }
        self.events
            .send(event)
            .await
            .map_err(|_| SinkError::Disconnected)
    }

    async fn closed(&self) {
        self.events.closed().await;
    }
}
