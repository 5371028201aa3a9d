//! Redis pub/sub broker.
//!
//! Publishing goes through a multiplexed connection. Each subscription runs
//! on its own pub/sub connection driven by a task that forwards messages
//! until it is told to unsubscribe or the connection drops. A client
//! connected with `connect_subscriber` opens only the pub/sub connection and
//! hands it to its first subscription.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use redis::aio::{MultiplexedConnection, PubSub};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use crate::broker::{Broker, Subscription};
use crate::errors::BrokerError;

/// How long `unsubscribe` waits for the subscription task to acknowledge.
const UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

type StopSignal = oneshot::Sender<oneshot::Sender<()>>;

/// Broker client for a Redis server.
pub struct RedisBroker {
    client: redis::Client,
    connected: bool,
    publisher: Option<MultiplexedConnection>,
    // Behind a mutex only to keep the client `Sync`; reached via `get_mut`.
    idle_pubsub: Mutex<Option<PubSub>>,
    subscriptions: HashMap<String, StopSignal>,
}

impl RedisBroker {
    /// Create an unconnected client for `url` (`redis://` or `rediss://`).
    pub fn new(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url).map_err(|e| BrokerError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            connected: false,
            publisher: None,
            idle_pubsub: Mutex::new(None),
            subscriptions: HashMap::new(),
        })
    }

    fn publisher(&mut self) -> Result<&mut MultiplexedConnection, BrokerError> {
        self.publisher.as_mut().ok_or(BrokerError::NotConnected)
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}

async fn pump(
    mut pubsub: redis::aio::PubSub,
    channel: String,
    tx: mpsc::UnboundedSender<String>,
    mut stop: oneshot::Receiver<oneshot::Sender<()>>,
) {
    let ack = {
        let mut messages = std::pin::pin!(pubsub.on_message());
        loop {
            tokio::select! {
                ack = &mut stop => break ack.ok(),
                msg = messages.next() => match msg {
                    Some(msg) => match msg.get_payload::<String>() {
                        Ok(payload) => {
                            if tx.send(payload).is_err() {
                                break None;
                            }
                        }
                        Err(err) => warn!(channel, error = %err, "dropping non-text payload"),
                    },
                    None => {
                        warn!(channel, "redis subscription connection closed");
                        break None;
                    }
                },
            }
        }
    };

    if let Some(ack) = ack {
        if let Err(err) = pubsub.unsubscribe(&channel).await {
            warn!(channel, error = %err, "redis unsubscribe failed");
        }
        let _ = ack.send(());
    }
    debug!(channel, "redis subscription task finished");
}

#[async_trait]
impl Broker for RedisBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        self.publisher = Some(conn);
        self.connected = true;
        Ok(())
    }

    async fn connect_subscriber(&mut self) -> Result<(), BrokerError> {
        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        *self.idle_pubsub.get_mut() = Some(pubsub);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        // Dropping the stop senders ends every pump task, which drops its
        // pub/sub connection.
        self.subscriptions.clear();
        self.publisher = None;
        *self.idle_pubsub.get_mut() = None;
        self.connected = false;
        Ok(())
    }

    fn duplicate(&self) -> Self {
        Self {
            client: self.client.clone(),
            connected: false,
            publisher: None,
            idle_pubsub: Mutex::new(None),
            subscriptions: HashMap::new(),
        }
    }

    async fn subscribe(&mut self, channel: &str) -> Result<Subscription, BrokerError> {
        self.ensure_connected()?;
        let sub_err = |e: redis::RedisError| BrokerError::Subscribe {
            channel: channel.to_owned(),
            message: e.to_string(),
        };
        let mut pubsub = match self.idle_pubsub.get_mut().take() {
            Some(pubsub) => pubsub,
            None => self.client.get_async_pubsub().await.map_err(sub_err)?,
        };
        pubsub.subscribe(channel).await.map_err(sub_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let _ = tokio::spawn(pump(pubsub, channel.to_owned(), tx, stop_rx));
        let _ = self.subscriptions.insert(channel.to_owned(), stop_tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn unsubscribe(&mut self, channel: &str) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        let Some(stop) = self.subscriptions.remove(channel) else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if stop.send(ack_tx).is_err() {
            // Task already gone: the connection dropped earlier.
            return Ok(());
        }
        if tokio::time::timeout(UNSUBSCRIBE_TIMEOUT, ack_rx).await.is_err() {
            warn!(channel, "redis unsubscribe not acknowledged in time");
        }
        Ok(())
    }

    async fn publish(&mut self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let conn = self.publisher()?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(conn)
            .await
            .map_err(|e| BrokerError::Publish {
                channel: channel.to_owned(),
                message: e.to_string(),
            })?;
        debug!(channel, receivers, "published");
        Ok(())
    }
}
