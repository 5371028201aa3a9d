//! In-process broker.
//!
//! Every clone and duplicate of a [`MemoryBroker`] talks to the same hub, so
//! a stream owner and a forwarder created from one broker reach each other
//! exactly as they would through an external server. The hub can be made
//! unavailable or severed to exercise failure paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};

use crate::broker::{Broker, Subscription};
use crate::errors::BrokerError;

struct Subscriber {
    client: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    publishes: AtomicUsize,
}

struct Hub {
    unavailable: AtomicBool,
    next_client: AtomicU64,
    channels: Mutex<HashMap<String, Vec<Subscriber>>>,
    counters: Counters,
}

/// Snapshot of hub-wide call counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryBrokerStats {
    /// Successful `connect` calls.
    pub connects: usize,
    /// `disconnect` calls.
    pub disconnects: usize,
    /// Successful `subscribe` calls.
    pub subscribes: usize,
    /// `unsubscribe` calls.
    pub unsubscribes: usize,
    /// Successful `publish` calls.
    pub publishes: usize,
}

/// Broker client backed by an in-process hub.
pub struct MemoryBroker {
    hub: Arc<Hub>,
    client: u64,
    connected: bool,
}

impl MemoryBroker {
    /// Create a client on a fresh hub.
    pub fn new() -> Self {
        let hub = Arc::new(Hub {
            unavailable: AtomicBool::new(false),
            next_client: AtomicU64::new(0),
            channels: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        });
        Self::on_hub(hub)
    }

    fn on_hub(hub: Arc<Hub>) -> Self {
        let client = hub.next_client.fetch_add(1, Ordering::Relaxed);
        Self {
            hub,
            client,
            connected: false,
        }
    }

    /// Make the hub refuse (`false`) or accept (`true`) connects and publishes.
    pub fn set_available(&self, available: bool) {
        self.hub.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Drop every subscription on the hub, as a lost broker connection would.
    pub fn sever(&self) {
        let dropped = std::mem::take(&mut *self.hub.channels.lock());
        debug!(channels = dropped.len(), "memory broker severed");
    }

    /// Live subscribers on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.hub
            .channels
            .lock()
            .get(channel)
            .map_or(0, |subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
    }

    /// Hub-wide call counts.
    pub fn stats(&self) -> MemoryBrokerStats {
        let c = &self.hub.counters;
        MemoryBrokerStats {
            connects: c.connects.load(Ordering::SeqCst),
            disconnects: c.disconnects.load(Ordering::SeqCst),
            subscribes: c.subscribes.load(Ordering::SeqCst),
            unsubscribes: c.unsubscribes.load(Ordering::SeqCst),
            publishes: c.publishes.load(Ordering::SeqCst),
        }
    }

    fn is_available(&self) -> bool {
        !self.hub.unavailable.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn drop_own_subscriptions(&self, channel: Option<&str>) {
        let mut channels = self.hub.channels.lock();
        channels.retain(|name, subs| {
            if channel.is_none_or(|c| c == name) {
                subs.retain(|s| s.client != self.client);
            }
            !subs.is_empty()
        });
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A clone is another client on the same hub sharing this client's
/// connection state, like a second handle to one connection.
impl Clone for MemoryBroker {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            client: self.client,
            connected: self.connected,
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        if !self.is_available() {
            return Err(BrokerError::Connect("memory broker unavailable".into()));
        }
        self.connected = true;
        let _ = self.hub.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        let _ = self.hub.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        self.drop_own_subscriptions(None);
        Ok(())
    }

    fn duplicate(&self) -> Self {
        Self::on_hub(Arc::clone(&self.hub))
    }

    async fn subscribe(&mut self, channel: &str) -> Result<Subscription, BrokerError> {
        self.ensure_connected()?;
        if !self.is_available() {
            return Err(BrokerError::Subscribe {
                channel: channel.to_owned(),
                message: "memory broker unavailable".into(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub
            .channels
            .lock()
            .entry(channel.to_owned())
            .or_default()
            .push(Subscriber {
                client: self.client,
                tx,
            });
        let _ = self.hub.counters.subscribes.fetch_add(1, Ordering::SeqCst);
        trace!(channel, client = self.client, "memory subscribe");
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn unsubscribe(&mut self, channel: &str) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        let _ = self.hub.counters.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.drop_own_subscriptions(Some(channel));
        trace!(channel, client = self.client, "memory unsubscribe");
        Ok(())
    }

    async fn publish(&mut self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        if !self.is_available() {
            return Err(BrokerError::Publish {
                channel: channel.to_owned(),
                message: "memory broker unavailable".into(),
            });
        }
        let mut channels = self.hub.channels.lock();
        if let Some(subs) = channels.get_mut(channel) {
            subs.retain(|s| s.tx.send(payload.to_owned()).is_ok());
            if subs.is_empty() {
                let _ = channels.remove(channel);
            }
        }
        drop(channels);
        let _ = self.hub.counters.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
