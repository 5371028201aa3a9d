//! Connection lifecycle around one broker client.

use tracing::{debug, warn};

use crate::broker::Broker;
use crate::errors::BrokerError;

/// Owns one broker client and tracks whether it is connected.
///
/// `start` and `close` are idempotent; `close` marks the manager closed
/// before disconnecting so a failing disconnect is never retried.
pub struct BrokerConnectionManager<B: Broker> {
    broker: B,
    connected: bool,
    subscribe_only: bool,
}

impl<B: Broker> BrokerConnectionManager<B> {
    /// Wrap an unconnected client.
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            connected: false,
            subscribe_only: false,
        }
    }

    /// Connect unless already connected.
    pub async fn start(&mut self) -> Result<(), BrokerError> {
        if self.connected {
            return Ok(());
        }
        if self.subscribe_only {
            self.broker.connect_subscriber().await?;
        } else {
            self.broker.connect().await?;
        }
        self.connected = true;
        debug!(subscribe_only = self.subscribe_only, "broker connected");
        Ok(())
    }

    /// Disconnect if connected.
    pub async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        if let Err(err) = self.broker.disconnect().await {
            warn!(error = %err, "broker disconnect failed");
            return Err(err);
        }
        debug!("broker disconnected");
        Ok(())
    }

    /// An unstarted manager over a duplicate of this client.
    pub fn duplicate(&self) -> Self {
        Self::new(self.broker.duplicate())
    }

    /// Like [`duplicate`](Self::duplicate), but `start` opens a
    /// subscribe-only connection.
    pub fn duplicate_for_subscribe(&self) -> Self {
        Self {
            subscribe_only: true,
            ..self.duplicate()
        }
    }

    /// Whether `start` succeeded and `close` has not run since.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The underlying client.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// The underlying client, for subscribe/publish calls.
    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use futures::StreamExt;
    use parking_lot::Mutex;

    use crate::broker::Subscription;
    use crate::memory::MemoryBroker;

    #[tokio::test]
    async fn start_and_close_are_idempotent() {
        let broker = MemoryBroker::new();
        let mut mgr = BrokerConnectionManager::new(broker.clone());

        mgr.start().await.unwrap();
        mgr.start().await.unwrap();
        assert!(mgr.is_connected());
        assert_eq!(broker.stats().connects, 1);

        mgr.close().await.unwrap();
        mgr.close().await.unwrap();
        assert!(!mgr.is_connected());
        assert_eq!(broker.stats().disconnects, 1);
    }

    #[tokio::test]
    async fn close_without_start_does_nothing() {
        let broker = MemoryBroker::new();
        let mut mgr = BrokerConnectionManager::new(broker.clone());
        mgr.close().await.unwrap();
        assert_eq!(broker.stats().disconnects, 0);
    }

    #[tokio::test]
    async fn failed_start_leaves_manager_disconnected() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let mut mgr = BrokerConnectionManager::new(broker.clone());
        assert_matches!(mgr.start().await, Err(BrokerError::Connect(_)));
        assert!(!mgr.is_connected());

        broker.set_available(true);
        mgr.start().await.unwrap();
        assert!(mgr.is_connected());
    }

    #[tokio::test]
    async fn duplicate_is_unstarted_and_independent() {
        let broker = MemoryBroker::new();
        let mut base = BrokerConnectionManager::new(broker.clone());
        base.start().await.unwrap();

        let mut dup = base.duplicate();
        assert!(!dup.is_connected());
        dup.start().await.unwrap();
        dup.close().await.unwrap();
        assert!(base.is_connected());
        assert_eq!(broker.stats().connects, 2);
    }

    /// Records which connect path each client took.
    #[derive(Default)]
    struct RoleBroker {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Broker for RoleBroker {
        async fn connect(&mut self) -> Result<(), BrokerError> {
            self.log.lock().push("connect");
            Ok(())
        }

        async fn connect_subscriber(&mut self) -> Result<(), BrokerError> {
            self.log.lock().push("connect_subscriber");
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn duplicate(&self) -> Self {
            Self {
                log: Arc::clone(&self.log),
            }
        }

        async fn subscribe(&mut self, _channel: &str) -> Result<Subscription, BrokerError> {
            Ok(futures::stream::empty().boxed())
        }

        async fn unsubscribe(&mut self, _channel: &str) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn publish(&mut self, _channel: &str, _payload: &str) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn subscribe_duplicate_uses_subscriber_connect() {
        let broker = RoleBroker::default();
        let log = Arc::clone(&broker.log);
        let mut base = BrokerConnectionManager::new(broker);
        let mut sub = base.duplicate_for_subscribe();
        let mut plain = sub.duplicate();

        base.start().await.unwrap();
        sub.start().await.unwrap();
        sub.start().await.unwrap();
        plain.start().await.unwrap();
        assert_eq!(*log.lock(), ["connect", "connect_subscriber", "connect"]);
    }

    #[tokio::test]
    async fn memory_subscriber_connect_falls_back_to_connect() {
        let broker = MemoryBroker::new();
        let mut sub = BrokerConnectionManager::new(broker.clone()).duplicate_for_subscribe();
        sub.start().await.unwrap();
        let mut stream = sub.broker_mut().subscribe("sse:channel:m").await.unwrap();

        let mut publisher = broker.duplicate();
        publisher.connect().await.unwrap();
        publisher.publish("sse:channel:m", "x").await.unwrap();
        assert_eq!(stream.next().await.as_deref(), Some("x"));
        assert_eq!(broker.stats().connects, 2);
    }
}
