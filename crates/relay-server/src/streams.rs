//! Live event streams indexed by session id.

use std::collections::HashMap;

use metrics::{counter, gauge};
use parking_lot::RwLock;
use relay_core::SessionId;
use relay_transport::StreamHandle;
use tracing::debug;

use crate::metrics::{STREAMS_ACTIVE, STREAMS_TOTAL};

/// Handles of the stream-owner transports currently running.
#[derive(Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<SessionId, StreamHandle>>,
}

impl StreamRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a running stream.
    pub fn add(&self, handle: StreamHandle) {
        let count = {
            let mut streams = self.streams.write();
            let _ = streams.insert(handle.session_id().clone(), handle);
            streams.len()
        };
        counter!(STREAMS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!(STREAMS_ACTIVE).set(count as f64);
    }

    /// Stop tracking a stream. Returns its handle if it was tracked.
    pub fn remove(&self, session_id: &SessionId) -> Option<StreamHandle> {
        let (removed, count) = {
            let mut streams = self.streams.write();
            let removed = streams.remove(session_id);
            (removed, streams.len())
        };
        #[allow(clippy::cast_precision_loss)]
        gauge!(STREAMS_ACTIVE).set(count as f64);
        removed
    }

    /// Number of tracked streams.
    pub fn count(&self) -> usize {
        self.streams.read().len()
    }

    /// Ask every tracked stream to close. Returns how many were asked.
    ///
    /// Streams deregister themselves once their delivery loop has exited.
    pub fn close_all(&self) -> usize {
        let streams = self.streams.read();
        for handle in streams.values() {
            handle.close();
        }
        debug!(count = streams.len(), "closing all streams");
        streams.len()
    }
}
