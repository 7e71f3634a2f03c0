//! Correlation demultiplexer.
//!
//! Maps correlation ids to waiting callers. Removal is atomic with lookup,
//! so a response arriving from the read loop and a timeout firing for the
//! same id can never both resolve one entry: whoever removes it resolves
//! it. A background sweep fails entries that outlive the configured max
//! age, and shutdown fails everything still pending.
//!
//! Leader and follower traffic use independent id spaces, so a handler
//! owns one `DemuxMap` per channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::{Result, RoomzinError};
use crate::protocol::RawResult;

/// A caller waiting for the response matching one correlation id.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    /// Completion channel; consumed by the unique resolver.
    pub tx: oneshot::Sender<Result<RawResult>>,
    /// When the request was written, for latency samples and sweeping.
    pub sent_at: Instant,
}

impl PendingRequest {
    pub fn new(tx: oneshot::Sender<Result<RawResult>>) -> Self {
        Self {
            tx,
            sent_at: Instant::now(),
        }
    }
}

/// Registry of in-flight requests for one correlation-id space.
pub(crate) struct DemuxMap {
    entries: Mutex<HashMap<u32, PendingRequest>>,
    max_age: Duration,
}

impl DemuxMap {
    /// Create a map and start its sweep task.
    ///
    /// The sweep runs every half of `max_age` and stops once the map is
    /// dropped. Must be called within a tokio runtime.
    pub fn new(max_age: Duration) -> Arc<Self> {
        let map = Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        });

        let weak = Arc::downgrade(&map);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(max_age / 2).await;
                let Some(map) = weak.upgrade() else { break };
                map.sweep();
            }
        });

        map
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, PendingRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending request under its correlation id.
    pub fn store(&self, id: u32, pending: PendingRequest) {
        self.lock().insert(id, pending);
    }

    /// Atomically look up and remove an entry.
    ///
    /// The caller that gets `Some` is the entry's unique resolver.
    pub fn load_remove(&self, id: u32) -> Option<PendingRequest> {
        self.lock().remove(&id)
    }

    /// Number of entries currently pending.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Remove and fail every entry older than the max age.
    fn sweep(&self) {
        let expired: Vec<PendingRequest> = {
            let mut entries = self.lock();
            let stale: Vec<u32> = entries
                .iter()
                .filter(|(_, p)| p.sent_at.elapsed() > self.max_age)
                .map(|(id, _)| *id)
                .collect();
            stale.into_iter().filter_map(|id| entries.remove(&id)).collect()
        };
        for pending in expired {
            tracing::debug!("sweeping stale pending request");
            let _ = pending.tx.send(Err(RoomzinError::Timeout));
        }
    }

    /// Fail every pending entry with a connection-lost condition.
    ///
    /// Used when the connection carrying this channel dies; the map itself
    /// stays usable for the replacement connection.
    pub fn fail_all(&self) {
        let drained: Vec<PendingRequest> = self.lock().drain().map(|(_, p)| p).collect();
        for pending in drained {
            let _ = pending.tx.send(Err(RoomzinError::ConnectionClosed));
        }
    }

    /// Fail every pending entry with a handler-closed condition and clear
    /// the map. Called exactly once at shutdown.
    pub fn destroy(&self) {
        let drained: Vec<PendingRequest> = self.lock().drain().map(|(_, p)| p).collect();
        for pending in drained {
            let _ = pending.tx.send(Err(RoomzinError::HandlerClosed));
        }
    }
}
