//! Live connection registry
//!
//! Maps an identity to the outbound event channel of the connection that most
//! recently registered it. A later registration silently replaces an earlier
//! one; removal is guarded by connection id so a replaced connection's cleanup
//! cannot evict its successor.

use dashmap::DashMap;
use tandem_shared::{Identity, ServerEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound side of one physical connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { id: Uuid::new_v4(), tx }
    }

    /// Unique id of the physical connection
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event, waiting for buffer space. Fails once the writer is gone.
    pub async fn send(&self, event: ServerEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("Connection {} writer closed", self.id))
    }
}

/// Outcome of a live delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Event queued on the receiver's connection
    Pushed,
    /// Receiver is not registered
    Offline,
    /// Receiver's writer already shut down
    Closed,
}

/// Identity → live connection map
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: DashMap<Identity, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `identity`. Returns the displaced handle.
    pub fn register(&self, identity: Identity, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries.insert(identity, handle)
    }

    /// The live connection for `identity`, if any
    pub fn lookup(&self, identity: &Identity) -> Option<ConnectionHandle> {
        self.entries.get(identity).map(|entry| entry.value().clone())
    }

    /// Remove `identity` only if its current entry belongs to `connection_id`.
    /// Returns whether an entry was removed.
    pub fn remove(&self, identity: &Identity, connection_id: Uuid) -> bool {
        self.entries
            .remove_if(identity, |_, handle| handle.id == connection_id)
            .is_some()
    }

    /// Push `event` to `identity` if online.
    ///
    /// Waits for room in the receiver's outbound buffer, so a slow receiver
    /// slows its senders down instead of missing events. The shard guard is
    /// released before waiting.
    pub async fn deliver(&self, identity: &Identity, event: ServerEvent) -> Delivery {
        let Some(handle) = self.lookup(identity) else {
            return Delivery::Offline;
        };
        match handle.tx.send(event).await {
            Ok(()) => Delivery::Pushed,
            Err(_) => Delivery::Closed,
        }
    }

    /// Number of registered identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
