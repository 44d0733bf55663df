// ============================
// roomchat-backend-lib/src/registry.rs
// ============================
//! Membership set of live participant connections.
//!
//! The registry owns the only shared-mutable state of the live path. All
//! mutation and snapshot reads go through one mutex, so a snapshot taken
//! after `unregister` returns can never contain the removed handle, and a
//! snapshot taken after `register` returns always does.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use roomchat_common::ChatMessage;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::metrics::WS_ACTIVE;

pub type ConnectionId = Uuid;

/// Why a message could not be queued for a connection
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue full")]
    Full,
    #[error("outbound queue closed")]
    Closed,
}

/// Handle to one live connection: its identity plus the sending side of its
/// outbound queue.
///
/// The registry holds the only long-lived clone, so once a connection is
/// unregistered its queue closes as soon as in-flight snapshots are dropped.
#[derive(Clone, Debug)]
pub struct ParticipantConnection {
    id: ConnectionId,
    outbound: mpsc::Sender<Arc<ChatMessage>>,
    disconnect: Arc<Notify>,
}

/// Receiving side of a connection's outbound queue, drained by its writer.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<Arc<ChatMessage>>,
    disconnect: Arc<Notify>,
}

impl ParticipantConnection {
    /// Create a handle with a fresh id and a queue bounded to `capacity`
    pub fn new(capacity: usize) -> (Self, OutboundQueue) {
        Self::with_id(Uuid::new_v4(), capacity)
    }

    pub fn with_id(id: ConnectionId, capacity: usize) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let disconnect = Arc::new(Notify::new());

        let conn = Self {
            id,
            outbound: tx,
            disconnect: disconnect.clone(),
        };
        (conn, OutboundQueue { rx, disconnect })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message without waiting
    pub fn try_deliver(&self, msg: Arc<ChatMessage>) -> Result<(), DeliveryError> {
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Tell the connection's writer to stop. The signal is kept if the writer
    /// is not currently waiting.
    pub fn disconnect(&self) {
        self.disconnect.notify_one();
    }
}

impl OutboundQueue {
    /// Next message to write, or `None` once the connection was told to
    /// disconnect or every sender is gone.
    pub async fn next(&mut self) -> Option<Arc<ChatMessage>> {
        tokio::select! {
            biased;
            () = self.disconnect.notified() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Handle on the disconnect signal that outlives the queue, for a
    /// handler whose writer may be blocked inside the transport.
    pub fn disconnect_signal(&self) -> DisconnectSignal {
        DisconnectSignal(self.disconnect.clone())
    }
}

/// Resolves once the dispatcher has dropped the connection.
///
/// The signal is delivered once: whichever of the writer or the handler
/// waits on it first consumes it.
#[derive(Clone, Debug)]
pub struct DisconnectSignal(Arc<Notify>);

impl DisconnectSignal {
    pub async fn wait(&self) {
        self.0.notified().await;
    }
}

/// Thread-safe set of live connections
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    members: Arc<Mutex<HashMap<ConnectionId, ParticipantConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns `false` if it was already present.
    pub fn register(&self, conn: ParticipantConnection) -> bool {
        let mut members = self.members.lock();
        let added = if members.contains_key(&conn.id) {
            false
        } else {
            members.insert(conn.id, conn);
            true
        };
        gauge!(WS_ACTIVE).set(members.len() as f64);
        added
    }

    /// Remove a connection. Removing an absent id is a no-op.
    pub fn unregister(&self, id: ConnectionId) -> Option<ParticipantConnection> {
        let mut members = self.members.lock();
        let removed = members.remove(&id);
        gauge!(WS_ACTIVE).set(members.len() as f64);
        removed
    }

    /// Point-in-time copy of the membership for iteration outside the lock
    pub fn snapshot(&self) -> Vec<ParticipantConnection> {
        self.members.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }
}
