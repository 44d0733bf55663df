// ============================
// roomchat-backend-lib/src/dispatcher.rs
// ============================
//! Broadcast dispatcher: one relay queue, one consuming task, one
//! non-blocking delivery attempt per live connection.
//!
//! Producers (connection read loops) enqueue into a bounded relay. The
//! consumer snapshots the registry for every message and `try_send`s into
//! each connection's own bounded outbound queue. A connection whose queue is
//! full is unregistered and told to disconnect, so one slow peer never holds
//! up the others.

use std::sync::Arc;

use metrics::{counter, histogram};
use roomchat_common::ChatMessage;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::metrics::{BROADCAST_DELIVERED, BROADCAST_DROPPED, BROADCAST_FANOUT};
use crate::registry::{ConnectionId, ConnectionRegistry, DeliveryError};

/// A message waiting in the relay, tagged with the connection that sent it
#[derive(Debug)]
struct Envelope {
    origin: ConnectionId,
    message: Arc<ChatMessage>,
}

/// Outcome of fanning one message out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections in the snapshot
    pub attempted: usize,
    /// Messages queued successfully
    pub delivered: usize,
    /// Connections dropped because their queue was full or closed
    pub dropped: usize,
}

/// Cloneable handle for submitting messages to the fan-out task
#[derive(Clone)]
pub struct BroadcastDispatcher {
    relay_tx: mpsc::Sender<Envelope>,
}

impl BroadcastDispatcher {
    /// Spawn the consuming task and return a handle to it. The task runs until
    /// every handle is dropped.
    pub fn spawn(registry: ConnectionRegistry, relay_capacity: usize) -> Self {
        let (relay_tx, relay_rx) = mpsc::channel(relay_capacity.max(1));
        tokio::spawn(run(registry, relay_rx));
        Self { relay_tx }
    }

    /// Enqueue a message for delivery to every live connection, the sender
    /// included. Waits only for room in the relay, never on a peer.
    pub async fn submit(&self, origin: ConnectionId, message: ChatMessage) -> Result<(), AppError> {
        self.relay_tx
            .send(Envelope {
                origin,
                message: Arc::new(message),
            })
            .await
            .map_err(|_| AppError::Internal("broadcast dispatcher stopped".to_string()))
    }
}

async fn run(registry: ConnectionRegistry, mut relay_rx: mpsc::Receiver<Envelope>) {
    tracing::debug!("broadcast dispatcher started");

    while let Some(envelope) = relay_rx.recv().await {
        let report = deliver(&registry, envelope.message);
        tracing::debug!(
            origin = %envelope.origin,
            attempted = report.attempted,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast complete"
        );
    }

    tracing::debug!("broadcast dispatcher stopped");
}

/// Fan one message out to a snapshot of the registry.
///
/// Every member gets its own attempt; a failure for one member only affects
/// that member.
pub fn deliver(registry: &ConnectionRegistry, message: Arc<ChatMessage>) -> DeliveryReport {
    let members = registry.snapshot();
    let mut report = DeliveryReport {
        attempted: members.len(),
        ..DeliveryReport::default()
    };

    for conn in &members {
        match conn.try_deliver(message.clone()) {
            Ok(()) => report.delivered += 1,
            Err(reason) => {
                report.dropped += 1;
                registry.unregister(conn.id());
                conn.disconnect();
                match reason {
                    DeliveryError::Full => tracing::warn!(
                        conn_id = %conn.id(),
                        "outbound queue full, disconnecting slow consumer"
                    ),
                    DeliveryError::Closed => tracing::debug!(
                        conn_id = %conn.id(),
                        "outbound queue already closed, dropping connection"
                    ),
                }
            },
        }
    }

    counter!(BROADCAST_DELIVERED).increment(report.delivered as u64);
    counter!(BROADCAST_DROPPED).increment(report.dropped as u64);
    histogram!(BROADCAST_FANOUT).record(report.attempted as f64);

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParticipantConnection;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn message(text: &str) -> ChatMessage {
        ChatMessage::new(1, "alice", text, Utc::now())
    }

    #[test]
    fn test_deliver_to_empty_registry() {
        let registry = ConnectionRegistry::new();
        let report = deliver(&registry, Arc::new(message("nobody home")));
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn test_deliver_reaches_every_member() {
        let registry = ConnectionRegistry::new();
        let mut queues = Vec::new();
        for _ in 0..3 {
            let (conn, queue) = ParticipantConnection::new(4);
            registry.register(conn);
            queues.push(queue);
        }

        let report = deliver(&registry, Arc::new(message("hi")));
        assert_eq!(
            report,
            DeliveryReport {
                attempted: 3,
                delivered: 3,
                dropped: 0
            }
        );

        for queue in &mut queues {
            assert_eq!(queue.next().await.unwrap().text, "hi");
        }
    }

    #[tokio::test]
    async fn test_full_queue_is_dropped_without_affecting_others() {
        let registry = ConnectionRegistry::new();
        let (fast_a, mut queue_a) = ParticipantConnection::new(4);
        let (slow, mut slow_queue) = ParticipantConnection::new(1);
        let (fast_b, mut queue_b) = ParticipantConnection::new(4);
        registry.register(fast_a.clone());
        registry.register(slow.clone());
        registry.register(fast_b.clone());

        // Fill the slow consumer's queue
        slow.try_deliver(Arc::new(message("backlog"))).unwrap();

        let report = deliver(&registry, Arc::new(message("hi")));
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 1);

        assert!(!registry.contains(slow.id()));
        assert!(registry.contains(fast_a.id()));
        assert!(registry.contains(fast_b.id()));

        assert_eq!(queue_a.next().await.unwrap().text, "hi");
        assert_eq!(queue_b.next().await.unwrap().text, "hi");
        // The slow consumer was told to disconnect
        assert!(slow_queue.next().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_queue_is_unregistered() {
        let registry = ConnectionRegistry::new();
        let (gone, queue) = ParticipantConnection::new(4);
        registry.register(gone.clone());
        drop(queue);

        let report = deliver(&registry, Arc::new(message("hi")));
        assert_eq!(report.dropped, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_submit_preserves_per_producer_order() {
        let registry = ConnectionRegistry::new();
        let (conn, mut queue) = ParticipantConnection::new(64);
        registry.register(conn);

        let dispatcher = BroadcastDispatcher::spawn(registry, 4);
        let origin = Uuid::new_v4();
        for i in 0..20 {
            dispatcher.submit(origin, message(&i.to_string())).await.unwrap();
        }

        for i in 0..20 {
            let msg = tokio::time::timeout(Duration::from_secs(1), queue.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(msg.text, i.to_string());
        }
    }

    #[tokio::test]
    async fn test_submit_with_no_connections_succeeds() {
        let dispatcher = BroadcastDispatcher::spawn(ConnectionRegistry::new(), 4);
        assert!(dispatcher.submit(Uuid::new_v4(), message("void")).await.is_ok());
    }
}
