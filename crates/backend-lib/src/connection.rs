// ==================
// crates/backend-lib/src/connection.rs
// ==================
//! Connection Handler
//!
//! One `ConnectionHandler` owns the lifecycle of one live connection:
//! `Connecting -> Open -> Closing -> Closed`.
//!
//! While open it runs two duties side by side:
//! - the read duty decodes inbound frames, stamps each with the server time,
//!   submits it to the broadcast dispatcher and then persists it;
//! - the write duty (its own task) drains the connection's outbound queue and
//!   is the only writer of the transport.
//!
//! Whichever duty stops first ends the connection. The handler then
//! unregisters itself before the transport is released, so the dispatcher
//! stops targeting it. Failures are logged and stay local to this connection.
//!
//! The handler is generic over the transport halves, so it works on the
//! split halves of an axum `WebSocket` as well as on any other
//! `Sink`/`Stream` pair carrying `Message`s.

use std::fmt::Display;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use roomchat_common::ChatMessage;

use crate::dispatcher::BroadcastDispatcher;
use crate::metrics::{MESSAGE_MALFORMED, MESSAGE_RECEIVED, PERSIST_FAILED, WS_CONNECTION, WS_DISCONNECTION};
use crate::registry::{ConnectionId, ConnectionRegistry, OutboundQueue, ParticipantConnection};
use crate::storage::Storage;
use crate::validation;
use crate::AppState;

/// Lifecycle of a connection handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// What ended a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or the stream ended
    PeerClosed,
    /// Reading from the transport failed
    ReadFailed,
    /// Writing to the transport failed
    WriteFailed,
    /// The dispatcher dropped the connection (slow consumer)
    Evicted,
}

/// Handler for a single live connection
pub struct ConnectionHandler<S> {
    id: ConnectionId,
    state: ConnectionState,
    storage: S,
    registry: ConnectionRegistry,
    dispatcher: BroadcastDispatcher,
    outbound_capacity: usize,
    last_stamp: Option<DateTime<Utc>>,
}

impl<S: Storage + Clone + 'static> ConnectionHandler<S> {
    pub fn new(state: &AppState<S>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            state: ConnectionState::Connecting,
            storage: state.storage.clone(),
            registry: state.registry.clone(),
            dispatcher: state.dispatcher.clone(),
            outbound_capacity: state.settings.outbound_queue_capacity,
            last_stamp: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, next: ConnectionState) {
        tracing::debug!(conn_id = %self.id, from = ?self.state, to = ?next, "connection state change");
        self.state = next;
    }

    /// Drive the connection until it closes.
    ///
    /// A handler runs once; calling `run` on a handler that already left
    /// `Connecting` returns immediately.
    pub async fn run<W, R, E>(&mut self, sink: W, mut stream: R) -> CloseReason
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        if self.state != ConnectionState::Connecting {
            tracing::warn!(conn_id = %self.id, state = ?self.state, "handler already ran");
            return CloseReason::PeerClosed;
        }

        // Connecting -> Open
        let (participant, outbound) = ParticipantConnection::with_id(self.id, self.outbound_capacity);
        self.registry.register(participant);
        self.set_state(ConnectionState::Open);
        counter!(WS_CONNECTION).increment(1);
        tracing::info!(conn_id = %self.id, "connection open");

        let evicted = outbound.disconnect_signal();
        let mut writer = tokio::spawn(write_duty(sink, outbound, self.id));

        // The writer can be parked inside a send to a stalled peer, so the
        // eviction signal is watched here as well
        let reason = tokio::select! {
            reason = self.read_duty(&mut stream) => reason,
            joined = &mut writer => joined.unwrap_or(CloseReason::WriteFailed),
            () = evicted.wait() => CloseReason::Evicted,
        };

        // Open -> Closing: stop deliveries before releasing the transport
        self.set_state(ConnectionState::Closing);
        self.registry.unregister(self.id);
        writer.abort();
        drop(stream);

        // Closing -> Closed
        self.set_state(ConnectionState::Closed);
        counter!(WS_DISCONNECTION).increment(1);
        tracing::info!(conn_id = %self.id, reason = ?reason, "connection closed");

        reason
    }

    async fn read_duty<R, E>(&mut self, stream: &mut R) -> CloseReason
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(conn_id = %self.id, "read failed: {e}");
                    return CloseReason::ReadFailed;
                },
            };

            match frame {
                Message::Text(text) => self.accept(text.as_str().as_bytes()).await,
                Message::Binary(bytes) => self.accept(&bytes).await,
                Message::Close(_) => return CloseReason::PeerClosed,
                // Ping/Pong are answered by the transport
                _ => {},
            }
        }

        CloseReason::PeerClosed
    }

    /// Handle one inbound payload: broadcast first, then persist.
    async fn accept(&mut self, payload: &[u8]) {
        let decoded: ChatMessage = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                counter!(MESSAGE_MALFORMED).increment(1);
                tracing::warn!(conn_id = %self.id, "dropping malformed frame: {e}");
                return;
            },
        };

        let mut msg = match validation::validate_live_message(decoded) {
            Ok(msg) => msg,
            Err(e) => {
                counter!(MESSAGE_MALFORMED).increment(1);
                tracing::warn!(conn_id = %self.id, "dropping invalid frame: {e}");
                return;
            },
        };

        // id and time are server-authoritative
        msg.id = None;
        msg.time = self.stamp();
        counter!(MESSAGE_RECEIVED).increment(1);
        tracing::debug!(conn_id = %self.id, room_id = msg.room_id, sender = %msg.sender, "frame accepted");

        if let Err(e) = self.dispatcher.submit(self.id, msg.clone()).await {
            tracing::error!(conn_id = %self.id, "broadcast submit failed: {e}");
        }

        if let Err(e) = self.storage.insert_message(&msg).await {
            counter!(PERSIST_FAILED).increment(1);
            tracing::warn!(conn_id = %self.id, room_id = msg.room_id, "failed to persist message: {e}");
        }
    }

    /// Server timestamp, never earlier than the previous one from this handler
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

async fn write_duty<W>(mut sink: W, mut outbound: OutboundQueue, id: ConnectionId) -> CloseReason
where
    W: Sink<Message> + Unpin + Send,
    W::Error: Display + Send,
{
    while let Some(msg) = outbound.next().await {
        let json = match serde_json::to_string(&*msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(conn_id = %id, "failed to serialize message: {e}");
                continue;
            },
        };

        if let Err(e) = sink.send(Message::Text(json.into())).await {
            tracing::warn!(conn_id = %id, "write failed: {e}");
            return CloseReason::WriteFailed;
        }
    }

    CloseReason::Evicted
}
