// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between `roomchat` clients and the server.
//! This module defines the room/history payloads and the live frame format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned room identifier
pub type RoomId = i64;

/// Store-assigned message identifier
pub type MessageId = i64;

/// A named conversation scope
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Identifier assigned by the store on creation
    pub id: RoomId,
    /// Display name
    pub name: String,
    /// Identity of the participant that created the room
    pub creator: String,
}

/// Request body for room creation
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRoom {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creator: String,
}

/// A timestamped, sender-attributed text unit belonging to one room.
///
/// This is both the history record and the live frame. On a live
/// broadcast copy `id` is always `None`: the frame goes out to peers
/// before the store has assigned an identifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub room_id: RoomId,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub text: String,
    /// Server-assigned acceptance time
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

impl ChatMessage {
    /// Build an unpersisted message stamped with `time`
    pub fn new(room_id: RoomId, sender: impl Into<String>, text: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            room_id,
            sender: sender.into(),
            text: text.into(),
            time,
        }
    }
}

/// Request body for posting a message outside of a live connection
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMessage {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub text: String,
}

/// Request body for `/login`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub name: String,
}

/// Response body for `/login`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub status: String,
}

impl LoginResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}
