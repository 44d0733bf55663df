// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Request and frame validation.

use roomchat_common::{ChatMessage, LoginRequest, NewMessage, NewRoom};
use thiserror::Error;

// Common validation constants
const MAX_ROOM_NAME_LENGTH: usize = 100;
const MAX_IDENTITY_LENGTH: usize = 64;
const MAX_TEXT_LENGTH: usize = 4000;

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Invalid room id: {0}")]
    InvalidRoomId(i64),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

fn require<'a>(field: &'static str, value: &'a str, max: usize) -> ValidationResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed)
}

/// Validate a room creation request, returning it with surrounding
/// whitespace removed
pub fn validate_new_room(room: &NewRoom) -> ValidationResult<NewRoom> {
    Ok(NewRoom {
        name: require("Room name", &room.name, MAX_ROOM_NAME_LENGTH)?.to_string(),
        creator: require("Creator", &room.creator, MAX_IDENTITY_LENGTH)?.to_string(),
    })
}

/// Validate a login request
pub fn validate_login(login: &LoginRequest) -> ValidationResult<&str> {
    require("Name", &login.name, MAX_IDENTITY_LENGTH)
}

/// Validate a message posted through the request/response API
pub fn validate_new_message(msg: &NewMessage) -> ValidationResult<NewMessage> {
    Ok(NewMessage {
        sender: require("Sender", &msg.sender, MAX_IDENTITY_LENGTH)?.to_string(),
        text: require("Text", &msg.text, MAX_TEXT_LENGTH)?.to_string(),
    })
}

/// Validate an inbound live frame. Sender and text come back trimmed the
/// same way as posted messages.
pub fn validate_live_message(msg: ChatMessage) -> ValidationResult<ChatMessage> {
    if msg.room_id <= 0 {
        return Err(ValidationError::InvalidRoomId(msg.room_id));
    }
    let sender = require("Sender", &msg.sender, MAX_IDENTITY_LENGTH)?.to_string();
    let text = require("Text", &msg.text, MAX_TEXT_LENGTH)?.to_string();
    Ok(ChatMessage { sender, text, ..msg })
}
