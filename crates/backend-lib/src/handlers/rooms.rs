// ============================
// crates/backend-lib/src/handlers/rooms.rs
// ============================
//! Room lifecycle and message history handlers.
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use metrics::counter;
use roomchat_common::{ChatMessage, NewMessage, NewRoom, Room, RoomId};

use crate::error::AppError;
use crate::metrics::{ROOM_CREATED, ROOM_DELETED};
use crate::storage::Storage;
use crate::validation;
use crate::AppState;

/// `GET /rooms`
pub async fn list_rooms<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Room>>, AppError> {
    Ok(Json(state.storage.list_rooms().await?))
}

/// `POST /rooms`
pub async fn create_room<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<NewRoom>, JsonRejection>,
) -> Result<Json<Room>, AppError> {
    let Json(new_room) = body?;
    let new_room = validation::validate_new_room(&new_room)?;

    let room = state.storage.insert_room(&new_room).await?;
    counter!(ROOM_CREATED).increment(1);
    tracing::info!(room_id = room.id, name = %room.name, creator = %room.creator, "room created");

    Ok(Json(room))
}

/// `DELETE /rooms/{id}`: removes the room and its messages
pub async fn delete_room<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, AppError> {
    if state.storage.delete_room(room_id).await? {
        counter!(ROOM_DELETED).increment(1);
        tracing::info!(room_id, "room deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /rooms/{id}/messages`, oldest first
pub async fn list_messages<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    Ok(Json(state.storage.query_messages_by_room(room_id).await?))
}

/// `POST /rooms/{id}/messages`. Stored only; live connections are not notified.
pub async fn post_message<S: Storage + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(room_id): Path<RoomId>,
    body: Result<Json<NewMessage>, JsonRejection>,
) -> Result<Json<ChatMessage>, AppError> {
    let Json(new_message) = body?;
    let new_message = validation::validate_new_message(&new_message)?;

    let msg = ChatMessage::new(room_id, new_message.sender, new_message.text, Utc::now());
    let stored = state.storage.insert_message(&msg).await?;

    Ok(Json(stored))
}
