// ============================
// roomchat-backend-lib/src/storage.rs
// ============================
//! Storage abstraction with a SQLite implementation.
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roomchat_common::{ChatMessage, NewRoom, Room, RoomId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::error::AppError;

const MAX_CONNECTIONS: u32 = 16;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS rooms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        creator TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        room_id INTEGER NOT NULL REFERENCES rooms(id),
        sender TEXT NOT NULL,
        text TEXT NOT NULL,
        time TIMESTAMP NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_room_time ON messages (room_id, time)",
];

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create a room; the store assigns its id
    async fn insert_room(&self, room: &NewRoom) -> Result<Room, AppError>;

    /// All rooms, in store order
    async fn list_rooms(&self) -> Result<Vec<Room>, AppError>;

    /// Look up a single room
    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, AppError>;

    /// Delete a room and every message in it. Returns whether the room existed.
    async fn delete_room(&self, room_id: RoomId) -> Result<bool, AppError>;

    /// Append a message; returns it with the store-assigned id
    async fn insert_message(&self, msg: &ChatMessage) -> Result<ChatMessage, AppError>;

    /// Messages of a room ordered by time ascending
    async fn query_messages_by_room(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, AppError>;
}

/// SQLite implementation of the Storage trait
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    /// Serializes room creation against room deletion so a cascade is never
    /// interleaved with another room-table write.
    room_lock: Arc<Mutex<()>>,
}

impl SqliteStorage {
    /// Connect using an sqlx URL such as `sqlite://chat.db` or `sqlite::memory:`
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own database
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .connect_with(options)
                .await?
        };

        Self::with_pool(pool).await
    }

    /// Open (or create) a database file
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, AppError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self {
            pool,
            room_lock: Arc::new(Mutex::new(())),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_room(&self, room: &NewRoom) -> Result<Room, AppError> {
        let _guard = self.room_lock.lock().await;

        let id = sqlx::query("INSERT INTO rooms (name, creator) VALUES (?, ?)")
            .bind(&room.name)
            .bind(&room.creator)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Room {
            id,
            name: room.name.clone(),
            creator: room.creator.clone(),
        })
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, AppError> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, creator FROM rooms ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, creator)| Room { id, name, creator })
            .collect())
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, AppError> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, creator FROM rooms WHERE id = ?")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, name, creator)| Room { id, name, creator }))
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<bool, AppError> {
        let _guard = self.room_lock.lock().await;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE room_id = ?")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(room_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;

        Ok(deleted)
    }

    async fn insert_message(&self, msg: &ChatMessage) -> Result<ChatMessage, AppError> {
        let result = sqlx::query(
            "INSERT INTO messages (room_id, sender, text, time) VALUES (?, ?, ?, ?)",
        )
        .bind(msg.room_id)
        .bind(&msg.sender)
        .bind(&msg.text)
        .bind(msg.time)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(ChatMessage {
                id: Some(done.last_insert_rowid()),
                ..msg.clone()
            }),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                Err(AppError::RoomNotFound(msg.room_id))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn query_messages_by_room(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, AppError> {
        let rows: Vec<(i64, i64, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, room_id, sender, text, time FROM messages
             WHERE room_id = ? ORDER BY time ASC, id ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, room_id, sender, text, time)| ChatMessage {
                id: Some(id),
                room_id,
                sender,
                text,
                time,
            })
            .collect())
    }
}
