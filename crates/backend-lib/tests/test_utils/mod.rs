//! Test utilities shared by the integration tests
//!
//! Builds app state on a temporary SQLite file, starts a real server on an
//! ephemeral port, and provides a store that fails every call.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use roomchat_backend_lib::{
    config::Settings,
    error::AppError,
    storage::{SqliteStorage, Storage},
    ws_router, AppState,
};
use roomchat_common::{ChatMessage, NewRoom, Room, RoomId};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// App state backed by a SQLite file inside a fresh temporary directory.
/// Keep the `TempDir` in scope for the duration of the test.
pub async fn setup_test_env() -> (Arc<AppState<SqliteStorage>>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = SqliteStorage::open(temp_dir.path().join("chat.db"))
        .await
        .unwrap();
    let state = Arc::new(AppState::new(storage, Settings::default()).unwrap());
    (state, temp_dir)
}

/// Serve the router on an ephemeral local port
pub async fn spawn_server<S: Storage + Clone + 'static>(state: Arc<AppState<S>>) -> SocketAddr {
    let app = ws_router::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect");
    ws
}

/// Next chat frame, failing the test after `secs` seconds
pub async fn next_chat_with_timeout(ws: &mut WsClient, secs: u64, context: &str) -> ChatMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(secs), ws.next())
            .await
            .unwrap_or_else(|_| panic!("{context}: timed out"))
            .unwrap_or_else(|| panic!("{context}: stream ended"))
            .unwrap_or_else(|e| panic!("{context}: {e}"));

        if frame.is_text() {
            return serde_json::from_str(frame.to_text().unwrap()).unwrap();
        }
    }
}

/// Assert nothing arrives within `millis`
pub async fn expect_silence(ws: &mut WsClient, millis: u64) {
    if let Ok(Some(Ok(frame))) =
        tokio::time::timeout(Duration::from_millis(millis), ws.next()).await
    {
        assert!(!frame.is_text(), "unexpected frame: {frame:?}");
    }
}

/// Poll until `cond` holds
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Send a request through the router and decode the JSON body (if any)
pub async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let body = body.map(|json| json.to_string()).unwrap_or_default();
    call_raw(app, method, uri, &body).await
}

/// Like [`call`], but with the body sent verbatim
pub async fn call_raw(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

/// A store whose every call fails, for checking that delivery does not
/// depend on persistence
#[derive(Clone)]
pub struct FailingStorage;

fn down<T>() -> Result<T, AppError> {
    Err(AppError::Internal("store unavailable".to_string()))
}

#[async_trait]
impl Storage for FailingStorage {
    async fn insert_room(&self, _room: &NewRoom) -> Result<Room, AppError> {
        down()
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, AppError> {
        down()
    }

    async fn get_room(&self, _room_id: RoomId) -> Result<Option<Room>, AppError> {
        down()
    }

    async fn delete_room(&self, _room_id: RoomId) -> Result<bool, AppError> {
        down()
    }

    async fn insert_message(&self, _msg: &ChatMessage) -> Result<ChatMessage, AppError> {
        down()
    }

    async fn query_messages_by_room(&self, _room_id: RoomId) -> Result<Vec<ChatMessage>, AppError> {
        down()
    }
}
