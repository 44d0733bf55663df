// ============================
// roomchat-backend-lib/src/ws_router.rs
// ============================
//! HTTP router: room/history API, the live WebSocket endpoint, and static
//! files for everything else.
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use futures_util::StreamExt;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::connection::ConnectionHandler;
use crate::handlers::{login, rooms};
use crate::storage::Storage;
use crate::AppState;

/// Create the application router
pub fn create_router<S: Storage + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    let static_files = ServeDir::new(&state.settings.static_dir);

    Router::new()
        .route("/ws", get(ws_handler::<S>))
        .route("/health", get(health_handler))
        .route("/login", post(login::login))
        .route(
            "/rooms",
            get(rooms::list_rooms::<S>).post(rooms::create_room::<S>),
        )
        .route("/rooms/{id}", delete(rooms::delete_room::<S>))
        .route(
            "/rooms/{id}/messages",
            get(rooms::list_messages::<S>).post(rooms::post_message::<S>),
        )
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "Healthy"
}

/// Handler for WebSocket connections
async fn ws_handler<S: Storage + Clone + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(|e| tracing::warn!("websocket upgrade failed: {e}"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<S: Storage + Clone + 'static>(socket: WebSocket, state: Arc<AppState<S>>) {
    let (sink, stream) = socket.split();
    let mut handler = ConnectionHandler::new(&state);
    handler.run(sink, stream).await;
}
