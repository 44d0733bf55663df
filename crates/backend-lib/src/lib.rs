// ============================
// roomchat-backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the `roomchat` server: room and
//! history API, live connection registry, and broadcast dispatch.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod validation;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::dispatcher::BroadcastDispatcher;
use crate::error::AppError;
use crate::registry::ConnectionRegistry;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState<S> {
    /// Storage backend
    pub storage: S,
    /// Settings
    pub settings: Arc<Settings>,
    /// Live connections
    pub registry: ConnectionRegistry,
    /// Fan-out point for live messages
    pub dispatcher: BroadcastDispatcher,
}

impl<S> AppState<S> {
    /// Create a new application state and start the broadcast dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(storage: S, settings: Settings) -> Result<Self, AppError> {
        settings.validate()?;

        let registry = ConnectionRegistry::new();
        let dispatcher = BroadcastDispatcher::spawn(registry.clone(), settings.relay_capacity);

        Ok(Self {
            storage,
            settings: Arc::new(settings),
            registry,
            dispatcher,
        })
    }
}
