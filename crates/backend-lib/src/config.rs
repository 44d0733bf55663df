// ============================
// roomchat-backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Config file read by [`Settings::load`] when present
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix for environment overrides, e.g. `ROOMCHAT_BIND_ADDR`
pub const ENV_PREFIX: &str = "ROOMCHAT_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// sqlx connection string for the message store
    pub database_url: String,
    /// Directory served for any path no route claims
    pub static_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Bound of the dispatcher's inbound relay queue
    pub relay_capacity: usize,
    /// Bound of each connection's outbound queue
    pub outbound_queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_url: "sqlite://chat.db".to_string(),
            static_dir: PathBuf::from("static"),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            relay_capacity: 256,
            outbound_queue_capacity: 64,
        }
    }
}

impl Settings {
    /// Load settings from defaults, `config/default.toml` and the environment
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings with `path` as the TOML layer. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Like [`Settings::load_from`], for a file the operator named explicitly:
    /// it must exist.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }
        Self::load_from(path)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        if self.relay_capacity == 0 {
            return Err(AppError::Config("relay_capacity must be positive".to_string()));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(AppError::Config(
                "outbound_queue_capacity must be positive".to_string(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(AppError::Config("database_url must be set".to_string()));
        }
        Ok(())
    }
}
