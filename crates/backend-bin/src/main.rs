use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use roomchat_backend_lib::{
    config::{LogFormat, Settings},
    storage::SqliteStorage,
    ws_router, AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Room-scoped chat server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML config file (defaults to config/default.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

fn init_tracing(settings: &Settings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_file(path),
        None => Settings::load(),
    }
    .context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }

    init_tracing(&settings);

    let storage = SqliteStorage::connect(&settings.database_url)
        .await
        .with_context(|| format!("failed to open store at {}", settings.database_url))?;

    let addr = settings.bind_addr;
    let state = Arc::new(AppState::new(storage, settings)?);
    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
