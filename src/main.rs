//! Bookmark Live Server
//!
//! Run with: cargo run --bin bookmark-live
//!
//! # Configuration
//!
//! Read from `config.toml` in the usual locations, then overridden by
//! environment variables:
//! - `BOOKMARK_HOST` / `BOOKMARK_PORT`: Bind address (default: 0.0.0.0:8090)
//! - `BOOKMARK_SITE_URL`: Public origin used for OAuth redirects
//! - `BOOKMARK_DB_PATH`: SQLite database file
//! - `BOOKMARK_API_KEY`: Public API key clients must present (falls back to
//!   `BOOKMARK_BACKEND_KEY`)
//! - `BOOKMARK_GOOGLE_CLIENT_ID` / `BOOKMARK_GOOGLE_CLIENT_SECRET`: OAuth app
//! - `BOOKMARK_LOG_LEVEL` / `BOOKMARK_LOG_FORMAT`: `[logging]` overrides
//! - `RUST_LOG`: Log filter (default from `[logging]`)

use bookmark_live::api::{serve, AppState};
use bookmark_live::config::Config;
use bookmark_live::store::Store;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_default();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.filter_directive().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Bookmark Live server v{}", env!("CARGO_PKG_VERSION"));

    if config.server_api_key().is_empty() {
        tracing::warn!("No API key configured, client requests are not checked");
    }
    for (name, provider) in &config.auth.providers {
        if !provider.is_configured() {
            tracing::warn!(provider = %name, "OAuth provider has no client credentials");
        }
    }

    if let Some(dir) = std::path::Path::new(&config.storage.db_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    tracing::info!("Database: {}", config.storage.db_path);
    let store = Arc::new(Store::open(&config.storage.db_path)?);

    let state = AppState::new(store, config);
    tracing::info!("Site URL: {}", state.auth.site_url());
    serve(state).await?;

    tracing::info!("Bookmark Live server stopped");
    Ok(())
}
