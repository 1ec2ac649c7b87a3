//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthService;
use crate::config::Config;
use crate::realtime::{ChangeHub, HubConfig};
use crate::service::BookmarkService;
use crate::store::Store;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relational store
    pub store: Arc<Store>,
    /// Access-checked bookmark operations
    pub bookmarks: Arc<BookmarkService>,
    /// Sign-in and session lookup
    pub auth: Arc<AuthService>,
    /// Change-feed hub
    pub hub: Arc<ChangeHub>,
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<Store>, config: Config) -> Self {
        let hub = Arc::new(ChangeHub::new(HubConfig::from(&config.realtime)));
        let bookmarks = Arc::new(BookmarkService::new(Arc::clone(&store), Arc::clone(&hub)));
        let auth = Arc::new(AuthService::new(
            Arc::clone(&store),
            &config.auth,
            &config.server,
        ));

        Self {
            store,
            bookmarks,
            auth,
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Key clients must present
    pub fn api_key(&self) -> &str {
        self.config.server_api_key()
    }

    /// Socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}
