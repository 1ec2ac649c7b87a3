//! # Bookmark Live
//!
//! Personal bookmarks with provider sign-in and a live change-feed: every
//! open view of the same user converges on the same list without reloading.
//!
//! ## Modules
//!
//! - [`store`]: SQLite tables for bookmarks, users and sessions
//! - [`auth`]: OAuth sign-in and session lookup
//! - [`realtime`]: Change hub and websocket protocol
//! - [`service`]: Owner-scoped bookmark writes that publish changes
//! - [`api`]: REST, auth, realtime and page routes with Axum
//! - [`client`]: Backend SDK and the shared process-wide handle
//! - [`views`]: Landing and dashboard logic over any backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bookmark_live::client::shared;
//! use bookmark_live::views::{DashboardController, RecordingNavigator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads BOOKMARK_BACKEND_URL, BOOKMARK_BACKEND_KEY and BOOKMARK_ACCESS_TOKEN
//!     let backend = shared()?;
//!
//!     let mut dashboard = DashboardController::new(backend, RecordingNavigator::new());
//!     dashboard.mount().await?;
//!     for bookmark in dashboard.bookmarks() {
//!         println!("{}  {}", bookmark.title, bookmark.url);
//!     }
//!
//!     // Apply live changes as they arrive
//!     while let Some(_changed) = dashboard.pump().await {
//!         println!("{} bookmarks", dashboard.bookmarks().len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod realtime;
pub mod service;
pub mod store;
pub mod views;

// Re-export top-level types for convenience
pub use store::{
    Bookmark, Column, Filter, NewBookmark, Order, SelectQuery, Session, Store, StoreError,
    StoreResult, User,
};

pub use api::{build_router, serve, ApiError, AppState};

pub use auth::{AuthError, AuthService};

pub use client::{
    Backend, ClientError, ClientResult, FeedMessage, HttpBackend, LocalBackend, Subscription,
};

pub use realtime::{ChangeEvent, ChangeHub, ClientMessage, HubConfig, ServerMessage};

pub use service::{BookmarkService, ServiceError};

pub use config::{Config, ConfigError, LoggingConfig};

pub use views::{DashboardController, SessionGuard};
