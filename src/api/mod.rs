//! Bookmark Service HTTP API
//!
//! HTTP layer built with Axum: row access, identity, the realtime
//! websocket and the two HTML views.
//!
//! # Endpoints
//!
//! ## Rows (`apikey` + bearer session)
//! - `GET /rest/v1/bookmarks` - Select own bookmarks (`col=eq.v`, `order=col.desc`, `limit=n`)
//! - `POST /rest/v1/bookmarks` - Insert a bookmark
//! - `DELETE /rest/v1/bookmarks` - Delete own bookmarks matching filters
//!
//! ## Auth
//! - `GET /auth/v1/authorize` - Start OAuth sign-in (`apikey` header or query)
//! - `GET /auth/v1/callback` - Provider redirect target
//! - `GET /auth/v1/session` - Current session
//! - `GET /auth/v1/user` - Current user
//! - `POST /auth/v1/logout` - Revoke the session
//!
//! ## Realtime
//! - `GET /realtime/v1/websocket` - Change-feed connection
//!
//! ## Pages
//! - `GET /`, `POST /login`, `POST /logout`
//! - `GET /dashboard`, `POST /dashboard/bookmarks`, `POST /dashboard/bookmarks/:id/delete`
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,no_run
//! use bookmark_live::api::{serve, AppState};
//! use bookmark_live::config::Config;
//! use bookmark_live::store::Store;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let store = Arc::new(Store::open(&config.storage.db_path)?);
//!     serve(AppState::new(store, config)).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::realtime::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    let rest_routes = Router::new().route(
        "/bookmarks",
        get(routes::bookmarks::select_bookmarks)
            .post(routes::bookmarks::insert_bookmark)
            .delete(routes::bookmarks::delete_bookmarks),
    );

    let auth_routes = Router::new()
        .route("/authorize", get(routes::auth::authorize))
        .route("/session", get(routes::auth::session))
        .route("/user", get(routes::auth::user))
        .route("/logout", post(routes::auth::logout));

    // Everything a client SDK calls presents the API key
    let keyed_routes = Router::new()
        .nest("/rest/v1", rest_routes)
        .nest("/auth/v1", auth_routes)
        .route("/realtime/v1/websocket", get(websocket_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&shared_state),
            extract::require_api_key,
        ));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let page_routes = Router::new()
        .route("/", get(routes::pages::landing))
        .route("/login", post(routes::pages::login))
        .route("/logout", post(routes::pages::logout))
        .route("/dashboard", get(routes::pages::dashboard))
        .route("/dashboard/bookmarks", post(routes::pages::add_bookmark))
        .route(
            "/dashboard/bookmarks/:id/delete",
            post(routes::pages::delete_bookmark),
        );

    Router::new()
        .merge(keyed_routes)
        .merge(page_routes)
        // The provider redirects here without any key
        .route("/auth/v1/callback", get(routes::auth::callback))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.addr();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Bookmark service listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Bookmark service shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
