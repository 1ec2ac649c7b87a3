//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON, and the client
//! SDK decodes the same types.

use serde::{Deserialize, Serialize};

use crate::store::{Session, User};

// ============================================
// BOOKMARK DTOs
// ============================================

/// Insert request body for `POST /rest/v1/bookmarks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertBookmarkRequest {
    pub title: String,
    pub url: String,
    /// Owner; defaults to the session's user, any other value is refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Form body of the dashboard add action
#[derive(Debug, Deserialize)]
pub struct AddBookmarkForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

// ============================================
// AUTH DTOs
// ============================================

/// Query of `GET /auth/v1/authorize`
#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

/// Query of `GET /auth/v1/callback`
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set by the provider when consent was denied
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Body of `GET /auth/v1/session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: Option<Session>,
}

/// Body of `GET /auth/v1/user`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

// ============================================
// PAGE DTOs
// ============================================

/// Query of the HTML pages
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    /// Failure message to show in the notice line
    #[serde(default)]
    pub notice: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Add-form inputs kept across a failed add
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Form body of the landing page sign-in action
#[derive(Debug, Deserialize)]
pub struct SignInForm {
    #[serde(default)]
    pub provider: Option<String>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy, unhealthy
    pub status: String,
    /// Store status
    pub store: String,
    /// Open realtime connections
    pub realtime_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
