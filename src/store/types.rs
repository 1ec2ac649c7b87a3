//! Store Types
//!
//! Rows of the three relations: users, sessions and bookmarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bookmark row. `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    /// Column value as text, used by filter matching
    pub fn column(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "title" => Some(self.title.clone()),
            "url" => Some(self.url.clone()),
            "user_id" => Some(self.user_id.clone()),
            "created_at" => Some(super::format_timestamp(&self.created_at)),
            _ => None,
        }
    }
}

/// Insert payload for a bookmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

impl NewBookmark {
    pub fn new(title: impl Into<String>, url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            user_id: user_id.into(),
        }
    }
}

/// An identity created on first sign-in with a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub provider: String,
    pub provider_subject: String,
    pub created_at: DateTime<Utc>,
}

/// Profile data handed over by an identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// An authenticated session, addressed by an opaque access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bookmark {
        Bookmark {
            id: "b-1".to_string(),
            title: "Example".to_string(),
            url: "https://example.com".to_string(),
            user_id: "u-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_bookmark_column_lookup() {
        let bookmark = sample();
        assert_eq!(bookmark.column("user_id").as_deref(), Some("u-1"));
        assert_eq!(bookmark.column("title").as_deref(), Some("Example"));
        assert!(bookmark.column("owner").is_none());
    }

    #[test]
    fn test_bookmark_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], "b-1");
        assert_eq!(json["url"], "https://example.com");
        assert!(json["created_at"].is_string());
    }
}
