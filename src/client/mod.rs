//! Client SDK
//!
//! The contract the views program against: identity, bookmark rows and the
//! change-feed. Two implementations:
//!
//! - [`HttpBackend`]: talks to a running server over REST and websocket
//! - [`LocalBackend`]: calls the server's services in-process
//!
//! [`shared()`] hands out one lazily constructed [`HttpBackend`] per process,
//! configured from `BOOKMARK_BACKEND_URL` and `BOOKMARK_BACKEND_KEY`.
//!
//! # Example
//!
//! ```rust,no_run
//! use bookmark_live::client::{self, Backend};
//! use bookmark_live::store::{Column, Order, SelectQuery};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = client::shared()?;
//! if let Some(user) = backend.get_user().await? {
//!     let query = SelectQuery::owned_by(&user.id).order(Order::desc(Column::CreatedAt));
//!     for row in backend.select_bookmarks(query).await? {
//!         println!("{} {}", row.title, row.url);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod http;
mod local;

pub use http::HttpBackend;
pub use local::LocalBackend;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::ConfigError;
use crate::realtime::{ChangeEvent, ChannelSpec, ServerMessage};
use crate::store::{Bookmark, Filter, NewBookmark, SelectQuery, Session, User};

/// Identity, rows and change-feed of the bookmark service
#[async_trait]
pub trait Backend: Send + Sync {
    /// Current session, `None` when signed out
    async fn get_session(&self) -> ClientResult<Option<Session>>;

    /// Current user, `None` when signed out
    async fn get_user(&self) -> ClientResult<Option<User>>;

    /// URL to send the user to for provider sign-in
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> ClientResult<String>;

    async fn select_bookmarks(&self, query: SelectQuery) -> ClientResult<Vec<Bookmark>>;

    async fn insert_bookmark(&self, new: NewBookmark) -> ClientResult<Bookmark>;

    /// Delete rows matching every filter; returns the removed rows
    async fn delete_bookmarks(&self, filters: Vec<Filter>) -> ClientResult<Vec<Bookmark>>;

    /// Join a change-feed channel
    async fn subscribe(&self, channel: ChannelSpec) -> ClientResult<Subscription>;
}

#[async_trait]
impl<'a, B> Backend for &'a B
where
    B: Backend + ?Sized,
{
    async fn get_session(&self) -> ClientResult<Option<Session>> {
        (**self).get_session().await
    }

    async fn get_user(&self) -> ClientResult<Option<User>> {
        (**self).get_user().await
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> ClientResult<String> {
        (**self).sign_in_with_oauth(provider, redirect_to).await
    }

    async fn select_bookmarks(&self, query: SelectQuery) -> ClientResult<Vec<Bookmark>> {
        (**self).select_bookmarks(query).await
    }

    async fn insert_bookmark(&self, new: NewBookmark) -> ClientResult<Bookmark> {
        (**self).insert_bookmark(new).await
    }

    async fn delete_bookmarks(&self, filters: Vec<Filter>) -> ClientResult<Vec<Bookmark>> {
        (**self).delete_bookmarks(filters).await
    }

    async fn subscribe(&self, channel: ChannelSpec) -> ClientResult<Subscription> {
        (**self).subscribe(channel).await
    }
}

/// Lifecycle of a channel subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    Closed,
}

/// One item of a subscription stream
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Status(SubscriptionStatus),
    Change(ChangeEvent),
    Error(String),
}

impl FeedMessage {
    /// Translate a server message; connection bookkeeping yields `None`
    pub(crate) fn from_server(message: ServerMessage) -> Option<Self> {
        match message {
            ServerMessage::Change { change, .. } => Some(FeedMessage::Change(change)),
            ServerMessage::Joined { .. } => Some(FeedMessage::Status(SubscriptionStatus::Subscribed)),
            ServerMessage::Left { .. } => Some(FeedMessage::Status(SubscriptionStatus::Closed)),
            ServerMessage::ChannelError { channel, message } => {
                Some(FeedMessage::Error(format!("channel {}: {}", channel, message)))
            }
            ServerMessage::Error { message } => Some(FeedMessage::Error(message)),
            ServerMessage::Connected { .. } | ServerMessage::Pong => None,
        }
    }
}

/// A joined change-feed channel
///
/// Dropping the subscription releases it.
pub struct Subscription {
    channel: String,
    events: mpsc::UnboundedReceiver<FeedMessage>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub(crate) fn new(
        channel: impl Into<String>,
        events: mpsc::UnboundedReceiver<FeedMessage>,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            channel: channel.into(),
            events,
            cancel: Some(cancel),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message; `None` once the feed has ended
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.events.recv().await
    }

    /// Next message if one is already queued
    pub fn try_next(&mut self) -> Option<FeedMessage> {
        self.events.try_recv().ok()
    }

    /// Leave the channel
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
            tracing::debug!(channel = %self.channel, "Subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Client-side errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Realtime error: {0}")]
    Realtime(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

static SHARED: OnceCell<HttpBackend> = OnceCell::new();

/// The process-wide client handle, created on first use
pub fn shared() -> ClientResult<&'static HttpBackend> {
    SHARED.get_or_try_init(HttpBackend::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeKind;
    use chrono::Utc;

    #[test]
    fn test_feed_message_translation() {
        let row = Bookmark {
            id: "1".to_string(),
            title: "t".to_string(),
            url: "https://t.test".to_string(),
            user_id: "u".to_string(),
            created_at: Utc::now(),
        };
        let change = ServerMessage::Change {
            channel: "c".to_string(),
            change: ChangeEvent::insert(row),
        };
        match FeedMessage::from_server(change) {
            Some(FeedMessage::Change(event)) => assert_eq!(event.event, ChangeKind::Insert),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(FeedMessage::from_server(ServerMessage::Pong), None);
        assert_eq!(
            FeedMessage::from_server(ServerMessage::Joined {
                channel: "c".to_string()
            }),
            Some(FeedMessage::Status(SubscriptionStatus::Subscribed))
        );
    }

    #[tokio::test]
    async fn test_subscription_drop_cancels() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let subscription = Subscription::new("c", rx, cancel_tx);
        assert_eq!(subscription.channel(), "c");

        drop(subscription);
        assert!(cancel_rx.await.is_ok());
    }
}
