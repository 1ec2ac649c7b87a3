//! In-Process Backend
//!
//! The client contract served directly from the server's shared state.
//! The HTML pages drive the views through it, acting as the user behind
//! the request's session token.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::{Backend, ClientError, ClientResult, FeedMessage, Subscription, SubscriptionStatus};
use crate::api::AppState;
use crate::auth::AuthError;
use crate::realtime::{ChannelSpec, HubError, ServerMessage};
use crate::service::ServiceError;
use crate::store::{Bookmark, Filter, NewBookmark, SelectQuery, Session, User};

impl From<AuthError> for ClientError {
    fn from(e: AuthError) -> Self {
        ClientError::Backend(e.to_string())
    }
}

impl From<ServiceError> for ClientError {
    fn from(e: ServiceError) -> Self {
        ClientError::Backend(e.to_string())
    }
}

impl From<HubError> for ClientError {
    fn from(e: HubError) -> Self {
        ClientError::Realtime(e.to_string())
    }
}

/// Backend bound to one session token of an in-process server
#[derive(Clone)]
pub struct LocalBackend {
    state: Arc<AppState>,
    access_token: Option<String>,
}

impl LocalBackend {
    pub fn new(state: Arc<AppState>, access_token: Option<String>) -> Self {
        Self {
            state,
            access_token,
        }
    }

    async fn require_user(&self) -> ClientResult<User> {
        self.get_user().await?.ok_or(ClientError::NotAuthenticated)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn get_session(&self) -> ClientResult<Option<Session>> {
        match &self.access_token {
            Some(token) => Ok(self.state.auth.session(token).await?),
            None => Ok(None),
        }
    }

    async fn get_user(&self) -> ClientResult<Option<User>> {
        Ok(self.get_session().await?.map(|s| s.user))
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> ClientResult<String> {
        Ok(self
            .state
            .auth
            .authorize_url(provider, Some(redirect_to))
            .await?)
    }

    async fn select_bookmarks(&self, query: SelectQuery) -> ClientResult<Vec<Bookmark>> {
        let user = self.require_user().await?;
        Ok(self.state.bookmarks.list(&user.id, query).await?)
    }

    async fn insert_bookmark(&self, new: NewBookmark) -> ClientResult<Bookmark> {
        let user = self.require_user().await?;
        Ok(self.state.bookmarks.insert(&user.id, new).await?)
    }

    async fn delete_bookmarks(&self, filters: Vec<Filter>) -> ClientResult<Vec<Bookmark>> {
        let user = self.require_user().await?;
        Ok(self.state.bookmarks.delete(&user.id, filters).await?)
    }

    async fn subscribe(&self, channel: ChannelSpec) -> ClientResult<Subscription> {
        let user = self.require_user().await?;
        let hub = Arc::clone(&self.state.hub);

        let (hub_tx, mut hub_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let connection_id = hub.register(&user.id, hub_tx).await?;
        if let Err(e) = hub.join(&connection_id, &channel.name, &channel.changes).await {
            hub.unregister(&connection_id).await;
            return Err(e.into());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(FeedMessage::Status(SubscriptionStatus::Subscribed));

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    message = hub_rx.recv() => match message {
                        Some(message) => {
                            if let Some(feed) = FeedMessage::from_server(message) {
                                if events_tx.send(feed).is_err() {
                                    break;
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
            hub.unregister(&connection_id).await;
            let _ = events_tx.send(FeedMessage::Status(SubscriptionStatus::Closed));
        });

        Ok(Subscription::new(channel.name, events_rx, cancel_tx))
    }
}
