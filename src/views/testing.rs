//! Test doubles for the view controllers

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::client::{Backend, ClientError, ClientResult, FeedMessage, Subscription};
use crate::realtime::ChannelSpec;
use crate::store::{Bookmark, Filter, NewBookmark, SelectQuery, Session, User};

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        name: None,
        provider: "google".to_string(),
        provider_subject: format!("sub-{}", id),
        created_at: Utc::now(),
    }
}

pub fn bookmark(id: &str, owner: &str) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        title: format!("title {}", id),
        url: format!("https://{}.test", id),
        user_id: owner.to_string(),
        created_at: Utc::now(),
    }
}

/// Scripted backend that counts and records every call
#[derive(Default)]
pub struct FakeBackend {
    user: Mutex<Option<User>>,
    rows: Mutex<Vec<Bookmark>>,
    failure: Mutex<Option<String>>,
    pub selects: Mutex<Vec<SelectQuery>>,
    pub inserts: Mutex<Vec<NewBookmark>>,
    pub deletes: Mutex<Vec<Vec<Filter>>>,
    pub channels: Mutex<Vec<ChannelSpec>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<FeedMessage>>>,
    cancels: Mutex<Vec<oneshot::Receiver<()>>>,
    user_lookups: AtomicUsize,
}

impl FakeBackend {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: &str) -> Self {
        Self {
            user: Mutex::new(Some(user(user_id))),
            ..Self::default()
        }
    }

    pub fn with_rows(self, rows: Vec<Bookmark>) -> Self {
        *self.rows.lock().unwrap() = rows;
        self
    }

    /// Switch the signed-in identity
    pub fn set_user(&self, user_id: Option<&str>) {
        *self.user.lock().unwrap() = user_id.map(user);
    }

    pub fn set_rows(&self, rows: Vec<Bookmark>) {
        *self.rows.lock().unwrap() = rows;
    }

    /// Make the next call fail
    pub fn fail_next(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    fn check_failure(&self) -> ClientResult<()> {
        match self.failure.lock().unwrap().take() {
            Some(message) => Err(ClientError::Backend(message)),
            None => Ok(()),
        }
    }

    /// Deliver a message on every live subscription
    pub fn push(&self, message: FeedMessage) {
        for feed in self.feeds.lock().unwrap().iter() {
            let _ = feed.send(message.clone());
        }
    }

    /// Subscriptions that were released so far
    pub fn released(&self) -> usize {
        self.cancels
            .lock()
            .unwrap()
            .iter_mut()
            .map(|rx| !matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)))
            .filter(|released| *released)
            .count()
    }

    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_session(&self) -> ClientResult<Option<Session>> {
        self.check_failure()?;
        Ok(self.user.lock().unwrap().clone().map(|user| Session {
            access_token: "token".to_string(),
            user,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }))
    }

    async fn get_user(&self) -> ClientResult<Option<User>> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.user.lock().unwrap().clone())
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> ClientResult<String> {
        self.check_failure()?;
        Ok(format!(
            "https://idp.test/authorize?provider={}&redirect_to={}",
            provider, redirect_to
        ))
    }

    async fn select_bookmarks(&self, query: SelectQuery) -> ClientResult<Vec<Bookmark>> {
        self.selects.lock().unwrap().push(query);
        self.check_failure()?;
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn insert_bookmark(&self, new: NewBookmark) -> ClientResult<Bookmark> {
        self.inserts.lock().unwrap().push(new.clone());
        self.check_failure()?;
        Ok(Bookmark {
            id: format!("new-{}", self.inserts.lock().unwrap().len()),
            title: new.title,
            url: new.url,
            user_id: new.user_id,
            created_at: Utc::now(),
        })
    }

    async fn delete_bookmarks(&self, filters: Vec<Filter>) -> ClientResult<Vec<Bookmark>> {
        self.deletes.lock().unwrap().push(filters);
        self.check_failure()?;
        Ok(Vec::new())
    }

    async fn subscribe(&self, channel: ChannelSpec) -> ClientResult<Subscription> {
        self.check_failure()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.feeds.lock().unwrap().push(tx);
        self.cancels.lock().unwrap().push(cancel_rx);
        self.channels.lock().unwrap().push(channel.clone());
        Ok(Subscription::new(channel.name, rx, cancel_tx))
    }
}

/// Wrapper counting delete requests of an inner backend
pub struct CountingBackend<B> {
    pub inner: B,
    pub delete_calls: AtomicUsize,
}

impl<B> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            delete_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for CountingBackend<B> {
    async fn get_session(&self) -> ClientResult<Option<Session>> {
        self.inner.get_session().await
    }

    async fn get_user(&self) -> ClientResult<Option<User>> {
        self.inner.get_user().await
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> ClientResult<String> {
        self.inner.sign_in_with_oauth(provider, redirect_to).await
    }

    async fn select_bookmarks(&self, query: SelectQuery) -> ClientResult<Vec<Bookmark>> {
        self.inner.select_bookmarks(query).await
    }

    async fn insert_bookmark(&self, new: NewBookmark) -> ClientResult<Bookmark> {
        self.inner.insert_bookmark(new).await
    }

    async fn delete_bookmarks(&self, filters: Vec<Filter>) -> ClientResult<Vec<Bookmark>> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_bookmarks(filters).await
    }

    async fn subscribe(&self, channel: ChannelSpec) -> ClientResult<Subscription> {
        self.inner.subscribe(channel).await
    }
}
