//! Dashboard Controller
//!
//! Logic of the dashboard view. On mount it resolves the user (or sends
//! the view back to the login route), opens the change-feed and loads the
//! user's bookmarks newest first. After mount only change-feed messages
//! touch the mirror: add and delete go to the backend and wait for the
//! feed to report the result, in this view and in every other view of the
//! same user.
//!
//! ```text
//! Unresolved ──mount, no user──▶ Redirected
//!     │
//!     └──mount, user──▶ Loaded ◀──change events
//! ```

use super::mirror::Mirror;
use super::navigator::{Navigator, LOGIN_ROUTE};
use crate::client::{Backend, ClientError, ClientResult, FeedMessage, Subscription};
use crate::realtime::{ChangeFilter, ChannelSpec, EventFilter};
use crate::store::{Bookmark, Column, Filter, NewBookmark, Order, SelectQuery, User};

/// Change-feed channel every dashboard joins
pub const FEED_CHANNEL: &str = "bookmarks-realtime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardState {
    /// User not resolved yet
    Unresolved,
    /// User known, mirror loaded, feed open
    Loaded,
    /// No user; the view went to the login route
    Redirected,
}

/// Result of the add action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// An input was empty; nothing was sent
    Skipped,
    /// The backend stored the row
    Sent(Bookmark),
}

/// Feed channel of a user's dashboard
pub fn feed_channel(user_id: &str) -> ChannelSpec {
    let owner = Filter::eq(Column::UserId, user_id);
    ChannelSpec::new(FEED_CHANNEL)
        .on(ChangeFilter::bookmarks(EventFilter::Insert).with_filter(&owner))
        .on(ChangeFilter::bookmarks(EventFilter::Delete).with_filter(&owner))
}

pub struct DashboardController<B, N> {
    backend: B,
    navigator: N,
    state: DashboardState,
    user: Option<User>,
    mirror: Mirror,
    title: String,
    url: String,
    notice: Option<String>,
    subscription: Option<Subscription>,
}

impl<B: Backend, N: Navigator> DashboardController<B, N> {
    pub fn new(backend: B, navigator: N) -> Self {
        Self {
            backend,
            navigator,
            state: DashboardState::Unresolved,
            user: None,
            mirror: Mirror::new(),
            title: String::new(),
            url: String::new(),
            notice: None,
            subscription: None,
        }
    }

    pub fn state(&self) -> DashboardState {
        self.state
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Mirror contents, newest first
    pub fn bookmarks(&self) -> &[Bookmark] {
        self.mirror.as_slice()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Last failure shown to the user
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Hand out the pending notice once
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Resolve the user, then subscribe and load, or redirect to login
    pub async fn mount(&mut self) -> ClientResult<DashboardState> {
        let user = match self.backend.get_user().await {
            Ok(user) => user,
            Err(e) => return Err(self.fail("Could not resolve the current user", e)),
        };

        match user {
            Some(user) => self.load(user).await,
            None => Ok(self.redirect()),
        }
    }

    /// Re-resolve the user after a possible identity change
    ///
    /// A different user tears the feed down and loads again; no user
    /// redirects to login.
    pub async fn refresh_identity(&mut self) -> ClientResult<DashboardState> {
        if self.state == DashboardState::Redirected {
            return Ok(self.state);
        }

        let user = match self.backend.get_user().await {
            Ok(user) => user,
            Err(e) => return Err(self.fail("Could not resolve the current user", e)),
        };

        match user {
            None => {
                self.teardown();
                self.user = None;
                self.mirror.replace(Vec::new());
                Ok(self.redirect())
            }
            Some(user) if self.user.as_ref().map(|u| &u.id) == Some(&user.id) => Ok(self.state),
            Some(user) => {
                tracing::info!(user_id = %user.id, "Identity changed, reloading dashboard");
                self.load(user).await
            }
        }
    }

    fn redirect(&mut self) -> DashboardState {
        self.navigator.assign(LOGIN_ROUTE);
        self.state = DashboardState::Redirected;
        self.state
    }

    async fn load(&mut self, user: User) -> ClientResult<DashboardState> {
        self.teardown();
        let user_id = user.id.clone();
        self.user = Some(user);
        self.state = DashboardState::Loaded;

        // Subscribe before fetching so nothing committed in between is lost;
        // queued events replay against the fetched list
        let subscribed = self.subscribe(&user_id).await;
        let fetched = self.fetch(&user_id).await;
        subscribed.and(fetched).map(|()| self.state)
    }

    async fn subscribe(&mut self, user_id: &str) -> ClientResult<()> {
        match self.backend.subscribe(feed_channel(user_id)).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => Err(self.fail("Live updates are unavailable", e)),
        }
    }

    async fn fetch(&mut self, user_id: &str) -> ClientResult<()> {
        let query = SelectQuery::owned_by(user_id).order(Order::desc(Column::CreatedAt));
        match self.backend.select_bookmarks(query).await {
            Ok(rows) => {
                tracing::debug!(count = rows.len(), "Bookmarks loaded");
                self.mirror.replace(rows);
                Ok(())
            }
            Err(e) => Err(self.fail("Failed to load bookmarks", e)),
        }
    }

    /// Insert the form's bookmark; the mirror waits for the feed
    pub async fn add(&mut self) -> ClientResult<AddOutcome> {
        if self.title.is_empty() || self.url.is_empty() {
            return Ok(AddOutcome::Skipped);
        }
        let Some(user_id) = self.user.as_ref().map(|u| u.id.clone()) else {
            return Err(self.fail("Failed to add bookmark", ClientError::NotAuthenticated));
        };

        let new = NewBookmark::new(self.title.clone(), self.url.clone(), user_id);
        match self.backend.insert_bookmark(new).await {
            Ok(row) => {
                self.title.clear();
                self.url.clear();
                self.notice = None;
                Ok(AddOutcome::Sent(row))
            }
            Err(e) => Err(self.fail("Failed to add bookmark", e)),
        }
    }

    /// Delete by id; the mirror waits for the feed
    pub async fn delete(&mut self, id: &str) -> ClientResult<()> {
        match self
            .backend
            .delete_bookmarks(vec![Filter::eq(Column::Id, id)])
            .await
        {
            Ok(_) => {
                self.notice = None;
                Ok(())
            }
            Err(e) => Err(self.fail("Failed to delete bookmark", e)),
        }
    }

    /// Apply one feed message; returns whether the mirror changed
    pub fn apply(&mut self, message: FeedMessage) -> bool {
        match message {
            FeedMessage::Change(change) => self.mirror.apply(&change),
            FeedMessage::Status(status) => {
                tracing::info!(status = ?status, channel = FEED_CHANNEL, "Subscription status");
                false
            }
            FeedMessage::Error(message) => {
                tracing::warn!(error = %message, channel = FEED_CHANNEL, "Subscription error");
                self.notice = Some(message);
                false
            }
        }
    }

    /// Wait for and apply the next feed message
    ///
    /// `None` when there is no feed or it has ended.
    pub async fn pump(&mut self) -> Option<bool> {
        let message = self.subscription.as_mut()?.next().await;
        match message {
            Some(message) => Some(self.apply(message)),
            None => {
                self.subscription = None;
                None
            }
        }
    }

    /// Apply every queued feed message; returns how many changed the mirror
    pub fn drain(&mut self) -> usize {
        let mut changed = 0;
        while let Some(message) = self.subscription.as_mut().and_then(Subscription::try_next) {
            if self.apply(message) {
                changed += 1;
            }
        }
        changed
    }

    /// Release the feed
    pub fn unmount(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn fail(&mut self, context: &str, error: ClientError) -> ClientError {
        tracing::error!(error = %error, "{}", context);
        self.notice = Some(format!("{}: {}", context, error));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeEvent;
    use crate::views::navigator::{Navigation, RecordingNavigator};
    use crate::views::testing::{bookmark, FakeBackend};

    fn ids<B: Backend, N: Navigator>(c: &DashboardController<B, N>) -> Vec<String> {
        c.bookmarks().iter().map(|r| r.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_mount_without_user_redirects_without_fetch() {
        let backend = FakeBackend::signed_out();
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);

        assert_eq!(dashboard.mount().await.unwrap(), DashboardState::Redirected);
        assert_eq!(nav.last(), Some(Navigation::Assign("/".to_string())));
        assert!(backend.selects.lock().unwrap().is_empty());
        assert!(backend.channels.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mount_loads_owned_rows_newest_first() {
        let backend = FakeBackend::signed_in("u1")
            .with_rows(vec![bookmark("3", "u1"), bookmark("2", "u1"), bookmark("1", "u1")]);
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);

        assert_eq!(dashboard.mount().await.unwrap(), DashboardState::Loaded);
        assert_eq!(ids(&dashboard), vec!["3", "2", "1"]);
        assert!(nav.history().is_empty());

        let selects = backend.selects.lock().unwrap();
        assert_eq!(selects.len(), 1);
        assert_eq!(selects[0].filters, vec![Filter::eq(Column::UserId, "u1")]);
        assert_eq!(selects[0].order, Some(Order::desc(Column::CreatedAt)));
    }

    #[tokio::test]
    async fn test_feed_channel_filters_insert_and_delete_by_owner() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        let channels = backend.channels.lock().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, FEED_CHANNEL);
        let events: Vec<_> = channels[0].changes.iter().map(|c| c.event).collect();
        assert_eq!(events, vec![EventFilter::Insert, EventFilter::Delete]);
        assert!(channels[0]
            .changes
            .iter()
            .all(|c| c.filter.as_deref() == Some("user_id=eq.u1")));
    }

    #[tokio::test]
    async fn test_add_skips_empty_inputs() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        dashboard.set_title("only a title");
        assert_eq!(dashboard.add().await.unwrap(), AddOutcome::Skipped);
        assert!(backend.inserts.lock().unwrap().is_empty());
        assert_eq!(dashboard.title(), "only a title");
    }

    #[tokio::test]
    async fn test_add_clears_inputs_and_waits_for_feed() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();
        dashboard.drain();

        dashboard.set_title("Rust");
        dashboard.set_url("https://rust-lang.org");
        let AddOutcome::Sent(row) = dashboard.add().await.unwrap() else {
            panic!("insert not sent");
        };

        assert_eq!(
            backend.inserts.lock().unwrap()[0],
            NewBookmark::new("Rust", "https://rust-lang.org", "u1")
        );
        assert_eq!(dashboard.title(), "");
        assert_eq!(dashboard.url(), "");
        assert!(dashboard.bookmarks().is_empty());

        backend.push(FeedMessage::Change(ChangeEvent::insert(row.clone())));
        assert_eq!(dashboard.drain(), 1);
        assert_eq!(ids(&dashboard), vec![row.id]);
    }

    #[tokio::test]
    async fn test_add_failure_keeps_inputs_and_sets_notice() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        dashboard.set_title("Rust");
        dashboard.set_url("https://rust-lang.org");
        backend.fail_next("insert refused");

        assert!(dashboard.add().await.is_err());
        assert_eq!(dashboard.title(), "Rust");
        assert_eq!(dashboard.url(), "https://rust-lang.org");
        assert!(dashboard.notice().unwrap().contains("insert refused"));
    }

    #[tokio::test]
    async fn test_delete_does_not_touch_mirror() {
        let backend = FakeBackend::signed_in("u1").with_rows(vec![bookmark("5", "u1")]);
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        dashboard.delete("5").await.unwrap();
        assert_eq!(ids(&dashboard), vec!["5"]);
        assert_eq!(
            backend.deletes.lock().unwrap()[0],
            vec![Filter::eq(Column::Id, "5")]
        );

        backend.push(FeedMessage::Change(ChangeEvent::delete(bookmark("5", "u1"))));
        dashboard.drain();
        assert!(dashboard.bookmarks().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_events() {
        let backend = FakeBackend::signed_in("u1").with_rows(vec![bookmark("1", "u1")]);
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        backend.push(FeedMessage::Change(ChangeEvent::insert(bookmark("2", "u1"))));
        backend.push(FeedMessage::Change(ChangeEvent::insert(bookmark("2", "u1"))));
        backend.push(FeedMessage::Change(ChangeEvent::delete(bookmark("9", "u1"))));
        assert_eq!(dashboard.drain(), 1);
        assert_eq!(ids(&dashboard), vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_feed_error_becomes_notice() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        backend.push(FeedMessage::Error("channel closed".to_string()));
        assert_eq!(dashboard.pump().await, Some(false));
        assert_eq!(dashboard.notice(), Some("channel closed"));
    }

    #[tokio::test]
    async fn test_notice_is_reported_once() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        backend.push(FeedMessage::Error("channel closed".to_string()));
        assert_eq!(dashboard.pump().await, Some(false));
        assert_eq!(dashboard.take_notice().as_deref(), Some("channel closed"));

        // A later status message brings no stale notice back
        backend.push(FeedMessage::Status(crate::client::SubscriptionStatus::Subscribed));
        assert_eq!(dashboard.pump().await, Some(false));
        assert_eq!(dashboard.take_notice(), None);
    }

    #[tokio::test]
    async fn test_user_lookup_failure_is_reported() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);

        backend.fail_next("boom");
        assert!(dashboard.mount().await.is_err());
        assert!(dashboard.notice().unwrap().contains("boom"));
        assert_eq!(dashboard.state(), DashboardState::Unresolved);
        assert!(backend.selects.lock().unwrap().is_empty());
        assert!(nav.history().is_empty());
    }

    #[tokio::test]
    async fn test_unmount_releases_feed() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();
        assert!(dashboard.is_subscribed());
        assert_eq!(backend.released(), 0);

        dashboard.unmount();
        assert!(!dashboard.is_subscribed());
        assert_eq!(backend.released(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_feed() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        {
            let mut dashboard = DashboardController::new(&backend, &nav);
            dashboard.mount().await.unwrap();
        }
        assert_eq!(backend.released(), 1);
    }

    #[tokio::test]
    async fn test_same_identity_keeps_feed() {
        let backend = FakeBackend::signed_in("u1");
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        assert_eq!(
            dashboard.refresh_identity().await.unwrap(),
            DashboardState::Loaded
        );
        assert_eq!(backend.released(), 0);
        assert_eq!(backend.user_lookups(), 2);
    }

    #[tokio::test]
    async fn test_identity_change_resubscribes_for_new_user() {
        let backend = FakeBackend::signed_in("u1").with_rows(vec![bookmark("1", "u1")]);
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();
        assert_eq!(ids(&dashboard), vec!["1"]);

        backend.set_user(Some("u2"));
        backend.set_rows(vec![bookmark("9", "u2")]);
        assert_eq!(
            dashboard.refresh_identity().await.unwrap(),
            DashboardState::Loaded
        );

        assert_eq!(backend.released(), 1);
        assert_eq!(dashboard.user().map(|u| u.id.as_str()), Some("u2"));
        assert_eq!(ids(&dashboard), vec!["9"]);
        assert!(dashboard.is_subscribed());

        let channels = backend.channels.lock().unwrap();
        assert_eq!(channels.len(), 2);
        assert!(channels[1]
            .changes
            .iter()
            .all(|c| c.filter.as_deref() == Some("user_id=eq.u2")));
    }

    #[tokio::test]
    async fn test_sign_out_clears_mirror_and_redirects() {
        let backend = FakeBackend::signed_in("u1").with_rows(vec![bookmark("1", "u1")]);
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(&backend, &nav);
        dashboard.mount().await.unwrap();

        backend.set_user(None);
        assert_eq!(
            dashboard.refresh_identity().await.unwrap(),
            DashboardState::Redirected
        );

        assert_eq!(backend.released(), 1);
        assert!(dashboard.bookmarks().is_empty());
        assert!(dashboard.user().is_none());
        assert!(!dashboard.is_subscribed());
        assert_eq!(nav.last(), Some(Navigation::Assign("/".to_string())));
    }
}
