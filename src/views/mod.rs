//! Views
//!
//! The page logic of the two routes, independent of how it is displayed:
//!
//! - [`SessionGuard`] (`/`): forwards signed-in users, starts sign-in
//! - [`DashboardController`] (`/dashboard`): the user's live bookmark list
//!
//! Both run against any [`Backend`](crate::client::Backend) and report
//! navigations through a [`Navigator`]. The server renders them to HTML,
//! the CLI drives them from a terminal.

pub mod dashboard;
pub mod landing;
pub mod mirror;
pub mod navigator;
pub mod render;

#[cfg(test)]
pub(crate) mod testing;

pub use dashboard::{feed_channel, AddOutcome, DashboardController, DashboardState, FEED_CHANNEL};
pub use landing::{LandingState, SessionGuard};
pub use mirror::Mirror;
pub use navigator::{Navigation, Navigator, RecordingNavigator, DASHBOARD_ROUTE, LOGIN_ROUTE};

#[cfg(test)]
mod tests {
    use super::testing::CountingBackend;
    use super::*;
    use crate::api::AppState;
    use crate::client::LocalBackend;
    use crate::config::Config;
    use crate::store::{NewBookmark, ProviderIdentity, Store};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    async fn app_with_user(subject: &str) -> (Arc<AppState>, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let state = Arc::new(AppState::new(store, Config::default()));
        let token = session_for(&state, subject).await;
        (state, token)
    }

    async fn session_for(state: &AppState, subject: &str) -> String {
        let user = state
            .store
            .upsert_user(&ProviderIdentity {
                provider: "google".to_string(),
                subject: subject.to_string(),
                email: Some(format!("{}@example.com", subject)),
                name: None,
            })
            .await
            .unwrap();
        state.auth.issue_session(&user.id).await.unwrap().access_token
    }

    /// Pump until a message changes the mirror
    async fn next_change<B, N>(dashboard: &mut DashboardController<B, N>)
    where
        B: crate::client::Backend,
        N: Navigator,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match dashboard.pump().await {
                    Some(true) => break,
                    Some(false) => continue,
                    None => panic!("feed ended"),
                }
            }
        })
        .await
        .expect("change delivered in time");
    }

    #[tokio::test]
    async fn test_mount_orders_newest_first_against_store() {
        let (state, token) = app_with_user("alice").await;
        let session = state.auth.session(&token).await.unwrap().unwrap();
        for n in 1..=3 {
            state
                .bookmarks
                .insert(
                    &session.user.id,
                    NewBookmark::new(format!("n{}", n), format!("https://{}.test", n), session.user.id.clone()),
                )
                .await
                .unwrap();
        }

        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(LocalBackend::new(state, Some(token)), &nav);
        dashboard.mount().await.unwrap();

        let titles: Vec<_> = dashboard.bookmarks().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["n3", "n2", "n1"]);
    }

    #[tokio::test]
    async fn test_two_views_converge_through_feed() {
        let (state, token) = app_with_user("alice").await;

        let nav_a = RecordingNavigator::new();
        let nav_b = RecordingNavigator::new();
        let backend_a = CountingBackend::new(LocalBackend::new(Arc::clone(&state), Some(token.clone())));
        let backend_b = CountingBackend::new(LocalBackend::new(Arc::clone(&state), Some(token)));
        let mut tab_a = DashboardController::new(&backend_a, &nav_a);
        let mut tab_b = DashboardController::new(&backend_b, &nav_b);

        tab_a.mount().await.unwrap();
        tab_b.mount().await.unwrap();

        tab_a.set_title("Five");
        tab_a.set_url("https://five.test");
        let AddOutcome::Sent(row) = tab_a.add().await.unwrap() else {
            panic!("insert not sent");
        };

        next_change(&mut tab_a).await;
        next_change(&mut tab_b).await;
        assert_eq!(tab_a.bookmarks().len(), 1);
        assert_eq!(tab_b.bookmarks()[0].id, row.id);

        tab_a.delete(&row.id).await.unwrap();
        next_change(&mut tab_a).await;
        next_change(&mut tab_b).await;
        assert!(tab_a.bookmarks().is_empty());
        assert!(tab_b.bookmarks().is_empty());

        assert_eq!(backend_a.delete_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend_b.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_users_changes_stay_private() {
        let (state, alice_token) = app_with_user("alice").await;
        let bob_token = session_for(&state, "bob").await;

        let nav = RecordingNavigator::new();
        let mut alice = DashboardController::new(LocalBackend::new(Arc::clone(&state), Some(alice_token)), &nav);
        let mut bob = DashboardController::new(LocalBackend::new(Arc::clone(&state), Some(bob_token)), &nav);
        alice.mount().await.unwrap();
        bob.mount().await.unwrap();

        bob.set_title("secret");
        bob.set_url("https://secret.test");
        bob.add().await.unwrap();
        next_change(&mut bob).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(alice.drain(), 0);
        assert!(alice.bookmarks().is_empty());
    }

    #[tokio::test]
    async fn test_landing_redirects_signed_in_user() {
        let (state, token) = app_with_user("alice").await;
        let nav = RecordingNavigator::new();
        let mut guard = SessionGuard::new(
            LocalBackend::new(Arc::clone(&state), Some(token)),
            &nav,
            "http://localhost:8090",
        );
        assert_eq!(guard.check().await.unwrap(), LandingState::Redirected);

        let mut anonymous = SessionGuard::new(LocalBackend::new(state, None), &nav, "http://localhost:8090");
        assert_eq!(anonymous.check().await.unwrap(), LandingState::Idle);
    }

    #[tokio::test]
    async fn test_unmount_unregisters_from_hub() {
        let (state, token) = app_with_user("alice").await;
        let nav = RecordingNavigator::new();
        let mut dashboard = DashboardController::new(LocalBackend::new(Arc::clone(&state), Some(token)), &nav);
        dashboard.mount().await.unwrap();
        assert_eq!(state.hub.connection_count().await, 1);

        dashboard.unmount();
        tokio::time::timeout(Duration::from_secs(2), async {
            while state.hub.connection_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection released");
    }
}
