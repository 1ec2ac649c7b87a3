//! Navigation
//!
//! How a view leaves itself: a history-replacing soft navigation or a
//! full navigation to an arbitrary URL.

use std::sync::{Mutex, PoisonError};

/// Route of the landing/login view
pub const LOGIN_ROUTE: &str = "/";
/// Route of the dashboard view
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// Sink for view navigations
pub trait Navigator: Send + Sync {
    /// Navigate in-app, replacing the current history entry
    fn replace(&self, route: &str);

    /// Navigate to a URL, leaving the current view
    fn assign(&self, url: &str);
}

/// A navigation issued by a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Replace(String),
    Assign(String),
}

impl Navigation {
    pub fn target(&self) -> &str {
        match self {
            Navigation::Replace(t) | Navigation::Assign(t) => t,
        }
    }
}

/// Navigator that records every navigation
///
/// Page handlers turn the last entry into an HTTP redirect; the CLI and
/// tests inspect it directly.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, navigation: Navigation) {
        tracing::debug!(target_url = %navigation.target(), "Navigation");
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(navigation);
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, route: &str) {
        self.push(Navigation::Replace(route.to_string()));
    }

    fn assign(&self, url: &str) {
        self.push(Navigation::Assign(url.to_string()));
    }
}

impl<N: Navigator + ?Sized> Navigator for &N {
    fn replace(&self, route: &str) {
        (**self).replace(route)
    }

    fn assign(&self, url: &str) {
        (**self).assign(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording() {
        let nav = RecordingNavigator::new();
        assert_eq!(nav.last(), None);

        nav.replace(DASHBOARD_ROUTE);
        nav.assign("https://idp.test/authorize");

        assert_eq!(
            nav.history(),
            vec![
                Navigation::Replace("/dashboard".to_string()),
                Navigation::Assign("https://idp.test/authorize".to_string()),
            ]
        );
        assert_eq!(nav.last().unwrap().target(), "https://idp.test/authorize");
    }
}
