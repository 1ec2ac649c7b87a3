//! Session Guard
//!
//! Logic of the landing view: send signed-in users on to the dashboard,
//! otherwise offer provider sign-in.

use super::navigator::{Navigator, DASHBOARD_ROUTE};
use crate::client::{Backend, ClientResult};

/// Where the landing view ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingState {
    /// Session lookup not finished yet
    Checking,
    /// No session; the sign-in action is available
    Idle,
    /// A session exists and the view moved on to the dashboard
    Redirected,
}

pub struct SessionGuard<B, N> {
    backend: B,
    navigator: N,
    origin: String,
    state: LandingState,
}

impl<B: Backend, N: Navigator> SessionGuard<B, N> {
    /// `origin` is the public origin sign-in returns to
    pub fn new(backend: B, navigator: N, origin: impl Into<String>) -> Self {
        Self {
            backend,
            navigator,
            origin: origin.into().trim_end_matches('/').to_string(),
            state: LandingState::Checking,
        }
    }

    pub fn state(&self) -> LandingState {
        self.state
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Look up the session; replace history with the dashboard if present
    pub async fn check(&mut self) -> ClientResult<LandingState> {
        match self.backend.get_session().await {
            Ok(Some(_)) => {
                self.navigator.replace(DASHBOARD_ROUTE);
                self.state = LandingState::Redirected;
            }
            Ok(None) => {
                self.state = LandingState::Idle;
            }
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed");
                self.state = LandingState::Idle;
                return Err(e);
            }
        }
        Ok(self.state)
    }

    /// Start provider sign-in returning to `<origin>/dashboard`
    ///
    /// Returns the authorization URL the view navigated to.
    pub async fn sign_in(&self, provider: &str) -> ClientResult<String> {
        let redirect_to = format!("{}{}", self.origin, DASHBOARD_ROUTE);
        match self.backend.sign_in_with_oauth(provider, &redirect_to).await {
            Ok(url) => {
                self.navigator.assign(&url);
                Ok(url)
            }
            Err(e) => {
                tracing::error!(error = %e, provider = %provider, "Sign-in could not start");
                Err(e)
            }
        }
    }
}
