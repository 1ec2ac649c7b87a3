//! Identity and Sessions
//!
//! Sign-in goes through an external OAuth provider:
//!
//! ```text
//! GET /auth/v1/authorize?provider=google&redirect_to=<site>/dashboard
//!        ↓ 302 to provider consent screen (state remembered here)
//! GET /auth/v1/callback?code=..&state=..
//!        ↓ code exchange + userinfo → user upsert → new session
//! 302 to redirect_to (session cookie set)
//! ```
//!
//! Sessions are opaque tokens stored in the relational store.

mod oauth;

pub use oauth::OAuthProvider;

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{AuthConfig, ServerConfig};
use crate::store::{Session, Store, StoreError};

/// How long a started sign-in may take before its state is forgotten
const PENDING_FLOW_TTL: std::time::Duration = std::time::Duration::from_secs(600);

/// A sign-in waiting for the provider callback
struct PendingFlow {
    provider: String,
    redirect_to: String,
    started: Instant,
}

/// Result of a finished sign-in
#[derive(Debug, Clone)]
pub struct CompletedSignIn {
    pub session: Session,
    pub redirect_to: String,
}

/// OAuth sign-in and session lookup
pub struct AuthService {
    store: Arc<Store>,
    providers: HashMap<String, OAuthProvider>,
    site_url: String,
    allowed_redirects: Vec<String>,
    session_ttl: Duration,
    pending: RwLock<HashMap<String, PendingFlow>>,
}

impl AuthService {
    pub fn new(store: Arc<Store>, auth: &AuthConfig, server: &ServerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(server.request_timeout_secs))
            .build()
            .unwrap_or_default();

        let providers = auth
            .providers
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    OAuthProvider::new(name.clone(), config.clone(), client.clone()),
                )
            })
            .collect();

        Self {
            store,
            providers,
            site_url: server.site_url.trim_end_matches('/').to_string(),
            allowed_redirects: server.additional_redirect_urls.clone(),
            session_ttl: Duration::hours(auth.session_ttl_hours),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Public origin of the pages
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    fn callback_url(&self) -> String {
        format!("{}/auth/v1/callback", self.site_url)
    }

    /// Accept `redirect_to` only for the site itself or an allowed prefix
    pub fn resolve_redirect(&self, redirect_to: Option<&str>) -> String {
        let fallback = format!("{}/dashboard", self.site_url);
        let Some(target) = redirect_to.filter(|t| !t.is_empty()) else {
            return fallback;
        };

        let allowed = std::iter::once(self.site_url.as_str())
            .chain(self.allowed_redirects.iter().map(String::as_str))
            .any(|prefix| has_origin_prefix(target, prefix));

        if allowed {
            target.to_string()
        } else {
            tracing::warn!(redirect_to = %target, "Redirect target not allowed, using site URL");
            fallback
        }
    }

    /// Start a sign-in: remember the flow and return the provider URL
    pub async fn authorize_url(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<String, AuthError> {
        let oauth = self
            .providers
            .get(provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))?;
        if !oauth.is_configured() {
            return Err(AuthError::ProviderNotConfigured(provider.to_string()));
        }

        let state = Uuid::new_v4().simple().to_string();
        let redirect_to = self.resolve_redirect(redirect_to);

        let mut pending = self.pending.write().await;
        pending.retain(|_, flow| flow.started.elapsed() < PENDING_FLOW_TTL);
        pending.insert(
            state.clone(),
            PendingFlow {
                provider: provider.to_string(),
                redirect_to,
                started: Instant::now(),
            },
        );

        tracing::debug!(provider = %provider, "Started sign-in");
        Ok(oauth.authorize_url(&self.callback_url(), &state))
    }

    /// Finish a sign-in from the provider callback
    pub async fn complete(&self, code: &str, state: &str) -> Result<CompletedSignIn, AuthError> {
        let flow = self
            .pending
            .write()
            .await
            .remove(state)
            .filter(|flow| flow.started.elapsed() < PENDING_FLOW_TTL)
            .ok_or(AuthError::InvalidState)?;

        let oauth = self
            .providers
            .get(&flow.provider)
            .ok_or_else(|| AuthError::UnknownProvider(flow.provider.clone()))?;

        let identity = oauth.exchange(code, &self.callback_url()).await?;
        let user = self.store.upsert_user(&identity).await?;
        let session = self.store.create_session(&user.id, self.session_ttl).await?;

        tracing::info!(user_id = %user.id, provider = %flow.provider, "User signed in");

        Ok(CompletedSignIn {
            session,
            redirect_to: flow.redirect_to,
        })
    }

    /// Resolve a session token
    pub async fn session(&self, token: &str) -> Result<Option<Session>, AuthError> {
        if token.is_empty() {
            return Ok(None);
        }
        Ok(self.store.session_by_token(token).await?)
    }

    /// Revoke a session token
    pub async fn sign_out(&self, token: &str) -> Result<bool, AuthError> {
        let revoked = self.store.delete_session(token).await?;
        if revoked {
            tracing::info!("Session revoked");
        }
        Ok(revoked)
    }

    /// Create a session directly for a known user (administrative use and tests)
    pub async fn issue_session(&self, user_id: &str) -> Result<Session, AuthError> {
        Ok(self.store.create_session(user_id, self.session_ttl).await?)
    }
}

/// `target` equals `prefix` or continues it with a path, query or fragment
fn has_origin_prefix(target: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match target.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Errors from sign-in and session handling
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unknown identity provider: {0}")]
    UnknownProvider(String),

    #[error("Identity provider {0} is not configured")]
    ProviderNotConfigured(String),

    #[error("Sign-in state is unknown or expired")]
    InvalidState,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderConfig};
    use crate::store::ProviderIdentity;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_with(provider: Option<ProviderConfig>) -> AuthService {
        let mut config = Config::default();
        config.server.site_url = "http://localhost:8090".to_string();
        config.server.additional_redirect_urls = vec!["http://127.0.0.1:3000".to_string()];
        if let Some(p) = provider {
            config.auth.providers.insert("google".to_string(), p);
        }
        let store = Arc::new(Store::open_in_memory().unwrap());
        AuthService::new(store, &config.auth, &config.server)
    }

    fn mock_provider(base: &str) -> ProviderConfig {
        ProviderConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/token", base),
            userinfo_url: format!("{}/userinfo", base),
            scopes: vec!["openid".to_string()],
        }
    }

    fn state_param(url: &str) -> String {
        url.split("state=").nth(1).unwrap().to_string()
    }

    #[test]
    fn test_origin_prefix() {
        assert!(has_origin_prefix("http://a.test", "http://a.test"));
        assert!(has_origin_prefix("http://a.test/dashboard", "http://a.test/"));
        assert!(!has_origin_prefix("http://a.test.evil/dashboard", "http://a.test"));
        assert!(!has_origin_prefix("http://b.test", "http://a.test"));
    }

    #[test]
    fn test_resolve_redirect() {
        let auth = service_with(None);
        assert_eq!(
            auth.resolve_redirect(Some("http://localhost:8090/dashboard")),
            "http://localhost:8090/dashboard"
        );
        assert_eq!(
            auth.resolve_redirect(Some("http://127.0.0.1:3000/dashboard")),
            "http://127.0.0.1:3000/dashboard"
        );
        assert_eq!(
            auth.resolve_redirect(Some("https://evil.test/dashboard")),
            "http://localhost:8090/dashboard"
        );
        assert_eq!(auth.resolve_redirect(None), "http://localhost:8090/dashboard");
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let auth = service_with(None);
        assert!(matches!(
            auth.authorize_url("google", None).await,
            Err(AuthError::ProviderNotConfigured(_))
        ));
        assert!(matches!(
            auth.authorize_url("github", None).await,
            Err(AuthError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_state_rejected() {
        let auth = service_with(Some(mock_provider("http://idp.invalid")));
        assert!(matches!(
            auth.complete("code", "never-issued").await,
            Err(AuthError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn test_full_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "t", "token_type": "bearer"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sub": "abc", "email": "a@example.com"})),
            )
            .mount(&server)
            .await;

        let auth = service_with(Some(mock_provider(&server.uri())));
        let url = auth
            .authorize_url("google", Some("http://localhost:8090/dashboard"))
            .await
            .unwrap();
        assert!(url.starts_with(&format!("{}/authorize?", server.uri())));

        let state = state_param(&url);
        let done = auth.complete("the-code", &state).await.unwrap();
        assert_eq!(done.redirect_to, "http://localhost:8090/dashboard");
        assert_eq!(done.session.user.email.as_deref(), Some("a@example.com"));

        let resolved = auth
            .session(&done.session.access_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.user.id, done.session.user.id);

        // state is single use
        assert!(matches!(
            auth.complete("the-code", &state).await,
            Err(AuthError::InvalidState)
        ));

        assert!(auth.sign_out(&done.session.access_token).await.unwrap());
        assert!(auth
            .session(&done.session.access_token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_issue_session_and_empty_token() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let config = Config::default();
        let auth = AuthService::new(Arc::clone(&store), &config.auth, &config.server);

        let user = store
            .upsert_user(&ProviderIdentity {
                provider: "google".to_string(),
                subject: "s".to_string(),
                email: None,
                name: None,
            })
            .await
            .unwrap();

        let session = auth.issue_session(&user.id).await.unwrap();
        assert!(auth.session(&session.access_token).await.unwrap().is_some());
        assert!(auth.session("").await.unwrap().is_none());
    }
}
