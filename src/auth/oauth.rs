//! OAuth 2.0 Provider Client
//!
//! Authorization-code flow against a configured identity provider:
//! build the consent URL, exchange the returned code for a token, and
//! read the user's profile from the userinfo endpoint.

use reqwest::Client;
use serde::Deserialize;

use super::AuthError;
use crate::config::ProviderConfig;
use crate::store::ProviderIdentity;

/// One configured identity provider
pub struct OAuthProvider {
    name: String,
    config: ProviderConfig,
    client: Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl OAuthProvider {
    pub fn new(name: impl Into<String>, config: ProviderConfig, client: Client) -> Self {
        Self {
            name: name.into(),
            config,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Generate the provider's authorization URL
    pub fn authorize_url(&self, callback_url: &str, state: &str) -> String {
        let separator = if self.config.authorize_url.contains('?') {
            '&'
        } else {
            '?'
        };

        format!(
            "{}{}response_type=code&\
             client_id={}&\
             redirect_uri={}&\
             scope={}&\
             state={}",
            self.config.authorize_url,
            separator,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(callback_url),
            urlencoding::encode(&self.config.scopes.join(" ")),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code and fetch the user's identity
    pub async fn exchange(
        &self,
        code: &str,
        callback_url: &str,
    ) -> Result<ProviderIdentity, AuthError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", callback_url),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid token response: {}", e)))?;

        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid userinfo response: {}", e)))?;

        Ok(ProviderIdentity {
            provider: self.name.clone(),
            subject: info.sub,
            email: info.email,
            name: info.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> OAuthProvider {
        let config = ProviderConfig {
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/token", base),
            userinfo_url: format!("{}/userinfo", base),
            scopes: vec!["openid".to_string(), "email".to_string()],
        };
        OAuthProvider::new("google", config, Client::new())
    }

    #[test]
    fn test_authorize_url_encoding() {
        let url = provider("https://idp.test").authorize_url(
            "http://localhost:8090/auth/v1/callback",
            "state-1",
        );
        assert!(url.starts_with("https://idp.test/authorize?response_type=code&"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8090%2Fauth%2Fv1%2Fcallback"));
        assert!(url.contains("scope=openid%20email"));
        assert!(url.ends_with("state=state-1"));
    }

    #[tokio::test]
    async fn test_exchange_reads_identity() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "idp-token"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer idp-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "10992",
                "email": "alice@example.com",
                "name": "Alice"
            })))
            .mount(&server)
            .await;

        let identity = provider(&server.uri())
            .exchange("abc", "http://localhost/callback")
            .await
            .unwrap();

        assert_eq!(identity.provider, "google");
        assert_eq!(identity.subject, "10992");
        assert_eq!(identity.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_exchange_rejected_code() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let result = provider(&server.uri())
            .exchange("bad", "http://localhost/callback")
            .await;
        assert!(matches!(result, Err(AuthError::Provider(_))));
    }
}
