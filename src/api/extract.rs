//! Request Credentials
//!
//! API key checking middleware and session extractors. Credentials are
//! accepted from headers first, then the query string (browser websocket
//! and redirect flows cannot set headers), then the session cookie.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::store::Session;

/// Cookie carrying the page session
pub const SESSION_COOKIE: &str = "bl-access-token";

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(mut params)| params.remove(name))
        .filter(|v| !v.is_empty())
}

/// Value of a cookie in the `Cookie` header
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

/// Bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Access token of a request: bearer header, `access_token` query
/// parameter, or session cookie
pub fn access_token(parts: &Parts) -> Option<String> {
    bearer_token(&parts.headers)
        .or_else(|| query_param(&parts.uri, "access_token"))
        .or_else(|| cookie_value(&parts.headers, SESSION_COOKIE))
}

/// `Set-Cookie` value storing a session token
pub fn session_cookie(token: &str, max_age_secs: i64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    ))
    .ok()
}

/// `Set-Cookie` value clearing the session cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("bl-access-token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Middleware rejecting requests without the configured API key
///
/// An empty configured key disables the check.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.api_key();
    if expected.is_empty() {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_param(request.uri(), "apikey"));

    match presented {
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => Err(ApiError::Unauthorized("invalid API key".to_string())),
        None => Err(ApiError::Unauthorized("missing API key".to_string())),
    }
}

/// The raw access token, unresolved
pub struct SessionToken(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionToken {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionToken(access_token(parts)))
    }
}

/// A resolved, unexpired session; rejects with 401 otherwise
pub struct CurrentSession(pub Session);

/// The session if one is present
pub struct MaybeSession(pub Option<Session>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = access_token(parts) else {
            return Ok(MaybeSession(None));
        };
        Ok(MaybeSession(state.auth.session(&token).await?))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let MaybeSession(session) = MaybeSession::from_request_parts(parts, state).await?;
        session
            .map(CurrentSession)
            .ok_or_else(|| ApiError::Unauthorized("no valid session".to_string()))
    }
}
