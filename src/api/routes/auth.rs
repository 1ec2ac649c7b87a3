//! Auth Routes
//!
//! - GET /auth/v1/authorize?provider=google&redirect_to=.. - Start OAuth sign-in
//! - GET /auth/v1/callback - Provider redirect target, issues the session
//! - GET /auth/v1/session - Current session or null
//! - GET /auth/v1/user - Current user, 401 without a session
//! - POST /auth/v1/logout - Revoke the current session

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{AuthorizeParams, CallbackParams, SessionResponse, UserResponse};
use crate::api::extract::{clear_session_cookie, session_cookie, CurrentSession, MaybeSession};
use crate::api::{ApiResult, AppState};
use crate::store::Session;

/// GET /auth/v1/authorize
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeParams>,
) -> ApiResult<Redirect> {
    let provider = params
        .provider
        .unwrap_or_else(|| state.config.auth.default_provider.clone());
    let url = state
        .auth
        .authorize_url(&provider, params.redirect_to.as_deref())
        .await?;
    Ok(Redirect::to(&url))
}

/// Landing page URL carrying a sign-in failure
fn failed_sign_in(state: &AppState, message: &str) -> Response {
    let target = format!(
        "{}/?error={}",
        state.auth.site_url(),
        urlencoding::encode(message)
    );
    Redirect::to(&target).into_response()
}

/// Redirect after sign-in: the token travels in the fragment for scripted
/// clients and in an HTTP-only cookie for the pages
pub(crate) fn signed_in_response(redirect_to: &str, session: &Session) -> Response {
    let target = format!(
        "{}#access_token={}&expires_at={}&token_type=bearer",
        redirect_to,
        session.access_token,
        session.expires_at.timestamp()
    );

    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let mut response = Redirect::to(&target).into_response();
    if let Some(cookie) = session_cookie(&session.access_token, max_age) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

/// GET /auth/v1/callback
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        let message = params.error_description.unwrap_or(error);
        tracing::warn!(error = %message, "Provider denied sign-in");
        return failed_sign_in(&state, &message);
    }

    let (Some(code), Some(flow_state)) = (params.code, params.state) else {
        return failed_sign_in(&state, "missing code or state");
    };

    match state.auth.complete(&code, &flow_state).await {
        Ok(done) => signed_in_response(&done.redirect_to, &done.session),
        Err(e) => {
            tracing::warn!(error = %e, "Sign-in callback failed");
            failed_sign_in(&state, &e.to_string())
        }
    }
}

/// GET /auth/v1/session
pub async fn session(MaybeSession(session): MaybeSession) -> Json<SessionResponse> {
    Json(SessionResponse { session })
}

/// GET /auth/v1/user
pub async fn user(CurrentSession(session): CurrentSession) -> Json<UserResponse> {
    Json(UserResponse { user: session.user })
}

/// POST /auth/v1/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
) -> ApiResult<Response> {
    if let Some(session) = session {
        state.auth.sign_out(&session.access_token).await?;
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie());
    Ok(response)
}
