//! Page Routes
//!
//! HTML rendering of the two views. Each request builds a fresh controller
//! over the in-process backend, acting as the user of the session cookie,
//! and turns recorded navigations into redirects.
//!
//! - GET / - Landing view
//! - POST /login - Start provider sign-in
//! - POST /logout - End the session
//! - GET /dashboard - Dashboard view
//! - POST /dashboard/bookmarks - Add action
//! - POST /dashboard/bookmarks/:id/delete - Delete action

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use std::sync::Arc;

use crate::api::dto::{AddBookmarkForm, PageParams, SignInForm};
use crate::api::extract::{clear_session_cookie, SessionToken};
use crate::api::{ApiError, ApiResult, AppState};
use crate::client::LocalBackend;
use crate::views::render::{render_dashboard, render_landing, DashboardPage};
use crate::views::{
    feed_channel, DashboardController, DashboardState, RecordingNavigator, SessionGuard,
    DASHBOARD_ROUTE, LOGIN_ROUTE,
};

type PageDashboard = DashboardController<LocalBackend, RecordingNavigator>;

fn redirect_with_notice(route: &str, notice: &str) -> Response {
    Redirect::to(&format!("{}?notice={}", route, urlencoding::encode(notice))).into_response()
}

/// Mount a dashboard for the request; `Err` carries the redirect to send
async fn mount_dashboard(
    state: &Arc<AppState>,
    token: Option<String>,
) -> Result<PageDashboard, Response> {
    let mut dashboard = DashboardController::new(
        LocalBackend::new(Arc::clone(state), token),
        RecordingNavigator::new(),
    );

    let mounted = dashboard.mount().await;
    match dashboard.state() {
        DashboardState::Redirected => {
            let target = dashboard
                .navigator()
                .last()
                .map(|n| n.target().to_string())
                .unwrap_or_else(|| LOGIN_ROUTE.to_string());
            Err(Redirect::to(&target).into_response())
        }
        DashboardState::Unresolved => {
            let message = mounted
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "dashboard did not load".to_string());
            Err(ApiError::Internal(message).into_response())
        }
        DashboardState::Loaded => Ok(dashboard),
    }
}

/// GET /
pub async fn landing(
    State(state): State<Arc<AppState>>,
    SessionToken(token): SessionToken,
    Query(params): Query<PageParams>,
) -> Response {
    let navigator = RecordingNavigator::new();
    let mut guard = SessionGuard::new(
        LocalBackend::new(Arc::clone(&state), token),
        &navigator,
        state.auth.site_url(),
    );

    let notice = match guard.check().await {
        Ok(_) => params.error.or(params.notice),
        Err(e) => Some(e.to_string()),
    };

    if let Some(navigation) = navigator.last() {
        return Redirect::to(navigation.target()).into_response();
    }

    Html(render_landing(
        notice.as_deref(),
        &state.config.auth.default_provider,
    ))
    .into_response()
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SignInForm>,
) -> Response {
    let provider = form
        .provider
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| state.config.auth.default_provider.clone());

    let navigator = RecordingNavigator::new();
    let guard = SessionGuard::new(
        LocalBackend::new(Arc::clone(&state), None),
        &navigator,
        state.auth.site_url(),
    );

    match guard.sign_in(&provider).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => redirect_with_notice(LOGIN_ROUTE, &e.to_string()),
    }
}

/// POST /logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    SessionToken(token): SessionToken,
) -> ApiResult<Response> {
    if let Some(token) = token {
        state.auth.sign_out(&token).await?;
    }
    let mut response = Redirect::to(LOGIN_ROUTE).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie());
    Ok(response)
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    SessionToken(token): SessionToken,
    Query(params): Query<PageParams>,
) -> Response {
    let mut dashboard = match mount_dashboard(&state, token).await {
        Ok(dashboard) => dashboard,
        Err(redirect) => return redirect,
    };

    if dashboard.notice().is_none() {
        dashboard.set_notice(params.notice);
    }
    if let Some(title) = params.title {
        dashboard.set_title(title);
    }
    if let Some(url) = params.url {
        dashboard.set_url(url);
    }

    let html = match dashboard.user() {
        Some(user) => render_dashboard(&DashboardPage {
            user,
            bookmarks: dashboard.bookmarks(),
            title: dashboard.title(),
            url: dashboard.url(),
            notice: dashboard.notice(),
            api_key: state.api_key(),
            channel: feed_channel(&user.id),
        }),
        None => return Redirect::to(LOGIN_ROUTE).into_response(),
    };

    dashboard.unmount();
    Html(html).into_response()
}

/// POST /dashboard/bookmarks
pub async fn add_bookmark(
    State(state): State<Arc<AppState>>,
    SessionToken(token): SessionToken,
    Form(form): Form<AddBookmarkForm>,
) -> Response {
    let mut dashboard = match mount_dashboard(&state, token).await {
        Ok(dashboard) => dashboard,
        Err(redirect) => return redirect,
    };

    dashboard.set_title(form.title.trim());
    dashboard.set_url(form.url.trim());

    let response = match dashboard.add().await {
        Ok(_) => Redirect::to(DASHBOARD_ROUTE).into_response(),
        Err(e) => Redirect::to(&format!(
            "{}?notice={}&title={}&url={}",
            DASHBOARD_ROUTE,
            urlencoding::encode(&e.to_string()),
            urlencoding::encode(dashboard.title()),
            urlencoding::encode(dashboard.url())
        ))
        .into_response(),
    };

    dashboard.unmount();
    response
}

/// POST /dashboard/bookmarks/:id/delete
pub async fn delete_bookmark(
    State(state): State<Arc<AppState>>,
    SessionToken(token): SessionToken,
    Path(id): Path<String>,
) -> Response {
    let mut dashboard = match mount_dashboard(&state, token).await {
        Ok(dashboard) => dashboard,
        Err(redirect) => return redirect,
    };

    let response = match dashboard.delete(&id).await {
        Ok(()) => Redirect::to(DASHBOARD_ROUTE).into_response(),
        Err(e) => redirect_with_notice(DASHBOARD_ROUTE, &e.to_string()),
    };

    dashboard.unmount();
    response
}
