//! Bookmark Routes
//!
//! Row access over `/rest/v1/bookmarks`, filtered with `column=op.value`
//! query parameters.
//!
//! - GET /rest/v1/bookmarks?order=created_at.desc - Select own rows
//! - POST /rest/v1/bookmarks - Insert a row
//! - DELETE /rest/v1/bookmarks?id=eq.<id> - Delete matching own rows

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::InsertBookmarkRequest;
use crate::api::extract::CurrentSession;
use crate::api::{ApiError, ApiResult, AppState};
use crate::store::{Bookmark, NewBookmark, SelectQuery};

fn parse_query(params: &[(String, String)]) -> ApiResult<SelectQuery> {
    Ok(SelectQuery::from_params(
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )?)
}

/// GET /rest/v1/bookmarks
pub async fn select_bookmarks(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Vec<Bookmark>>> {
    let query = parse_query(&params)?;
    let rows = state.bookmarks.list(&session.user.id, query).await?;
    Ok(Json(rows))
}

/// POST /rest/v1/bookmarks
pub async fn insert_bookmark(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Json(body): Json<InsertBookmarkRequest>,
) -> ApiResult<(StatusCode, Json<Bookmark>)> {
    let owner = body.user_id.unwrap_or_else(|| session.user.id.clone());
    let row = state
        .bookmarks
        .insert(&session.user.id, NewBookmark::new(body.title, body.url, owner))
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /rest/v1/bookmarks
///
/// Returns the removed rows.
pub async fn delete_bookmarks(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Vec<Bookmark>>> {
    let query = parse_query(&params)?;
    if query.order.is_some() || query.limit.is_some() {
        return Err(ApiError::Validation(
            "delete accepts column filters only".to_string(),
        ));
    }
    let removed = state
        .bookmarks
        .delete(&session.user.id, query.filters)
        .await?;
    Ok(Json(removed))
}
