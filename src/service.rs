//! Bookmark Service
//!
//! Row-level access rules on top of the store, and change publication.
//! Every read is scoped to the acting user, inserts for another user are
//! refused, deletes only reach owned rows. Each committed change is handed
//! to the change hub before the next write may commit, so subscribers see
//! changes in commit order.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::realtime::{ChangeEvent, ChangeHub};
use crate::store::{Bookmark, Column, Filter, NewBookmark, SelectQuery, Store, StoreError};

const MAX_TITLE_LEN: usize = 500;
const MAX_URL_LEN: usize = 2048;

/// Access-checked bookmark operations
pub struct BookmarkService {
    store: Arc<Store>,
    hub: Arc<ChangeHub>,
    /// Held from commit through publish
    commit: Mutex<()>,
}

impl BookmarkService {
    pub fn new(store: Arc<Store>, hub: Arc<ChangeHub>) -> Self {
        Self {
            store,
            hub,
            commit: Mutex::new(()),
        }
    }

    /// Select the acting user's bookmarks
    pub async fn list(&self, user_id: &str, query: SelectQuery) -> ServiceResult<Vec<Bookmark>> {
        let query = query.filter(Filter::eq(Column::UserId, user_id));
        Ok(self.store.select_bookmarks(&query).await?)
    }

    /// Insert a bookmark owned by the acting user and publish the INSERT
    pub async fn insert(&self, user_id: &str, new: NewBookmark) -> ServiceResult<Bookmark> {
        if new.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "bookmarks can only be created for the signed-in user".to_string(),
            ));
        }
        validate_new(&new)?;

        let (row, delivered) = {
            let _commit = self.commit.lock().await;
            let row = self.store.insert_bookmark(new).await?;
            let delivered = self.hub.publish(&ChangeEvent::insert(row.clone())).await;
            (row, delivered)
        };

        tracing::info!(
            bookmark_id = %row.id,
            user_id = %user_id,
            delivered,
            "Bookmark created"
        );
        Ok(row)
    }

    /// Delete the acting user's bookmarks matching the filters and publish
    /// one DELETE per removed row
    pub async fn delete(&self, user_id: &str, filters: Vec<Filter>) -> ServiceResult<Vec<Bookmark>> {
        if filters.is_empty() {
            return Err(ServiceError::Validation(
                "delete requires at least one filter".to_string(),
            ));
        }

        let mut scoped = filters;
        scoped.push(Filter::eq(Column::UserId, user_id));

        let removed = {
            let _commit = self.commit.lock().await;
            let removed = self.store.delete_bookmarks(&scoped).await?;
            for row in &removed {
                self.hub.publish(&ChangeEvent::delete(row.clone())).await;
            }
            removed
        };

        tracing::info!(user_id = %user_id, removed = removed.len(), "Bookmarks deleted");
        Ok(removed)
    }
}

fn validate_new(new: &NewBookmark) -> ServiceResult<()> {
    if new.title.trim().is_empty() {
        return Err(ServiceError::Validation("title cannot be empty".to_string()));
    }
    if new.url.trim().is_empty() {
        return Err(ServiceError::Validation("url cannot be empty".to_string()));
    }
    if new.title.len() > MAX_TITLE_LEN {
        return Err(ServiceError::Validation(format!(
            "title exceeds maximum length of {} characters",
            MAX_TITLE_LEN
        )));
    }
    if new.url.len() > MAX_URL_LEN {
        return Err(ServiceError::Validation(format!(
            "url exceeds maximum length of {} characters",
            MAX_URL_LEN
        )));
    }
    Ok(())
}

/// Errors from access-checked operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
