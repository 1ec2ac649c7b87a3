//! Relational Store
//!
//! SQLite-backed storage for the three relations the service owns:
//!
//! - **bookmarks**: `(id, title, url, user_id, created_at)`, ordered newest first
//! - **users**: identities created on first provider sign-in
//! - **sessions**: opaque access tokens with an expiry
//!
//! A single connection is shared behind an async mutex; SQLite serialises
//! writes per row, which is all the consistency the service relies on.
//!
//! # Example
//!
//! ```rust,no_run
//! use bookmark_live::store::{NewBookmark, SelectQuery, Store};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open("bookmarks.db")?;
//! store.insert_bookmark(NewBookmark::new("Rust", "https://rust-lang.org", "user-1")).await?;
//! let rows = store.select_bookmarks(&SelectQuery::owned_by("user-1")).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod query;
mod types;

pub use error::{StoreError, StoreResult};
pub use query::{Column, Direction, Filter, FilterOp, Order, SelectQuery};
pub use types::{Bookmark, NewBookmark, ProviderIdentity, Session, User};

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        provider TEXT NOT NULL,
        provider_subject TEXT NOT NULL,
        email TEXT,
        name TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (provider, provider_subject)
    );

    CREATE TABLE IF NOT EXISTS sessions (
        access_token TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bookmarks (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        user_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_bookmarks_owner ON bookmarks(user_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
";

const BOOKMARK_COLUMNS: &str = "id, title, url, user_id, created_at";
const USER_COLUMNS: &str = "id, email, name, provider, provider_subject, created_at";

/// Fixed-width RFC 3339 so text ordering equals time ordering
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Drop every session that expired before `at`
fn prune_expired_sessions(conn: &Connection, at: &DateTime<Utc>) -> rusqlite::Result<usize> {
    let pruned = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?",
        params![format_timestamp(at)],
    )?;
    if pruned > 0 {
        tracing::debug!(pruned, "Pruned expired sessions");
    }
    Ok(pruned)
}

fn row_to_bookmark(row: &Row<'_>) -> rusqlite::Result<Bookmark> {
    let created_at: String = row.get(4)?;
    Ok(Bookmark {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        provider: row.get(3)?,
        provider_subject: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn where_clause(filters: &[Filter]) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = filters.iter().map(Filter::sql_clause).collect();
    format!(" WHERE {}", clauses.join(" AND "))
}

/// SQLite-backed relational store
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Self::init(conn, Some(path))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = ?path, "Store schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cheap round-trip used by the readiness probe
    pub async fn ping(&self) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ==================== Bookmarks ====================

    /// Select bookmarks matching every filter, in the requested order
    pub async fn select_bookmarks(&self, query: &SelectQuery) -> StoreResult<Vec<Bookmark>> {
        let mut sql = format!(
            "SELECT {} FROM bookmarks{}",
            BOOKMARK_COLUMNS,
            where_clause(&query.filters)
        );
        match &query.order {
            Some(order) => sql.push_str(&format!(" ORDER BY {}", order.sql_clause())),
            None => sql.push_str(" ORDER BY seq ASC"),
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(query.filters.iter().map(|f| f.value.as_str())),
            row_to_bookmark,
        )?;

        let bookmarks = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(bookmarks)
    }

    /// Insert a bookmark, assigning its id and creation timestamp
    pub async fn insert_bookmark(&self, new: NewBookmark) -> StoreResult<Bookmark> {
        let bookmark = Bookmark {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            url: new.url,
            user_id: new.user_id,
            created_at: now(),
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO bookmarks (id, title, url, user_id, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                bookmark.id,
                bookmark.title,
                bookmark.url,
                bookmark.user_id,
                format_timestamp(&bookmark.created_at)
            ],
        )?;

        tracing::debug!(bookmark_id = %bookmark.id, user_id = %bookmark.user_id, "Inserted bookmark");
        Ok(bookmark)
    }

    /// Delete every bookmark matching the filters and return the removed rows
    pub async fn delete_bookmarks(&self, filters: &[Filter]) -> StoreResult<Vec<Bookmark>> {
        if filters.is_empty() {
            return Err(StoreError::UnfilteredDelete);
        }

        let clause = where_clause(filters);
        let values: Vec<&str> = filters.iter().map(|f| f.value.as_str()).collect();

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let removed = {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {} FROM bookmarks{} ORDER BY seq",
                BOOKMARK_COLUMNS, clause
            ))?;
            let rows = stmt.query_map(params_from_iter(values.iter()), row_to_bookmark)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        if !removed.is_empty() {
            tx.execute(
                &format!("DELETE FROM bookmarks{}", clause),
                params_from_iter(values.iter()),
            )?;
        }
        tx.commit()?;

        tracing::debug!(removed = removed.len(), "Deleted bookmarks");
        Ok(removed)
    }

    // ==================== Users ====================

    /// Create the user on first sign-in, refresh profile fields afterwards
    pub async fn upsert_user(&self, identity: &ProviderIdentity) -> StoreResult<User> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (id, provider, provider_subject, email, name, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (provider, provider_subject)
             DO UPDATE SET email = excluded.email, name = excluded.name",
            params![
                Uuid::new_v4().to_string(),
                identity.provider,
                identity.subject,
                identity.email,
                identity.name,
                format_timestamp(&now())
            ],
        )?;

        let user = conn.query_row(
            &format!(
                "SELECT {} FROM users WHERE provider = ? AND provider_subject = ?",
                USER_COLUMNS
            ),
            params![identity.provider, identity.subject],
            row_to_user,
        )?;
        Ok(user)
    }

    pub async fn user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    // ==================== Sessions ====================

    /// Issue a new session token for a user
    pub async fn create_session(&self, user_id: &str, ttl: Duration) -> StoreResult<Session> {
        let user = self
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        let created = now();
        let session = Session {
            access_token: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            user,
            expires_at: created + ttl,
        };

        let conn = self.conn.lock().await;
        prune_expired_sessions(&conn, &created)?;
        conn.execute(
            "INSERT INTO sessions (access_token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
            params![
                session.access_token,
                user_id,
                format_timestamp(&created),
                format_timestamp(&session.expires_at)
            ],
        )?;

        Ok(session)
    }

    /// Resolve a token; expired sessions are removed and reported as absent
    pub async fn session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row(
                "SELECT s.expires_at, u.id, u.email, u.name, u.provider, u.provider_subject, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.access_token = ?",
                params![token],
                |row| {
                    let expires_at: String = row.get(0)?;
                    let created_at: String = row.get(6)?;
                    Ok((
                        parse_timestamp(0, &expires_at)?,
                        User {
                            id: row.get(1)?,
                            email: row.get(2)?,
                            name: row.get(3)?,
                            provider: row.get(4)?,
                            provider_subject: row.get(5)?,
                            created_at: parse_timestamp(6, &created_at)?,
                        },
                    ))
                },
            )
            .optional()?;

        let Some((expires_at, user)) = found else {
            return Ok(None);
        };

        let session = Session {
            access_token: token.to_string(),
            user,
            expires_at,
        };

        if session.is_expired() {
            conn.execute("DELETE FROM sessions WHERE access_token = ?", params![token])?;
            tracing::debug!(user_id = %session.user.id, "Pruned expired session");
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Revoke a session; returns whether it existed
    pub async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM sessions WHERE access_token = ?", params![token])?;
        Ok(removed > 0)
    }
}
