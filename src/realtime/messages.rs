//! Change-Feed Message Types
//!
//! Row change events, the filters a channel subscribes with, and the JSON
//! messages exchanged over the realtime websocket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Bookmark, Filter};

/// Name of the relation the feed reports on
pub const BOOKMARKS_TABLE: &str = "bookmarks";
/// Schema every relation lives in
pub const PUBLIC_SCHEMA: &str = "public";

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A committed row change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "eventType")]
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
    pub commit_timestamp: DateTime<Utc>,
    /// Row after the change (inserts and updates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Bookmark>,
    /// Row before the change (updates and deletes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Bookmark>,
}

impl ChangeEvent {
    pub fn insert(row: Bookmark) -> Self {
        Self::new(ChangeKind::Insert, Some(row), None)
    }

    pub fn update(old: Bookmark, new: Bookmark) -> Self {
        Self::new(ChangeKind::Update, Some(new), Some(old))
    }

    pub fn delete(row: Bookmark) -> Self {
        Self::new(ChangeKind::Delete, None, Some(row))
    }

    fn new(event: ChangeKind, new: Option<Bookmark>, old: Option<Bookmark>) -> Self {
        Self {
            event,
            schema: PUBLIC_SCHEMA.to_string(),
            table: BOOKMARKS_TABLE.to_string(),
            commit_timestamp: Utc::now(),
            new,
            old,
        }
    }

    /// The row filters are evaluated against
    pub fn record(&self) -> Option<&Bookmark> {
        match self.event {
            ChangeKind::Delete => self.old.as_ref(),
            ChangeKind::Insert | ChangeKind::Update => self.new.as_ref(),
        }
    }

    /// Owner of the changed row
    pub fn owner(&self) -> Option<&str> {
        self.record().map(|r| r.user_id.as_str())
    }
}

/// Event selector of a channel filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFilter {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

impl EventFilter {
    pub fn accepts(&self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Insert => kind == ChangeKind::Insert,
            EventFilter::Update => kind == ChangeKind::Update,
            EventFilter::Delete => kind == ChangeKind::Delete,
        }
    }
}

fn default_schema() -> String {
    PUBLIC_SCHEMA.to_string()
}

/// One `postgres_changes`-style subscription clause of a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub event: EventFilter,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    /// Column filter in `column=op.value` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ChangeFilter {
    /// Clause on the bookmarks relation
    pub fn bookmarks(event: EventFilter) -> Self {
        Self {
            event,
            schema: PUBLIC_SCHEMA.to_string(),
            table: BOOKMARKS_TABLE.to_string(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: &Filter) -> Self {
        self.filter = Some(filter.to_expr());
        self
    }
}

/// Channel subscription request used by clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub changes: Vec<ChangeFilter>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: Vec::new(),
        }
    }

    pub fn on(mut self, change: ChangeFilter) -> Self {
        self.changes.push(change);
        self
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a named channel with its change filters
    Join {
        channel: String,
        #[serde(default)]
        changes: Vec<ChangeFilter>,
    },
    /// Leave a channel
    Leave { channel: String },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected { connection_id: String },
    /// Channel join confirmed
    Joined { channel: String },
    /// Channel left
    Left { channel: String },
    /// A row change matched one of the channel's filters
    Change { channel: String, change: ChangeEvent },
    /// A channel could not be joined
    ChannelError { channel: String, message: String },
    /// Pong response to ping
    Pong,
    /// Connection-level error
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Column;

    fn row() -> Bookmark {
        Bookmark {
            id: "b-5".to_string(),
            title: "Five".to_string(),
            url: "https://five.test".to_string(),
            user_id: "alice".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_message_deserialize_join() {
        let json = r#"{
            "type": "join",
            "channel": "bookmarks-realtime",
            "changes": [{"event": "INSERT", "table": "bookmarks", "filter": "user_id=eq.alice"}]
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join { channel, changes } => {
                assert_eq!(channel, "bookmarks-realtime");
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].schema, "public");
                assert_eq!(changes[0].event, EventFilter::Insert);
            }
            _ => panic!("Expected Join"),
        }
    }

    #[test]
    fn test_client_message_deserialize_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_wildcard_event_filter() {
        let filter: ChangeFilter =
            serde_json::from_str(r#"{"event": "*", "table": "bookmarks"}"#).unwrap();
        assert_eq!(filter.event, EventFilter::All);
        assert!(filter.event.accepts(ChangeKind::Update));
        assert!(!EventFilter::Insert.accepts(ChangeKind::Delete));
    }

    #[test]
    fn test_server_message_serialize_change() {
        let msg = ServerMessage::Change {
            channel: "bookmarks-realtime".to_string(),
            change: ChangeEvent::delete(row()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"change\""));
        assert!(json.contains("\"eventType\":\"DELETE\""));
        assert!(json.contains("\"old\""));
        assert!(!json.contains("\"new\""));
    }

    #[test]
    fn test_change_record_and_owner() {
        let insert = ChangeEvent::insert(row());
        assert_eq!(insert.record().map(|r| r.id.as_str()), Some("b-5"));
        assert_eq!(insert.owner(), Some("alice"));

        let delete = ChangeEvent::delete(row());
        assert!(delete.new.is_none());
        assert_eq!(delete.owner(), Some("alice"));
    }

    #[test]
    fn test_change_filter_builder() {
        let clause = ChangeFilter::bookmarks(EventFilter::Delete)
            .with_filter(&Filter::eq(Column::UserId, "alice"));
        assert_eq!(clause.filter.as_deref(), Some("user_id=eq.alice"));
        assert_eq!(clause.table, BOOKMARKS_TABLE);
    }
}
