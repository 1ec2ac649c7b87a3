//! Realtime Change-Feed
//!
//! Push delivery of committed bookmark changes to every open view.
//!
//! # Protocol
//!
//! Connect to `/realtime/v1/websocket?apikey=<key>&access_token=<token>`.
//! The access token may also travel as a bearer header or session cookie.
//!
//! ## Client → Server Messages
//!
//! ```json
//! {"type": "join", "channel": "bookmarks-realtime", "changes": [
//!     {"event": "INSERT", "schema": "public", "table": "bookmarks", "filter": "user_id=eq.<id>"},
//!     {"event": "DELETE", "schema": "public", "table": "bookmarks", "filter": "user_id=eq.<id>"}
//! ]}
//! {"type": "leave", "channel": "bookmarks-realtime"}
//! {"type": "ping"}
//! ```
//!
//! ## Server → Client Messages
//!
//! ```json
//! {"type": "connected", "connection_id": "uuid"}
//! {"type": "joined", "channel": "bookmarks-realtime"}
//! {"type": "change", "channel": "bookmarks-realtime", "change": {"eventType": "INSERT", "new": {...}, ...}}
//! {"type": "channel_error", "channel": "...", "message": "..."}
//! {"type": "pong"}
//! {"type": "error", "message": "..."}
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ChangeHub, ConnectionId, HubConfig, HubError};
pub use messages::{
    ChangeEvent, ChangeFilter, ChangeKind, ChannelSpec, ClientMessage, EventFilter,
    ServerMessage, BOOKMARKS_TABLE, PUBLIC_SCHEMA,
};
