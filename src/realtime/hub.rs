//! Change-Feed Hub
//!
//! Tracks realtime connections, the channels each one joined and the
//! filters of every channel, and fans committed row changes out to them.
//!
//! Delivery is owner-scoped: a change only reaches connections whose
//! authenticated user owns the changed row, whatever filters were requested.

use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::{ChangeEvent, ChangeFilter, EventFilter, ServerMessage};
use crate::config::RealtimeConfig;
use crate::store::Filter;

/// Unique identifier for a realtime connection
pub type ConnectionId = String;

/// Configuration for the change hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Maximum channels a single connection may join
    pub max_channels_per_connection: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            max_channels_per_connection: 100,
        }
    }
}

impl From<&RealtimeConfig> for HubConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            max_channels_per_connection: config.max_channels_per_connection,
        }
    }
}

/// A channel filter with its column expression parsed
#[derive(Debug, Clone)]
struct CompiledFilter {
    event: EventFilter,
    schema: String,
    table: String,
    column: Option<Filter>,
}

impl CompiledFilter {
    fn compile(filter: &ChangeFilter) -> Result<Self, HubError> {
        let column = filter
            .filter
            .as_deref()
            .map(Filter::parse_expr)
            .transpose()
            .map_err(|e| HubError::InvalidFilter(e.to_string()))?;

        Ok(Self {
            event: filter.event,
            schema: filter.schema.clone(),
            table: filter.table.clone(),
            column,
        })
    }

    fn matches(&self, change: &ChangeEvent) -> bool {
        if !self.event.accepts(change.event) {
            return false;
        }
        if self.schema != change.schema || self.table != change.table {
            return false;
        }
        match (&self.column, change.record()) {
            (None, _) => true,
            (Some(filter), Some(row)) => filter.matches(row),
            (Some(_), None) => false,
        }
    }
}

/// Handle for sending messages to a specific connection
struct ConnectionHandle {
    /// Authenticated owner of this connection
    user_id: String,
    /// Channel sender for this connection
    sender: mpsc::UnboundedSender<ServerMessage>,
    /// Joined channels and their filters
    channels: HashMap<String, Vec<CompiledFilter>>,
}

/// Manages all realtime connections and channel memberships
pub struct ChangeHub {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    config: HubConfig,
}

impl ChangeHub {
    /// Create a new hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a connection for an authenticated user
    ///
    /// Returns the connection ID, or an error once the limit is reached.
    pub async fn register(
        &self,
        user_id: &str,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(
            id.clone(),
            ConnectionHandle {
                user_id: user_id.to_string(),
                sender,
                channels: HashMap::new(),
            },
        );

        tracing::info!(connection_id = %id, user_id = %user_id, "Realtime connected");
        Ok(id)
    }

    /// Unregister a connection and drop its channels
    pub async fn unregister(&self, id: &str) {
        if self.connections.write().await.remove(id).is_some() {
            tracing::info!(connection_id = %id, "Realtime disconnected");
        }
    }

    /// Join (or re-join, replacing filters) a named channel
    pub async fn join(
        &self,
        id: &str,
        channel: &str,
        filters: &[ChangeFilter],
    ) -> Result<(), HubError> {
        if channel.trim().is_empty() {
            return Err(HubError::InvalidChannel(channel.to_string()));
        }

        let compiled = filters
            .iter()
            .map(CompiledFilter::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        if !handle.channels.contains_key(channel)
            && handle.channels.len() >= self.config.max_channels_per_connection
        {
            return Err(HubError::TooManyChannels(
                self.config.max_channels_per_connection,
            ));
        }

        handle.channels.insert(channel.to_string(), compiled);

        tracing::debug!(
            connection_id = %id,
            channel = %channel,
            filters = filters.len(),
            "Joined channel"
        );
        Ok(())
    }

    /// Leave a channel; returns whether the connection had joined it
    pub async fn leave(&self, id: &str, channel: &str) -> Result<bool, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let left = handle.channels.remove(channel).is_some();
        tracing::debug!(connection_id = %id, channel = %channel, left, "Left channel");
        Ok(left)
    }

    /// Deliver a committed change to every matching channel of every
    /// connection owned by the row's user. Returns the number of deliveries.
    pub async fn publish(&self, change: &ChangeEvent) -> usize {
        let Some(owner) = change.owner() else {
            tracing::warn!(event = ?change.event, "Change without a row, not published");
            return 0;
        };

        let connections = self.connections.read().await;
        let mut delivered = 0;

        for handle in connections.values().filter(|h| h.user_id == owner) {
            for (channel, filters) in &handle.channels {
                if !filters.iter().any(|f| f.matches(change)) {
                    continue;
                }
                let message = ServerMessage::Change {
                    channel: channel.clone(),
                    change: change.clone(),
                };
                if handle.sender.send(message).is_ok() {
                    delivered += 1;
                }
            }
        }

        tracing::trace!(event = ?change.event, delivered, "Published change");
        delivered
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle
            .sender
            .send(message)
            .map_err(|_| HubError::SendFailed)
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of connections that joined a channel
    pub async fn channel_members(&self, channel: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|h| h.channels.contains_key(channel))
            .count()
    }
}

/// Errors that can occur in the change hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Too many channels on one connection (limit: {0})")]
    TooManyChannels(usize),

    #[error("Invalid channel name: '{0}'")]
    InvalidChannel(String),

    #[error("Invalid change filter: {0}")]
    InvalidFilter(String),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,
}
