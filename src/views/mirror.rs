//! Bookmark Mirror
//!
//! A view-local copy of the user's bookmarks, newest first. Replaced
//! wholesale by a fetch and patched by change-feed events afterwards.

use crate::realtime::{ChangeEvent, ChangeKind};
use crate::store::Bookmark;

#[derive(Debug, Clone, Default)]
pub struct Mirror {
    rows: Vec<Bookmark>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a fetched list (no merge)
    pub fn replace(&mut self, rows: Vec<Bookmark>) {
        self.rows = rows;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.iter().any(|r| r.id == id)
    }

    /// Prepend unless the id is already present
    pub fn insert_front(&mut self, row: Bookmark) -> bool {
        if self.contains(&row.id) {
            return false;
        }
        self.rows.insert(0, row);
        true
    }

    /// Remove the row with this id; absent ids are a no-op
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != id);
        self.rows.len() != before
    }

    /// Replace a present row in place
    pub fn update(&mut self, row: Bookmark) -> bool {
        match self.rows.iter_mut().find(|r| r.id == row.id) {
            Some(slot) => {
                *slot = row;
                true
            }
            None => false,
        }
    }

    /// Apply one change event; returns whether the mirror changed
    pub fn apply(&mut self, change: &ChangeEvent) -> bool {
        match change.event {
            ChangeKind::Insert => change
                .new
                .clone()
                .map(|row| self.insert_front(row))
                .unwrap_or(false),
            ChangeKind::Update => change
                .new
                .clone()
                .map(|row| self.update(row))
                .unwrap_or(false),
            ChangeKind::Delete => change
                .old
                .as_ref()
                .map(|row| self.remove(&row.id))
                .unwrap_or(false),
        }
    }

    pub fn as_slice(&self) -> &[Bookmark] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
