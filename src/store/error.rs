//! Store error types

use thiserror::Error;

/// Errors that can occur in the relational store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported a failure
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O operation failed (creating the data directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Filter or order expression could not be parsed
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Filter refers to a column the relation does not have
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Delete without any filter would wipe the relation
    #[error("Refusing to delete without a filter")]
    UnfilteredDelete,

    /// Referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::UnknownColumn("owner".to_string());
        assert_eq!(err.to_string(), "Unknown column: owner");

        let err = StoreError::UnfilteredDelete;
        assert_eq!(err.to_string(), "Refusing to delete without a filter");
    }
}
