//! Error types for SQLite storage engine

use thiserror::Error;
use webmarket_core::RecordId;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, SqliteError>;

/// Errors that can occur during SQLite storage operations
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Database connection or query error
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Open with version 0; versions start at 1
    #[error("Invalid database version {0}: versions start at 1")]
    InvalidVersion(u32),

    /// Open with a version below the stored one
    #[error("Requested version {requested} is less than existing version {existing}")]
    Version { requested: u32, existing: u32 },

    /// Delete while connections are open
    #[error("Database {0} has open connections")]
    Blocked(String),

    /// Operation on a closed connection
    #[error("Connection to {0} is closed")]
    Closed(String),

    /// Collection missing from the database
    #[error("Collection {0} not found")]
    CollectionNotFound(String),

    /// Insert on a key that is already taken
    #[error("Record {0} already exists")]
    KeyExists(RecordId),

    /// Key outside the valid range, or key generator exhausted
    #[error("Record key out of range: {0}")]
    KeyOutOfRange(u64),
}
