//! Error types for the in-memory engine

use thiserror::Error;

use crate::record::RecordId;

/// Errors raised by [`MemoryEngine`](crate::MemoryEngine).
///
/// The variants mirror the DOMException names IndexedDB reports for the same
/// situations, so code exercised against the memory engine sees the same failures
/// it would in a browser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Transaction on a collection the database does not have (NotFoundError)
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// Insert on a key that is already taken (ConstraintError)
    #[error("record {0} already exists")]
    KeyExists(RecordId),

    /// Key outside the valid range, or key generator exhausted (ConstraintError)
    #[error("record key out of range: {0}")]
    KeyOutOfRange(u64),

    /// Open with version 0; versions start at 1 (TypeError)
    #[error("invalid database version {0}: versions start at 1")]
    InvalidVersion(u32),

    /// Open with a version below the stored one (VersionError)
    #[error("requested version {requested} is less than existing version {existing}")]
    Version { requested: u32, existing: u32 },

    /// Delete while connections are open (blocked)
    #[error("database '{0}' has open connections")]
    Blocked(String),

    /// Operation on a closed connection (InvalidStateError)
    #[error("connection to '{0}' is closed")]
    Closed(String),
}

/// Result type for in-memory engine operations
pub type MemoryResult<T> = Result<T, MemoryError>;
