//! Engine capability traits
//!
//! The store handle never talks to a concrete backend. Every backend exposes the
//! same small surface that IndexedDB offers natively:
//!
//! - [`Engine`]: open (with an upgrade step that ensures the collection exists),
//!   delete and enumerate databases
//! - [`Connection`]: one open database; every method runs in its own transaction
//!
//! Implementations exist for:
//!
//! - **Memory**: [`MemoryEngine`](crate::MemoryEngine), for testing
//! - **SQLite**: `webmarket-sqlite`, native only
//! - **IndexedDB**: `webmarket-indexeddb`, browser WASM only
//!
//! Errors are the backend's own type and pass through the handle unchanged.
//! The futures are not required to be `Send`: browser engines are single-threaded
//! and their JS handles cannot cross threads.

#![allow(async_fn_in_trait)]

use crate::config::Schema;
use crate::naming::DatabaseName;
use crate::record::{Record, RecordId};

/// Database-level operations of a storage backend.
pub trait Engine {
    /// An open database. Cloning shares the same underlying connection.
    type Connection: Connection<Error = Self::Error>;

    /// The backend's native error.
    type Error: std::error::Error + 'static;

    /// Open (or create) a database.
    ///
    /// When the stored version is older than `schema.version` (or the database is new)
    /// the engine runs its upgrade step and creates `schema.collection` if missing.
    /// Opening with a version lower than the stored one fails.
    async fn open(
        &self,
        name: &DatabaseName,
        schema: &Schema,
    ) -> Result<Self::Connection, Self::Error>;

    /// Irreversibly delete a database. Deleting a missing database succeeds.
    /// Fails if connections to it are still open.
    async fn delete_database(&self, name: &DatabaseName) -> Result<(), Self::Error>;

    /// Every database name the engine knows about, as stored (prefixed).
    async fn database_names(&self) -> Result<Vec<String>, Self::Error>;
}

/// Record-level operations on an open database.
pub trait Connection: Clone {
    type Error: std::error::Error + 'static;

    /// Release the connection. Further calls on this connection (or its clones) fail.
    fn close(&self);

    /// All records of a collection in the engine's natural (ascending key) order.
    async fn get_all(&self, collection: &str) -> Result<Vec<Record>, Self::Error>;

    /// The record at `id`, or `None`.
    async fn get(&self, collection: &str, id: RecordId) -> Result<Option<Record>, Self::Error>;

    /// Insert a record. Assigns a key when `record.id` is `None`; fails if the key
    /// is already taken.
    async fn add(&self, collection: &str, record: Record) -> Result<RecordId, Self::Error>;

    /// Insert a batch in one transaction, returning keys in input order.
    ///
    /// All-or-nothing: if any insert fails the transaction aborts, nothing from the
    /// batch persists, and the first error is returned.
    async fn add_all(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordId>, Self::Error>;

    /// Insert or replace a record. Assigns a key when `record.id` is `None`.
    async fn put(&self, collection: &str, record: Record) -> Result<RecordId, Self::Error>;

    /// Remove the record at `id`. Removing a missing key succeeds.
    async fn delete(&self, collection: &str, id: RecordId) -> Result<(), Self::Error>;
}
