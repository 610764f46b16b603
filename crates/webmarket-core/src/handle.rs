//! Lazily-connected store handle
//!
//! A [`StoreHandle`] is bound to one namespaced database and one collection in it.
//! The connection is opened on first use, cached, and replaced only when the handle
//! is rebound with [`StoreHandle::change_database`] or closed.
//!
//! # States
//!
//! ```text
//! Uninitialized --(first call)--> Initializing --> Ready
//!       ^                                            |
//!       +-------- change_database / close -----------+
//! ```
//!
//! The binding (name + cached connection) sits behind an async mutex that is held
//! for the whole open step. Concurrent first callers queue on it and then reuse the
//! connection the winner opened, so at most one open is ever in flight. The lock is
//! dropped before the record operation itself runs.
//!
//! Each CRUD call is its own engine transaction; two calls are never composed into
//! one. Engine errors are returned as-is.

use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::{Schema, StoreConfig};
use crate::engine::{Connection, Engine};
use crate::naming::DatabaseName;
use crate::record::{Record, RecordId};

struct Binding<C> {
    name: DatabaseName,
    connection: Option<C>,
}

/// Handle to one collection of one namespaced database.
pub struct StoreHandle<E: Engine> {
    engine: E,
    schema: Schema,
    binding: Mutex<Binding<E::Connection>>,
}

impl<E: Engine> StoreHandle<E> {
    /// Create an uninitialized handle. Nothing is opened until the first operation.
    pub fn create(engine: E, config: StoreConfig) -> Self {
        let schema = config.schema();
        Self {
            engine,
            schema,
            binding: Mutex::new(Binding {
                name: config.database,
                connection: None,
            }),
        }
    }

    /// Create a handle and wait until its connection is ready and the collection exists.
    pub async fn open(engine: E, config: StoreConfig) -> Result<Self, E::Error> {
        let handle = Self::create(engine, config);
        handle.init().await?;
        Ok(handle)
    }

    /// Ensure the connection is open, returning it.
    ///
    /// Idempotent: on a ready handle this returns the cached connection without
    /// touching the engine. A failed open leaves the handle uninitialized so the next
    /// call retries.
    pub async fn init(&self) -> Result<E::Connection, E::Error> {
        let mut binding = self.binding.lock().await;
        self.ensure_open(&mut binding).await
    }

    async fn ensure_open(
        &self,
        binding: &mut Binding<E::Connection>,
    ) -> Result<E::Connection, E::Error> {
        if let Some(conn) = &binding.connection {
            return Ok(conn.clone());
        }

        tracing::debug!(
            database = %binding.name,
            collection = %self.schema.collection,
            version = self.schema.version,
            "⊔ opening database"
        );
        let conn = self.engine.open(&binding.name, &self.schema).await?;
        binding.connection = Some(conn.clone());
        Ok(conn)
    }

    /// Rebind to another database.
    ///
    /// The current connection (if any) is closed, then the handle opens the new
    /// database before returning. Operations issued concurrently wait for the rebind
    /// and then act on the new database. If the open fails the handle stays bound to
    /// the new name, uninitialized.
    pub async fn change_database(&self, name: impl Into<DatabaseName>) -> Result<(), E::Error> {
        let name = name.into();
        let mut binding = self.binding.lock().await;

        if let Some(old) = binding.connection.take() {
            tracing::debug!(from = %binding.name, to = %name, "⊔ switching database");
            old.close();
        }
        binding.name = name;
        self.ensure_open(&mut binding).await?;
        Ok(())
    }

    /// Close the cached connection. The next operation reopens it.
    pub async fn close(&self) {
        let mut binding = self.binding.lock().await;
        if let Some(conn) = binding.connection.take() {
            tracing::debug!(database = %binding.name, "⊔ closing database");
            conn.close();
        }
    }

    /// Name of the currently bound database (without prefix).
    pub async fn database_name(&self) -> DatabaseName {
        self.binding.lock().await.name.clone()
    }

    /// Whether a connection is currently cached.
    pub async fn is_ready(&self) -> bool {
        self.binding.lock().await.connection.is_some()
    }

    /// The collection this handle reads and writes.
    pub fn collection(&self) -> &str {
        &self.schema.collection
    }

    /// The engine behind this handle.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Every record in the collection, in the engine's natural order.
    pub async fn select_all(&self) -> Result<Vec<Record>, E::Error> {
        let conn = self.init().await?;
        conn.get_all(&self.schema.collection).await
    }

    /// The record with the given key, or `None`.
    pub async fn select_by_id(&self, id: RecordId) -> Result<Option<Record>, E::Error> {
        let conn = self.init().await?;
        conn.get(&self.schema.collection, id).await
    }

    /// Insert one payload and return its generated key.
    pub async fn insert_one(&self, data: Value) -> Result<RecordId, E::Error> {
        let conn = self.init().await?;
        let id = conn.add(&self.schema.collection, Record::new(data)).await?;
        tracing::trace!(%id, "⊔ inserted record");
        Ok(id)
    }

    /// Insert several payloads in one transaction.
    ///
    /// Keys come back in input order. The batch is all-or-nothing: on failure nothing
    /// from it is stored and the first engine error is returned.
    pub async fn insert_many<I>(&self, items: I) -> Result<Vec<RecordId>, E::Error>
    where
        I: IntoIterator<Item = Value>,
    {
        let records: Vec<Record> = items.into_iter().map(Record::new).collect();
        let conn = self.init().await?;
        let count = records.len();
        let ids = conn.add_all(&self.schema.collection, records).await?;
        tracing::trace!(count, "⊔ inserted batch");
        Ok(ids)
    }

    /// Write `data` at `id`, replacing any existing record. Returns the key written.
    pub async fn update_one(&self, id: RecordId, data: Value) -> Result<RecordId, E::Error> {
        let conn = self.init().await?;
        conn.put(&self.schema.collection, Record::with_id(id, data))
            .await
    }

    /// Remove the record at `id`. Succeeds if it did not exist.
    pub async fn delete_one(&self, id: RecordId) -> Result<(), E::Error> {
        let conn = self.init().await?;
        conn.delete(&self.schema.collection, id).await
    }

    // ========================================================================
    // Database lifecycle (engine-level, not bound to a handle)
    // ========================================================================

    /// Irreversibly delete a whole database.
    ///
    /// Fails if the engine reports open connections to it; close or rebind any handle
    /// using it first.
    pub async fn delete_database(engine: &E, name: impl Into<DatabaseName>) -> Result<(), E::Error> {
        let name = name.into();
        tracing::debug!(database = %name, "⊔ deleting database");
        engine.delete_database(&name).await.inspect_err(|e| {
            tracing::warn!(database = %name, error = %e, "⊔ delete failed");
        })
    }

    /// Names of all databases in the namespace, prefix stripped, in engine order.
    pub async fn list_databases(engine: &E) -> Result<Vec<String>, E::Error> {
        let names = engine.database_names().await?;
        Ok(names
            .iter()
            .filter_map(|raw| DatabaseName::from_qualified(raw))
            .map(String::from)
            .collect())
    }
}
