//! In-memory storage engine
//!
//! A BTreeMap-based engine for testing and development. It follows IndexedDB's
//! rules closely enough to stand in for the browser in native tests: versioned
//! databases with an upgrade step, an auto-incrementing key generator per
//! collection, constraint errors on duplicate inserts, blocked deletes while
//! connections are open, and rollback of aborted batches.
//!
//! Not suitable for production use due to lack of persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::Schema;
use crate::engine::{Connection, Engine};
use crate::error::{MemoryError, MemoryResult};
use crate::naming::DatabaseName;
use crate::record::{Record, RecordId, MAX_RECORD_ID};

#[derive(Debug, Default)]
struct Databases {
    by_name: BTreeMap<String, Database>,
}

#[derive(Debug, Default)]
struct Database {
    version: u32,
    collections: HashMap<String, Collection>,
    open_connections: usize,
}

#[derive(Debug, Clone)]
struct Collection {
    records: BTreeMap<u64, Value>,
    next_key: u64,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            next_key: 1,
        }
    }
}

impl Collection {
    /// Write a record, generating a key if needed. `overwrite` selects put vs add.
    fn write(&mut self, record: Record, overwrite: bool) -> MemoryResult<RecordId> {
        let id = match record.id {
            Some(id) if id.get() > MAX_RECORD_ID => {
                return Err(MemoryError::KeyOutOfRange(id.get()))
            }
            Some(id) => id,
            None if self.next_key > MAX_RECORD_ID => {
                return Err(MemoryError::KeyOutOfRange(self.next_key))
            }
            None => RecordId(self.next_key),
        };

        if !overwrite && self.records.contains_key(&id.get()) {
            return Err(MemoryError::KeyExists(id));
        }

        self.records.insert(id.get(), record.data);
        if id.get() >= self.next_key {
            self.next_key = id.get() + 1;
        }
        Ok(id)
    }
}

/// In-memory engine.
///
/// Clones share the same databases, so a test can keep one clone for lifecycle
/// calls while handles own others.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<Databases>>,
}

impl MemoryEngine {
    /// Create an engine with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open connections to a database (for testing).
    pub fn open_connections(&self, name: &DatabaseName) -> usize {
        self.state
            .lock()
            .by_name
            .get(&name.qualified())
            .map_or(0, |db| db.open_connections)
    }

    /// Stored schema version of a database, if it exists.
    pub fn version(&self, name: &DatabaseName) -> Option<u32> {
        self.state
            .lock()
            .by_name
            .get(&name.qualified())
            .map(|db| db.version)
    }
}

impl Engine for MemoryEngine {
    type Connection = MemoryConnection;
    type Error = MemoryError;

    async fn open(&self, name: &DatabaseName, schema: &Schema) -> MemoryResult<MemoryConnection> {
        if schema.version == 0 {
            return Err(MemoryError::InvalidVersion(schema.version));
        }
        let qualified = name.qualified();
        let mut state = self.state.lock();
        let db = state.by_name.entry(qualified.clone()).or_default();

        if db.version > schema.version {
            return Err(MemoryError::Version {
                requested: schema.version,
                existing: db.version,
            });
        }
        if db.version < schema.version {
            tracing::debug!(
                database = %qualified,
                from = db.version,
                to = schema.version,
                "⊔ upgrading database"
            );
            db.version = schema.version;
            db.collections
                .entry(schema.collection.clone())
                .or_default();
        }
        db.open_connections += 1;

        Ok(MemoryConnection {
            state: self.state.clone(),
            database: qualified,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn delete_database(&self, name: &DatabaseName) -> MemoryResult<()> {
        let qualified = name.qualified();
        let mut state = self.state.lock();
        if let Some(db) = state.by_name.get(&qualified) {
            if db.open_connections > 0 {
                return Err(MemoryError::Blocked(qualified));
            }
        }
        state.by_name.remove(&qualified);
        Ok(())
    }

    async fn database_names(&self) -> MemoryResult<Vec<String>> {
        Ok(self.state.lock().by_name.keys().cloned().collect())
    }
}

/// Connection to one database of a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    state: Arc<Mutex<Databases>>,
    database: String,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    /// Run `f` against a collection while holding the engine lock.
    fn with_collection<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Collection) -> MemoryResult<T>,
    ) -> MemoryResult<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MemoryError::Closed(self.database.clone()));
        }
        let mut state = self.state.lock();
        let db = state
            .by_name
            .get_mut(&self.database)
            .ok_or_else(|| MemoryError::Closed(self.database.clone()))?;
        let collection = db
            .collections
            .get_mut(collection)
            .ok_or_else(|| MemoryError::CollectionNotFound(collection.to_string()))?;
        f(collection)
    }
}

impl Connection for MemoryConnection {
    type Error = MemoryError;

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(db) = self.state.lock().by_name.get_mut(&self.database) {
            db.open_connections = db.open_connections.saturating_sub(1);
        }
    }

    async fn get_all(&self, collection: &str) -> MemoryResult<Vec<Record>> {
        self.with_collection(collection, |c| {
            Ok(c.records
                .iter()
                .map(|(id, data)| Record::with_id(RecordId(*id), data.clone()))
                .collect())
        })
    }

    async fn get(&self, collection: &str, id: RecordId) -> MemoryResult<Option<Record>> {
        self.with_collection(collection, |c| {
            Ok(c.records
                .get(&id.get())
                .map(|data| Record::with_id(id, data.clone())))
        })
    }

    async fn add(&self, collection: &str, record: Record) -> MemoryResult<RecordId> {
        self.with_collection(collection, |c| c.write(record, false))
    }

    async fn add_all(&self, collection: &str, records: Vec<Record>) -> MemoryResult<Vec<RecordId>> {
        self.with_collection(collection, |c| {
            // Stage on a copy so an aborted batch leaves records and generator untouched
            let mut staged = c.clone();
            let ids = records
                .into_iter()
                .map(|record| staged.write(record, false))
                .collect::<MemoryResult<Vec<_>>>()?;
            *c = staged;
            Ok(ids)
        })
    }

    async fn put(&self, collection: &str, record: Record) -> MemoryResult<RecordId> {
        self.with_collection(collection, |c| c.write(record, true))
    }

    async fn delete(&self, collection: &str, id: RecordId) -> MemoryResult<()> {
        self.with_collection(collection, |c| {
            c.records.remove(&id.get());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shop() -> DatabaseName {
        DatabaseName::new("shop")
    }

    async fn open_shop(engine: &MemoryEngine) -> MemoryConnection {
        engine.open(&shop(), &Schema::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_key_generator_starts_at_one() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;

        let first = conn.add("webstore", Record::new(json!("a"))).await.unwrap();
        let second = conn.add("webstore", Record::new(json!("b"))).await.unwrap();
        assert_eq!(first, RecordId(1));
        assert_eq!(second, RecordId(2));
    }

    #[tokio::test]
    async fn test_explicit_key_advances_generator() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;

        conn.put("webstore", Record::with_id(RecordId(10), json!("x")))
            .await
            .unwrap();
        let next = conn.add("webstore", Record::new(json!("y"))).await.unwrap();
        assert_eq!(next, RecordId(11));

        // A lower explicit key does not move the generator backwards
        conn.put("webstore", Record::with_id(RecordId(3), json!("z")))
            .await
            .unwrap();
        let next = conn.add("webstore", Record::new(json!("w"))).await.unwrap();
        assert_eq!(next, RecordId(12));
    }

    #[tokio::test]
    async fn test_add_duplicate_key_fails() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;

        let id = conn.add("webstore", Record::new(json!(1))).await.unwrap();
        let result = conn.add("webstore", Record::with_id(id, json!(2))).await;
        assert_eq!(result, Err(MemoryError::KeyExists(id)));
    }

    #[tokio::test]
    async fn test_add_all_rolls_back_on_failure() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;
        let existing = conn.add("webstore", Record::new(json!("kept"))).await.unwrap();

        let batch = vec![
            Record::new(json!("a")),
            Record::with_id(existing, json!("clash")),
            Record::new(json!("b")),
        ];
        let result = conn.add_all("webstore", batch).await;
        assert_eq!(result, Err(MemoryError::KeyExists(existing)));

        let all = conn.get_all("webstore").await.unwrap();
        assert_eq!(all, vec![Record::with_id(existing, json!("kept"))]);

        // Generator was not advanced by the aborted batch
        let next = conn.add("webstore", Record::new(json!("c"))).await.unwrap();
        assert_eq!(next, RecordId(2));
    }

    #[tokio::test]
    async fn test_key_out_of_range() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;

        let too_big = RecordId(MAX_RECORD_ID + 1);
        let result = conn.put("webstore", Record::with_id(too_big, json!(0))).await;
        assert_eq!(result, Err(MemoryError::KeyOutOfRange(MAX_RECORD_ID + 1)));

        // Writing the maximum key exhausts the generator
        conn.put("webstore", Record::with_id(RecordId(MAX_RECORD_ID), json!(0)))
            .await
            .unwrap();
        let result = conn.add("webstore", Record::new(json!(1))).await;
        assert_eq!(result, Err(MemoryError::KeyOutOfRange(MAX_RECORD_ID + 1)));
    }

    #[tokio::test]
    async fn test_version_rules() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;
        conn.close();

        let v2 = Schema {
            collection: "archive".into(),
            version: 2,
        };
        let conn = engine.open(&shop(), &v2).await.unwrap();
        assert_eq!(engine.version(&shop()), Some(2));
        // Upgrade added the new collection and kept the old one
        conn.get_all("archive").await.unwrap();
        conn.get_all("webstore").await.unwrap();
        conn.close();

        let result = engine.open(&shop(), &Schema::default()).await;
        assert!(matches!(
            result,
            Err(MemoryError::Version {
                requested: 1,
                existing: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;
        let result = conn.get_all("nope").await;
        assert_eq!(result, Err(MemoryError::CollectionNotFound("nope".into())));
    }

    #[tokio::test]
    async fn test_close_is_shared_and_idempotent() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;
        let clone = conn.clone();
        assert_eq!(engine.open_connections(&shop()), 1);

        conn.close();
        conn.close();
        assert_eq!(engine.open_connections(&shop()), 0);

        let result = clone.get_all("webstore").await;
        assert_eq!(result, Err(MemoryError::Closed("webmarket.shop".into())));
    }

    #[tokio::test]
    async fn test_delete_database_blocked_while_open() {
        let engine = MemoryEngine::new();
        let conn = open_shop(&engine).await;

        let result = engine.delete_database(&shop()).await;
        assert_eq!(result, Err(MemoryError::Blocked("webmarket.shop".into())));

        conn.close();
        engine.delete_database(&shop()).await.unwrap();
        assert!(engine.database_names().await.unwrap().is_empty());

        // Deleting again is fine
        engine.delete_database(&shop()).await.unwrap();
    }
}
