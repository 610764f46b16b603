//! SQLite storage engine implementing the webmarket engine traits
//!
//! A single SQLite database (file or in-memory) holds every namespaced webmarket
//! database as rows of the `databases` / `collections` / `records` tables. Each
//! engine operation runs in its own SQLite transaction.
//!
//! Keys are not SQLite rowids: every collection carries an explicit `next_key`
//! counter that follows the IndexedDB key generator rules (start at 1, jump past
//! explicitly written keys, unchanged when a transaction rolls back).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{OptionalExtension, Transaction};
use webmarket_core::{Connection, DatabaseName, Engine, Record, RecordId, Schema};

use crate::error::{Result, SqliteError};
use crate::json::{deserialize_payload, key_to_sql, serialize_payload, sql_to_key};

/// SQLite-backed engine. Clones share the same SQLite connection.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    conn: Arc<Mutex<rusqlite::Connection>>,
    /// Open webmarket connections per qualified database name
    open: Arc<Mutex<HashMap<String, usize>>>,
}

impl SqliteEngine {
    /// Wrap an existing SQLite connection, applying migrations first.
    pub fn from_connection(conn: rusqlite::Connection) -> Result<Self> {
        crate::migrate::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            open: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Create an in-memory engine (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(rusqlite::Connection::open_in_memory()?)
    }

    /// Create a file-backed engine
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(rusqlite::Connection::open(path)?)
    }

    /// Number of open webmarket connections to a database.
    pub fn open_connections(&self, name: &DatabaseName) -> usize {
        self.open
            .lock()
            .get(&name.qualified())
            .copied()
            .unwrap_or(0)
    }

    fn release(&self, qualified: &str) {
        let mut open = self.open.lock();
        if let Some(count) = open.get_mut(qualified) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                open.remove(qualified);
            }
        }
    }
}

impl Engine for SqliteEngine {
    type Connection = SqliteConnection;
    type Error = SqliteError;

    async fn open(&self, name: &DatabaseName, schema: &Schema) -> Result<SqliteConnection> {
        if schema.version == 0 {
            return Err(SqliteError::InvalidVersion(schema.version));
        }
        let qualified = name.qualified();
        // Held until the connection is counted so a delete cannot slip in between
        let mut conn = self.conn.lock();
        {
            let tx = conn.transaction()?;

            let existing: Option<u32> = tx
                .query_row(
                    "SELECT version FROM databases WHERE name = ?",
                    [&qualified],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(version) if version > schema.version => {
                    return Err(SqliteError::Version {
                        requested: schema.version,
                        existing: version,
                    });
                }
                Some(version) if version == schema.version => {}
                Some(version) => {
                    tracing::debug!(database = %qualified, from = version, to = schema.version, "⊔ upgrading database");
                    tx.execute(
                        "UPDATE databases SET version = ? WHERE name = ?",
                        rusqlite::params![schema.version, qualified],
                    )?;
                    ensure_collection(&tx, &qualified, &schema.collection)?;
                }
                None => {
                    tracing::debug!(database = %qualified, version = schema.version, "⊔ creating database");
                    tx.execute(
                        "INSERT INTO databases (name, version) VALUES (?, ?)",
                        rusqlite::params![qualified, schema.version],
                    )?;
                    ensure_collection(&tx, &qualified, &schema.collection)?;
                }
            }

            tx.commit()?;
        }

        *self.open.lock().entry(qualified.clone()).or_insert(0) += 1;
        drop(conn);

        Ok(SqliteConnection {
            engine: self.clone(),
            database: qualified,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn delete_database(&self, name: &DatabaseName) -> Result<()> {
        let qualified = name.qualified();
        let conn = self.conn.lock();
        if self.open.lock().contains_key(&qualified) {
            return Err(SqliteError::Blocked(qualified));
        }

        // Collections and records follow through ON DELETE CASCADE
        conn.execute("DELETE FROM databases WHERE name = ?", [&qualified])?;
        Ok(())
    }

    async fn database_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM databases ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<String>, rusqlite::Error>>()?;
        Ok(names)
    }
}

fn ensure_collection(tx: &Transaction, database: &str, collection: &str) -> Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO collections (database, name) VALUES (?, ?)",
        [database, collection],
    )?;
    Ok(())
}

/// Connection to one database of a [`SqliteEngine`].
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    engine: SqliteEngine,
    database: String,
    closed: Arc<AtomicBool>,
}

impl SqliteConnection {
    /// Run `f` inside one SQLite transaction scoped to a collection.
    ///
    /// `f` receives the transaction and the collection's current `next_key`. The
    /// transaction commits only if `f` succeeds.
    fn in_transaction<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&Transaction, i64) -> Result<T>,
    ) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SqliteError::Closed(self.database.clone()));
        }

        let mut conn = self.engine.conn.lock();
        let tx = conn.transaction()?;

        let next_key: i64 = tx
            .query_row(
                "SELECT next_key FROM collections WHERE database = ? AND name = ?",
                [self.database.as_str(), collection],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| SqliteError::CollectionNotFound(collection.to_string()))?;

        let value = f(&tx, next_key)?;
        tx.commit()?;
        Ok(value)
    }

    /// Write one record inside `tx`, generating a key if needed.
    ///
    /// Returns the key written and the generator value afterwards.
    fn write(
        &self,
        tx: &Transaction,
        collection: &str,
        next_key: i64,
        record: Record,
        overwrite: bool,
    ) -> Result<(RecordId, i64)> {
        let id = match record.id {
            Some(id) => id,
            None => sql_to_key(next_key)?,
        };
        let key = key_to_sql(id)?;
        let data = serialize_payload(&record.data)?;

        if overwrite {
            tx.execute(
                "INSERT OR REPLACE INTO records (database, collection, id, data) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![self.database, collection, key, data],
            )?;
        } else {
            let taken = tx
                .prepare_cached(
                    "SELECT 1 FROM records WHERE database = ?1 AND collection = ?2 AND id = ?3",
                )?
                .exists(rusqlite::params![self.database, collection, key])?;
            if taken {
                return Err(SqliteError::KeyExists(id));
            }
            tx.execute(
                "INSERT INTO records (database, collection, id, data) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![self.database, collection, key, data],
            )?;
        }

        let next_key = next_key.max(key + 1);
        Ok((id, next_key))
    }

    fn store_next_key(&self, tx: &Transaction, collection: &str, next_key: i64) -> Result<()> {
        tx.execute(
            "UPDATE collections SET next_key = ?1 WHERE database = ?2 AND name = ?3",
            rusqlite::params![next_key, self.database, collection],
        )?;
        Ok(())
    }
}

impl Connection for SqliteConnection {
    type Error = SqliteError;

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.engine.release(&self.database);
        }
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Record>> {
        self.in_transaction(collection, |tx, _| {
            let mut stmt = tx.prepare_cached(
                "SELECT id, data FROM records WHERE database = ? AND collection = ? ORDER BY id",
            )?;
            let rows = stmt
                .query_map([self.database.as_str(), collection], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

            rows.into_iter()
                .map(|(id, data)| -> Result<Record> {
                    Ok(Record::with_id(sql_to_key(id)?, deserialize_payload(&data)?))
                })
                .collect()
        })
    }

    async fn get(&self, collection: &str, id: RecordId) -> Result<Option<Record>> {
        let key = key_to_sql(id)?;
        self.in_transaction(collection, |tx, _| {
            let data: Option<String> = tx
                .query_row(
                    "SELECT data FROM records WHERE database = ?1 AND collection = ?2 AND id = ?3",
                    rusqlite::params![self.database, collection, key],
                    |row| row.get(0),
                )
                .optional()?;

            data.map(|data| -> Result<Record> {
                Ok(Record::with_id(id, deserialize_payload(&data)?))
            })
            .transpose()
        })
    }

    async fn add(&self, collection: &str, record: Record) -> Result<RecordId> {
        self.in_transaction(collection, |tx, next_key| {
            let (id, next_key) = self.write(tx, collection, next_key, record, false)?;
            self.store_next_key(tx, collection, next_key)?;
            Ok(id)
        })
    }

    async fn add_all(&self, collection: &str, records: Vec<Record>) -> Result<Vec<RecordId>> {
        self.in_transaction(collection, |tx, mut next_key| {
            let mut ids = Vec::with_capacity(records.len());
            for record in records {
                let (id, next) = self.write(tx, collection, next_key, record, false)?;
                ids.push(id);
                next_key = next;
            }
            self.store_next_key(tx, collection, next_key)?;
            Ok(ids)
        })
    }

    async fn put(&self, collection: &str, record: Record) -> Result<RecordId> {
        self.in_transaction(collection, |tx, next_key| {
            let (id, next_key) = self.write(tx, collection, next_key, record, true)?;
            self.store_next_key(tx, collection, next_key)?;
            Ok(id)
        })
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<()> {
        let key = key_to_sql(id)?;
        self.in_transaction(collection, |tx, _| {
            tx.execute(
                "DELETE FROM records WHERE database = ?1 AND collection = ?2 AND id = ?3",
                rusqlite::params![self.database, collection, key],
            )?;
            Ok(())
        })
    }
}
