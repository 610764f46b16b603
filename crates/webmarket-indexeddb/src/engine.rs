//! IndexedDB engine implementing the webmarket engine traits
//!
//! Each connection method opens its own transaction on the named collection and
//! waits for it to complete before returning, so a resolved call is durable.

use futures::future::try_join_all;
use wasm_bindgen::JsValue;
use web_sys::{IdbDatabase, IdbTransactionMode};
use webmarket_core::{Connection, DatabaseName, Engine, Record, RecordId, Schema};

use crate::error::{describe, IndexedDbError, Result};
use crate::idb;
use crate::js;

/// The browser's IndexedDB, reached through the global `indexedDB` factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedDbEngine;

impl IndexedDbEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for IndexedDbEngine {
    type Connection = IndexedDbConnection;
    type Error = IndexedDbError;

    async fn open(&self, name: &DatabaseName, schema: &Schema) -> Result<IndexedDbConnection> {
        // indexedDB.open throws a TypeError for version 0
        if schema.version == 0 {
            return Err(IndexedDbError::InvalidVersion(schema.version));
        }
        let qualified = name.qualified();
        tracing::debug!(database = %qualified, version = schema.version, "⊔ opening IndexedDB");
        let db = idb::open_database(&qualified, schema.version, &schema.collection).await?;
        Ok(IndexedDbConnection { db })
    }

    async fn delete_database(&self, name: &DatabaseName) -> Result<()> {
        idb::delete_database(&name.qualified()).await
    }

    async fn database_names(&self) -> Result<Vec<String>> {
        idb::database_names().await
    }
}

/// An open IndexedDB database.
#[derive(Debug, Clone)]
pub struct IndexedDbConnection {
    db: IdbDatabase,
}

impl IndexedDbConnection {
    /// The underlying `IDBDatabase`.
    pub fn database(&self) -> &IdbDatabase {
        &self.db
    }

    /// Run a single request in its own transaction and return its result.
    async fn single<F>(&self, collection: &str, mode: IdbTransactionMode, f: F) -> Result<JsValue>
    where
        F: FnOnce(&web_sys::IdbObjectStore) -> std::result::Result<web_sys::IdbRequest, JsValue>,
    {
        let (tx, store) = idb::begin_transaction(&self.db, collection, mode)?;
        let done = idb::transaction_future(&tx);
        let req = match f(&store) {
            Ok(req) => req,
            Err(e) => return Err(abort(&tx, done, IndexedDbError::Request(describe(&e))).await),
        };
        match idb::request_future(&req).await {
            Ok(result) => {
                done.await?;
                Ok(result)
            }
            // A failed request aborts the transaction; wait for it before reporting
            Err(err) => {
                let _ = done.await;
                Err(err)
            }
        }
    }
}

/// Abort `tx`, wait for it to settle, and hand back `err`.
async fn abort(
    tx: &web_sys::IdbTransaction,
    done: impl std::future::Future<Output = Result<()>>,
    err: IndexedDbError,
) -> IndexedDbError {
    let _ = tx.abort();
    let _ = done.await;
    err
}

impl Connection for IndexedDbConnection {
    type Error = IndexedDbError;

    fn close(&self) {
        self.db.close();
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Record>> {
        let result = self
            .single(collection, IdbTransactionMode::Readonly, |store| store.get_all())
            .await?;
        js_sys::Array::from(&result)
            .iter()
            .map(|val| js::js_to_record(&val))
            .collect()
    }

    async fn get(&self, collection: &str, id: RecordId) -> Result<Option<Record>> {
        let key = js::key_to_js(id);
        let result = self
            .single(collection, IdbTransactionMode::Readonly, |store| store.get(&key))
            .await?;

        if result.is_undefined() || result.is_null() {
            return Ok(None);
        }
        js::js_to_record(&result).map(Some)
    }

    async fn add(&self, collection: &str, record: Record) -> Result<RecordId> {
        let value = js::record_to_js(&record)?;
        let key = self
            .single(collection, IdbTransactionMode::Readwrite, |store| store.add(&value))
            .await?;
        js::js_to_key(&key)
    }

    async fn add_all(&self, collection: &str, records: Vec<Record>) -> Result<Vec<RecordId>> {
        let values = records
            .iter()
            .map(js::record_to_js)
            .collect::<Result<Vec<_>>>()?;

        let (tx, store) = idb::begin_transaction(&self.db, collection, IdbTransactionMode::Readwrite)?;
        let done = idb::transaction_future(&tx);

        // Dispatch every add before awaiting any of them; a failed add aborts the lot
        let mut pending = Vec::with_capacity(values.len());
        for value in &values {
            match store.add(value) {
                Ok(req) => pending.push(idb::request_future(&req)),
                Err(e) => {
                    return Err(abort(&tx, done, IndexedDbError::Request(describe(&e))).await);
                }
            }
        }

        let keys = match try_join_all(pending).await {
            Ok(keys) => keys,
            Err(err) => {
                let _ = done.await;
                return Err(err);
            }
        };
        done.await?;
        tracing::trace!(collection, count = keys.len(), "⊔ batch committed");
        keys.iter().map(js::js_to_key).collect()
    }

    async fn put(&self, collection: &str, record: Record) -> Result<RecordId> {
        let value = js::record_to_js(&record)?;
        let key = self
            .single(collection, IdbTransactionMode::Readwrite, |store| store.put(&value))
            .await?;
        js::js_to_key(&key)
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<()> {
        let key = js::key_to_js(id);
        self.single(collection, IdbTransactionMode::Readwrite, |store| store.delete(&key))
            .await?;
        Ok(())
    }
}
