//! `Webmarket` JS class backed by IndexedDB
//!
//! Instance methods clone the shared handle into a `'static` future and hand it to
//! `future_to_promise`; class-level methods are plain `async fn` exports.

use std::future::Future;
use std::rc::Rc;

use js_sys::{Array, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use webmarket_core::{RecordId, StoreConfig, StoreHandle};
use webmarket_indexeddb::{js, IndexedDbEngine, IndexedDbError};

type Handle = StoreHandle<IndexedDbEngine>;

/// A namespaced record store in the browser's IndexedDB.
#[wasm_bindgen]
pub struct Webmarket {
    handle: Rc<Handle>,
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn config(name: Option<String>, collection: Option<String>, version: Option<u32>) -> StoreConfig {
    let mut config = name.map(StoreConfig::new).unwrap_or_default();
    if let Some(collection) = collection {
        config = config.collection(collection);
    }
    if let Some(version) = version {
        config = config.version(version);
    }
    config
}

fn record_id(id: f64) -> Result<RecordId, JsValue> {
    RecordId::from_f64(id).ok_or_else(|| js_error(format!("invalid record id: {}", id)))
}

impl Webmarket {
    /// Run an operation against the shared handle as a Promise.
    fn spawn<F, Fut>(&self, op: F) -> Promise
    where
        F: FnOnce(Rc<Handle>) -> Fut,
        Fut: Future<Output = Result<JsValue, IndexedDbError>> + 'static,
    {
        let fut = op(self.handle.clone());
        future_to_promise(async move { fut.await.map_err(js_error) })
    }
}

#[wasm_bindgen]
impl Webmarket {
    /// Create an uninitialized store. Nothing is opened until first use.
    #[wasm_bindgen(constructor)]
    pub fn new(
        name: Option<String>,
        collection: Option<String>,
        version: Option<u32>,
    ) -> Webmarket {
        // Route Rust panics to console.error instead of "RuntimeError: unreachable"
        console_error_panic_hook::set_once();

        Webmarket {
            handle: Rc::new(StoreHandle::create(
                IndexedDbEngine,
                config(name, collection, version),
            )),
        }
    }

    /// Same as `new Webmarket(...)`.
    pub fn create(
        name: Option<String>,
        collection: Option<String>,
        version: Option<u32>,
    ) -> Webmarket {
        Webmarket::new(name, collection, version)
    }

    /// Create a store and wait until its collection is ready.
    pub async fn open(
        name: Option<String>,
        collection: Option<String>,
        version: Option<u32>,
    ) -> Result<Webmarket, JsValue> {
        let store = Webmarket::new(name, collection, version);
        store.handle.init().await.map_err(js_error)?;
        Ok(store)
    }

    /// Irreversibly delete a database. Rejects while connections to it are open.
    #[wasm_bindgen(js_name = deleteDatabase)]
    pub async fn delete_database(name: String) -> Result<(), JsValue> {
        Handle::delete_database(&IndexedDbEngine, name)
            .await
            .map_err(js_error)
    }

    /// Names of every webmarket database, without the namespace prefix.
    #[wasm_bindgen(js_name = listDatabases)]
    pub async fn list_databases() -> Result<Array, JsValue> {
        let names = Handle::list_databases(&IndexedDbEngine)
            .await
            .map_err(js_error)?;
        Ok(names.into_iter().map(JsValue::from).collect())
    }

    /// Open the connection if needed. Resolves with the `IDBDatabase`.
    pub fn init(&self) -> Promise {
        self.spawn(|handle| async move {
            let conn = handle.init().await?;
            Ok(conn.database().clone().into())
        })
    }

    /// Close the current connection and bind to another database.
    #[wasm_bindgen(js_name = changeDatabase)]
    pub fn change_database(&self, name: String) -> Promise {
        self.spawn(|handle| async move {
            handle.change_database(name).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Every record of the collection, as `{ id, data }` objects.
    #[wasm_bindgen(js_name = selectAll)]
    pub fn select_all(&self) -> Promise {
        self.spawn(|handle| async move {
            let records = handle.select_all().await?;
            let array = Array::new();
            for record in &records {
                array.push(&js::record_to_js(record)?);
            }
            Ok(array.into())
        })
    }

    /// Alias of `selectAll`.
    pub fn select(&self) -> Promise {
        self.select_all()
    }

    /// The record at `id`, or `undefined`.
    #[wasm_bindgen(js_name = selectById)]
    pub fn select_by_id(&self, id: f64) -> Promise {
        let id = match record_id(id) {
            Ok(id) => id,
            Err(err) => return Promise::reject(&err),
        };
        self.spawn(move |handle| async move {
            match handle.select_by_id(id).await? {
                Some(record) => js::record_to_js(&record),
                None => Ok(JsValue::UNDEFINED),
            }
        })
    }

    /// Store a payload. Resolves with the assigned id.
    #[wasm_bindgen(js_name = insertOne)]
    pub fn insert_one(&self, data: JsValue) -> Promise {
        let data = match js::js_to_value(&data) {
            Ok(data) => data,
            Err(err) => return Promise::reject(&js_error(err)),
        };
        self.spawn(|handle| async move {
            let id = handle.insert_one(data).await?;
            Ok(js::key_to_js(id))
        })
    }

    /// Store several payloads in one transaction. Resolves with their ids in order;
    /// if any insert fails nothing is stored.
    #[wasm_bindgen(js_name = insertMany)]
    pub fn insert_many(&self, items: Array) -> Promise {
        let items = match items
            .iter()
            .map(|item| js::js_to_value(&item))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(items) => items,
            Err(err) => return Promise::reject(&js_error(err)),
        };
        self.spawn(|handle| async move {
            let ids = handle.insert_many(items).await?;
            Ok(ids.into_iter().map(js::key_to_js).collect::<Array>().into())
        })
    }

    /// Replace (or create) the record at `id`. Resolves with the id.
    #[wasm_bindgen(js_name = updateOne)]
    pub fn update_one(&self, id: f64, data: JsValue) -> Promise {
        let id = match record_id(id) {
            Ok(id) => id,
            Err(err) => return Promise::reject(&err),
        };
        let data = match js::js_to_value(&data) {
            Ok(data) => data,
            Err(err) => return Promise::reject(&js_error(err)),
        };
        self.spawn(move |handle| async move {
            let id = handle.update_one(id, data).await?;
            Ok(js::key_to_js(id))
        })
    }

    /// Remove the record at `id`. Removing a missing record succeeds.
    #[wasm_bindgen(js_name = deleteOne)]
    pub fn delete_one(&self, id: f64) -> Promise {
        let id = match record_id(id) {
            Ok(id) => id,
            Err(err) => return Promise::reject(&err),
        };
        self.spawn(move |handle| async move {
            handle.delete_one(id).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Release the connection. The next operation reopens it.
    pub fn close(&self) -> Promise {
        self.spawn(|handle| async move {
            handle.close().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// The bound database name, without the namespace prefix.
    #[wasm_bindgen(js_name = databaseName)]
    pub fn database_name(&self) -> Promise {
        self.spawn(|handle| async move { Ok(handle.database_name().await.to_string().into()) })
    }

    /// Whether a connection is currently open.
    #[wasm_bindgen(js_name = isReady)]
    pub fn is_ready(&self) -> Promise {
        self.spawn(|handle| async move { Ok(handle.is_ready().await.into()) })
    }
}
