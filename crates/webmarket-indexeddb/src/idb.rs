//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`.
//!
//! The futures returned by [`request_future`] and [`transaction_future`] attach their
//! event handlers immediately, not on first poll, so a caller can dispatch several
//! requests and start watching the transaction before awaiting anything.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use js_sys::Promise;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    IdbDatabase, IdbFactory, IdbObjectStore, IdbOpenDbRequest, IdbRequest, IdbTransaction,
    IdbTransactionMode,
};

use crate::error::{describe, IndexedDbError, Result};

/// Key path of every record collection.
pub const KEY_PATH: &str = "id";

/// Rejection value used when a delete is blocked by open connections.
const BLOCKED: &str = "blocked";

/// Type alias for upgrade closure to reduce complexity
type UpgradeClosure = Rc<RefCell<Option<Closure<dyn FnMut(web_sys::IdbVersionChangeEvent)>>>>;

type EventClosure = Closure<dyn FnMut(web_sys::Event)>;

/// Get the global IndexedDB factory (window or worker scope).
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| IndexedDbError::NotAvailable("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(IndexedDbError::NotAvailable(
            "indexedDB is null/undefined".into(),
        ));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| IndexedDbError::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// The DOMException of a failed request, or a fallback string.
fn request_error(req: &IdbRequest) -> JsValue {
    req.error()
        .ok()
        .flatten()
        .map(JsValue::from)
        .unwrap_or_else(|| JsValue::from_str("unknown IDB error"))
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's result.
fn request_to_promise(req: &IdbRequest) -> Promise {
    let req = req.clone();

    Promise::new(&mut move |resolve, reject| {
        // Store closures in Rc<RefCell> to manage their lifetime without leaking
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let req_s = req.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = reject.call1(&JsValue::UNDEFINED, &request_error(&req_e));
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        // Keep both closures alive until one fires
        *closures.borrow_mut() = Some((on_success, on_error));
    })
}

/// Convert an IdbTransaction's outcome into a JS Promise.
///
/// Resolves on `complete`; rejects on `error` or `abort`.
fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        type ClosureSet = (EventClosure, EventClosure, EventClosure);
        let closures: Rc<RefCell<Option<ClosureSet>>> = Rc::new(RefCell::new(None));

        let tx_c = tx.clone();
        let closures_for_complete = closures.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            detach_transaction(&tx_c);
            *closures_for_complete.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let failure = {
            let tx = tx.clone();
            let closures = closures.clone();
            move |fallback: &str| {
                let err = tx
                    .error()
                    .map(JsValue::from)
                    .unwrap_or_else(|| JsValue::from_str(fallback));
                let _ = reject.call1(&JsValue::UNDEFINED, &err);
                // `error` is followed by `abort`; neither may reach a dropped closure
                detach_transaction(&tx);
                *closures.borrow_mut() = None;
            }
        };
        let failure = Rc::new(failure);

        let on_error_failure = failure.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            on_error_failure("transaction error");
        }) as Box<dyn FnMut(web_sys::Event)>);

        let on_abort = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            failure("transaction aborted");
        }) as Box<dyn FnMut(web_sys::Event)>);

        tx.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        tx.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_complete, on_error, on_abort));
    })
}

/// Convert a deleteDatabase request into a JS Promise.
///
/// Rejects with [`BLOCKED`] if the browser reports open connections instead of
/// waiting for them to close.
fn delete_request_to_promise(req: &IdbOpenDbRequest) -> Promise {
    let req = req.clone();

    Promise::new(&mut move |resolve, reject| {
        type ClosureSet = (EventClosure, EventClosure, EventClosure);
        let closures: Rc<RefCell<Option<ClosureSet>>> = Rc::new(RefCell::new(None));

        let req_s = req.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            detach_delete(&req_s);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req.clone();
        let reject_e = reject.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = reject_e.call1(&JsValue::UNDEFINED, &request_error(&req_e));
            detach_delete(&req_e);
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        // The delete stays queued after `blocked` and may still succeed later
        let req_b = req.clone();
        let closures_for_blocked = closures.clone();
        let on_blocked = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = reject.call1(&JsValue::UNDEFINED, &JsValue::from_str(BLOCKED));
            detach_delete(&req_b);
            *closures_for_blocked.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        req.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_success, on_error, on_blocked));
    })
}

fn detach_transaction(tx: &IdbTransaction) {
    tx.set_oncomplete(None);
    tx.set_onerror(None);
    tx.set_onabort(None);
}

fn detach_delete(req: &IdbOpenDbRequest) {
    req.set_onsuccess(None);
    req.set_onerror(None);
    req.set_onblocked(None);
}

/// Create the collection during an upgrade if it does not exist yet.
fn ensure_collection(
    event: &web_sys::IdbVersionChangeEvent,
    collection: &str,
) -> std::result::Result<(), JsValue> {
    let target = event
        .target()
        .ok_or_else(|| JsValue::from_str("upgrade event has no target"))?;
    let req: IdbOpenDbRequest = target.unchecked_into();
    let db: IdbDatabase = req.result()?.unchecked_into();

    if db.object_store_names().contains(collection) {
        return Ok(());
    }

    let params = web_sys::IdbObjectStoreParameters::new();
    js_sys::Reflect::set(&params, &"keyPath".into(), &KEY_PATH.into())?;
    js_sys::Reflect::set(&params, &"autoIncrement".into(), &JsValue::TRUE)?;

    if let Err(err) = db.create_object_store_with_optional_parameters(collection, &params) {
        // Abort the versionchange transaction so the open request fails
        if let Some(tx) = req.transaction() {
            let _ = tx.abort();
        }
        return Err(err);
    }
    Ok(())
}

/// Open (or create) a database, creating `collection` on upgrade.
pub async fn open_database(db_name: &str, version: u32, collection: &str) -> Result<IdbDatabase> {
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = factory
        .open_with_u32(db_name, version)
        .map_err(|e| IndexedDbError::Open(describe(&e)))?;

    // Store upgrade closure to manage its lifetime without leaking
    let upgrade_closure: UpgradeClosure = Rc::new(RefCell::new(None));
    let upgrade_closure_for_drop = upgrade_closure.clone();

    let collection_name = collection.to_string();
    let db_label = db_name.to_string();
    let on_upgrade = Closure::wrap(Box::new(move |event: web_sys::IdbVersionChangeEvent| {
        tracing::debug!(database = %db_label, collection = %collection_name, "⊔ upgrade needed");
        if let Err(err) = ensure_collection(&event, &collection_name) {
            tracing::error!(
                database = %db_label,
                collection = %collection_name,
                error = %describe(&err),
                "⊔ failed to create collection"
            );
        }
    }) as Box<dyn FnMut(web_sys::IdbVersionChangeEvent)>);

    open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
    *upgrade_closure.borrow_mut() = Some(on_upgrade);

    let open_promise = request_to_promise(open_req.unchecked_ref());
    let result = JsFuture::from(open_promise).await;

    // Clean up upgrade closure now that open is complete
    *upgrade_closure_for_drop.borrow_mut() = None;

    result
        .map_err(|e| IndexedDbError::Open(describe(&e)))?
        .dyn_into::<IdbDatabase>()
        .map_err(|_| IndexedDbError::Open("result is not IdbDatabase".into()))
}

/// Start a transaction on one collection.
pub fn begin_transaction(
    db: &IdbDatabase,
    collection: &str,
    mode: IdbTransactionMode,
) -> Result<(IdbTransaction, IdbObjectStore)> {
    let tx = db
        .transaction_with_str_and_mode(collection, mode)
        .map_err(|e| IndexedDbError::Transaction(describe(&e)))?;
    let store = tx
        .object_store(collection)
        .map_err(|e| IndexedDbError::Request(describe(&e)))?;
    Ok((tx, store))
}

/// Future resolving to an IdbRequest's result.
pub fn request_future(req: &IdbRequest) -> impl Future<Output = Result<JsValue>> {
    let future = JsFuture::from(request_to_promise(req));
    async move {
        future
            .await
            .map_err(|e| IndexedDbError::Request(describe(&e)))
    }
}

/// Future resolving once an IdbTransaction completes.
pub fn transaction_future(tx: &IdbTransaction) -> impl Future<Output = Result<()>> {
    let future = JsFuture::from(transaction_to_promise(tx));
    async move {
        future
            .await
            .map(|_| ())
            .map_err(|e| IndexedDbError::Transaction(describe(&e)))
    }
}

/// Delete a database by name. Fails with [`IndexedDbError::Blocked`] while other
/// connections to it are open.
pub async fn delete_database(db_name: &str) -> Result<()> {
    let factory = idb_factory()?;
    let req = factory
        .delete_database(db_name)
        .map_err(|e| IndexedDbError::Open(format!("delete db: {}", describe(&e))))?;

    match JsFuture::from(delete_request_to_promise(&req)).await {
        Ok(_) => Ok(()),
        Err(e) if e.as_string().as_deref() == Some(BLOCKED) => {
            Err(IndexedDbError::Blocked(db_name.to_string()))
        }
        Err(e) => Err(IndexedDbError::Open(format!("delete db: {}", describe(&e)))),
    }
}

/// Names of every database visible to this origin, via `indexedDB.databases()`.
pub async fn database_names() -> Result<Vec<String>> {
    let factory = idb_factory()?;

    let databases = js_sys::Reflect::get(&factory, &"databases".into())
        .ok()
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok())
        .ok_or_else(|| {
            IndexedDbError::NotAvailable("indexedDB.databases() is not supported".into())
        })?;

    let promise: Promise = databases
        .call0(&factory)
        .map_err(|e| IndexedDbError::Request(describe(&e)))?
        .dyn_into()
        .map_err(|_| IndexedDbError::JsValue("databases() did not return a Promise".into()))?;

    let list = JsFuture::from(promise)
        .await
        .map_err(|e| IndexedDbError::Request(describe(&e)))?;

    Ok(js_sys::Array::from(&list)
        .iter()
        .filter_map(|info| js_sys::Reflect::get(&info, &"name".into()).ok()?.as_string())
        .collect())
}
