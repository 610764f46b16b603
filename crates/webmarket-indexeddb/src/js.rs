//! Conversions between records and JS values
//!
//! Payloads cross the boundary as JSON: `serde_json` on the Rust side,
//! `JSON.parse`/`JSON.stringify` on the JS side. Whatever `JSON.stringify` cannot
//! represent (functions, symbols, `undefined`) reads back as `null`.

use serde_json::Value;
use wasm_bindgen::prelude::*;
use webmarket_core::{Record, RecordId};

use crate::error::{describe, IndexedDbError, Result};
use crate::idb::KEY_PATH;

const DATA: &str = "data";

/// Convert a JSON value into the equivalent JS value.
pub fn value_to_js(value: &Value) -> Result<JsValue> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text).map_err(|e| IndexedDbError::JsValue(describe(&e)))
}

/// Convert a JS value into JSON. `undefined` and unrepresentable values become `null`.
pub fn js_to_value(val: &JsValue) -> Result<Value> {
    if val.is_undefined() {
        return Ok(Value::Null);
    }
    let text: JsValue = js_sys::JSON::stringify(val)
        .map_err(|e| IndexedDbError::JsValue(describe(&e)))?
        .into();
    match text.as_string() {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(Value::Null),
    }
}

/// Convert a record key into a JS number.
pub fn key_to_js(id: RecordId) -> JsValue {
    JsValue::from_f64(id.as_f64())
}

/// Convert a JS key into a record key.
pub fn js_to_key(val: &JsValue) -> Result<RecordId> {
    val.as_f64()
        .and_then(RecordId::from_f64)
        .ok_or_else(|| IndexedDbError::KeyOutOfRange(describe(val)))
}

/// Convert a record into the `{ id?, data }` object stored in a collection.
///
/// `id` is left off when absent so the key generator assigns one.
pub fn record_to_js(record: &Record) -> Result<JsValue> {
    let obj = js_sys::Object::new();
    if let Some(id) = record.id {
        set_prop(&obj, KEY_PATH, &key_to_js(id))?;
    }
    set_prop(&obj, DATA, &value_to_js(&record.data)?)?;
    Ok(obj.into())
}

/// Convert a stored `{ id, data }` object back into a record.
pub fn js_to_record(val: &JsValue) -> Result<Record> {
    let id = get_prop(val, KEY_PATH)?;
    let id = if id.is_undefined() {
        None
    } else {
        Some(js_to_key(&id)?)
    };
    let data = js_to_value(&get_prop(val, DATA)?)?;
    Ok(Record { id, data })
}

/// Set a property on a JS object.
fn set_prop(obj: &js_sys::Object, key: &str, val: &JsValue) -> Result<()> {
    js_sys::Reflect::set(obj, &key.into(), val)
        .map_err(|_| IndexedDbError::JsValue(format!("failed to set property: {}", key)))?;
    Ok(())
}

/// Get a property from a JS object.
fn get_prop(val: &JsValue, key: &str) -> Result<JsValue> {
    js_sys::Reflect::get(val, &key.into())
        .map_err(|_| IndexedDbError::JsValue(format!("missing property: {}", key)))
}
