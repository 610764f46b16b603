//! Error types for IndexedDB storage engine

use thiserror::Error;

/// Result type for IndexedDB operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// Errors that can occur during IndexedDB storage operations
///
/// Request and transaction failures carry the DOMException name and message as
/// reported by the browser (e.g. `ConstraintError: Key already exists...`).
#[derive(Debug, Error)]
pub enum IndexedDbError {
    /// IndexedDB is not available in this environment
    #[error("IndexedDB not available: {0}")]
    NotAvailable(String),

    /// Database open/upgrade error
    #[error("IndexedDB open error: {0}")]
    Open(String),

    /// Open with version 0; versions start at 1
    #[error("IndexedDB invalid version {0}: versions start at 1")]
    InvalidVersion(u32),

    /// Transaction error
    #[error("IndexedDB transaction error: {0}")]
    Transaction(String),

    /// Request error from IDB operation
    #[error("IndexedDB request error: {0}")]
    Request(String),

    /// Delete blocked by open connections
    #[error("IndexedDB delete of {0} blocked by open connections")]
    Blocked(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key outside the range a record id can hold
    #[error("IndexedDB key out of range: {0}")]
    KeyOutOfRange(String),

    /// JavaScript value conversion error
    #[error("JS conversion error: {0}")]
    JsValue(String),
}

/// Human-readable text for a thrown JS value: `Name: message` for DOMExceptions and
/// Errors, the JSON form for anything else.
pub(crate) fn describe(val: &wasm_bindgen::JsValue) -> String {
    use wasm_bindgen::JsCast;

    if let Some(ex) = val.dyn_ref::<web_sys::DomException>() {
        return format!("{}: {}", ex.name(), ex.message());
    }
    if let Some(err) = val.dyn_ref::<js_sys::Error>() {
        return format!("{}: {}", String::from(err.name()), String::from(err.message()));
    }
    if let Some(s) = val.as_string() {
        return s;
    }
    js_sys::JSON::stringify(val)
        .map(String::from)
        .unwrap_or_else(|_| format!("{:?}", val))
}
