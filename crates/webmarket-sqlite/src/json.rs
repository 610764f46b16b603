//! Conversion between record payloads / keys and SQLite columns

use serde_json::Value;
use webmarket_core::{RecordId, MAX_RECORD_ID};

use crate::error::{Result, SqliteError};

/// Serialize a payload to JSON text for the `data` column
pub fn serialize_payload(data: &Value) -> Result<String> {
    Ok(serde_json::to_string(data)?)
}

/// Deserialize the `data` column back into a payload
pub fn deserialize_payload(json: &str) -> Result<Value> {
    Ok(serde_json::from_str(json)?)
}

/// Convert a key to the INTEGER column value, rejecting keys beyond the valid range
pub fn key_to_sql(id: RecordId) -> Result<i64> {
    if id.get() > MAX_RECORD_ID {
        return Err(SqliteError::KeyOutOfRange(id.get()));
    }
    // MAX_RECORD_ID fits comfortably in an i64
    Ok(id.get() as i64)
}

/// Convert an INTEGER column value back to a key
pub fn sql_to_key(value: i64) -> Result<RecordId> {
    u64::try_from(value)
        .ok()
        .and_then(RecordId::new)
        .ok_or(SqliteError::KeyOutOfRange(value as u64))
}
