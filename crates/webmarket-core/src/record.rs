//! Record envelope and primary keys

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest key a key generator hands out (2^53, the IndexedDB limit).
/// Every engine rejects keys above it so data stays portable between backends.
pub const MAX_RECORD_ID: u64 = 1 << 53;

/// Primary key of a record. Assigned by the engine's key generator starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Build a key, rejecting values beyond [`MAX_RECORD_ID`].
    pub fn new(id: u64) -> Option<Self> {
        (id <= MAX_RECORD_ID).then_some(Self(id))
    }

    /// Build a key from a JS number. Only non-negative integers up to
    /// [`MAX_RECORD_ID`] are valid keys.
    pub fn from_f64(id: f64) -> Option<Self> {
        if id.is_finite() && id >= 0.0 && id.fract() == 0.0 && id <= MAX_RECORD_ID as f64 {
            Some(Self(id as u64))
        } else {
            None
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RecordId> for u64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// The `{ id?, data }` envelope persisted for every caller payload.
///
/// `id` is absent on insert (the engine assigns one) and present on everything
/// read back from an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub data: Value,
}

impl Record {
    /// Envelope for an insert; the engine assigns the key.
    pub fn new(data: Value) -> Self {
        Self { id: None, data }
    }

    /// Envelope with an explicit key, as written by an update.
    pub fn with_id(id: RecordId, data: Value) -> Self {
        Self { id: Some(id), data }
    }

    /// Deserialize the payload into a concrete type.
    pub fn data_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}
