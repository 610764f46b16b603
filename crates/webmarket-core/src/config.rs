//! Store configuration

use serde::Deserialize;

use crate::naming::DatabaseName;

/// Collection name used when the caller does not supply one.
pub const DEFAULT_COLLECTION: &str = "webstore";

/// Schema version requested on open. Bumping it triggers the engine's upgrade step.
pub const DEFAULT_VERSION: u32 = 1;

/// What a handle asks the engine for when it opens a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Collection that must exist after open
    pub collection: String,
    /// Requested database version
    pub version: u32,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            version: DEFAULT_VERSION,
        }
    }
}

/// Configuration for a [`StoreHandle`](crate::StoreHandle).
///
/// Deserializable so hosts can pass options as JSON; missing fields take defaults
/// (`"webmarket"` / `"webstore"` / version 1).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database name, without namespace prefix
    pub database: DatabaseName,
    /// Collection holding the records
    pub collection: String,
    /// Schema version
    pub version: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let schema = Schema::default();
        Self {
            database: DatabaseName::default(),
            collection: schema.collection,
            version: schema.version,
        }
    }
}

impl StoreConfig {
    /// Default configuration bound to the given database name
    pub fn new(database: impl Into<DatabaseName>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// The open request derived from this configuration
    pub fn schema(&self) -> Schema {
        Schema {
            collection: self.collection.clone(),
            version: self.version,
        }
    }
}
