//! IndexedDB storage engine for webmarket record stores (browser WASM)
//!
//! Implements the `webmarket-core` [`Engine`](webmarket_core::Engine) and
//! [`Connection`](webmarket_core::Connection) traits on top of the browser's
//! IndexedDB, so a [`StoreHandle`](webmarket_core::StoreHandle) can run unchanged in
//! a page or worker.
//!
//! # Schema
//!
//! Every collection is an object store with keyPath `"id"` and a key generator.
//! Records are stored as `{ id, data }` objects where `data` is the caller's payload
//! converted from JSON. Collections are created in the `upgradeneeded` step when a
//! database is opened with a higher version than it has.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use webmarket_core::{StoreConfig, StoreHandle};
//! use webmarket_indexeddb::IndexedDbEngine;
//!
//! let handle = StoreHandle::open(IndexedDbEngine, StoreConfig::new("shop")).await?;
//! let id = handle.insert_one(json!({"sku": "A-1"})).await?;
//! let record = handle.select_by_id(id).await?;
//! assert!(record.is_some());
//! ```

pub mod engine;
pub mod error;
pub mod idb;
pub mod js;

pub use engine::{IndexedDbConnection, IndexedDbEngine};
pub use error::{IndexedDbError, Result};
