//! Webmarket Core
//!
//! A thin, namespaced record store over an embedded key-value engine. The engine
//! (IndexedDB in the browser, SQLite natively, or the in-memory engine in tests)
//! does all the real work; this crate provides:
//!
//! - [`StoreHandle`]: lazily connects to one collection in one namespaced
//!   database and exposes record-level CRUD plus database lifecycle operations
//! - [`Engine`] / [`Connection`]: the capability interface every backend implements
//! - [`MemoryEngine`]: a process-local engine with IndexedDB-like semantics
//! - [`naming`]: the `"webmarket."` namespace convention shared with other clients
//!
//! Engine errors are returned unchanged: a `StoreHandle<E>` fails with `E::Error`.
//!
//! # Features
//!
//! - `subscriber` - `logging::init()` helpers built on tracing-subscriber (native only)
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use webmarket_core::{MemoryEngine, StoreConfig, StoreHandle};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = MemoryEngine::new();
//! let handle = StoreHandle::open(engine.clone(), StoreConfig::new("shop")).await?;
//!
//! let id = handle.insert_one(json!({"sku": "A-1", "qty": 3})).await?;
//! let record = handle.select_by_id(id).await?.expect("just inserted");
//! assert_eq!(record.data["qty"], 3);
//!
//! let names = StoreHandle::list_databases(&engine).await?;
//! assert_eq!(names, vec!["shop".to_string()]);
//! # Ok::<(), webmarket_core::MemoryError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
#[cfg(feature = "subscriber")]
pub mod logging;
pub mod memory;
pub mod naming;
pub mod record;

// Re-export main types at crate root
pub use config::{Schema, StoreConfig};
pub use engine::{Connection, Engine};
pub use error::MemoryError;
pub use handle::StoreHandle;
pub use memory::{MemoryConnection, MemoryEngine};
pub use naming::{namespaced, DatabaseName, NAMESPACE_PREFIX};
pub use record::{Record, RecordId, MAX_RECORD_ID};
