//! SQLite storage engine for webmarket record stores
//!
//! This crate provides a persistent SQLite implementation of the webmarket-core
//! engine traits, so native hosts get the same namespaced record store the browser
//! gets from IndexedDB.
//!
//! # Features
//!
//! - Implements `Engine` and `Connection` from webmarket-core
//! - Every namespaced database lives in one SQLite file (or in memory for tests)
//! - Explicit per-collection key counters matching IndexedDB key generator rules
//! - Embedded, versioned schema migrations
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use webmarket_core::{StoreConfig, StoreHandle};
//! use webmarket_sqlite::SqliteEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SqliteEngine::open("webmarket.sqlite3")?;
//! let handle = StoreHandle::open(engine.clone(), StoreConfig::new("shop")).await?;
//!
//! let id = handle.insert_one(json!({"sku": "A-1"})).await?;
//! assert!(handle.select_by_id(id).await?.is_some());
//!
//! let databases = StoreHandle::list_databases(&engine).await?;
//! assert_eq!(databases, vec!["shop".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod json;
pub mod migrate;

// Re-export main types
pub use engine::{SqliteConnection, SqliteEngine};
pub use error::{Result, SqliteError};
