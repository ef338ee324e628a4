//! # Coffer Engine
//!
//! Storage engine boundary for Coffer.
//!
//! This crate defines the contract between the Coffer client layer and an
//! embedded, versioned storage engine. Engines own durability and on-disk
//! format; this crate only fixes the vocabulary:
//!
//! - Databases are named and carry a schema version
//! - Collections hold JSON records keyed by a key path
//! - Schema changes happen only in the upgrade-needed phase
//! - Live handles are notified when a newer version is being opened
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - complete in-memory reference engine
//!
//! ## Example
//!
//! ```rust
//! use coffer_engine::{MemoryEngine, StorageEngine, TransactionMode};
//! use serde_json::json;
//!
//! let engine = MemoryEngine::new();
//! let handle = engine
//!     .open("app", 1, &mut |editor| {
//!         editor.create_collection("users", "id", true)
//!     })
//!     .unwrap();
//!
//! let mut txn = handle.transaction(&["users"], TransactionMode::ReadWrite).unwrap();
//! let key = txn.add("users", json!({"name": "ada"})).unwrap();
//! assert!(txn.get("users", &key).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod key;
mod memory;

pub use engine::{
    DatabaseHandle, SchemaEditor, StorageEngine, Transaction, TransactionMode, UpgradeFn,
    VersionChangeListener,
};
pub use error::{EngineError, EngineResult};
pub use key::{key_at_path, set_at_path, value_at_path, Key};
pub use memory::MemoryEngine;
