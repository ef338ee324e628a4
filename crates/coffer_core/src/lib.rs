//! Coffer core: version-coordinated access to embedded databases.
//!
//! Coffer layers three things over a [`coffer_engine::StorageEngine`]:
//!
//! - a [`VersionRegistry`], a small meta-database recording the current
//!   schema version of every named database
//! - [`Session`]s, which open databases at their registered version,
//!   retire stale handles on version changes, and gate all schema
//!   mutation behind upgrade transitions
//! - a [`RecordStore`] and [`Migrator`] for record CRUD and declarative
//!   schema setup
//!
//! Everything is constructible: build an engine, wrap it in a registry,
//! and derive sessions from it. There are no globals.
//!
//! ```
//! use coffer_core::{Migrator, RecordStore, Session, VersionRegistry};
//! use coffer_core::{CollectionSpec, IndexSpec};
//! use coffer_engine::{MemoryEngine, StorageEngine};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), coffer_core::CoreError> {
//! let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
//! let registry = Arc::new(VersionRegistry::new(engine));
//! let session = Arc::new(Session::new(registry, "app"));
//! session.open_or_create().await?;
//!
//! let specs = [CollectionSpec::new("usuarios", "id", true)
//!     .with_index(IndexSpec::unique("numeroCelular", "numeroCelular"))];
//! Migrator::new().ensure_collections(&session, &specs).await?;
//!
//! let store = RecordStore::new(session);
//! let key = store.add("usuarios", json!({"numeroCelular": "555-0101"})).await?;
//! assert!(store.get("usuarios", &key).await?.is_some());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod error;
pub mod records;
pub mod registry;
pub mod schema;
pub mod session;

pub use envelope::{Envelope, Status};
pub use error::{CoreError, CoreResult};
pub use records::RecordStore;
pub use registry::{RegistryConfig, TeardownReport, VersionRecord, VersionRegistry};
pub use schema::{CollectionSpec, IndexSpec, Migrator};
pub use session::{Session, SessionState};
