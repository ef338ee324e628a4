//! Declarative collection specs and the migrator that applies them.

use crate::error::CoreResult;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A secondary index over one field of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Dotted path to the indexed field.
    pub key_path: String,
    /// Whether two records may share a value at the path.
    pub unique: bool,
}

impl IndexSpec {
    /// An index allowing duplicate values.
    #[must_use]
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    /// An index rejecting duplicate values.
    #[must_use]
    pub fn unique(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: true,
        }
    }
}

/// Desired shape of one collection: primary key, key generation, indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,
    /// Dotted path to the primary key within each record.
    pub key_path: String,
    /// Whether the engine assigns keys to records missing one.
    pub auto_increment: bool,
    /// Indices created alongside the collection, in order.
    #[serde(default)]
    pub indices: Vec<IndexSpec>,
}

impl CollectionSpec {
    /// A spec with no indices.
    #[must_use]
    pub fn new(name: impl Into<String>, key_path: impl Into<String>, auto_increment: bool) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            auto_increment,
            indices: Vec::new(),
        }
    }

    /// Adds an index to the spec.
    #[must_use]
    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indices.push(index);
        self
    }
}

/// Applies [`CollectionSpec`]s to a session inside an upgrade transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct Migrator;

impl Migrator {
    /// Creates a migrator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Brings the session's database to contain every listed collection.
    ///
    /// Runs one upgrade transition. Specs are applied in slice order;
    /// within a spec, the collection first and then its indices in order.
    /// A collection that already exists is skipped whole, indices
    /// included, so reapplying the same list is harmless.
    ///
    /// Resolves `false` when the database is not registered; nothing is
    /// created in that case.
    ///
    /// # Errors
    ///
    /// Any engine refusal inside the transition aborts it; the schema and
    /// version are left as they were.
    pub async fn ensure_collections(
        &self,
        session: &Session,
        specs: &[CollectionSpec],
    ) -> CoreResult<bool> {
        session
            .upgrade_with(|editor| {
                for spec in specs {
                    if editor.contains_collection(&spec.name) {
                        info!(collection = %spec.name, "collection already exists, skipping");
                        continue;
                    }
                    editor.create_collection(&spec.name, &spec.key_path, spec.auto_increment)?;
                    for index in &spec.indices {
                        editor.create_index(&spec.name, &index.name, &index.key_path, index.unique)?;
                    }
                    info!(collection = %spec.name, indices = spec.indices.len(), "collection created");
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VersionRegistry;
    use coffer_engine::{MemoryEngine, StorageEngine, TransactionMode};
    use serde_json::json;
    use std::sync::Arc;

    fn session(name: &str) -> Session {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let registry = Arc::new(VersionRegistry::new(engine));
        Session::new(registry, name)
    }

    fn user_specs() -> Vec<CollectionSpec> {
        vec![CollectionSpec::new("usuarios", "id", true)
            .with_index(IndexSpec::unique("numeroCelular", "numeroCelular"))]
    }

    #[tokio::test]
    async fn creates_collections_and_indices() {
        let session = session("app");
        session.open_or_create().await.unwrap();

        let applied = Migrator::new()
            .ensure_collections(&session, &user_specs())
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(session.version(), 2);

        let handle = session.ensure_open().await.unwrap();
        assert_eq!(handle.collection_names(), vec!["usuarios".to_string()]);
    }

    #[tokio::test]
    async fn unique_index_from_spec_is_enforced() {
        let session = session("app");
        session.open_or_create().await.unwrap();
        Migrator::new()
            .ensure_collections(&session, &user_specs())
            .await
            .unwrap();

        let handle = session.ensure_open().await.unwrap();
        let mut txn = handle
            .transaction(&["usuarios"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("usuarios", json!({"numeroCelular": "555-0101"}))
            .unwrap();
        let dup = txn.add("usuarios", json!({"numeroCelular": "555-0101"}));
        assert!(matches!(
            dup,
            Err(coffer_engine::EngineError::Constraint { .. })
        ));
    }

    #[tokio::test]
    async fn reapplying_specs_is_idempotent_but_still_bumps() {
        let session = session("app");
        session.open_or_create().await.unwrap();

        let migrator = Migrator::new();
        migrator
            .ensure_collections(&session, &user_specs())
            .await
            .unwrap();
        migrator
            .ensure_collections(&session, &user_specs())
            .await
            .unwrap();

        // Each call is its own upgrade transition; the schema is unchanged.
        assert_eq!(session.version(), 3);
        let handle = session.ensure_open().await.unwrap();
        assert_eq!(handle.collection_names(), vec!["usuarios".to_string()]);
    }

    #[tokio::test]
    async fn unregistered_database_gets_nothing() {
        let session = session("ghost");
        let applied = Migrator::new()
            .ensure_collections(&session, &user_specs())
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn specs_apply_in_order() {
        let session = session("app");
        session.open_or_create().await.unwrap();

        let specs = vec![
            CollectionSpec::new("b-side", "id", true),
            CollectionSpec::new("a-side", "id", true),
        ];
        Migrator::new()
            .ensure_collections(&session, &specs)
            .await
            .unwrap();

        // Names come back sorted; both were created in one transition.
        let handle = session.ensure_open().await.unwrap();
        assert_eq!(
            handle.collection_names(),
            vec!["a-side".to_string(), "b-side".to_string()]
        );
        assert_eq!(session.version(), 2);
    }
}
