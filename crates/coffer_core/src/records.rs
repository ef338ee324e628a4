//! Record CRUD and structural operations over one session.

use crate::error::{CoreError, CoreResult};
use crate::schema::IndexSpec;
use crate::session::Session;
use coffer_engine::{EngineError, Key, TransactionMode};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Record-level access to the database a [`Session`] manages.
///
/// Every operation obtains a live handle through the session first, so a
/// handle retired by a concurrent upgrade is reopened transparently.
/// Lookups that find nothing resolve `Ok(None)`; only genuine failures
/// are errors.
///
/// Structural operations (rename, drop, index management) run as upgrade
/// transitions: each one bumps the registered version and reopens. They
/// resolve `false` when their target does not exist.
pub struct RecordStore {
    session: Arc<Session>,
}

impl RecordStore {
    /// Creates a store over the session.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// The session this store operates through.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Inserts a record, resolving with its primary key. When the
    /// collection auto-increments and the record lacks a key, the assigned
    /// key is also injected into the stored record at the key path.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Constraint`] when a unique index rejects the record
    /// - [`CoreError::Engine`] for missing collections or aborted
    ///   transactions
    pub async fn add(&self, collection: &str, record: Value) -> CoreResult<Key> {
        let handle = self.session.ensure_open().await?;
        let mut txn = handle.transaction(&[collection], TransactionMode::ReadWrite)?;
        let key = txn.add(collection, record).map_err(constraint_to_core)?;
        txn.commit()?;
        info!(database = %self.session.name(), collection, %key, "record added");
        Ok(key)
    }

    /// Looks a record up by primary key. Absence is `Ok(None)`.
    pub async fn get(&self, collection: &str, key: &Key) -> CoreResult<Option<Value>> {
        let handle = self.session.ensure_open().await?;
        let mut txn = handle.transaction(&[collection], TransactionMode::ReadOnly)?;
        Ok(txn.get(collection, key)?)
    }

    /// Inserts or replaces a record at its primary key.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Constraint`] when a unique index rejects the record
    /// - [`CoreError::Engine`] when the record lacks a key and the
    ///   collection does not auto-increment
    pub async fn update(&self, collection: &str, record: Value) -> CoreResult<Key> {
        let handle = self.session.ensure_open().await?;
        let mut txn = handle.transaction(&[collection], TransactionMode::ReadWrite)?;
        let key = txn.put(collection, record).map_err(constraint_to_core)?;
        txn.commit()?;
        info!(database = %self.session.name(), collection, %key, "record updated");
        Ok(key)
    }

    /// Removes the record at `key`. Removing an absent key succeeds.
    pub async fn delete(&self, collection: &str, key: &Key) -> CoreResult<()> {
        let handle = self.session.ensure_open().await?;
        let mut txn = handle.transaction(&[collection], TransactionMode::ReadWrite)?;
        txn.delete(collection, key)?;
        txn.commit()?;
        info!(database = %self.session.name(), collection, %key, "record deleted");
        Ok(())
    }

    /// Returns every record in the collection, in ascending primary-key
    /// order.
    pub async fn list_all(&self, collection: &str) -> CoreResult<Vec<Value>> {
        let handle = self.session.ensure_open().await?;
        let mut txn = handle.transaction(&[collection], TransactionMode::ReadOnly)?;
        Ok(txn.get_all(collection)?)
    }

    /// Renames a collection, keeping its records and indices. Resolves
    /// `false` when the source collection (or the database registration)
    /// does not exist.
    pub async fn rename_collection(&self, from: &str, to: &str) -> CoreResult<bool> {
        let mut renamed = false;
        let applied = self
            .session
            .upgrade_with(|editor| {
                if editor.contains_collection(from) {
                    editor.rename_collection(from, to)?;
                    renamed = true;
                }
                Ok(())
            })
            .await?;
        if applied && renamed {
            info!(database = %self.session.name(), from, to, "collection renamed");
        }
        Ok(applied && renamed)
    }

    /// Drops a collection and everything in it. Resolves `false` when the
    /// collection (or the database registration) does not exist.
    pub async fn delete_collection(&self, name: &str) -> CoreResult<bool> {
        let mut dropped = false;
        let applied = self
            .session
            .upgrade_with(|editor| {
                if editor.contains_collection(name) {
                    editor.delete_collection(name)?;
                    dropped = true;
                }
                Ok(())
            })
            .await?;
        if applied && dropped {
            info!(database = %self.session.name(), collection = name, "collection dropped");
        }
        Ok(applied && dropped)
    }

    /// Adds an index to an existing collection. Resolves `false` when the
    /// collection (or the database registration) does not exist.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Constraint`] when a unique index cannot be built
    ///   over the existing records
    pub async fn create_index(&self, collection: &str, index: &IndexSpec) -> CoreResult<bool> {
        let mut created = false;
        let applied = self
            .session
            .upgrade_with(|editor| {
                if editor.contains_collection(collection) {
                    editor.create_index(collection, &index.name, &index.key_path, index.unique)?;
                    created = true;
                }
                Ok(())
            })
            .await?;
        if applied && created {
            info!(database = %self.session.name(), collection, index = %index.name, "index created");
        }
        Ok(applied && created)
    }

    /// Removes an index. Resolves `false` when the collection, the index,
    /// or the database registration does not exist.
    pub async fn delete_index(&self, collection: &str, name: &str) -> CoreResult<bool> {
        let mut removed = false;
        let applied = self
            .session
            .upgrade_with(|editor| {
                if !editor.contains_collection(collection) {
                    return Ok(());
                }
                match editor.delete_index(collection, name) {
                    Ok(()) => {
                        removed = true;
                        Ok(())
                    }
                    Err(EngineError::IndexNotFound { .. }) => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .await?;
        if applied && removed {
            info!(database = %self.session.name(), collection, index = name, "index removed");
        }
        Ok(applied && removed)
    }

    /// Deletes the whole database: the session's handle is discarded, the
    /// engine drops the data, and the version record is removed. Deleting
    /// an unregistered database succeeds.
    pub async fn delete_database(&self) -> CoreResult<()> {
        self.session.discard_handle();
        self.session.engine().delete_database(self.session.name())?;
        match self
            .session
            .registry()
            .delete_by_name(self.session.name())
            .await
        {
            Ok(_) | Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        info!(database = %self.session.name(), "database deleted");
        Ok(())
    }
}

fn constraint_to_core(error: EngineError) -> CoreError {
    match error {
        EngineError::Constraint { collection, index } => CoreError::Constraint {
            message: format!("unique index {index} on {collection} rejected the record"),
        },
        other => other.into(),
    }
}
