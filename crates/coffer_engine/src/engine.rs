//! Storage engine trait definitions.

use crate::error::EngineResult;
use crate::key::Key;
use serde_json::Value;

/// Callback invoked while a database is in its upgrade-needed phase.
///
/// The [`SchemaEditor`] passed to the callback is the only way to change
/// a database's schema; it does not exist outside this window.
pub type UpgradeFn<'a> = &'a mut dyn FnMut(&mut dyn SchemaEditor) -> EngineResult<()>;

/// Listener invoked when a newer version of the database is being opened
/// by another handle. The listener is expected to close its handle.
pub type VersionChangeListener = Box<dyn Fn() + Send + Sync>;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// An embedded, versioned storage engine.
///
/// Each named database carries a schema version. Opening a database at a
/// version above its stored version enters the upgrade-needed phase, the
/// only window in which collections and indices may be created or removed.
/// Opening below the stored version is an error, and opening above it while
/// other handles stay open after being notified reports blocked rather than
/// waiting.
pub trait StorageEngine: Send + Sync {
    /// Opens a database at exactly `version`, creating it if absent.
    ///
    /// `upgrade` runs when `version` exceeds the stored version, before the
    /// handle is returned. Live handles on older versions receive their
    /// version-change notification first.
    ///
    /// # Errors
    ///
    /// - [`EngineError::VersionTooOld`] if `version` is below the stored version
    /// - [`EngineError::Blocked`] if live handles remain after notification
    /// - [`EngineError::Open`] if the database cannot be opened
    ///
    /// [`EngineError::VersionTooOld`]: crate::EngineError::VersionTooOld
    /// [`EngineError::Blocked`]: crate::EngineError::Blocked
    /// [`EngineError::Open`]: crate::EngineError::Open
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn<'_>,
    ) -> EngineResult<Box<dyn DatabaseHandle>>;

    /// Deletes a database and all of its collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot delete the database.
    fn delete_database(&self, name: &str) -> EngineResult<()>;

    /// Returns the stored version of a database, or `None` if it has
    /// never been created.
    fn database_version(&self, name: &str) -> Option<u32>;
}

/// An open handle to one named, versioned database.
pub trait DatabaseHandle: Send + Sync {
    /// Returns the database name.
    fn name(&self) -> &str;

    /// Returns the version this handle was opened at.
    fn version(&self) -> u32;

    /// Returns the names of all collections in the database.
    fn collection_names(&self) -> Vec<String>;

    /// Starts a transaction scoped to the given collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed.
    fn transaction(
        &self,
        collections: &[&str],
        mode: TransactionMode,
    ) -> EngineResult<Box<dyn Transaction>>;

    /// Registers the listener invoked when a newer version is being
    /// opened elsewhere. Replaces any previous listener.
    fn on_version_change(&self, listener: VersionChangeListener);

    /// Closes the handle. Idempotent.
    fn close(&self);

    /// Whether the handle is still open.
    fn is_open(&self) -> bool;
}

/// A transaction over one or more collections.
///
/// Requests apply in call order (FIFO). Write requests on a read-only
/// transaction fail, and every request fails once the owning handle
/// has closed.
pub trait Transaction: Send {
    /// Inserts a new record, assigning its key from the collection's key
    /// path (auto-increment collections assign the next integer key when
    /// the record carries none). Fails on any unique-index violation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Constraint`] on key or unique-index conflicts.
    ///
    /// [`EngineError::Constraint`]: crate::EngineError::Constraint
    fn add(&mut self, collection: &str, record: Value) -> EngineResult<Key>;

    /// Reads a record by primary key. Absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or the
    /// transaction can no longer be used.
    fn get(&mut self, collection: &str, key: &Key) -> EngineResult<Option<Value>>;

    /// Reads the first record whose indexed value equals `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection or index does not exist.
    fn get_by_index(
        &mut self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> EngineResult<Option<Value>>;

    /// Upserts a record by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Constraint`] if the write would violate a
    /// unique index against another record.
    ///
    /// [`EngineError::Constraint`]: crate::EngineError::Constraint
    fn put(&mut self, collection: &str, record: Value) -> EngineResult<Key>;

    /// Removes a record by primary key. Succeeds whether or not the key
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist.
    fn delete(&mut self, collection: &str, key: &Key) -> EngineResult<()>;

    /// Returns all records in primary-key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist.
    fn get_all(&mut self, collection: &str) -> EngineResult<Vec<Value>>;

    /// Completes the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction was aborted.
    fn commit(self: Box<Self>) -> EngineResult<()>;
}

/// Schema mutation surface, valid only during the upgrade-needed phase.
pub trait SchemaEditor {
    /// Returns the names of all collections.
    fn collection_names(&self) -> Vec<String>;

    /// Whether a collection exists.
    fn contains_collection(&self, name: &str) -> bool;

    /// Creates a collection with the given key path and auto-key policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection already exists.
    fn create_collection(
        &mut self,
        name: &str,
        key_path: &str,
        auto_increment: bool,
    ) -> EngineResult<()>;

    /// Removes a collection and all of its records.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist.
    fn delete_collection(&mut self, name: &str) -> EngineResult<()>;

    /// Renames a collection, keeping its records and indices.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is absent or the target exists.
    fn rename_collection(&mut self, from: &str, to: &str) -> EngineResult<()>;

    /// Creates a secondary index on a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the index exists, the collection is absent,
    /// or existing records violate a requested unique constraint.
    fn create_index(
        &mut self,
        collection: &str,
        name: &str,
        key_path: &str,
        unique: bool,
    ) -> EngineResult<()>;

    /// Removes a secondary index.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection or index does not exist.
    fn delete_index(&mut self, collection: &str, name: &str) -> EngineResult<()>;
}
