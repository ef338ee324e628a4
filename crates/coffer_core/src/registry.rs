//! Version registry: the meta-store tracking every database's schema version.

use crate::envelope::Envelope;
use crate::error::{CoreError, CoreResult};
use coffer_engine::{DatabaseHandle, EngineError, Key, StorageEngine, TransactionMode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Version the meta-database itself is pinned at.
const META_VERSION: u32 = 1;

/// One registered database and its current schema version.
///
/// Exactly one record exists per distinct database name, and the version
/// of a given name never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Engine-assigned primary key. `None` until stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Database name, unique across the registry.
    pub name: String,
    /// Current schema version, at least 1.
    pub version: u32,
}

impl VersionRecord {
    /// Creates an unstored record.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            version,
        }
    }
}

/// Configuration for a [`VersionRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Name of the meta-database holding the registry.
    pub database_name: String,
    /// Name of the collection holding version records.
    pub collection: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_name: "coffer-meta".to_string(),
            collection: "versions".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the meta-database name.
    #[must_use]
    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Sets the versions collection name.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }
}

/// Report from a [`VersionRegistry::delete_other_databases`] teardown.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Names whose database and version record were removed.
    pub deleted: Vec<String>,
    /// Names whose removal failed, with the failure message.
    pub failed: Vec<(String, String)>,
}

impl TeardownReport {
    /// Whether every deletion succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks the current schema version of every named database.
///
/// The registry owns a single meta-database (pinned at version 1) with a
/// `versions` collection, indexed uniquely by name. Sessions consult it
/// to decide which version to open a database at, and bump it on every
/// schema upgrade.
///
/// Registries are plain values: construct one per engine, share it via
/// `Arc`. Nothing here is global.
pub struct VersionRegistry {
    engine: Arc<dyn StorageEngine>,
    config: RegistryConfig,
    handle: Arc<Mutex<Option<Arc<dyn DatabaseHandle>>>>,
}

impl VersionRegistry {
    /// Creates a registry over the given engine with default configuration.
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self::with_config(engine, RegistryConfig::default())
    }

    /// Creates a registry with custom configuration.
    pub fn with_config(engine: Arc<dyn StorageEngine>, config: RegistryConfig) -> Self {
        Self {
            engine,
            config,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Opens the meta-database, creating the versions collection and its
    /// indices on first use. Idempotent: a second call after success is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Open`] if the engine refuses to open.
    pub async fn initialize(&self) -> CoreResult<()> {
        if self
            .handle
            .lock()
            .as_ref()
            .is_some_and(|h| h.is_open())
        {
            return Ok(());
        }

        let collection = self.config.collection.clone();
        let handle = self
            .engine
            .open(&self.config.database_name, META_VERSION, &mut |editor| {
                if !editor.contains_collection(&collection) {
                    editor.create_collection(&collection, "id", true)?;
                    editor.create_index(&collection, "name", "name", true)?;
                    editor.create_index(&collection, "version", "version", false)?;
                }
                Ok(())
            })
            .map_err(|e| {
                error!(database = %self.config.database_name, %e, "registry open failed");
                CoreError::from_open_failure(&self.config.database_name, e)
            })?;

        let handle: Arc<dyn DatabaseHandle> = Arc::from(handle);
        let slot = Arc::clone(&self.handle);
        let name = self.config.database_name.clone();
        let weak = Arc::downgrade(&handle);
        handle.on_version_change(Box::new(move || {
            warn!(database = %name, "registry handle closing on version change");
            if let Some(h) = weak.upgrade() {
                h.close();
            }
            *slot.lock() = None;
        }));

        *self.handle.lock() = Some(handle);
        info!(database = %self.config.database_name, version = META_VERSION, "version registry ready");
        Ok(())
    }

    /// Returns the open meta handle, initializing lazily.
    async fn meta(&self) -> CoreResult<Arc<dyn DatabaseHandle>> {
        if let Some(handle) = self.handle.lock().clone().filter(|h| h.is_open()) {
            return Ok(handle);
        }
        self.initialize().await?;
        self.handle
            .lock()
            .clone()
            .ok_or(CoreError::NotInitialized)
    }

    /// Returns the open meta handle, failing if [`initialize`] has not
    /// completed.
    ///
    /// [`initialize`]: VersionRegistry::initialize
    fn meta_strict(&self) -> CoreResult<Arc<dyn DatabaseHandle>> {
        self.handle
            .lock()
            .clone()
            .filter(|h| h.is_open())
            .ok_or(CoreError::NotInitialized)
    }

    /// Inserts a new version record.
    ///
    /// Resolves with the stored record, including its assigned id.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotInitialized`] before [`initialize`] has completed
    /// - [`CoreError::DuplicateName`] if the name is already registered
    ///
    /// [`initialize`]: VersionRegistry::initialize
    pub async fn add(&self, record: VersionRecord) -> CoreResult<VersionRecord> {
        let handle = self.meta_strict().map_err(|e| {
            error!(name = %record.name, "add rejected: registry not open");
            e
        })?;
        let value = to_value(&record)?;
        let mut txn =
            handle.transaction(&[self.config.collection.as_str()], TransactionMode::ReadWrite)?;
        let key = txn.add(&self.config.collection, value).map_err(|e| match e {
            EngineError::Constraint { .. } => {
                warn!(name = %record.name, "duplicate version record rejected");
                CoreError::duplicate_name(record.name.clone())
            }
            other => other.into(),
        })?;
        txn.commit()?;

        let mut stored = record;
        stored.id = key.as_int();
        info!(name = %stored.name, version = stored.version, "registered database version");
        Ok(stored)
    }

    /// Initializes the registry and inserts a record in one step.
    ///
    /// Never fails: any failure is captured in an error-status envelope so
    /// callers branch on `status` alone.
    pub async fn add_with_init(&self, name: &str, version: u32) -> Envelope<VersionRecord> {
        let result = async {
            self.initialize().await?;
            self.add(VersionRecord::new(name, version)).await
        }
        .await;
        Envelope::capture(result, "version record added")
    }

    /// Looks a record up by its unique name index. Absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be opened or read.
    pub async fn get_by_name(&self, name: &str) -> CoreResult<Option<VersionRecord>> {
        let handle = self.meta().await?;
        let mut txn =
            handle.transaction(&[self.config.collection.as_str()], TransactionMode::ReadOnly)?;
        let found = txn.get_by_index(&self.config.collection, "name", &Value::from(name))?;
        found.map(from_value).transpose()
    }

    /// Sets the stored version for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the name is not registered.
    pub async fn update_version_by_name(
        &self,
        name: &str,
        new_version: u32,
    ) -> CoreResult<VersionRecord> {
        let handle = self.meta().await?;
        let mut txn =
            handle.transaction(&[self.config.collection.as_str()], TransactionMode::ReadWrite)?;
        let found = txn.get_by_index(&self.config.collection, "name", &Value::from(name))?;
        let Some(value) = found else {
            warn!(name, "update rejected: no version record");
            return Err(CoreError::not_found(name));
        };
        let mut record: VersionRecord = from_value(value)?;
        record.version = new_version;
        txn.put(&self.config.collection, to_value(&record)?)?;
        txn.commit()?;
        info!(name, version = new_version, "updated database version");
        Ok(record)
    }

    /// Removes the record for `name`, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the name is not registered.
    pub async fn delete_by_name(&self, name: &str) -> CoreResult<VersionRecord> {
        let handle = self.meta().await?;
        let mut txn =
            handle.transaction(&[self.config.collection.as_str()], TransactionMode::ReadWrite)?;
        let found = txn.get_by_index(&self.config.collection, "name", &Value::from(name))?;
        let Some(value) = found else {
            warn!(name, "delete rejected: no version record");
            return Err(CoreError::not_found(name));
        };
        let record: VersionRecord = from_value(value)?;
        let key = record
            .id
            .map(Key::Int)
            .ok_or_else(|| CoreError::invalid_record("stored record has no id"))?;
        txn.delete(&self.config.collection, &key)?;
        txn.commit()?;
        info!(name, "removed database version record");
        Ok(record)
    }

    /// Returns every version record. Callers must not assume an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be opened or read.
    pub async fn list_all(&self) -> CoreResult<Vec<VersionRecord>> {
        let handle = self.meta().await?;
        let mut txn =
            handle.transaction(&[self.config.collection.as_str()], TransactionMode::ReadOnly)?;
        let values = txn.get_all(&self.config.collection)?;
        values.into_iter().map(from_value).collect()
    }

    /// Deletes every registered database except the registry's own
    /// meta-database, removing each underlying database and its version
    /// record.
    ///
    /// Deletions run as an independent fan-out: one name's failure never
    /// aborts the others. Failures are collected in the report, and the
    /// failing name keeps its version record.
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry itself cannot be listed.
    pub async fn delete_other_databases(&self) -> CoreResult<TeardownReport> {
        let records = self.list_all().await?;
        let tasks = records
            .into_iter()
            .filter(|r| r.name != self.config.database_name)
            .map(|record| async move {
                let name = record.name;
                let result = async {
                    self.engine.delete_database(&name)?;
                    self.delete_by_name(&name).await?;
                    Ok::<_, CoreError>(())
                }
                .await;
                (name, result)
            });

        let mut report = TeardownReport::default();
        for (name, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(()) => {
                    info!(database = %name, "dropped database");
                    report.deleted.push(name);
                }
                Err(e) => {
                    error!(database = %name, %e, "drop failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Returns the engine this registry runs on.
    pub(crate) fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }
}

fn to_value(record: &VersionRecord) -> CoreResult<Value> {
    serde_json::to_value(record).map_err(|e| CoreError::invalid_record(e.to_string()))
}

fn from_value(value: Value) -> CoreResult<VersionRecord> {
    serde_json::from_value(value).map_err(|e| CoreError::invalid_record(e.to_string()))
}
