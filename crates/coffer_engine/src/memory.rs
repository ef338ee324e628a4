//! In-memory storage engine.

use crate::engine::{
    DatabaseHandle, SchemaEditor, StorageEngine, Transaction, TransactionMode, UpgradeFn,
    VersionChangeListener,
};
use crate::error::{EngineError, EngineResult};
use crate::key::{key_at_path, set_at_path, value_at_path, Key};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A non-persistent engine holding every database in memory.
///
/// `MemoryEngine` implements the full engine contract, including the
/// upgrade-needed phase, version-change delivery to live handles, and
/// unique-index enforcement. It is the reference engine for tests and
/// ephemeral deployments; data is lost when the engine is dropped.
#[derive(Default)]
pub struct MemoryEngine {
    databases: Mutex<HashMap<String, Arc<Mutex<DatabaseState>>>>,
    delete_failures: Mutex<HashSet<String>>,
}

struct DatabaseState {
    version: u32,
    collections: BTreeMap<String, CollectionState>,
    connections: Vec<Arc<Connection>>,
}

#[derive(Clone)]
struct CollectionState {
    key_path: String,
    auto_increment: bool,
    next_key: i64,
    records: BTreeMap<Key, Value>,
    indices: BTreeMap<String, IndexDef>,
}

#[derive(Clone)]
struct IndexDef {
    key_path: String,
    unique: bool,
}

struct Connection {
    open: AtomicBool,
    listener: Mutex<Option<VersionChangeListener>>,
}

impl MemoryEngine {
    /// Creates a new empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `delete_database` call for `name` fail.
    ///
    /// Test hook for exercising partial-failure paths in callers.
    pub fn inject_delete_failure(&self, name: &str) {
        self.delete_failures.lock().insert(name.to_string());
    }

    fn database(&self, name: &str) -> Arc<Mutex<DatabaseState>> {
        Arc::clone(
            self.databases
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(DatabaseState {
                        version: 0,
                        collections: BTreeMap::new(),
                        connections: Vec::new(),
                    }))
                }),
        )
    }
}

impl StorageEngine for MemoryEngine {
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn<'_>,
    ) -> EngineResult<Box<dyn DatabaseHandle>> {
        if version == 0 {
            return Err(EngineError::open("version must be at least 1"));
        }
        let db = self.database(name);

        let needs_upgrade = {
            let state = db.lock();
            if version < state.version {
                return Err(EngineError::VersionTooOld {
                    name: name.to_string(),
                    requested: version,
                    current: state.version,
                });
            }
            version > state.version
        };

        if needs_upgrade {
            // Deliver version-change to live handles before touching the
            // schema. Listeners run without any engine lock held.
            let live: Vec<Arc<Connection>> = {
                let state = db.lock();
                state
                    .connections
                    .iter()
                    .filter(|c| c.open.load(Ordering::SeqCst))
                    .cloned()
                    .collect()
            };
            for conn in &live {
                let listener = conn.listener.lock();
                if let Some(callback) = listener.as_ref() {
                    callback();
                }
            }

            let mut state = db.lock();
            state
                .connections
                .retain(|c| c.open.load(Ordering::SeqCst));
            if !state.connections.is_empty() {
                return Err(EngineError::Blocked {
                    name: name.to_string(),
                    version,
                });
            }

            // The upgrade runs against a staged schema; a failing callback
            // leaves the database exactly as it was.
            let mut staged = state.collections.clone();
            {
                let mut editor = MemoryEditor {
                    collections: &mut staged,
                };
                upgrade(&mut editor)?;
            }
            state.collections = staged;
            state.version = version;
        }

        let conn = Arc::new(Connection {
            open: AtomicBool::new(true),
            listener: Mutex::new(None),
        });
        db.lock().connections.push(Arc::clone(&conn));

        Ok(Box::new(MemoryHandle {
            name: name.to_string(),
            version,
            db,
            conn,
        }))
    }

    fn delete_database(&self, name: &str) -> EngineResult<()> {
        if self.delete_failures.lock().remove(name) {
            return Err(EngineError::open(format!(
                "delete of database {name} refused"
            )));
        }
        if let Some(db) = self.databases.lock().remove(name) {
            let state = db.lock();
            for conn in &state.connections {
                conn.open.store(false, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn database_version(&self, name: &str) -> Option<u32> {
        self.databases
            .lock()
            .get(name)
            .map(|db| db.lock().version)
            .filter(|v| *v > 0)
    }
}

struct MemoryHandle {
    name: String,
    version: u32,
    db: Arc<Mutex<DatabaseState>>,
    conn: Arc<Connection>,
}

impl DatabaseHandle for MemoryHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn collection_names(&self) -> Vec<String> {
        self.db.lock().collections.keys().cloned().collect()
    }

    fn transaction(
        &self,
        collections: &[&str],
        mode: TransactionMode,
    ) -> EngineResult<Box<dyn Transaction>> {
        if !self.conn.open.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(Box::new(MemoryTransaction {
            db: Arc::clone(&self.db),
            conn: Arc::clone(&self.conn),
            scope: collections.iter().map(|c| (*c).to_string()).collect(),
            mode,
        }))
    }

    fn on_version_change(&self, listener: VersionChangeListener) {
        *self.conn.listener.lock() = Some(listener);
    }

    fn close(&self) {
        self.conn.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.conn.open.load(Ordering::SeqCst)
    }
}

struct MemoryTransaction {
    db: Arc<Mutex<DatabaseState>>,
    conn: Arc<Connection>,
    scope: Vec<String>,
    mode: TransactionMode,
}

impl MemoryTransaction {
    fn check(&self, collection: &str, write: bool) -> EngineResult<()> {
        if !self.conn.open.load(Ordering::SeqCst) {
            return Err(EngineError::aborted("database handle closed"));
        }
        if !self.scope.iter().any(|c| c == collection) {
            return Err(EngineError::CollectionNotFound {
                name: collection.to_string(),
            });
        }
        if write && self.mode == TransactionMode::ReadOnly {
            return Err(EngineError::ReadOnly {
                collection: collection.to_string(),
            });
        }
        Ok(())
    }
}

fn check_unique(
    collection: &str,
    coll: &CollectionState,
    record: &Value,
    exclude: Option<&Key>,
) -> EngineResult<()> {
    for (index_name, index) in &coll.indices {
        if !index.unique {
            continue;
        }
        let Some(candidate) = value_at_path(record, &index.key_path) else {
            continue;
        };
        for (key, existing) in &coll.records {
            if exclude == Some(key) {
                continue;
            }
            if value_at_path(existing, &index.key_path) == Some(candidate) {
                return Err(EngineError::constraint(collection, index_name.clone()));
            }
        }
    }
    Ok(())
}

fn resolve_key(
    collection: &str,
    coll: &mut CollectionState,
    record: &mut Value,
) -> EngineResult<Key> {
    match key_at_path(record, &coll.key_path) {
        Some(key) => {
            if let Key::Int(n) = key {
                if n >= coll.next_key {
                    coll.next_key = n + 1;
                }
            }
            Ok(key)
        }
        None if coll.auto_increment => {
            let key = Key::Int(coll.next_key);
            coll.next_key += 1;
            if !set_at_path(record, &coll.key_path, key.to_value()) {
                return Err(EngineError::MissingKey {
                    collection: collection.to_string(),
                    key_path: coll.key_path.clone(),
                });
            }
            Ok(key)
        }
        None => Err(EngineError::MissingKey {
            collection: collection.to_string(),
            key_path: coll.key_path.clone(),
        }),
    }
}

impl Transaction for MemoryTransaction {
    fn add(&mut self, collection: &str, mut record: Value) -> EngineResult<Key> {
        self.check(collection, true)?;
        let mut state = self.db.lock();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        let key = resolve_key(collection, coll, &mut record)?;
        if coll.records.contains_key(&key) {
            return Err(EngineError::constraint(collection, "primary"));
        }
        check_unique(collection, coll, &record, None)?;
        coll.records.insert(key.clone(), record);
        Ok(key)
    }

    fn get(&mut self, collection: &str, key: &Key) -> EngineResult<Option<Value>> {
        self.check(collection, false)?;
        let state = self.db.lock();
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        Ok(coll.records.get(key).cloned())
    }

    fn get_by_index(
        &mut self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> EngineResult<Option<Value>> {
        self.check(collection, false)?;
        let state = self.db.lock();
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        let def = coll
            .indices
            .get(index)
            .ok_or_else(|| EngineError::IndexNotFound {
                collection: collection.to_string(),
                name: index.to_string(),
            })?;
        Ok(coll
            .records
            .values()
            .find(|record| value_at_path(record, &def.key_path) == Some(value))
            .cloned())
    }

    fn put(&mut self, collection: &str, mut record: Value) -> EngineResult<Key> {
        self.check(collection, true)?;
        let mut state = self.db.lock();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        let key = resolve_key(collection, coll, &mut record)?;
        check_unique(collection, coll, &record, Some(&key))?;
        coll.records.insert(key.clone(), record);
        Ok(key)
    }

    fn delete(&mut self, collection: &str, key: &Key) -> EngineResult<()> {
        self.check(collection, true)?;
        let mut state = self.db.lock();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        coll.records.remove(key);
        Ok(())
    }

    fn get_all(&mut self, collection: &str) -> EngineResult<Vec<Value>> {
        self.check(collection, false)?;
        let state = self.db.lock();
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        Ok(coll.records.values().cloned().collect())
    }

    fn commit(self: Box<Self>) -> EngineResult<()> {
        if !self.conn.open.load(Ordering::SeqCst) {
            return Err(EngineError::aborted("database handle closed"));
        }
        Ok(())
    }
}

struct MemoryEditor<'a> {
    collections: &'a mut BTreeMap<String, CollectionState>,
}

impl SchemaEditor for MemoryEditor<'_> {
    fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    fn contains_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    fn create_collection(
        &mut self,
        name: &str,
        key_path: &str,
        auto_increment: bool,
    ) -> EngineResult<()> {
        if self.collections.contains_key(name) {
            return Err(EngineError::CollectionExists {
                name: name.to_string(),
            });
        }
        self.collections.insert(
            name.to_string(),
            CollectionState {
                key_path: key_path.to_string(),
                auto_increment,
                next_key: 1,
                records: BTreeMap::new(),
                indices: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn delete_collection(&mut self, name: &str) -> EngineResult<()> {
        self.collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    fn rename_collection(&mut self, from: &str, to: &str) -> EngineResult<()> {
        if self.collections.contains_key(to) {
            return Err(EngineError::CollectionExists {
                name: to.to_string(),
            });
        }
        let coll = self
            .collections
            .remove(from)
            .ok_or_else(|| EngineError::CollectionNotFound {
                name: from.to_string(),
            })?;
        self.collections.insert(to.to_string(), coll);
        Ok(())
    }

    fn create_index(
        &mut self,
        collection: &str,
        name: &str,
        key_path: &str,
        unique: bool,
    ) -> EngineResult<()> {
        let coll = self.collections.get_mut(collection).ok_or_else(|| {
            EngineError::CollectionNotFound {
                name: collection.to_string(),
            }
        })?;
        if coll.indices.contains_key(name) {
            return Err(EngineError::IndexExists {
                collection: collection.to_string(),
                name: name.to_string(),
            });
        }
        if unique {
            let mut seen = Vec::new();
            for record in coll.records.values() {
                if let Some(value) = value_at_path(record, key_path) {
                    if seen.contains(&value) {
                        return Err(EngineError::constraint(collection, name));
                    }
                    seen.push(value);
                }
            }
        }
        coll.indices.insert(
            name.to_string(),
            IndexDef {
                key_path: key_path.to_string(),
                unique,
            },
        );
        Ok(())
    }

    fn delete_index(&mut self, collection: &str, name: &str) -> EngineResult<()> {
        let coll = self.collections.get_mut(collection).ok_or_else(|| {
            EngineError::CollectionNotFound {
                name: collection.to_string(),
            }
        })?;
        coll.indices
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::IndexNotFound {
                collection: collection.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_upgrade(_: &mut dyn SchemaEditor) -> EngineResult<()> {
        Ok(())
    }

    fn open_with_users(engine: &MemoryEngine, version: u32) -> Box<dyn DatabaseHandle> {
        engine
            .open("app", version, &mut |editor| {
                if !editor.contains_collection("users") {
                    editor.create_collection("users", "id", true)?;
                    editor.create_index("users", "phone", "phone", true)?;
                }
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn open_creates_database_at_version() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.database_version("app"), None);

        let handle = engine.open("app", 1, &mut no_upgrade).unwrap();
        assert_eq!(handle.version(), 1);
        assert_eq!(engine.database_version("app"), Some(1));
    }

    #[test]
    fn open_at_version_zero_rejected() {
        let engine = MemoryEngine::new();
        assert!(matches!(
            engine.open("app", 0, &mut no_upgrade),
            Err(EngineError::Open { .. })
        ));
    }

    #[test]
    fn open_below_stored_version_rejected() {
        let engine = MemoryEngine::new();
        let handle = engine.open("app", 3, &mut no_upgrade).unwrap();
        handle.close();

        let result = engine.open("app", 2, &mut no_upgrade);
        assert!(matches!(
            result,
            Err(EngineError::VersionTooOld {
                requested: 2,
                current: 3,
                ..
            })
        ));
    }

    #[test]
    fn upgrade_callback_runs_only_on_version_bump() {
        let engine = MemoryEngine::new();
        let mut calls = 0;
        engine
            .open("app", 1, &mut |_| {
                calls += 1;
                Ok(())
            })
            .unwrap()
            .close();
        engine
            .open("app", 1, &mut |_| {
                calls += 1;
                Ok(())
            })
            .unwrap()
            .close();
        assert_eq!(calls, 1);
    }

    #[test]
    fn failed_upgrade_leaves_schema_and_version_untouched() {
        let engine = MemoryEngine::new();
        open_with_users(&engine, 1).close();

        let result = engine.open("app", 2, &mut |editor| {
            editor.create_collection("orders", "id", true)?;
            Err(EngineError::open("boom"))
        });
        assert!(result.is_err());
        assert_eq!(engine.database_version("app"), Some(1));

        let handle = engine.open("app", 1, &mut no_upgrade).unwrap();
        assert_eq!(handle.collection_names(), vec!["users".to_string()]);
    }

    #[test]
    fn newer_open_notifies_and_proceeds_once_handles_close() {
        let engine = MemoryEngine::new();
        let first = engine.open("app", 1, &mut no_upgrade).unwrap();

        let first = Arc::new(Mutex::new(Some(first)));
        let slot = Arc::clone(&first);
        first
            .lock()
            .as_ref()
            .unwrap()
            .on_version_change(Box::new(move || {
                if let Some(handle) = slot.lock().as_ref() {
                    handle.close();
                }
            }));

        let second = engine.open("app", 2, &mut no_upgrade).unwrap();
        assert_eq!(second.version(), 2);
        assert!(!first.lock().as_ref().unwrap().is_open());
    }

    #[test]
    fn newer_open_blocked_by_unresponsive_handle() {
        let engine = MemoryEngine::new();
        let first = engine.open("app", 1, &mut no_upgrade).unwrap();

        // No listener registered: the stale handle never closes.
        let result = engine.open("app", 2, &mut no_upgrade);
        assert!(matches!(result, Err(EngineError::Blocked { version: 2, .. })));
        assert!(first.is_open());
    }

    #[test]
    fn add_assigns_auto_increment_keys_in_order() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        let k1 = txn.add("users", json!({"phone": "1"})).unwrap();
        let k2 = txn.add("users", json!({"phone": "2"})).unwrap();
        txn.commit().unwrap();

        assert_eq!(k1, Key::Int(1));
        assert_eq!(k2, Key::Int(2));
    }

    #[test]
    fn add_injects_key_into_record() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        let key = txn.add("users", json!({"phone": "1"})).unwrap();
        let stored = txn.get("users", &key).unwrap().unwrap();
        assert_eq!(stored["id"], json!(1));
    }

    #[test]
    fn unique_index_rejects_duplicate() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("users", json!({"phone": "123"})).unwrap();
        let result = txn.add("users", json!({"phone": "123"}));
        assert!(matches!(result, Err(EngineError::Constraint { .. })));
    }

    #[test]
    fn put_upserts_and_respects_unique_indices() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        let key = txn.add("users", json!({"phone": "1"})).unwrap();
        txn.add("users", json!({"phone": "2"})).unwrap();

        // Replacing a record with itself is fine.
        txn.put("users", json!({"id": 1, "phone": "1", "name": "a"}))
            .unwrap();
        let stored = txn.get("users", &key).unwrap().unwrap();
        assert_eq!(stored["name"], json!("a"));

        // Stealing another record's unique value is not.
        let result = txn.put("users", json!({"id": 1, "phone": "2"}));
        assert!(matches!(result, Err(EngineError::Constraint { .. })));
    }

    #[test]
    fn get_missing_returns_none() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.get("users", &Key::Int(99)).unwrap(), None);
    }

    #[test]
    fn get_by_index_finds_record() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("users", json!({"phone": "123"})).unwrap();
        let found = txn
            .get_by_index("users", "phone", &json!("123"))
            .unwrap()
            .unwrap();
        assert_eq!(found["phone"], json!("123"));
        assert_eq!(
            txn.get_by_index("users", "phone", &json!("999")).unwrap(),
            None
        );
    }

    #[test]
    fn get_by_missing_index_fails() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadOnly)
            .unwrap();
        assert!(matches!(
            txn.get_by_index("users", "nope", &json!(1)),
            Err(EngineError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn delete_is_silent_on_missing_key() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.delete("users", &Key::Int(42)).unwrap();
    }

    #[test]
    fn get_all_returns_primary_key_order() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("users", json!({"id": 3, "phone": "c"})).unwrap();
        txn.add("users", json!({"id": 1, "phone": "a"})).unwrap();
        txn.add("users", json!({"id": 2, "phone": "b"})).unwrap();

        let all = txn.get_all("users").unwrap();
        let ids: Vec<_> = all.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn explicit_key_advances_auto_increment() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("users", json!({"id": 10, "phone": "a"})).unwrap();
        let next = txn.add("users", json!({"phone": "b"})).unwrap();
        assert_eq!(next, Key::Int(11));
    }

    #[test]
    fn readonly_transaction_rejects_writes() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadOnly)
            .unwrap();
        assert!(matches!(
            txn.add("users", json!({"phone": "1"})),
            Err(EngineError::ReadOnly { .. })
        ));
    }

    #[test]
    fn out_of_scope_collection_rejected() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        assert!(matches!(
            txn.get_all("orders"),
            Err(EngineError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn closed_handle_aborts_requests() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        handle.close();
        assert!(matches!(
            txn.add("users", json!({"phone": "1"})),
            Err(EngineError::TransactionAborted { .. })
        ));
        assert!(matches!(
            handle.transaction(&["users"], TransactionMode::ReadOnly),
            Err(EngineError::Closed)
        ));
    }

    #[test]
    fn records_survive_reopen_at_higher_version() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);
        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("users", json!({"phone": "123"})).unwrap();
        txn.commit().unwrap();
        handle.close();

        let handle = engine.open("app", 2, &mut no_upgrade).unwrap();
        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.get_all("users").unwrap().len(), 1);
    }

    #[test]
    fn rename_collection_keeps_records() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);
        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("users", json!({"phone": "1"})).unwrap();
        txn.commit().unwrap();
        handle.close();

        engine
            .open("app", 2, &mut |editor| {
                editor.rename_collection("users", "people")
            })
            .unwrap();

        let handle = engine.open("app", 2, &mut no_upgrade).unwrap();
        assert_eq!(handle.collection_names(), vec!["people".to_string()]);
        let mut txn = handle
            .transaction(&["people"], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.get_all("people").unwrap().len(), 1);
    }

    #[test]
    fn create_unique_index_over_conflicting_records_fails() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);
        let mut txn = handle
            .transaction(&["users"], TransactionMode::ReadWrite)
            .unwrap();
        txn.add("users", json!({"phone": "1", "country": "pe"}))
            .unwrap();
        txn.add("users", json!({"phone": "2", "country": "pe"}))
            .unwrap();
        txn.commit().unwrap();
        handle.close();

        let result = engine.open("app", 2, &mut |editor| {
            editor.create_index("users", "country", "country", true)
        });
        assert!(matches!(result, Err(EngineError::Constraint { .. })));
    }

    #[test]
    fn duplicate_collection_and_index_creation_rejected() {
        let engine = MemoryEngine::new();
        let result = engine.open("app", 1, &mut |editor| {
            editor.create_collection("users", "id", true)?;
            editor.create_collection("users", "id", true)
        });
        assert!(matches!(result, Err(EngineError::CollectionExists { .. })));

        let engine = MemoryEngine::new();
        let result = engine.open("app", 1, &mut |editor| {
            editor.create_collection("users", "id", true)?;
            editor.create_index("users", "phone", "phone", true)?;
            editor.create_index("users", "phone", "phone", false)
        });
        assert!(matches!(result, Err(EngineError::IndexExists { .. })));
    }

    #[test]
    fn delete_database_removes_state_and_closes_handles() {
        let engine = MemoryEngine::new();
        let handle = open_with_users(&engine, 1);

        engine.delete_database("app").unwrap();
        assert!(!handle.is_open());
        assert_eq!(engine.database_version("app"), None);
    }

    #[test]
    fn injected_delete_failure_fires_once() {
        let engine = MemoryEngine::new();
        open_with_users(&engine, 1).close();

        engine.inject_delete_failure("app");
        assert!(engine.delete_database("app").is_err());
        assert!(engine.delete_database("app").is_ok());
    }
}
