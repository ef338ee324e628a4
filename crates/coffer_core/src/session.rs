//! Database sessions: lifecycle and version coordination for one database.

use crate::error::{CoreError, CoreResult};
use crate::registry::{VersionRecord, VersionRegistry};
use coffer_engine::{DatabaseHandle, EngineResult, SchemaEditor, StorageEngine};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No open attempt has been made, or the handle was discarded.
    Unopened,
    /// An open is in flight.
    Opening,
    /// A live handle is installed.
    Open,
    /// The handle was retired by a version change elsewhere.
    Closed,
}

struct SessionInner {
    state: SessionState,
    handle: Option<Arc<dyn DatabaseHandle>>,
    version: u32,
    upgrading: bool,
}

/// A managed connection to one named database.
///
/// The session consults the [`VersionRegistry`] on open so the database is
/// always opened at its registered version, and re-registers on first
/// contact. A handle retired by a concurrent upgrade moves the session to
/// [`SessionState::Closed`]; the next operation that needs a handle reopens
/// at the current registered version.
///
/// All record and schema operations go through [`ensure_open`], so callers
/// never observe a half-open session.
///
/// [`ensure_open`]: Session::ensure_open
pub struct Session {
    name: String,
    engine: Arc<dyn StorageEngine>,
    registry: Arc<VersionRegistry>,
    inner: Arc<Mutex<SessionInner>>,
    closed_tx: watch::Sender<u64>,
}

/// Clears the in-flight upgrade marker on every exit path.
struct UpgradeReset(Arc<Mutex<SessionInner>>);

impl Drop for UpgradeReset {
    fn drop(&mut self) {
        self.0.lock().upgrading = false;
    }
}

impl Session {
    /// Creates a session for `name` on the registry's engine. Nothing is
    /// opened until the first operation.
    pub fn new(registry: Arc<VersionRegistry>, name: impl Into<String>) -> Self {
        let engine = Arc::clone(registry.engine());
        let (closed_tx, _) = watch::channel(0u64);
        Self {
            name: name.into(),
            engine,
            registry,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Unopened,
                handle: None,
                version: 0,
                upgrading: false,
            })),
            closed_tx,
        }
    }

    /// The database name this session manages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Version the current handle was opened at, 0 when unopened.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.lock().version
    }

    /// The registry this session coordinates through.
    #[must_use]
    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    /// The engine this session runs on.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Opens the database at its registered version, registering it at
    /// version 1 on first contact. Resolves with the opened version.
    /// Idempotent while the handle stays live.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Blocked`] if stale handles elsewhere refuse to close
    /// - [`CoreError::Open`] for any other engine refusal
    pub async fn open_or_create(&self) -> CoreResult<u32> {
        self.registry.initialize().await?;
        {
            let mut guard = self.inner.lock();
            if guard.state == SessionState::Open
                && guard.handle.as_ref().is_some_and(|h| h.is_open())
            {
                return Ok(guard.version);
            }
            guard.state = SessionState::Opening;
        }

        let result = async {
            let version = match self.registry.get_by_name(&self.name).await? {
                Some(record) => record.version,
                None => {
                    self.registry
                        .add(VersionRecord::new(&self.name, 1))
                        .await?
                        .version
                }
            };
            let handle = self
                .engine
                .open(&self.name, version, &mut |_| Ok(()))
                .map_err(|e| CoreError::from_open_failure(&self.name, e))?;
            self.install_handle(handle, version);
            info!(database = %self.name, version, "database open");
            Ok(version)
        }
        .await;

        if result.is_err() {
            let mut guard = self.inner.lock();
            if guard.state == SessionState::Opening {
                guard.state = SessionState::Unopened;
            }
        }
        result
    }

    /// Bumps the registered version by one and reopens, without touching
    /// the schema.
    ///
    /// Resolves `false` when the name is not registered; nothing happens
    /// in that case.
    pub async fn upgrade(&self) -> CoreResult<bool> {
        self.upgrade_with(|_| Ok(())).await
    }

    /// Bumps the registered version by one and reopens, running `apply`
    /// inside the upgrade transition. This is the only path on which a
    /// [`SchemaEditor`] is reachable, so all schema mutation happens under
    /// a version bump.
    ///
    /// Resolves `false` when the name is not registered; `apply` does not
    /// run and no state changes. If a live handle existed, the session
    /// waits for its retirement signal before installing the new handle.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SchemaChangeOutsideUpgrade`] when an upgrade is
    ///   already in flight on this session
    /// - [`CoreError::Blocked`] if a stale handle refuses to close
    /// - any error `apply` raises, with the schema and version rolled back
    ///   by the engine
    pub async fn upgrade_with<F>(&self, mut apply: F) -> CoreResult<bool>
    where
        F: FnMut(&mut dyn SchemaEditor) -> EngineResult<()>,
    {
        let Some(record) = self.registry.get_by_name(&self.name).await? else {
            warn!(database = %self.name, "upgrade skipped: not registered");
            return Ok(false);
        };

        {
            let mut guard = self.inner.lock();
            if guard.upgrading {
                return Err(CoreError::SchemaChangeOutsideUpgrade);
            }
            guard.upgrading = true;
        }
        let _reset = UpgradeReset(Arc::clone(&self.inner));

        let was_open = {
            let guard = self.inner.lock();
            guard.state == SessionState::Open
                && guard.handle.as_ref().is_some_and(|h| h.is_open())
        };
        let mut closed_rx = self.closed_tx.subscribe();
        closed_rx.borrow_and_update();

        let new_version = record.version + 1;
        self.registry
            .update_version_by_name(&self.name, new_version)
            .await?;

        let handle = self
            .engine
            .open(&self.name, new_version, &mut apply)
            .map_err(|e| CoreError::from_open_failure(&self.name, e))?;

        if was_open {
            // The version bump retires the previous handle through its
            // version-change listener; wait for that signal rather than
            // sleeping an arbitrary interval.
            let _ = closed_rx.changed().await;
        }
        self.install_handle(handle, new_version);
        info!(database = %self.name, version = new_version, "database upgraded");
        Ok(true)
    }

    /// Returns a live handle, opening the database first if needed.
    ///
    /// Every record operation funnels through here, so a session whose
    /// handle was retired transparently reopens at the current version.
    pub async fn ensure_open(&self) -> CoreResult<Arc<dyn DatabaseHandle>> {
        if let Some(handle) = self.inner.lock().handle.clone().filter(|h| h.is_open()) {
            return Ok(handle);
        }
        self.open_or_create().await?;
        self.inner
            .lock()
            .handle
            .clone()
            .ok_or_else(|| CoreError::open(format!("database {} failed to open", self.name)))
    }

    /// Closes and drops the current handle, returning the session to
    /// [`SessionState::Unopened`]. Used before deleting the database.
    pub fn discard_handle(&self) {
        let mut guard = self.inner.lock();
        if let Some(handle) = guard.handle.take() {
            handle.close();
        }
        guard.state = SessionState::Unopened;
        guard.version = 0;
    }

    fn install_handle(&self, handle: Box<dyn DatabaseHandle>, version: u32) {
        let handle: Arc<dyn DatabaseHandle> = Arc::from(handle);

        let inner = Arc::clone(&self.inner);
        let closed_tx = self.closed_tx.clone();
        let weak = Arc::downgrade(&handle);
        let name = self.name.clone();
        handle.on_version_change(Box::new(move || {
            warn!(database = %name, "handle retired by version change");
            if let Some(h) = weak.upgrade() {
                h.close();
            }
            {
                let mut guard = inner.lock();
                guard.handle = None;
                guard.state = SessionState::Closed;
            }
            closed_tx.send_modify(|n| *n += 1);
        }));

        let mut guard = self.inner.lock();
        guard.handle = Some(handle);
        guard.version = version;
        guard.state = SessionState::Open;
    }
}
