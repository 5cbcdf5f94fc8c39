//! In-memory storage engine
//!
//! Stores are keyed by configuration path and shared by every handle the
//! engine opens for that path, on any thread. The engine is the process-wide
//! cache of open stores; clones share it.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use undertow_core::{CallbackQueue, Configuration, StorageEngine};

use crate::error::{MemoryError, Result};
use crate::handle::MemoryHandle;
use crate::store::Store;
use crate::testing::{Fault, FaultRegistry};

struct EngineInner {
    stores: DashMap<PathBuf, Arc<Store>>,
    faults: Arc<FaultRegistry>,
    next_store_id: AtomicU64,
    next_handle_serial: AtomicU64,
    opened: AtomicUsize,
}

/// An embedded engine that keeps every store in memory
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

impl MemoryEngine {
    /// Create an engine with no open stores
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                stores: DashMap::new(),
                faults: Arc::new(FaultRegistry::default()),
                next_store_id: AtomicU64::new(1),
                next_handle_serial: AtomicU64::new(1),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    fn open_handle(&self, configuration: &Configuration) -> Result<MemoryHandle> {
        if self.inner.faults.is_armed(&configuration.path, Fault::Open) {
            return Err(MemoryError::Injected(Fault::Open));
        }

        let store = self
            .inner
            .stores
            .entry(configuration.path.clone())
            .or_insert_with(|| {
                let id = self.inner.next_store_id.fetch_add(1, Ordering::Relaxed);
                debug!(path = %configuration.path.display(), store = id, "store created");
                Arc::new(Store::new(id, &configuration.path, configuration.schema_version))
            })
            .clone();

        store.check_schema(configuration.schema_version, configuration.read_only)?;

        let serial = self.inner.next_handle_serial.fetch_add(1, Ordering::Relaxed);
        self.inner.opened.fetch_add(1, Ordering::Relaxed);
        debug!(
            path = %configuration.path.display(),
            handle = serial,
            read_only = configuration.read_only,
            "handle opened"
        );
        Ok(MemoryHandle::new(
            serial,
            store,
            Arc::clone(&self.inner.faults),
            configuration.clone(),
        ))
    }

    /// Invalidate the store at `path`
    ///
    /// Existing handles can no longer refresh or commit. The next open of
    /// `path` starts a fresh, empty store. Returns whether a store existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        match self.inner.stores.remove(path) {
            Some((_, store)) => {
                store.invalidate();
                warn!(path = %path.display(), "store invalidated");
                true
            }
            None => false,
        }
    }

    /// Arm `fault` for every handle of the store at `path`
    pub fn inject_fault(&self, path: impl AsRef<Path>, fault: Fault) {
        self.inner.faults.inject(path.as_ref(), fault);
    }

    /// Disarm every fault for `path`
    pub fn clear_faults(&self, path: impl AsRef<Path>) {
        self.inner.faults.clear(path.as_ref());
    }

    /// Number of handles opened so far
    pub fn opened_handles(&self) -> usize {
        self.inner.opened.load(Ordering::Relaxed)
    }

    /// Latest committed version of the store at `path`
    pub fn committed_version(&self, path: &Path) -> Option<u64> {
        self.inner.stores.get(path).map(|store| store.latest().version)
    }

    /// Schema version recorded for the store at `path`
    pub fn schema_version(&self, path: &Path) -> Option<u64> {
        self.inner.stores.get(path).map(|store| store.schema_version())
    }

    /// Number of live change subscriptions on the store at `path`
    pub fn subscriber_count(&self, path: &Path) -> usize {
        self.inner
            .stores
            .get(path)
            .map_or(0, |store| store.subscriber_count())
    }

    /// Whether a store exists for `path`
    pub fn contains_store(&self, path: &Path) -> bool {
        self.inner.stores.contains_key(path)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    type Error = MemoryError;
    type Handle = MemoryHandle;

    fn open(&self, configuration: &Configuration) -> Result<MemoryHandle> {
        if configuration.is_synced_read_only() {
            return Err(MemoryError::RequiresAsyncOpen);
        }
        self.open_handle(configuration)
    }

    fn async_open(
        &self,
        configuration: Configuration,
        queue: &dyn CallbackQueue,
        callback: Box<dyn FnOnce(Result<MemoryHandle>) + Send + 'static>,
    ) {
        let engine = self.clone();
        queue.dispatch(Box::new(move || callback(engine.open_handle(&configuration))));
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("stores", &self.inner.stores.len())
            .field("opened", &self.opened_handles())
            .finish()
    }
}
