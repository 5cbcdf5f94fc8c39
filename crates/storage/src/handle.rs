//! Thread-confined handles to an in-memory store
//!
//! A `MemoryHandle` reads from an immutable snapshot of the store and, while
//! a write transaction is open, from its own pending copy. It is `!Send`:
//! it lives and dies on the thread that opened it.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::trace;
use undertow_concurrency::RunLoop;
use undertow_core::{Configuration, StorageHandle};

use crate::error::{MemoryError, Result};
use crate::notify::{Change, NotificationToken};
use crate::record::Record;
use crate::store::{Snapshot, Store};
use crate::testing::{Fault, FaultRegistry};

/// Identity of a [`MemoryHandle`]
///
/// Handles opened for the same store on the same thread compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandleId {
    /// Engine-assigned id of the store
    pub store: u64,
    /// Thread the handle is confined to
    pub thread: ThreadId,
}

/// A handle to an in-memory store, confined to the thread that opened it
pub struct MemoryHandle {
    serial: u64,
    store: Arc<Store>,
    faults: Arc<FaultRegistry>,
    configuration: Configuration,
    owner: ThreadId,
    autorefresh: Cell<bool>,
    snapshot: RefCell<Snapshot>,
    pending: RefCell<Option<BTreeMap<String, Record>>>,
    _not_send: PhantomData<*const ()>,
}

impl MemoryHandle {
    pub(crate) fn new(
        serial: u64,
        store: Arc<Store>,
        faults: Arc<FaultRegistry>,
        configuration: Configuration,
    ) -> Self {
        let snapshot = store.latest();
        Self {
            serial,
            store,
            faults,
            configuration,
            owner: thread::current().id(),
            autorefresh: Cell::new(true),
            snapshot: RefCell::new(snapshot),
            pending: RefCell::new(None),
            _not_send: PhantomData,
        }
    }

    fn assert_owner(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "memory handle used off its owning thread"
        );
    }

    fn faulted(&self, fault: Fault) -> bool {
        self.faults.is_armed(&self.configuration.path, fault)
    }

    fn maybe_autorefresh(&self) {
        if self.autorefresh.get() && self.pending.borrow().is_none() {
            self.refresh();
        }
    }

    fn read<R>(&self, f: impl FnOnce(&BTreeMap<String, Record>) -> R) -> R {
        self.assert_owner();
        self.maybe_autorefresh();
        if let Some(pending) = self.pending.borrow().as_ref() {
            return f(pending);
        }
        f(&self.snapshot.borrow().records)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Record>) -> R) -> Result<R> {
        self.assert_owner();
        let mut pending = self.pending.borrow_mut();
        let records = pending.as_mut().ok_or(MemoryError::NotInWriteTransaction)?;
        Ok(f(records))
    }

    /// All records, ordered by id
    pub fn objects(&self) -> Vec<Record> {
        self.read(|records| records.values().cloned().collect())
    }

    /// The record stored under `id`
    pub fn object(&self, id: &str) -> Option<Record> {
        self.read(|records| records.get(id).cloned())
    }

    /// Number of records visible to this handle
    pub fn len(&self) -> usize {
        self.read(|records| records.len())
    }

    /// Whether no records are visible to this handle
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a record in the open write transaction
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotInWriteTransaction`] outside a write transaction.
    pub fn add(&self, record: Record) -> Result<()> {
        self.mutate(|records| {
            records.insert(record.id.clone(), record);
        })
    }

    /// Remove the record stored under `id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotInWriteTransaction`] outside a write transaction.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.mutate(|records| records.remove(id).is_some())
    }

    /// Remove every record
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotInWriteTransaction`] outside a write transaction.
    pub fn delete_all(&self) -> Result<()> {
        self.mutate(BTreeMap::clear)
    }

    /// Committed version this handle is reading
    pub fn version(&self) -> u64 {
        self.snapshot.borrow().version
    }

    /// Whether reads advance to the latest commit automatically
    pub fn autorefresh(&self) -> bool {
        self.autorefresh.get()
    }

    /// Subscribe to changes of this store
    ///
    /// `callback` first receives [`Change::Initial`] and then one
    /// [`Change::Update`] per non-empty commit, always on the calling
    /// thread's run loop, until the returned token is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NoRunLoop`] if the calling thread has no run loop.
    pub fn observe(
        &self,
        callback: impl FnMut(&Change) + Send + 'static,
    ) -> Result<NotificationToken> {
        self.assert_owner();
        let run_loop = RunLoop::current().ok_or(MemoryError::NoRunLoop)?;
        Ok(self.store.subscribe(run_loop, Box::new(callback)))
    }
}

impl StorageHandle for MemoryHandle {
    type Error = MemoryError;
    type Identity = MemoryHandleId;

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn identity(&self) -> MemoryHandleId {
        MemoryHandleId {
            store: self.store.id,
            thread: self.owner,
        }
    }

    fn set_autorefresh(&self, enabled: bool) {
        self.assert_owner();
        self.autorefresh.set(enabled);
    }

    fn refresh(&self) -> bool {
        self.assert_owner();
        if self.store.is_invalidated() || self.faulted(Fault::Refresh) {
            return false;
        }
        if self.pending.borrow().is_none() {
            *self.snapshot.borrow_mut() = self.store.latest();
        }
        true
    }

    fn begin_write(&self) -> Result<()> {
        self.assert_owner();
        if self.configuration.read_only {
            return Err(MemoryError::ReadOnly);
        }
        if self.pending.borrow().is_some() {
            return Err(MemoryError::AlreadyInWriteTransaction);
        }

        self.store.acquire_writer(self.serial);
        let latest = self.store.latest();
        *self.pending.borrow_mut() = Some((*latest.records).clone());
        *self.snapshot.borrow_mut() = latest;
        trace!(handle = self.serial, "write transaction started");
        Ok(())
    }

    fn commit_write(&self) -> Result<()> {
        self.assert_owner();
        let records = self
            .pending
            .borrow_mut()
            .take()
            .ok_or(MemoryError::NotInWriteTransaction)?;
        if self.faulted(Fault::Commit) {
            self.store.release_writer(self.serial);
            return Err(MemoryError::Injected(Fault::Commit));
        }
        let snapshot = self.store.commit(self.serial, records)?;
        *self.snapshot.borrow_mut() = snapshot;
        Ok(())
    }

    fn cancel_write(&self) {
        self.assert_owner();
        if self.pending.borrow_mut().take().is_some() {
            self.store.release_writer(self.serial);
            trace!(handle = self.serial, "write transaction cancelled");
        }
    }

    fn is_in_write_transaction(&self) -> bool {
        self.pending.borrow().is_some()
    }
}

impl PartialEq for MemoryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for MemoryHandle {}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        if self.pending.get_mut().take().is_some() {
            self.store.release_writer(self.serial);
        }
    }
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("path", &self.store.path())
            .field("serial", &self.serial)
            .field("version", &self.snapshot.borrow().version)
            .field("in_write", &self.pending.borrow().is_some())
            .finish()
    }
}
