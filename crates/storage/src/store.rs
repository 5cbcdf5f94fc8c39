//! Shared per-path store state
//!
//! One `Store` exists per path per engine. Handles on any thread read
//! immutable snapshots of its committed records; a single writer at a time
//! replaces them on commit.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use undertow_concurrency::RunLoop;

use crate::error::{MemoryError, Result};
use crate::notify::{Change, ChangeSet, NotificationToken, Subscriber};
use crate::record::Record;

/// Committed state visible to readers
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) version: u64,
    pub(crate) records: Arc<BTreeMap<String, Record>>,
}

pub(crate) struct Store {
    pub(crate) id: u64,
    path: PathBuf,
    schema_version: AtomicU64,
    committed: RwLock<Snapshot>,
    /// Serial of the handle holding the write lock
    writer: Mutex<Option<u64>>,
    writer_released: Condvar,
    invalidated: AtomicBool,
    subscribers: Mutex<Vec<Subscriber>>,
    next_token: AtomicU64,
}

impl Store {
    pub(crate) fn new(id: u64, path: &Path, schema_version: u64) -> Self {
        Self {
            id,
            path: path.to_path_buf(),
            schema_version: AtomicU64::new(schema_version),
            committed: RwLock::new(Snapshot {
                version: 0,
                records: Arc::new(BTreeMap::new()),
            }),
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            invalidated: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Check (and if needed migrate) the schema for a new handle
    pub(crate) fn check_schema(&self, requested: u64, read_only: bool) -> Result<()> {
        let stored = self.schema_version.load(Ordering::Acquire);
        if requested < stored {
            return Err(MemoryError::SchemaVersionMismatch { stored, requested });
        }
        if requested > stored {
            if read_only {
                return Err(MemoryError::MigrationRequired { stored, requested });
            }
            self.schema_version.fetch_max(requested, Ordering::AcqRel);
            debug!(path = %self.path.display(), from = stored, to = requested, "schema migrated");
        }
        Ok(())
    }

    pub(crate) fn schema_version(&self) -> u64 {
        self.schema_version.load(Ordering::Acquire)
    }

    pub(crate) fn latest(&self) -> Snapshot {
        self.committed.read().clone()
    }

    pub(crate) fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    fn invalidated_error(&self) -> MemoryError {
        MemoryError::Invalidated(self.path.display().to_string())
    }

    /// Block until no other handle holds the write lock, then take it
    pub(crate) fn acquire_writer(&self, serial: u64) {
        let mut writer = self.writer.lock();
        while writer.is_some() {
            self.writer_released.wait(&mut writer);
        }
        *writer = Some(serial);
        trace!(path = %self.path.display(), handle = serial, "write lock acquired");
    }

    pub(crate) fn release_writer(&self, serial: u64) {
        let mut writer = self.writer.lock();
        if *writer == Some(serial) {
            *writer = None;
            self.writer_released.notify_one();
            trace!(path = %self.path.display(), handle = serial, "write lock released");
        }
    }

    /// Publish `records` as the next committed version and release the write lock
    pub(crate) fn commit(&self, serial: u64, records: BTreeMap<String, Record>) -> Result<Snapshot> {
        if self.is_invalidated() {
            self.release_writer(serial);
            return Err(self.invalidated_error());
        }

        // Subscribers stay locked from publish to delivery so updates arrive
        // in version order and never race a new subscription's initial state.
        let mut subscribers = self.subscribers.lock();
        let (snapshot, change) = {
            let mut committed = self.committed.write();
            let version = committed.version + 1;
            let change = ChangeSet::between(version, &committed.records, &records);
            *committed = Snapshot {
                version,
                records: Arc::new(records),
            };
            (committed.clone(), change)
        };

        debug!(
            path = %self.path.display(),
            version = snapshot.version,
            inserted = change.insertions.len(),
            modified = change.modifications.len(),
            deleted = change.deletions.len(),
            "write committed"
        );

        if !change.is_empty() {
            subscribers.retain(|subscriber| subscriber.deliver(Change::Update(change.clone())));
        }
        drop(subscribers);
        self.release_writer(serial);
        Ok(snapshot)
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        run_loop: RunLoop,
        callback: Box<dyn FnMut(&Change) + Send + 'static>,
    ) -> NotificationToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (subscriber, active) = Subscriber::new(token, run_loop, callback);

        let mut subscribers = self.subscribers.lock();
        let initial = self.latest().records.values().cloned().collect();
        subscriber.deliver(Change::Initial(initial));
        subscribers.push(subscriber);
        drop(subscribers);

        NotificationToken::new(self, token, active)
    }

    pub(crate) fn unsubscribe(&self, token: u64) {
        self.subscribers.lock().retain(|s| s.token != token);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
