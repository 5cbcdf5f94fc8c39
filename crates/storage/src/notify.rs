//! Change notifications
//!
//! Subscriptions are bound to the run loop of the thread that registered
//! them. When a write commits, the store posts the change to every
//! subscriber's run loop, so callbacks always run on the subscribing thread
//! and only while that thread keeps its loop alive.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use undertow_concurrency::RunLoop;

use crate::record::Record;
use crate::store::Store;

/// Difference between two committed versions of a store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    /// Version the change produced
    pub version: u64,
    /// Records that did not exist before
    pub insertions: Vec<Record>,
    /// Records whose contents changed
    pub modifications: Vec<Record>,
    /// Ids of records that were removed
    pub deletions: Vec<String>,
}

impl ChangeSet {
    pub(crate) fn between(
        version: u64,
        before: &BTreeMap<String, Record>,
        after: &BTreeMap<String, Record>,
    ) -> Self {
        let mut change = ChangeSet {
            version,
            ..Default::default()
        };

        for (id, record) in after {
            match before.get(id) {
                None => change.insertions.push(record.clone()),
                Some(previous) if previous != record => change.modifications.push(record.clone()),
                Some(_) => {}
            }
        }
        change.deletions = before
            .keys()
            .filter(|id| !after.contains_key(*id))
            .cloned()
            .collect();

        change
    }

    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
    }
}

/// Event delivered to an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Contents of the store when the subscription was registered
    Initial(Vec<Record>),
    /// A committed write transaction
    Update(ChangeSet),
}

type Callback = Arc<Mutex<Box<dyn FnMut(&Change) + Send + 'static>>>;

pub(crate) struct Subscriber {
    pub(crate) token: u64,
    run_loop: RunLoop,
    callback: Callback,
    active: Arc<AtomicBool>,
}

impl Subscriber {
    pub(crate) fn new(
        token: u64,
        run_loop: RunLoop,
        callback: Box<dyn FnMut(&Change) + Send + 'static>,
    ) -> (Self, Arc<AtomicBool>) {
        let active = Arc::new(AtomicBool::new(true));
        let subscriber = Subscriber {
            token,
            run_loop,
            callback: Arc::new(Mutex::new(callback)),
            active: Arc::clone(&active),
        };
        (subscriber, active)
    }

    /// Post `change` to the subscriber's run loop.
    ///
    /// Returns `false` if the run loop is gone and the subscriber should be dropped.
    pub(crate) fn deliver(&self, change: Change) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let callback = Arc::clone(&self.callback);
        let active = Arc::clone(&self.active);
        self.run_loop.perform(move || {
            // The token may have been dropped while this was queued
            if active.load(Ordering::Acquire) {
                (callback.lock())(&change);
            }
        })
    }
}

/// Keeps a subscription alive. Dropping it stops further callbacks.
#[must_use = "dropping the token cancels the subscription"]
pub struct NotificationToken {
    store: Weak<Store>,
    token: u64,
    active: Arc<AtomicBool>,
}

impl NotificationToken {
    pub(crate) fn new(store: &Arc<Store>, token: u64, active: Arc<AtomicBool>) -> Self {
        Self {
            store: Arc::downgrade(store),
            token,
            active,
        }
    }

    /// Whether the subscription still delivers changes
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Cancel the subscription
    pub fn invalidate(self) {}
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.token);
        }
    }
}

impl std::fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken")
            .field("token", &self.token)
            .field("active", &self.is_active())
            .finish()
    }
}
