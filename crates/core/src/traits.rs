//! Storage engine contract
//!
//! The background machinery never touches an engine directly; it drives
//! these traits through the engine's documented lifecycle
//! (open → refresh → begin/commit/cancel). Any embedded store whose handles
//! are confined to the thread that opened them can be plugged in.
//!
//! Handles are deliberately not required to be `Send`: a handle is opened,
//! used, and dropped on one thread, and callers only ever see it by
//! reference inside a callback running on that thread.

use std::error::Error as StdError;
use std::fmt::Debug;

use crate::config::Configuration;

/// A boxed task that can be run on another thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that runs tasks on its own thread
///
/// Engines use it to deliver the result of an asynchronous open.
pub trait CallbackQueue: Send + Sync {
    /// Schedule `task` to run on this queue
    fn dispatch(&self, task: Task);
}

/// Decision returned by a cancellable-commit callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionDecision {
    /// Commit the open write transaction
    Commit,
    /// Roll the open write transaction back
    Cancel,
}

impl TransactionDecision {
    /// Map a "should cancel" flag onto a decision
    pub fn from_should_cancel(should_cancel: bool) -> Self {
        if should_cancel {
            TransactionDecision::Cancel
        } else {
            TransactionDecision::Commit
        }
    }

    /// Whether this decision cancels the transaction
    pub fn is_cancel(self) -> bool {
        self == TransactionDecision::Cancel
    }
}

/// An embedded storage engine that opens thread-confined handles
///
/// Engines are cheap to clone (typically an `Arc` around shared state) so a
/// copy can travel to whichever thread ends up opening the handle.
pub trait StorageEngine: Clone + Send + Sync + 'static {
    /// Error reported by the engine and its handles
    type Error: StdError + Send + Sync + 'static;

    /// Handle type produced by [`StorageEngine::open`]
    type Handle: StorageHandle<Error = Self::Error>;

    /// Open a handle bound to the calling thread
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened with `configuration`.
    fn open(&self, configuration: &Configuration) -> Result<Self::Handle, Self::Error>;

    /// Open a handle on `queue` and pass it to `callback` on that queue's thread
    ///
    /// Synchronized read-only stores must be opened this way. The default
    /// implementation opens synchronously inside the dispatched task.
    fn async_open(
        &self,
        configuration: Configuration,
        queue: &dyn CallbackQueue,
        callback: Box<dyn FnOnce(Result<Self::Handle, Self::Error>) + Send + 'static>,
    ) {
        let engine = self.clone();
        queue.dispatch(Box::new(move || callback(engine.open(&configuration))));
    }
}

/// An opened, thread-confined handle to a store
pub trait StorageHandle: 'static {
    /// Error reported by the handle
    type Error: StdError + Send + Sync + 'static;

    /// Comparable, thread-safe summary of a handle's identity
    ///
    /// Two handles are equal iff their identities are equal.
    type Identity: Clone + Eq + Debug + Send + Sync + 'static;

    /// Configuration the handle was opened with
    fn configuration(&self) -> &Configuration;

    /// Identity of this handle
    fn identity(&self) -> Self::Identity;

    /// Enable or disable automatic refresh to the latest committed state
    fn set_autorefresh(&self, enabled: bool);

    /// Advance the handle to the latest committed state
    ///
    /// Returns `false` if the handle could not be refreshed.
    fn refresh(&self) -> bool;

    /// Start an explicit write transaction
    ///
    /// # Errors
    ///
    /// Returns an error if a write transaction cannot be started.
    fn begin_write(&self) -> Result<(), Self::Error>;

    /// Commit the open write transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the engine rolls back.
    fn commit_write(&self) -> Result<(), Self::Error>;

    /// Roll back the open write transaction
    fn cancel_write(&self);

    /// Whether a write transaction is open on this handle
    fn is_in_write_transaction(&self) -> bool;

    /// Run `body` inside an implicit write transaction and commit it
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or committed.
    fn write<F: FnOnce()>(&self, body: F) -> Result<(), Self::Error>
    where
        Self: Sized,
    {
        self.begin_write()?;
        body();
        if self.is_in_write_transaction() {
            self.commit_write()
        } else {
            Ok(())
        }
    }
}
