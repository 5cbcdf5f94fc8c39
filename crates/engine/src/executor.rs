//! Transaction executor
//!
//! Runs one background write against a freshly opened handle. Callers are
//! expected to already be inside a serialized execution context (the
//! single-writer queue); nothing here hops threads.
//!
//! Protocol:
//! 1. Force a writable copy of the configuration
//! 2. Open a handle (failure → `Generic`)
//! 3. Disable autorefresh
//! 4. Refresh once (failure → `Refresh`, no transaction is opened)
//! 5. Write mode: implicit transaction around the callback, then commit.
//!    Commit mode: explicit transaction, the callback decides commit or cancel.
//!
//! The handle is owned by the executing call and dropped before it returns,
//! on every path.

use tracing::{debug, error, warn};
use undertow_core::{
    BackgroundError, Configuration, Result, StorageEngine, StorageHandle, TransactionDecision,
};

/// How a commit-mode execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The transaction was committed
    Committed,
    /// The callback chose to cancel
    Cancelled,
    /// The callback ended the transaction itself
    Closed,
    /// Opening, refreshing, beginning or committing failed
    Failed,
}

/// Open a handle prepared for a background write.
///
/// The caller's configuration is never modified; a writable copy is opened.
///
/// # Errors
///
/// - `Generic` if the engine fails to open the handle
/// - `Refresh` if the handle cannot advance to the latest committed state
pub fn open_for_write<E: StorageEngine>(
    engine: &E,
    configuration: &Configuration,
) -> Result<E::Handle> {
    let configuration = configuration.writable();

    let handle = engine.open(&configuration).map_err(|e| {
        warn!(path = %configuration.path.display(), error = %e, "failed to open handle for write");
        BackgroundError::generic(e)
    })?;

    handle.set_autorefresh(false);
    if !handle.refresh() {
        warn!(path = %configuration.path.display(), "refresh failed, skipping write");
        return Err(BackgroundError::Refresh);
    }

    Ok(handle)
}

/// Run `on_result` inside an implicit write transaction and commit it.
///
/// `on_result` is called exactly once: with the handle inside the open
/// transaction, or with the error that prevented it from starting. A commit
/// failure after `on_result` has run is logged; the engine rolls back.
///
/// Returns whether the transaction committed.
pub fn execute_write<E, F>(engine: &E, configuration: &Configuration, on_result: F) -> bool
where
    E: StorageEngine,
    F: FnOnce(Result<&E::Handle>),
{
    let handle = match open_for_write(engine, configuration) {
        Ok(handle) => handle,
        Err(e) => {
            on_result(Err(e));
            return false;
        }
    };

    let mut on_result = Some(on_result);
    let outcome = handle.write(|| {
        if let Some(on_result) = on_result.take() {
            on_result(Ok(&handle));
        }
    });

    match outcome {
        Ok(()) => {
            debug!(path = %configuration.path.display(), "background write committed");
            true
        }
        Err(e) => {
            match on_result.take() {
                // The transaction never started, so the callback has not run yet
                Some(on_result) => on_result(Err(BackgroundError::generic(e))),
                None => error!(
                    path = %configuration.path.display(),
                    error = %e,
                    "background write failed after its callback ran"
                ),
            }
            false
        }
    }
}

/// Cancels the transaction if it is still open when dropped
struct TransactionGuard<'a, H: StorageHandle>(&'a H);

impl<H: StorageHandle> Drop for TransactionGuard<'_, H> {
    fn drop(&mut self) {
        if self.0.is_in_write_transaction() {
            self.0.cancel_write();
        }
    }
}

/// Begin a write transaction, let `decide` choose, then commit or cancel.
///
/// `decide` is called exactly once. When it is handed an error its decision
/// is ignored. Choosing [`TransactionDecision::Cancel`] is not a failure.
pub fn execute_commit<E, F>(engine: &E, configuration: &Configuration, decide: F) -> CommitOutcome
where
    E: StorageEngine,
    F: FnOnce(Result<&E::Handle>) -> TransactionDecision,
{
    let handle = match open_for_write(engine, configuration) {
        Ok(handle) => handle,
        Err(e) => {
            decide(Err(e));
            return CommitOutcome::Failed;
        }
    };

    if let Err(e) = handle.begin_write() {
        warn!(path = %configuration.path.display(), error = %e, "failed to begin write transaction");
        decide(Err(BackgroundError::generic(e)));
        return CommitOutcome::Failed;
    }

    let guard = TransactionGuard(&handle);
    let decision = decide(Ok(&handle));

    if decision.is_cancel() {
        drop(guard);
        debug!(path = %configuration.path.display(), "background commit cancelled");
        return CommitOutcome::Cancelled;
    }
    if !handle.is_in_write_transaction() {
        return CommitOutcome::Closed;
    }

    let result = handle.commit_write();
    drop(guard);
    match result {
        Ok(()) => {
            debug!(path = %configuration.path.display(), "background commit committed");
            CommitOutcome::Committed
        }
        Err(e) => {
            error!(
                path = %configuration.path.display(),
                error = %e,
                "background commit failed after its callback ran"
            );
            CommitOutcome::Failed
        }
    }
}
