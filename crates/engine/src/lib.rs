//! Background execution for Undertow
//!
//! This crate ties configuration resolution, the concurrency primitives and
//! a storage engine together:
//! - Background: entry points for background writes, cancellable commits
//!   and standing handles
//! - Executor: the open → refresh → write/commit protocol run inside the
//!   single-writer queue
//! - BackgroundHandle: a storage handle kept alive on a dedicated worker
//!   thread so its notifications keep firing
//!
//! Resolution always happens on the calling thread. Everything else runs on
//! another thread and reports back through the caller's callback, exactly
//! once, on that thread.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod executor;
pub mod handle;

pub use background::Background;
pub use executor::{execute_commit, execute_write, open_for_write, CommitOutcome};
pub use handle::{BackgroundHandle, SetupState, ASYNC_OPEN_QUEUE_LABEL, WORKER_LABEL};
