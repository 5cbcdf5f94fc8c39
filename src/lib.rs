//! Undertow - serialized background writes for thread-confined embedded stores
//!
//! Undertow runs storage writes off the caller's thread without ever letting
//! two write transactions overlap, and keeps long-lived handles alive on
//! dedicated threads so their change notifications keep arriving.
//!
//! # Quick Start
//!
//! ```ignore
//! use undertow::{Background, Configuration, ConfigurationRegistry, TransactionDecision};
//!
//! ConfigurationRegistry::global().set(Some(Configuration::new("app.store")));
//! let background = Background::new(engine);
//!
//! // Implicit transaction, committed when the callback returns
//! background.write_in_background(None, None, |result| {
//!     if let Ok(handle) = result {
//!         // mutate through `handle`
//!     }
//! });
//!
//! // Explicit transaction, the callback decides
//! background.commit_in_background(None, None, |result| match result {
//!     Ok(_handle) => TransactionDecision::Commit,
//!     Err(_) => TransactionDecision::Cancel,
//! });
//!
//! // Standing handle on its own thread
//! let standing = background.open_background_handle(None, |result| {
//!     // register observers on the handle here
//! });
//! ```
//!
//! # Architecture
//!
//! Configuration is resolved on the calling thread. Ad-hoc writes then go
//! through a single-writer queue ([`SerialQueue`]); standing handles each
//! get a [`BackgroundWorker`] hosting a [`RunLoop`]. Any engine implementing
//! [`StorageEngine`] can be plugged in.

pub use undertow_concurrency::{
    BackgroundWorker, QueueStats, RunLoop, SerialQueue, SHARED_QUEUE_LABEL,
};
pub use undertow_core::{
    resolve, resolve_with_path, BackgroundError, CallbackQueue, Configuration,
    ConfigurationRegistry, ResolutionPolicy, Result, StorageEngine, StorageHandle,
    SyncConfiguration, TransactionDecision, DEFAULT_STORE_FILE_NAME,
};
pub use undertow_engine::{
    execute_commit, execute_write, Background, BackgroundHandle, CommitOutcome, SetupState,
};
