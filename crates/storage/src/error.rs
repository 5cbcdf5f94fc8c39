//! Error types for the in-memory engine

use thiserror::Error;

use crate::testing::Fault;

/// Result type alias for in-memory engine operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors reported by the in-memory engine and its handles
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The store has a newer schema than the caller asked for
    #[error("schema version mismatch: store is at {stored}, requested {requested}")]
    SchemaVersionMismatch {
        /// Schema version recorded in the store
        stored: u64,
        /// Schema version in the configuration
        requested: u64,
    },

    /// Migrating to a newer schema needs write access
    #[error("migration from schema {stored} to {requested} requires a writable handle")]
    MigrationRequired {
        /// Schema version recorded in the store
        stored: u64,
        /// Schema version in the configuration
        requested: u64,
    },

    /// A write was attempted through a read-only handle
    #[error("handle is read-only")]
    ReadOnly,

    /// A mutation was attempted outside a write transaction
    #[error("not in a write transaction")]
    NotInWriteTransaction,

    /// `begin_write` was called on a handle that already has a transaction open
    #[error("a write transaction is already open on this handle")]
    AlreadyInWriteTransaction,

    /// Synchronized read-only stores can only be opened asynchronously
    #[error("synchronized read-only stores must be opened with async_open")]
    RequiresAsyncOpen,

    /// Notifications need a run loop on the subscribing thread
    #[error("cannot observe changes on a thread without a run loop")]
    NoRunLoop,

    /// The store was invalidated and can no longer be written
    #[error("store at {0} has been invalidated")]
    Invalidated(String),

    /// A fault armed through [`MemoryEngine::inject_fault`](crate::MemoryEngine::inject_fault)
    #[error("injected {0:?} fault")]
    Injected(Fault),
}
