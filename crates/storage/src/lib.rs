//! In-memory storage engine for Undertow
//!
//! This crate implements the reference `StorageEngine`:
//! - MemoryEngine: shares one store per path across threads (DashMap)
//! - MemoryHandle: thread-confined handle with snapshot reads and a single
//!   explicit write transaction at a time
//! - Notifications: change subscriptions delivered on the subscriber's run loop
//!
//! Stores follow the usual embedded-database lifecycle: schema check on
//! open, a store-wide write lock held from `begin_write` to commit or
//! cancel, and snapshot isolation for readers with optional autorefresh.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod handle;
pub mod notify;
pub mod record;
mod store;
pub mod testing;

pub use engine::MemoryEngine;
pub use error::{MemoryError, Result};
pub use handle::{MemoryHandle, MemoryHandleId};
pub use notify::{Change, ChangeSet, NotificationToken};
pub use record::Record;
