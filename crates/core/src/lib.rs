//! Core types and traits for Undertow
//!
//! This crate defines the foundational types used throughout the system:
//! - Configuration: where and how to open a storage handle
//! - ConfigurationRegistry: the process-wide default configuration slot
//! - Resolution: picking the effective configuration for a background call
//! - BackgroundError: the error taxonomy delivered through result callbacks
//! - Traits: the storage engine contract (StorageEngine, StorageHandle)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod registry;
pub mod resolve;
pub mod traits;

pub use config::{Configuration, SyncConfiguration, DEFAULT_STORE_FILE_NAME};
pub use error::{BackgroundError, Result};
pub use registry::ConfigurationRegistry;
pub use resolve::{resolve, resolve_with_path, ResolutionPolicy};
pub use traits::{CallbackQueue, StorageEngine, StorageHandle, Task, TransactionDecision};
