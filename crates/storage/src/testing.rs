//! Fault injection for exercising failure paths
//!
//! Faults are armed per store path on a [`MemoryEngine`](crate::MemoryEngine)
//! and stay armed until cleared. Every handle for that path, existing or
//! future, observes them.
//!
//! # Example
//!
//! ```ignore
//! use undertow_storage::{testing::Fault, MemoryEngine};
//!
//! let engine = MemoryEngine::new();
//! engine.inject_fault("app.store", Fault::Refresh);
//! // handle.refresh() now returns false for app.store
//! ```

use dashmap::DashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A failure the engine can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `open` fails with [`MemoryError::Injected`](crate::MemoryError::Injected)
    Open,
    /// `refresh` reports failure
    Refresh,
    /// `commit_write` fails and rolls back
    Commit,
}

#[derive(Debug, Default)]
pub(crate) struct FaultRegistry {
    armed: DashMap<PathBuf, HashSet<Fault>>,
}

impl FaultRegistry {
    pub(crate) fn inject(&self, path: &Path, fault: Fault) {
        self.armed.entry(path.to_path_buf()).or_default().insert(fault);
    }

    pub(crate) fn clear(&self, path: &Path) {
        self.armed.remove(path);
    }

    pub(crate) fn is_armed(&self, path: &Path, fault: Fault) -> bool {
        self.armed
            .get(path)
            .map_or(false, |faults| faults.contains(&fault))
    }
}
