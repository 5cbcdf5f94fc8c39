//! Process-wide default configuration
//!
//! The registry holds a single optional configuration that background calls
//! fall back to when no explicit configuration is passed. Reads return a
//! copy; concurrent writers race and the last write wins. No lock is held
//! beyond the copy in or out of the slot.
//!
//! Code that needs isolation (tests, embedded subsystems) creates its own
//! registry and hands it to the background API; everything else shares
//! [`ConfigurationRegistry::global`].

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Configuration;

/// Global registry shared by the whole process
static GLOBAL_REGISTRY: Lazy<Arc<ConfigurationRegistry>> =
    Lazy::new(|| Arc::new(ConfigurationRegistry::new()));

/// A slot holding the default background configuration
#[derive(Debug, Default)]
pub struct ConfigurationRegistry {
    slot: RwLock<Option<Configuration>>,
}

impl ConfigurationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with a default configuration
    pub fn with_default(configuration: Configuration) -> Self {
        Self {
            slot: RwLock::new(Some(configuration)),
        }
    }

    /// The registry shared by the whole process
    pub fn global() -> Arc<ConfigurationRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Copy of the current default configuration
    pub fn get(&self) -> Option<Configuration> {
        self.slot.read().clone()
    }

    /// Set (or clear, with `None`) the default configuration
    pub fn set(&self, configuration: Option<Configuration>) {
        *self.slot.write() = configuration;
    }

    /// Set the default configuration, returning the previous one
    pub fn replace(&self, configuration: Option<Configuration>) -> Option<Configuration> {
        std::mem::replace(&mut *self.slot.write(), configuration)
    }

    /// Remove the default configuration
    pub fn clear(&self) {
        self.set(None);
    }

    /// Whether a default configuration is set
    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }
}
