//! Storage configuration
//!
//! A `Configuration` describes where and how a storage handle is opened.
//! It is a plain value: every consumer copies it before changing anything,
//! so forcing a background write into writable mode never mutates a value
//! the caller can still see.
//!
//! Configurations can also be loaded from a TOML file:
//!
//! ```toml
//! path = "/var/lib/app/main.store"
//! read_only = false
//! schema_version = 3
//!
//! # [sync]
//! # server_url = "https://sync.example.com"
//! # partition = "team-a"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BackgroundError, Result};

/// File name used by the system default configuration.
pub const DEFAULT_STORE_FILE_NAME: &str = "default.store";

/// Settings for a store that is synchronized with a remote server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncConfiguration {
    /// Server the store synchronizes with
    pub server_url: String,
    /// Partition of the server-side data this store mirrors
    pub partition: String,
}

impl SyncConfiguration {
    /// Create sync settings for a server and partition
    pub fn new(server_url: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            partition: partition.into(),
        }
    }
}

/// Descriptor of where and how to open a storage handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    /// Location of the store
    pub path: PathBuf,
    /// Open the store without write access
    #[serde(default)]
    pub read_only: bool,
    /// Schema version the caller expects the store to have
    #[serde(default)]
    pub schema_version: u64,
    /// Remote synchronization settings, if the store is synchronized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncConfiguration>,
}

impl Configuration {
    /// Create a writable, unsynchronized configuration for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            schema_version: 0,
            sync: None,
        }
    }

    /// The configuration used when nothing else is available
    pub fn system_default() -> Self {
        Self::new(DEFAULT_STORE_FILE_NAME)
    }

    /// Replace the storage location, keeping every other field
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the read-only flag
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the expected schema version
    pub fn with_schema_version(mut self, schema_version: u64) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Attach synchronization settings
    pub fn with_sync(mut self, sync: SyncConfiguration) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Copy of this configuration with write access forced on
    pub fn writable(&self) -> Self {
        Self {
            read_only: false,
            ..self.clone()
        }
    }

    /// Synchronized read-only stores must be opened asynchronously
    pub fn is_synced_read_only(&self) -> bool {
        self.read_only && self.sync.is_some()
    }

    /// Parse a configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns `BackgroundError::Generic` if the text is not a valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(BackgroundError::generic)
    }

    /// Read and parse a configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(BackgroundError::generic)?;
        Self::from_toml_str(&content)
    }

    /// Serialize this configuration as TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(BackgroundError::generic)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::system_default()
    }
}
