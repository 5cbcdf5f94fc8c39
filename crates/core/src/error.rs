//! Error types for background operations
//!
//! Every failure that happens off the caller's thread is captured where it
//! occurs and handed to the caller's result callback as a `BackgroundError`.
//! We use `thiserror` for the `Display` and `Error` implementations.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for background operations
pub type Result<T> = std::result::Result<T, BackgroundError>;

/// Errors delivered to background result callbacks
#[derive(Debug, Clone, Error)]
pub enum BackgroundError {
    /// No configuration was passed and no default configuration is set
    #[error("no configuration was passed and the default background configuration is empty")]
    NoBackgroundConfiguration,

    /// The handle could not be refreshed to the latest committed state
    #[error("couldn't refresh the background handle")]
    Refresh,

    /// Any other failure, usually coming from the storage engine itself
    #[error("{0}")]
    Generic(#[source] Arc<dyn StdError + Send + Sync + 'static>),
}

impl BackgroundError {
    /// Wrap an underlying error
    pub fn generic(err: impl StdError + Send + Sync + 'static) -> Self {
        BackgroundError::Generic(Arc::new(err))
    }

    /// The wrapped error, for `Generic` failures
    pub fn underlying(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            BackgroundError::Generic(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

// Generic errors compare by message; the wrapped types are opaque.
impl PartialEq for BackgroundError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BackgroundError::Generic(a), BackgroundError::Generic(b)) => {
                a.to_string() == b.to_string()
            }
            (BackgroundError::NoBackgroundConfiguration, BackgroundError::NoBackgroundConfiguration)
            | (BackgroundError::Refresh, BackgroundError::Refresh) => true,
            _ => false,
        }
    }
}

impl Eq for BackgroundError {}
