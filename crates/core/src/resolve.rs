//! Configuration resolution
//!
//! Picks the configuration a background call opens its handle with:
//!
//! 1. the configuration passed explicitly by the caller
//! 2. the registry's default configuration
//! 3. depending on [`ResolutionPolicy`], either the system default or
//!    `BackgroundError::NoBackgroundConfiguration`
//!
//! Path overloads resolve a base configuration the same way (always
//! falling back to the system default, since the path itself is explicit)
//! and then replace only its location.

use std::path::PathBuf;

use crate::config::Configuration;
use crate::error::{BackgroundError, Result};

/// What to do when neither an explicit nor a default configuration exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPolicy {
    /// Fail with `NoBackgroundConfiguration`
    Strict,
    /// Fall back to `Configuration::system_default()`
    #[default]
    Lenient,
}

/// Resolve the effective configuration
///
/// # Errors
///
/// Returns `NoBackgroundConfiguration` under `ResolutionPolicy::Strict`
/// when neither `explicit` nor `default` is present.
pub fn resolve(
    explicit: Option<&Configuration>,
    default: Option<&Configuration>,
    policy: ResolutionPolicy,
) -> Result<Configuration> {
    match (explicit, default, policy) {
        (Some(config), _, _) | (None, Some(config), _) => Ok(config.clone()),
        (None, None, ResolutionPolicy::Lenient) => Ok(Configuration::system_default()),
        (None, None, ResolutionPolicy::Strict) => Err(BackgroundError::NoBackgroundConfiguration),
    }
}

/// Resolve a base configuration and point it at `path`
pub fn resolve_with_path(path: impl Into<PathBuf>, default: Option<&Configuration>) -> Configuration {
    default
        .cloned()
        .unwrap_or_else(Configuration::system_default)
        .with_path(path)
}
