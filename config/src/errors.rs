// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration / validation error types.
//!
//! `ConfigError` covers §7's `InvalidConfig` kind; the other error kinds in §7
//! (`AllocatorExhausted`, `DriverTransient`, ...) live in the crates that raise them
//! (`alloc`, `drivers`, `dataplane`, `ike`) so each crate boundary owns one `thiserror` enum,
//! matching this crate's precedent.

use thiserror::Error;

/// Reasons a candidate or active configuration may be rejected.
///
/// Every validation failure names the offending YAML path, per §4.1: "The validator fails with
/// `InvalidConfig` citing the offending path."
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    /// Generic structural/semantic validation failure.
    #[error("invalid config at {path}: {reason}")]
    InvalidConfig { path: String, reason: String },

    /// A tenant YAML file's name does not match its own `id` field.
    #[error("tenant file {file} declares id {declared}, expected {expected}")]
    TenantIdMismatch {
        file: String,
        declared: String,
        expected: String,
    },

    /// Schema (YAML → model) parse failure.
    #[error("failed to parse {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    /// No candidate exists for the tenant being committed.
    #[error("no candidate configuration for tenant {0}")]
    NoSuchCandidate(String),

    /// No active configuration exists for the tenant.
    #[error("no active configuration for tenant {0}")]
    NoSuchActive(String),

    /// The active configuration store could not be read (escalates to process exit per §7).
    #[error("active configuration store is corrupt: {0}")]
    StoreCorrupt(String),

    /// Underlying I/O failure while reading, writing or renaming a config file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::sync::Arc<std::io::Error>,
    },
}

impl ConfigError {
    /// Build an [`ConfigError::Io`] from a path and the originating error.
    #[must_use]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source: std::sync::Arc::new(source),
        }
    }

    /// Build an [`ConfigError::InvalidConfig`] from a path and a human-readable reason.
    #[must_use]
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for fallible configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
