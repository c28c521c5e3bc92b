// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error kinds raised by the dataplane primitives (§7).

use thiserror::Error;

/// Everything that can go wrong while reconciling kernel state.
#[derive(Debug, Error)]
pub enum DataplaneError {
    /// A netlink request to the kernel failed.
    #[error("netlink request failed: {0}")]
    Netlink(#[from] rtnetlink::Error),
    /// A network namespace could not be created, entered, or removed.
    #[error("namespace {name}: {reason}")]
    Namespace {
        /// The namespace's name (its filename under `/var/run/netns`).
        name: String,
        /// What went wrong.
        reason: String,
    },
    /// An external control-plane binary (`jool`, `ip`) exited non-zero or could not be spawned.
    #[error("external command `{command}` failed: {reason}")]
    ExternalCommand {
        /// The command line that was run, for diagnostics.
        command: String,
        /// The failure reason: a nonzero exit status or spawn error.
        reason: String,
    },
    /// A filesystem operation underlying a primitive failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// The path involved.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl DataplaneError {
    /// Build an [`DataplaneError::Io`] from a path and [`std::io::Error`].
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        DataplaneError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a [`DataplaneError::ExternalCommand`] from a rendered command line and reason.
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        DataplaneError::ExternalCommand {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for dataplane primitive results.
pub type DataplaneResult<T> = Result<T, DataplaneError>;
