// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error kinds raised by the routing-daemon driver (§7 `DriverTransient`/`DriverFatal`).

use thiserror::Error;

/// Everything that can go wrong rendering, pushing, or polling routing-daemon config.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Writing the rendered config file failed.
    #[error("failed to write routing config to {path}: {source}")]
    Write {
        /// The path being written.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The control binary used to trigger a reload or poll neighbor state could not be run, or
    /// returned non-zero (§7 `DriverTransient`: "timeout/disconnect talking to ... the routing
    /// daemon").
    #[error("routing daemon control command `{command}` failed: {reason}")]
    Control {
        /// The command line that was run.
        command: String,
        /// The failure reason.
        reason: String,
    },
    /// The routing daemon's control binary accepted the command but rejected the configuration
    /// outright (§7 `DriverFatal`).
    #[error("routing daemon rejected the configuration: {0}")]
    Rejected(String),
}

/// Result alias for routing-daemon driver operations.
pub type RoutingResult<T> = Result<T, RoutingError>;
