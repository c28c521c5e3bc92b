// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors raised standing up the status/query surface (§6).

use thiserror::Error;

/// Everything that can go wrong serving the local read-only status endpoint.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The Unix socket could not be bound (stale socket file, permission denied, missing
    /// parent directory).
    #[error("failed to bind status socket at {path}: {source}")]
    Bind {
        /// The socket path that failed to bind.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The server loop itself failed after binding (rare: `axum::serve` only returns on I/O
    /// failure of the accept loop).
    #[error("status server error: {0}")]
    Serve(std::io::Error),
}

/// Result alias for status-surface operations.
pub type StatusResult<T> = Result<T, StatusError>;
