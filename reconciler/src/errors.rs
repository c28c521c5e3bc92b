// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reconciler-scoped errors (§7): wraps every subordinate crate's error type behind one
//! `thiserror::Error` enum, matching the granularity of `config::errors::ConfigError`.

use thiserror::Error;

use alloc::AllocError;
use dataplane::errors::DataplaneError;
use drivers::DriverError;

/// Everything that can go wrong while reconciling one network instance.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The allocator rejected the snapshot (wrong pool size or a genuine collision).
    #[error("allocator: {0}")]
    Allocator(#[from] AllocError),

    /// A kernel-facing primitive failed (link/address/route/namespace/NAT64/NPTv6).
    #[error("dataplane: {0}")]
    Dataplane(#[from] DataplaneError),

    /// A connection driver reported a fatal or transient failure.
    #[error("driver: {0}")]
    Driver(#[from] DriverError),

    /// A connection's `config` variant has no matching desired-state translation, e.g. because
    /// its `routes`/`traffic_selectors` combination was left un-validated upstream.
    #[error("connection {tenant}/{ni}/{conn} has no derivable desired state: {reason}")]
    UnplannableConnection {
        /// The owning tenant.
        tenant: String,
        /// The owning network instance.
        ni: String,
        /// The connection id.
        conn: u8,
        /// Why no plan could be derived.
        reason: String,
    },
}

/// Result alias for reconciler operations.
pub type ReconcilerResult<T> = Result<T, ReconcilerError>;
