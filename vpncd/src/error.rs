// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The supervisor's top-level error type (§7): aggregates every subordinate crate's error enum
//! behind one `thiserror::Error`, the way `dataplane-mgmt::rpc::ApiError` aggregates
//! `ConfigError` one layer below the gRPC boundary.

use thiserror::Error;

use config::ConfigError;
use dns::DnsError;
use ike::IkeError;
use reconciler::ReconcilerError;
use routing::RoutingError;
use status::StatusError;

/// Everything that can surface out of the supervisor's single `Result`-returning entry point.
#[derive(Debug, Error)]
pub enum VpncError {
    /// The config store or its watcher failed.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// A network instance could not be reconciled.
    #[error("reconciler: {0}")]
    Reconciler(#[from] ReconcilerError),

    /// The IKE/SA monitor's control channel failed outside its own retry budget.
    #[error("ike: {0}")]
    Ike(#[from] IkeError),

    /// The routing-daemon driver failed to render, write, or reload its configuration.
    #[error("routing: {0}")]
    Routing(#[from] RoutingError),

    /// The DNS-doctor control channel failed.
    #[error("dns: {0}")]
    Dns(#[from] DnsError),

    /// The status/query endpoint failed to bind or serve.
    #[error("status: {0}")]
    Status(#[from] StatusError),

    /// The root-namespace netlink handle could not be opened at startup.
    #[error("failed to open root-namespace netlink handle: {0}")]
    Netlink(#[from] std::io::Error),
}

/// Result alias for the supervisor's top-level operations.
pub type VpncResult<T> = Result<T, VpncError>;
