// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tenant/service configuration: schema, validation, the on-disk store and its watcher (§3, §4.1).

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod display;
pub mod errors;
pub mod ids;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod validate;
pub mod watch;

pub use errors::{ConfigError, ConfigResult};
pub use ids::{ConnId, NetworkInstanceId, TenantId, TenantRole};
pub use model::{
    AllocatorPrefixes, BgpGlobals, BgpNeighbor, Connection, ConnectionConfig, IkeVersion,
    Initiation, InterfaceAddrs, IpNetSpec, IpsecConfig, Mode, NetworkInstance, NiType,
    PhysicalConfig, RouteSpec, ServiceConfig, SshConfig, Tenant, TrafficSelector, WireguardConfig,
};
pub use snapshot::{Snapshot, SnapshotDiff, SnapshotDiffEntry};
pub use store::{CommitOptions, CommitOutcome, Store};
pub use watch::{SnapshotRx, watch_active};

use tracectl::trace_target;
trace_target!("config", tracing::level_filters::LevelFilter::INFO, &["config"]);
