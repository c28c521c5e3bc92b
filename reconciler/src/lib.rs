// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tenant/network-instance reconciliation (§4.5): build the desired state of each network
//! instance from a [`config::Snapshot`] plus the allocator's prefix map, then drive the kernel
//! and connection drivers towards it in the fixed order namespace, links, addresses, transport,
//! routes, NAT64/NPTv6.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod driver_handle;
mod engine;
mod errors;
mod lock;
mod plan;

pub use driver_handle::{AnyConnDesired, AnyConnDriver};
pub use engine::{DriverTable, apply_ni, teardown_ni};
pub use errors::{ReconcilerError, ReconcilerResult};
pub use lock::NiLockRegistry;
pub use plan::{ConnPlan, NiPlan, build_ni_plan};

use tracectl::trace_target;
trace_target!("vpnc-reconciler", tracing::level_filters::LevelFilter::INFO, &["reconciler"]);
