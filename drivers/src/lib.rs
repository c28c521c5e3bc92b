// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-transport connection lifecycle drivers (§4.4): IPsec, WireGuard, SSH, and physical.
//!
//! Every driver implements the shared [`ConnectionDriver`] contract (`apply`/`observe`/
//! `teardown`) and reports into the same [`ConnState`] machine, mirroring the way
//! `dataplane::Manager<R>` generalizes reconciliation across interface kinds via a single trait
//! set: here the "kind" varies per connection transport instead of per interface kind.

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

mod driver;
mod errors;
mod ipsec;
mod physical;
mod ssh;
mod state;
mod wireguard;

pub use driver::ConnectionDriver;
pub use errors::{DriverError, DriverResult};
pub use ipsec::{
    Initiation, IpsecControl, IpsecDesired, IpsecDriver, SwanctlControl, TrafficSelectorSpec,
    render_conn,
};
pub use physical::{PhysicalDesired, PhysicalDriver};
pub use ssh::{SshDesired, SshDriver};
pub use state::ConnState;
pub use wireguard::{WireguardDesired, WireguardDriver};

use tracectl::trace_target;
trace_target!("vpnc-drivers", tracing::level_filters::LevelFilter::INFO, &["drivers"]);
