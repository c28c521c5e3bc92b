// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The routing-daemon driver (§4.7): renders a routing-daemon config file from a [`Snapshot`],
//! reloads the daemon without restarting it, and polls/republishes neighbor state.

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

mod errors;
mod neighbor;
mod render;
mod reload;

pub use errors::{RoutingError, RoutingResult};
pub use neighbor::{NeighborState, NeighborStatus, poll_neighbors};
pub use render::{render_config, render_prefix_lists, render_route_maps};
pub use reload::reload;

use tracectl::trace_target;
trace_target!("vpnc-routing", tracing::level_filters::LevelFilter::INFO, &["routing"]);
