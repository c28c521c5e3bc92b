// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The local read-only observability surface (§6): per-connection status, active NAT
//! translations, and BGP neighbor summary, served as JSON over a Unix domain socket.

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
mod server;
mod store;
mod types;

pub use errors::{StatusError, StatusResult};
pub use server::serve_unix;
pub use store::StatusStore;
pub use types::{
    BgpStatus, ConnStateView, ConnectionStatus, Nat64Entry, NatStatus, Nptv6Entry, ReapFailure,
    StatusSnapshot, TransportKind,
};

use tracectl::trace_target;
trace_target!("vpnc-status", tracing::level_filters::LevelFilter::INFO, &["status"]);
