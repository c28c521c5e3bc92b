// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The DNS-doctor rule feeder (§4.8): computes NAT64/NPTv6 DNS rewrite rules for downlink
//! network instances and pushes them to the netfilter DNS hook's control channel.

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

mod control;
mod errors;
mod rules;

pub use control::DnsControl;
pub use errors::{DnsError, DnsResult};
pub use rules::{NiRewriteRules, RewriteRule, compute_rules};

use tracectl::trace_target;
trace_target!("vpnc-dns", tracing::level_filters::LevelFilter::INFO, &["dns"]);
