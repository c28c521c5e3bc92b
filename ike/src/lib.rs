// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The IKE/SA monitor (§4.6): deduplicates IKE and CHILD SAs reported by the IKE daemon's event
//! stream, keeping the youngest of any duplicate pair and tolerating make-before-break rekeys.

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
mod monitor;
mod sa;

pub use control::IkeControl;
pub use errors::{IkeError, IkeResult, SaReapFailed};
pub use monitor::{DEFAULT_REKEY_WINDOW, SaMonitor, run};
pub use sa::{SaEvent, SaEventKind, SaId, SaKey, SaKind};

use tracectl::trace_target;
trace_target!("vpnc-ike", tracing::level_filters::LevelFilter::INFO, &["ike"]);
