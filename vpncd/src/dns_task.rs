// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Recomputes DNS rewrite rules on every snapshot generation and pushes them through
//! [`crate::dns_control::CliDnsControl`] (§4.8). An NI that drops out of the rule set entirely
//! (no more NAT64/NPTv6 routes, or the NI itself is gone) gets its rules cleared rather than left
//! stale.

use std::collections::HashSet;

use config::{NetworkInstanceId, SnapshotRx, TenantId};
use dns::DnsControl;
use tokio::sync::watch;
use tracing::{error, info};

use crate::dns_control::CliDnsControl;

/// Run until `shutdown` reports `true`.
pub async fn run(control: CliDnsControl, mut snapshot_rx: SnapshotRx, mut shutdown: watch::Receiver<bool>) {
    let mut last_ruled: HashSet<(TenantId, NetworkInstanceId)> = HashSet::new();

    loop {
        tokio::select! {
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    info!("config snapshot channel closed, shutting down dns task");
                    break;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                last_ruled = reconcile_rules(&control, &snapshot, last_ruled).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn reconcile_rules(
    control: &CliDnsControl,
    snapshot: &config::Snapshot,
    last_ruled: HashSet<(TenantId, NetworkInstanceId)>,
) -> HashSet<(TenantId, NetworkInstanceId)> {
    let allocated = match alloc::allocate_all(snapshot) {
        Ok(allocated) => allocated,
        Err(e) => {
            error!(error = %e, "allocator rejected snapshot, skipping dns rule reload");
            return last_ruled;
        }
    };

    let rule_sets = dns::compute_rules(snapshot, &allocated);
    let mut current = HashSet::new();
    for set in &rule_sets {
        current.insert((set.tenant.clone(), set.ni.clone()));
        if let Err(e) = control.push_rules(&set.ni, &set.rules).await {
            error!(tenant = %set.tenant, ni = %set.ni, error = %e, "failed to push dns rewrite rules");
        }
    }

    for (tenant, ni) in last_ruled.difference(&current) {
        if let Err(e) = control.clear_rules(ni).await {
            error!(tenant = %tenant, ni = %ni, error = %e, "failed to clear dns rewrite rules");
        }
    }

    current
}
