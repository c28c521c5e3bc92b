// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Drives the routing-daemon driver (§4.7): rerenders and reloads the config on every snapshot
//! generation, and polls neighbor state on its own interval, republishing to the status surface.
//!
//! Mirrors the teacher's long-lived-task-per-concern shape (`dataplane::main`'s gRPC server vs.
//! packet-forwarding split), generalized to "one task per external control surface."

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloc::ConnectionPrefixes;
use config::SnapshotRx;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::supervisor::Supervisor;

/// Configuration for the routing task, taken verbatim from CLI flags.
pub struct RoutingTaskConfig {
    /// Path the rendered config is written to before reload.
    pub config_path: PathBuf,
    /// Argv invoked to apply a written config (empty means "write only, no reload").
    pub reload_command: Vec<String>,
    /// Argv invoked to poll neighbor summary state.
    pub poll_command: Vec<String>,
    /// How often to poll neighbor state.
    pub poll_interval: Duration,
}

fn argv(command: &[String]) -> Vec<&str> {
    command.iter().map(String::as_str).collect()
}

/// Run until `shutdown` reports `true`: rerender+reload on every new snapshot, and poll neighbor
/// state on `config.poll_interval` regardless of whether the snapshot changed (§4.7 treats reload
/// and polling as independent schedules).
pub async fn run(
    supervisor: Arc<Supervisor>,
    mut snapshot_rx: SnapshotRx,
    config: RoutingTaskConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut poll_tick = tokio::time::interval(config.poll_interval);
    poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    info!("config snapshot channel closed, shutting down routing task");
                    break;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                reload_from_snapshot(&snapshot, &config).await;
            }
            _ = poll_tick.tick() => {
                poll_once(&supervisor, &config).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn reload_from_snapshot(snapshot: &config::Snapshot, config: &RoutingTaskConfig) {
    let allocated = match alloc::allocate_all(snapshot) {
        Ok(allocated) => allocated,
        Err(e) => {
            error!(error = %e, "allocator rejected snapshot, skipping routing reload");
            return;
        }
    };
    let prefixes: Vec<ConnectionPrefixes> = allocated.into_values().collect();
    let rendered = routing::render_config(snapshot, &prefixes);

    if config.reload_command.is_empty() {
        warn!("no routing reload command configured, writing config without reload");
    }
    let reload_argv = argv(&config.reload_command);
    if let Err(e) = routing::reload(&config.config_path, &rendered, &reload_argv).await {
        error!(error = %e, "routing config reload failed");
    } else {
        info!(generation = snapshot.generation, "routing config reloaded");
    }
}

async fn poll_once(supervisor: &Arc<Supervisor>, config: &RoutingTaskConfig) {
    if config.poll_command.is_empty() {
        return;
    }
    let poll_argv = argv(&config.poll_command);
    match routing::poll_neighbors(&poll_argv).await {
        Ok(neighbors) => supervisor.publish_bgp(neighbors).await,
        Err(e) => warn!(error = %e, "neighbor poll failed"),
    }
}
