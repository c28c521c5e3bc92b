// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `vpncd`: the VPNC control-plane daemon (§4.9). Watches tenant configuration, reconciles every
//! network instance's kernel and driver state against it, drives the routing daemon and the
//! netfilter DNS hook, deduplicates IKE/CHILD SAs, and serves a read-only status surface.
//!
//! Startup order and shutdown handling follow the teacher's `dataplane::main` shape: parse args,
//! install tracing, bring up every long-lived task, then block until asked to stop.

mod args;
mod dns_control;
mod dns_task;
mod error;
mod ike_control;
mod ike_events;
mod ike_task;
mod routing_task;
mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use args::{CmdArgs, Parser};
use dataplane::Manager;
use dataplane::interface::Interface;
use error::VpncResult;
use routing_task::RoutingTaskConfig;
use supervisor::Supervisor;
use tracectl::{LevelFilter, get_trace_ctl};
use tracing::{error, info, warn};

fn apply_tracing_config(spec: &str) {
    let ctl = get_trace_ctl();
    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((tag, level)) = entry.split_once('=') else {
            warn!(entry, "ignoring malformed tracing config entry, expected tag=level");
            continue;
        };
        let Ok(level) = level.trim().parse::<LevelFilter>() else {
            warn!(entry, "ignoring tracing config entry with unparseable level");
            continue;
        };
        match tag.trim() {
            "default" => ctl.set_default_level(level),
            "all" => {
                for known_tag in ctl.get_tags() {
                    ctl.set_tag_level(known_tag, level);
                }
            }
            tag => ctl.set_tag_level(tag, level),
        }
    }
}

async fn build_root_manager() -> std::io::Result<Manager<Interface>> {
    let (connection, handle, _) = rtnetlink::new_connection()?;
    tokio::spawn(connection);
    Ok(Manager::new(Arc::new(handle)))
}

fn split_argv(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = CmdArgs::parse();

    tracectl::TracingControl::init();
    let ctl = get_trace_ctl();
    if let Some(spec) = &args.tracing {
        apply_tracing_config(spec);
    }
    if args.show_tracing_tags {
        let mut tags: Vec<&str> = ctl.get_tags().into_iter().collect();
        tags.sort_unstable();
        for tag in tags {
            println!("{tag}");
        }
        return std::process::ExitCode::SUCCESS;
    }

    info!(config_dir = %args.config_dir.display(), "starting vpncd");

    match run(&args).await {
        Ok(()) => {
            info!("vpncd shut down");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "vpncd exiting");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Bring up every long-lived task and block until a shutdown signal is received, then tear
/// everything down and return. Any failure before the daemon is fully up is surfaced through the
/// single [`VpncError`] return path (§7: a top-level aggregate over every subordinate crate's
/// error enum), mirroring the teacher's own `ApiError`-aggregates-one-layer-down shape.
async fn run(args: &CmdArgs) -> VpncResult<()> {
    let active_dir = args.config_dir.join("active");
    let store = config::Store::open(&args.config_dir)?;
    let snapshot_rx = config::watch_active(store, active_dir)?;
    let root_manager = build_root_manager().await?;

    let status_store = Arc::new(status::StatusStore::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let status_task = {
        let status_store = status_store.clone();
        let socket_path: PathBuf = args.status_sock.clone();
        tokio::spawn(async move {
            if let Err(e) = status::serve_unix(&socket_path, status_store).await {
                error!(error = %e, "status endpoint exited");
            }
        })
    };

    let supervisor = Arc::new(Supervisor::new(root_manager, status_store, args.max_concurrent_nis));
    let supervisor_task = {
        let supervisor = supervisor.clone();
        let snapshot_rx = snapshot_rx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { supervisor.run(snapshot_rx, shutdown_rx).await })
    };

    let command_timeout = Duration::from_secs(args.command_timeout_secs);

    let routing_task = {
        let supervisor = supervisor.clone();
        let snapshot_rx = snapshot_rx.clone();
        let shutdown_rx = shutdown_rx.clone();
        let config = RoutingTaskConfig {
            config_path: args.routing_config_path.clone(),
            reload_command: split_argv(&args.routing_reload_command),
            poll_command: split_argv(&args.routing_poll_command),
            poll_interval: Duration::from_secs(args.routing_poll_interval_secs),
        };
        tokio::spawn(async move { routing_task::run(supervisor, snapshot_rx, config, shutdown_rx).await })
    };

    let ike_task = {
        let supervisor = supervisor.clone();
        let events_sock = args.ike_events_sock.clone();
        let swanctl_binary = args.swanctl_binary.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            ike_task::run(supervisor, events_sock, swanctl_binary, command_timeout, shutdown_rx).await;
        })
    };

    let dns_task = {
        let control = dns_control::CliDnsControl::new(args.dns_hook_binary.clone(), command_timeout);
        let snapshot_rx = snapshot_rx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { dns_task::run(control, snapshot_rx, shutdown_rx).await })
    };

    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl-c handler, shutting down immediately");
    } else {
        info!("received shutdown signal");
    }
    let _ = shutdown_tx.send(true);

    if let Err(e) = supervisor_task.await {
        warn!(error = %e, "reconcile loop task panicked");
    }
    for task in [routing_task, ike_task, dns_task] {
        if let Err(e) = task.await {
            warn!(error = %e, "background task panicked");
        }
    }
    status_task.abort();

    Ok(())
}
