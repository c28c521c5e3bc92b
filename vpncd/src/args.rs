// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command-line surface for the `vpncd` binary, mirroring the flag/default style of the
//! teacher's own `CmdArgs` (config paths, a status/grpc-style listen address, log level, and a
//! tracing-control flag), narrowed to what a control-plane daemon (no packet driver, no EAL)
//! needs.

pub use clap::Parser;

/// `vpncd` process arguments.
#[derive(Parser, Debug)]
#[command(name = "vpncd")]
#[command(version)]
#[command(about = "VPNC control-plane daemon", long_about = None)]
pub struct CmdArgs {
    /// Root directory holding `active/` and `candidate/` tenant configuration.
    #[arg(long, value_name = "DIR", default_value = "/opt/ncubed/config/vpnc")]
    pub config_dir: std::path::PathBuf,

    /// Unix socket path for the read-only status/query endpoint (§6).
    #[arg(long, value_name = "PATH", default_value = "/run/ncubed/vpnc/status.sock")]
    pub status_sock: std::path::PathBuf,

    /// Path to the rendered routing-daemon configuration file (§4.7).
    #[arg(long, value_name = "PATH", default_value = "/etc/frr/vpnc.conf")]
    pub routing_config_path: std::path::PathBuf,

    /// Command run to ask the routing daemon to reload `routing_config_path` without
    /// restarting, split on whitespace (e.g. `/usr/lib/frr/frr-reload.py --reload`).
    #[arg(long, value_name = "CMD", default_value = "/usr/lib/frr/frr-reload.py --reload")]
    pub routing_reload_command: String,

    /// Command run to poll the routing daemon's neighbor table as JSON, split on whitespace.
    #[arg(long, value_name = "CMD", default_value = "vtysh -c show bgp neighbors json")]
    pub routing_poll_command: String,

    /// How often to poll routing-daemon neighbor state.
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    pub routing_poll_interval_secs: u64,

    /// `swanctl`-compatible binary used to load/unload/initiate/terminate IPsec connections and
    /// to reap duplicate SAs (§4.4, §4.6).
    #[arg(long, value_name = "BINARY", default_value = "swanctl")]
    pub swanctl_binary: String,

    /// Unix socket the IKE daemon publishes its SA event stream on, as newline-delimited JSON
    /// (§4.6: "modeled as an async `Stream` of `SaEvent` values").
    #[arg(long, value_name = "PATH", default_value = "/run/ncubed/vpnc/ike-events.sock")]
    pub ike_events_sock: std::path::PathBuf,

    /// Control binary used to push/clear the netfilter DNS hook's rewrite rules (§4.8).
    #[arg(long, value_name = "BINARY", default_value = "vpnc-dns-hookctl")]
    pub dns_hook_binary: String,

    /// Upper bound on network instances reconciled concurrently (§5: "small pool of
    /// cooperative workers").
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub max_concurrent_nis: usize,

    /// Default timeout for external commands issued by drivers and the routing/DNS/IKE control
    /// clients (§5: "every external command has a 10s default timeout").
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    pub command_timeout_secs: u64,

    #[arg(
        long,
        value_name = "tracing configuration",
        help = "Tracing config string as comma-separated sequence of tag=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level.
Passing all=level allows setting the log-level of all targets to level.
E.g. default=error,all=info,reconciler=debug will set the default target to error, and all registered targets to info, but enable debug for reconciler"
    )]
    pub tracing: Option<String>,

    /// Show the available tracing tags and exit.
    #[arg(long, default_value_t = false)]
    pub show_tracing_tags: bool,
}
