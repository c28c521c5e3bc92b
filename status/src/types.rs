// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The content of the status/query surface (§6): per-connection status, active NAT
//! translations, and BGP neighbor summary.

use std::net::IpAddr;

use config::{ConnId, NetworkInstanceId, TenantId};
use drivers::ConnState;
use ipnet::Ipv6Net;
use ike::{SaId, SaKey};
use routing::NeighborStatus;
use serde::Serialize;

/// Which transport a connection uses, mirroring `config::ConnectionConfig`'s variants without
/// dragging the full configuration (keys, proposals) into a read-only status response.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// A moved-in physical link.
    Physical,
    /// An IPsec/IKEv2 tunnel.
    Ipsec,
    /// A WireGuard tunnel.
    Wireguard,
    /// An SSH tunnel.
    Ssh,
}

/// A JSON-friendly projection of [`ConnState`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnStateView {
    /// No configuration has been installed.
    Idle,
    /// Configuration is installed, transport not yet asked to connect.
    Configured,
    /// Transport asked to establish, outcome not yet known.
    Connecting,
    /// Transport reports the connection up.
    Active,
    /// Transport reports the connection lost; retried with backoff.
    Degraded,
}

impl From<ConnState> for ConnStateView {
    fn from(value: ConnState) -> Self {
        match value {
            ConnState::Idle => ConnStateView::Idle,
            ConnState::Configured => ConnStateView::Configured,
            ConnState::Connecting => ConnStateView::Connecting,
            ConnState::Active => ConnStateView::Active,
            ConnState::Degraded => ConnStateView::Degraded,
        }
    }
}

/// One connection's status summary (§6: "tenant, ni, connection, type, state, interface,
/// addresses, remote").
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionStatus {
    /// The owning tenant.
    pub tenant: TenantId,
    /// The owning network instance.
    pub ni: NetworkInstanceId,
    /// The connection id.
    pub conn: ConnId,
    /// Which transport this connection uses.
    pub transport: TransportKind,
    /// Current lifecycle state.
    pub state: ConnStateView,
    /// This connection's link name, if the reconciler (not the driver) owns its creation.
    pub interface: Option<String>,
    /// Interface addresses bound to `interface`.
    pub addresses: Vec<IpAddr>,
    /// Remote peer addresses, as configured.
    pub remote: Vec<IpAddr>,
    /// A human-readable reason, set when `state` is [`ConnStateView::Degraded`] or the driver
    /// otherwise has something to report (§7 `DriverFatal`: "connection stays `CONFIGURED` with
    /// reason").
    pub reason: Option<String>,
}

/// One NAT64 `/96` currently bound to a connection (§6: "active NAT translations").
#[derive(Clone, Debug, Serialize)]
pub struct Nat64Entry {
    /// The owning tenant.
    pub tenant: TenantId,
    /// The owning network instance.
    pub ni: NetworkInstanceId,
    /// The connection id.
    pub conn: ConnId,
    /// The bound NAT64 `/96`.
    pub prefix: Ipv6Net,
}

/// One NPTv6 1:1 mapping currently installed for a connection's route.
#[derive(Clone, Debug, Serialize)]
pub struct Nptv6Entry {
    /// The owning tenant.
    pub tenant: TenantId,
    /// The owning network instance.
    pub ni: NetworkInstanceId,
    /// The connection id.
    pub conn: ConnId,
    /// The connection-side prefix.
    pub from: Ipv6Net,
    /// The translated (uplink-facing) prefix.
    pub to: Ipv6Net,
}

/// Active NAT translations in use across every network instance (§6).
#[derive(Clone, Debug, Default, Serialize)]
pub struct NatStatus {
    /// NAT64 `/96`s currently bound.
    pub nat64: Vec<Nat64Entry>,
    /// NPTv6 `/48`s currently installed.
    pub nptv6: Vec<Nptv6Entry>,
}

/// A reap failure, pushed from [`ike::SaMonitor`] onto the status surface on retry exhaustion
/// (§7 `SAReapFailed`).
#[derive(Clone, Debug, Serialize)]
pub struct ReapFailure {
    /// The connection identity's local IKE id, if configured.
    pub local_id: Option<String>,
    /// The connection identity's remote IKE id, if configured.
    pub remote_id: Option<String>,
    /// The XFRM `if_id` correlating the IKE_SA/CHILD_SA pair.
    pub if_id: u32,
    /// The SA that could not be reaped.
    pub sa_id: String,
    /// The control channel's last rejection reason.
    pub reason: String,
}

impl ReapFailure {
    /// Project an [`ike::SaReapFailed`] report into its status-surface view.
    #[must_use]
    pub fn from_report(key: &SaKey, sa_id: &SaId, reason: &str) -> Self {
        ReapFailure {
            local_id: key.local_id.clone(),
            remote_id: key.remote_id.clone(),
            if_id: key.if_id,
            sa_id: sa_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// BGP neighbor summary (§6).
#[derive(Clone, Debug, Default, Serialize)]
pub struct BgpStatus {
    /// Last-polled state of every configured neighbor.
    pub neighbors: Vec<NeighborStatus>,
}

/// The full published status, last-writer-wins per §5's coalescing policy for read-only state.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StatusSnapshot {
    /// The config generation this status was computed against.
    pub generation: u64,
    /// Per-connection status.
    pub connections: Vec<ConnectionStatus>,
    /// Active NAT translations.
    pub nat: NatStatus,
    /// BGP neighbor summary.
    pub bgp: BgpStatus,
    /// Outstanding SA-reap failures, most recent last.
    pub reap_failures: Vec<ReapFailure>,
}
