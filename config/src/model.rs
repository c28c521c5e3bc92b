// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The VPNC data model (spec §3): tenants, network instances, connections and the
//! `DEFAULT` tenant's service-level configuration.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};

use crate::ids::{ConnId, NetworkInstanceId, TenantId};

/// The daemon's operating mode (§3, service config).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Hub mode: `C`/`D` tenants may own `downlink` network instances.
    Hub,
    /// Endpoint mode: only `E####` tenants are permitted, each owning an `ENDPOINT` NI.
    Endpoint,
}

/// The kind of a network instance (§3).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NiType {
    /// The tenant-`DEFAULT`-owned instance facing the tenant sites / internet.
    External,
    /// The tenant-`DEFAULT`-owned instance facing the management core.
    Core,
    /// A hub-mode downlink instance, owned by a `C`/`D` tenant.
    Downlink,
    /// An endpoint-mode instance, owned by an `E####` tenant.
    Endpoint,
}

/// A single IPsec/WireGuard/SSH/physical connection's route entry (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    /// The destination prefix (either family).
    pub to: IpNetSpec,
    /// The next hop, if the route isn't directly attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<IpAddr>,
    /// Whether this IPv6 route should additionally receive an allocator-assigned NPTv6
    /// sub-prefix. Only meaningful for IPv6 `to` prefixes.
    #[serde(default)]
    pub nptv6: bool,
    /// An explicit NPTv6 prefix overriding the allocator's derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nptv6_prefix: Option<Ipv6Net>,
}

/// Either an IPv4 or IPv6 network, serialized as a plain `a.b.c.d/n` or `a:b::/n` string.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpNetSpec {
    /// An IPv4 prefix.
    V4(Ipv4Net),
    /// An IPv6 prefix.
    V6(Ipv6Net),
}

impl IpNetSpec {
    /// The prefix length, regardless of family.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        match self {
            IpNetSpec::V4(n) => n.prefix_len(),
            IpNetSpec::V6(n) => n.prefix_len(),
        }
    }

    /// `true` if this is an IPv6 prefix.
    #[must_use]
    pub fn is_v6(&self) -> bool {
        matches!(self, IpNetSpec::V6(_))
    }
}

/// IKE protocol version (§3: `ike_version=2` is the only supported value today).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IkeVersion {
    /// IKEv2.
    V2,
}

/// Whether an IPsec connection is initiated locally or only accepted (trap) (§3, §4.4).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiation {
    /// Initiate the connection proactively (`start`/`close` actions).
    Start,
    /// Never initiate; only respond (`trap` action).
    None,
}

/// IKE/IPsec traffic selector, used only when `routes` is not set (§3, mutually exclusive).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficSelector {
    /// Local traffic selector prefix.
    pub local: IpNetSpec,
    /// Remote traffic selector prefix.
    pub remote: IpNetSpec,
}

/// `config.ipsec` connection parameters (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpsecConfig {
    /// Remote peer addresses, tried in order.
    pub remote_addrs: Vec<IpAddr>,
    /// Local IKE identity, if not the local address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Remote IKE identity, if not the remote address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// IKE protocol version.
    #[serde(default = "default_ike_version")]
    pub ike_version: IkeVersion,
    /// IKE SA proposal string (e.g. `aes256-sha256-modp2048`).
    pub ike_proposal: String,
    /// IKE SA lifetime, in seconds.
    pub ike_lifetime: u32,
    /// CHILD SA proposal string.
    pub ipsec_proposal: String,
    /// CHILD SA lifetime, in seconds.
    pub ipsec_lifetime: u32,
    /// Whether this side initiates or only responds.
    #[serde(default = "default_initiation")]
    pub initiation: Initiation,
    /// Pre-shared key.
    pub psk: String,
    /// Explicit traffic selectors. Mutually exclusive with the connection's `routes` (§4.1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_selectors: Option<Vec<TrafficSelector>>,
}

const fn default_ike_version() -> IkeVersion {
    IkeVersion::V2
}
const fn default_initiation() -> Initiation {
    Initiation::Start
}

/// `config.wireguard` connection parameters (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireguardConfig {
    /// Local UDP port to bind, or kernel-assigned if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    /// Remote peer addresses, tried in order to find one that's reachable.
    pub remote_addrs: Vec<IpAddr>,
    /// Remote peer UDP port.
    pub remote_port: u16,
    /// Local WireGuard private key (base64).
    pub private_key: String,
    /// Remote peer's public key (base64).
    pub public_key: String,
}

/// `config.ssh` connection parameters (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// Remote peer addresses, tried in order.
    pub remote_addrs: Vec<IpAddr>,
    /// The tunnel device id on the remote side (`ssh -w local:remote`).
    pub remote_tunnel_id: u8,
    /// SSH username.
    pub username: String,
    /// Whether the driver should push forwarding rules to the remote host.
    #[serde(default)]
    pub remote_config: bool,
    /// Interface name on the remote host the pushed forwarding rules should bind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_config_interface: Option<String>,
}

/// `config.physical` connection parameters (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysicalConfig {
    /// The name of the pre-existing link to move into the NI.
    pub interface_name: String,
}

/// The tagged `config` variant of a [`Connection`] (§3): exactly one transport per connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum ConnectionConfig {
    /// Move an existing link into the NI.
    Physical(PhysicalConfig),
    /// Route-based IPsec via the IKE daemon.
    Ipsec(IpsecConfig),
    /// A WireGuard tunnel.
    Wireguard(WireguardConfig),
    /// An SSH tunnel device, supervised by `autossh`/`ssh -w`.
    Ssh(SshConfig),
}

/// Per-family interface addresses explicitly assigned to a connection's link.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceAddrs {
    /// Explicit IPv4 interface address, overriding the allocator's pool assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v4: Option<Ipv4Addr>,
    /// Explicit IPv6 interface address, overriding the allocator's pool assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v6: Option<Ipv6Addr>,
}

/// A single connection within a network instance (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connection {
    /// The connection's numeric id, unique within its NI.
    pub id: ConnId,
    /// Explicit per-family interface addresses, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_addrs: Option<InterfaceAddrs>,
    /// Routes to install once the connection is active.
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    /// The transport-specific configuration. Its variant determines which driver owns this
    /// connection's link.
    pub config: ConnectionConfig,
}

impl Connection {
    /// `true` if this connection's config carries IPsec traffic selectors.
    #[must_use]
    pub fn has_traffic_selectors(&self) -> bool {
        matches!(
            &self.config,
            ConnectionConfig::Ipsec(IpsecConfig {
                traffic_selectors: Some(ts),
                ..
            }) if !ts.is_empty()
        )
    }
}

/// A network instance: an isolated routing domain, 1:1 with a network namespace (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkInstance {
    /// This NI's kind.
    #[serde(rename = "type")]
    pub ni_type: NiType,
    /// Free-form metadata (name, description, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// This NI's connections, keyed by connection id. A `BTreeMap` keeps iteration order
    /// deterministic, which the route tie-break (§4.5) and idempotent replay both depend on.
    #[serde(default)]
    pub connections: BTreeMap<ConnId, Connection>,
}

/// A tenant: an administrative unit owning a set of network instances (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tenant {
    /// This tenant's id, which must match the YAML filename it was loaded from.
    pub id: TenantId,
    /// A human-readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// This tenant's network instances, keyed by NI id.
    #[serde(default)]
    pub network_instances: BTreeMap<NetworkInstanceId, NetworkInstance>,
}

/// One configured BGP neighbor (§3, service config).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BgpNeighbor {
    /// Neighbor address.
    pub address: IpAddr,
    /// Neighbor ASN.
    pub asn: u32,
    /// Neighbor priority, `0..=9`; lower is preferred (§4.7, §8 S6).
    pub priority: u8,
}

/// Service-level BGP globals (§3, service config).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BgpGlobals {
    /// Local ASN, restricted to the private 4-byte range `4.2e9..4.29e9` per §3.
    pub asn: u32,
    /// BGP router id.
    pub router_id: Ipv4Addr,
    /// Whether to enable BFD on uplink sessions.
    #[serde(default)]
    pub bfd: bool,
    /// Configured uplink neighbors.
    #[serde(default)]
    pub neighbors: Vec<BgpNeighbor>,
}

/// The four allocator prefixes carried in the `DEFAULT` service config (§3, §4.2).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocatorPrefixes {
    /// `/16` pool for downlink interface IPv4 addresses.
    pub prefix_downlink_interface_v4: Ipv4Net,
    /// `/32` pool for downlink interface IPv6 addresses.
    pub prefix_downlink_interface_v6: Ipv6Net,
    /// `/32` pool for per-connection NAT64 `/96`s.
    pub prefix_downlink_nat64: Ipv6Net,
    /// `/12` pool for per-route NPTv6 sub-prefixes.
    pub prefix_downlink_nptv6: Ipv6Net,
}

/// The `DEFAULT` tenant's service-level configuration (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Daemon operating mode.
    pub mode: Mode,
    /// Allocator prefix pools.
    #[serde(flatten)]
    pub prefixes: AllocatorPrefixes,
    /// BGP globals and neighbor list.
    pub bgp: BgpGlobals,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_config_is_internally_tagged() {
        let yaml = "type: wireguard\nremote_addrs: [\"192.0.2.8\"]\nremote_port: 51820\nprivate_key: a\npublic_key: b\n";
        let cfg: ConnectionConfig = serde_yaml_ng::from_str(yaml).expect("should parse");
        assert!(matches!(cfg, ConnectionConfig::Wireguard(_)));
    }

    #[test]
    fn connection_config_rejects_unknown_fields() {
        let yaml = "type: wireguard\nremote_addrs: [\"192.0.2.8\"]\nremote_port: 51820\nprivate_key: a\npublic_key: b\nbogus: true\n";
        let result: Result<ConnectionConfig, _> = serde_yaml_ng::from_str(yaml);
        assert!(result.is_err());
    }
}
