// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Build the desired state of one network instance from a [`Snapshot`] (§4.5 step 1-2).
//!
//! [`NiPlan`] is a pure function of a `Snapshot` plus the allocator's per-connection prefix map:
//! no kernel or daemon state is consulted here. This mirrors the allocator's own "pure function of
//! its inputs" contract (`alloc::allocate_connection`) one layer up, and is what lets
//! `engine.rs` diff a freshly built plan against observed state instead of mutating as it goes.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use alloc::{AllocKey, ConnectionPrefixes};
use config::{
    Connection, ConnectionConfig, ConnId, IpNetSpec, NetworkInstance, NetworkInstanceId, TenantId,
};
use dataplane::addr::AddressSpec;
use dataplane::interface::{InterfacePropertiesSpec, InterfaceSpec, XfrmPropertiesSpec};
use dataplane::route::RouteSpec as KernelRouteSpec;
use ipnet::Ipv6Net;
use net::{AdminState, InterfaceName};
use tracing::warn;

use crate::driver_handle::AnyConnDesired;
use crate::errors::{ReconcilerError, ReconcilerResult};

/// The full desired state of one network instance (§4.5 step 1).
#[derive(Debug)]
pub struct NiPlan {
    /// The owning tenant.
    pub tenant: TenantId,
    /// This NI's id.
    pub ni: NetworkInstanceId,
    /// The bind-mount namespace name this NI's kernel state lives in, `ns_ensure`'s argument.
    pub netns_name: String,
    /// Per-connection plans, in ascending `ConnId` order (matching `NetworkInstance.connections`'s
    /// `BTreeMap` iteration, which the route tie-break below depends on).
    pub connections: Vec<ConnPlan>,
}

/// The desired state of a single connection within its NI (§4.4, §4.5).
#[derive(Debug, Clone)]
pub struct ConnPlan {
    /// The connection's id.
    pub id: ConnId,
    /// The link this connection's transport owns and the reconciler itself must create, if any.
    /// `None` for physical (pre-existing link, moved not created), WireGuard (owns its link via
    /// its own generic-netlink channel) and SSH (the kernel creates the `tun` device as a side
    /// effect of `ssh -w`).
    pub interface: Option<InterfaceSpec>,
    /// Addresses to bind to `interface`, empty when `interface` is `None`.
    pub addresses: Vec<AddressSpec>,
    /// Routes to install in this NI's namespace once the connection is active, after the
    /// overlap tie-break has suppressed any losers.
    pub routes: Vec<KernelRouteSpec>,
    /// The NAT64 `/96` to bind for this connection, if any of its routes needs v4-to-v6
    /// synthesis (§4.8).
    pub nat64: Option<Ipv6Net>,
    /// NPTv6 1:1 mappings to install: `(connection-side prefix, translated prefix)`.
    pub nptv6: Vec<(Ipv6Net, Ipv6Net)>,
    /// The transport-specific desired state, dispatched to the matching driver.
    pub driver: AnyConnDesired,
}

fn ipnet_spec_to_ip_and_len(spec: &IpNetSpec) -> (IpAddr, u8) {
    match spec {
        IpNetSpec::V4(n) => (IpAddr::V4(n.network()), n.prefix_len()),
        IpNetSpec::V6(n) => (IpAddr::V6(n.network()), n.prefix_len()),
    }
}

fn ipnet_spec_display(spec: &IpNetSpec) -> String {
    match spec {
        IpNetSpec::V4(n) => n.to_string(),
        IpNetSpec::V6(n) => n.to_string(),
    }
}

/// Mirrors `dns::rules::RewriteRule::rewrite_v6`'s bitmask idiom: mask both networks down to the
/// shorter of the two prefix lengths and compare the resulting network addresses.
fn networks_overlap(a: (IpAddr, u8), b: (IpAddr, u8)) -> bool {
    match (a.0, b.0) {
        (IpAddr::V4(a4), IpAddr::V4(b4)) => {
            let len = a.1.min(b.1);
            let mask: u32 = if len == 0 { 0 } else { !0u32 << (32 - u32::from(len)) };
            (u32::from(a4) & mask) == (u32::from(b4) & mask)
        }
        (IpAddr::V6(a6), IpAddr::V6(b6)) => {
            let len = a.1.min(b.1);
            let mask: u128 = if len == 0 { 0 } else { !0u128 << (128 - u32::from(len)) };
            (u128::from(a6) & mask) == (u128::from(b6) & mask)
        }
        _ => false,
    }
}

/// A connection/route pair admitted by the tie-break, kept around so later connections can be
/// checked against it.
struct AdmittedRoute {
    conn: ConnId,
    network: (IpAddr, u8),
}

/// XFRM `if_id`s must agree between this daemon's dataplane primitive and the IKE daemon's
/// connection config (§4.4). Downlink connections use the allocator's packed `if_id`
/// (`alloc::if_id`); connections in non-downlink NIs (`EXTERNAL`/`CORE`/`ENDPOINT`) don't
/// participate in the allocator algebra at all, so their `if_id` is instead derived from a
/// simple FNV-1a-style mix of their identity string, with the top bit forced high so it can
/// never collide with an allocator-derived id (those top out at bit 30, per `alloc::if_id`'s
/// `letter_bit << 30`).
fn fallback_if_id(tenant: &TenantId, ni: &NetworkInstanceId, conn: ConnId) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in format!("{tenant}/{ni}/{conn}").bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash | 0x8000_0000
}

fn connection_if_id(
    tenant: &TenantId,
    ni: &NetworkInstanceId,
    conn: ConnId,
    key: Option<AllocKey>,
) -> u32 {
    match key {
        Some(key) => alloc::if_id(key),
        None => fallback_if_id(tenant, ni, conn),
    }
}

fn xfrm_link_name(if_id: u32) -> Option<InterfaceName> {
    InterfaceName::try_from(format!("x{if_id:08x}")).ok()
}

fn host_address(pool: ipnet::Ipv4Net) -> Ipv4Addr {
    let mut octets = pool.network().octets();
    octets[3] = octets[3].wrapping_add(1);
    Ipv4Addr::from(octets)
}

fn host_address_v6(pool: Ipv6Net) -> Ipv6Addr {
    let mut segments = pool.network().segments();
    segments[7] = segments[7].wrapping_add(1);
    Ipv6Addr::from(segments)
}

/// Build the plan for one connection. `allocated` is this connection's `ConnectionPrefixes`, if
/// it participates in the allocator algebra at all (§4.2). `nptv6_pool` is the service's
/// `prefix_downlink_nptv6` pool, only consulted for routes carrying `nptv6=true` without an
/// explicit `nptv6_prefix` override.
#[allow(clippy::too_many_arguments)]
fn plan_connection(
    tenant: &TenantId,
    ni: &NetworkInstanceId,
    netns_name: &str,
    connection: &Connection,
    key: Option<AllocKey>,
    allocated: Option<&ConnectionPrefixes>,
    nptv6_pool: Ipv6Net,
) -> ReconcilerResult<ConnPlan> {
    let if_id = connection_if_id(tenant, ni, connection.id, key);

    let explicit = connection.interface_addrs.as_ref();
    let v4_addr = explicit
        .and_then(|a| a.v4)
        .or_else(|| allocated.map(|a| host_address(a.v4_iface)));
    let v6_addr = explicit
        .and_then(|a| a.v6)
        .or_else(|| allocated.map(|a| host_address_v6(a.v6_iface)));

    let mut routes = Vec::new();
    let mut nptv6 = Vec::new();
    let mut nat64 = None;
    for (idx, route) in connection.routes.iter().enumerate() {
        let (destination, prefix_len) = ipnet_spec_to_ip_and_len(&route.to);
        routes.push(KernelRouteSpec {
            destination,
            prefix_len,
            via: route.via,
        });

        if !route.to.is_v6() {
            if let Some(allocated) = allocated {
                nat64 = Some(allocated.nat64);
            }
            continue;
        }

        if !route.nptv6 {
            continue;
        }
        let IpNetSpec::V6(to_net) = route.to else {
            continue;
        };
        let dst = match route.nptv6_prefix {
            Some(explicit) => Some(explicit),
            None => match key {
                Some(key) => Some(
                    alloc::nptv6_prefix(
                        nptv6_pool,
                        key,
                        u16::try_from(idx).unwrap_or(u16::MAX),
                        route.to.prefix_len(),
                    )
                    .map_err(ReconcilerError::Allocator)?,
                ),
                None => None,
            },
        };
        if let Some(dst) = dst {
            nptv6.push((to_net, dst));
        }
    }

    let (interface, addresses, driver) = match &connection.config {
        ConnectionConfig::Ipsec(ipsec) => {
            let Some(link_name) = xfrm_link_name(if_id) else {
                return Err(ReconcilerError::UnplannableConnection {
                    tenant: tenant.to_string(),
                    ni: ni.to_string(),
                    conn: connection.id.to_u8(),
                    reason: "derived xfrm link name is not a legal interface name".to_string(),
                });
            };
            let spec = InterfaceSpec {
                name: link_name,
                mtu: None,
                admin_state: AdminState::Up,
                properties: InterfacePropertiesSpec::Xfrm(XfrmPropertiesSpec { if_id }),
            };
            let mut addrs = Vec::new();
            if let Some(v4) = v4_addr {
                addrs.push(AddressSpec {
                    address: IpAddr::V4(v4),
                    prefix_len: allocated.map_or(32, |a| a.v4_iface.prefix_len()),
                });
            }
            if let Some(v6) = v6_addr {
                addrs.push(AddressSpec {
                    address: IpAddr::V6(v6),
                    prefix_len: allocated.map_or(128, |a| a.v6_iface.prefix_len()),
                });
            }
            let traffic_selectors = if connection.has_traffic_selectors() {
                ipsec.traffic_selectors.as_ref().map(|ts| {
                    ts.iter()
                        .map(|sel| drivers::TrafficSelectorSpec {
                            local: ipnet_spec_display(&sel.local),
                            remote: ipnet_spec_display(&sel.remote),
                        })
                        .collect()
                })
            } else {
                None
            };
            let desired = drivers::IpsecDesired {
                name: format!("{tenant}-{ni}-{}", connection.id).to_lowercase(),
                if_id,
                remote_addrs: ipsec.remote_addrs.clone(),
                local_id: ipsec.local_id.clone(),
                remote_id: ipsec.remote_id.clone(),
                ike_proposal: ipsec.ike_proposal.clone(),
                ike_lifetime: ipsec.ike_lifetime,
                ipsec_proposal: ipsec.ipsec_proposal.clone(),
                ipsec_lifetime: ipsec.ipsec_lifetime,
                initiation: match ipsec.initiation {
                    config::Initiation::Start => drivers::Initiation::Start,
                    config::Initiation::None => drivers::Initiation::Trap,
                },
                psk: ipsec.psk.clone(),
                traffic_selectors,
            };
            (Some(spec), addrs, AnyConnDesired::Ipsec(desired))
        }
        ConnectionConfig::Wireguard(wg) => {
            let link_name = InterfaceName::try_from(format!("wg{if_id:08x}")).map_err(|e| {
                ReconcilerError::UnplannableConnection {
                    tenant: tenant.to_string(),
                    ni: ni.to_string(),
                    conn: connection.id.to_u8(),
                    reason: format!("wireguard link name: {e}"),
                }
            })?;
            let desired = drivers::WireguardDesired {
                link_name,
                local_port: wg.local_port,
                remote_addrs: wg.remote_addrs.clone(),
                remote_port: wg.remote_port,
                private_key: wg.private_key.clone(),
                public_key: wg.public_key.clone(),
            };
            (None, Vec::new(), AnyConnDesired::Wireguard(desired))
        }
        ConnectionConfig::Ssh(ssh) => {
            let desired = drivers::SshDesired {
                remote_addrs: ssh.remote_addrs.clone(),
                remote_tunnel_id: ssh.remote_tunnel_id,
                local_tunnel_id: connection.id.to_u8(),
                username: ssh.username.clone(),
                remote_config: ssh.remote_config,
                remote_config_interface: ssh.remote_config_interface.clone(),
            };
            (None, Vec::new(), AnyConnDesired::Ssh(desired))
        }
        ConnectionConfig::Physical(phys) => {
            let interface_name =
                InterfaceName::try_from(phys.interface_name.clone()).map_err(|e| {
                    ReconcilerError::UnplannableConnection {
                        tenant: tenant.to_string(),
                        ni: ni.to_string(),
                        conn: connection.id.to_u8(),
                        reason: format!("physical interface name: {e}"),
                    }
                })?;
            let desired = drivers::PhysicalDesired {
                interface_name,
                netns_path: std::path::PathBuf::from(format!("/var/run/netns/{netns_name}")),
            };
            (None, Vec::new(), AnyConnDesired::Physical(desired))
        }
    };

    Ok(ConnPlan {
        id: connection.id,
        interface,
        addresses,
        routes,
        nat64,
        nptv6,
        driver,
    })
}

/// Build the full desired-state plan for one network instance, applying the §4.5 route
/// tie-break across its connections (lowest `ConnId` wins; losers are suppressed and logged as
/// `RouteShadowed`).
pub fn build_ni_plan(
    tenant: &TenantId,
    ni_id: &NetworkInstanceId,
    ni: &NetworkInstance,
    nptv6_pool: Ipv6Net,
    allocated: &HashMap<(TenantId, NetworkInstanceId, ConnId), ConnectionPrefixes>,
) -> ReconcilerResult<NiPlan> {
    let netns_name = ni_id.as_str().to_string();
    let mut connections = Vec::new();
    let mut admitted: Vec<AdmittedRoute> = Vec::new();

    for connection in ni.connections.values() {
        let key = AllocKey::new(tenant, ni_id, connection.id);
        let allocated_prefixes = allocated.get(&(tenant.clone(), ni_id.clone(), connection.id));

        let mut plan = plan_connection(
            tenant,
            ni_id,
            &netns_name,
            connection,
            key,
            allocated_prefixes,
            nptv6_pool,
        )?;

        let mut kept_routes = Vec::with_capacity(plan.routes.len());
        for route in plan.routes {
            let candidate = (route.destination, route.prefix_len);
            if let Some(loser) = admitted
                .iter()
                .find(|a| networks_overlap(a.network, candidate))
            {
                warn!(
                    target: "reconciler",
                    tenant = %tenant,
                    ni = %ni_id,
                    winner = %loser.conn,
                    loser = %connection.id,
                    destination = %route.destination,
                    prefix_len = route.prefix_len,
                    "RouteShadowed"
                );
                continue;
            }
            admitted.push(AdmittedRoute {
                conn: connection.id,
                network: candidate,
            });
            kept_routes.push(route);
        }
        plan.routes = kept_routes;
        connections.push(plan);
    }

    Ok(NiPlan {
        tenant: tenant.clone(),
        ni: ni_id.clone(),
        netns_name,
        connections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ConnId;
    use std::net::IpAddr;

    #[test]
    fn overlapping_routes_keep_the_lower_connection_id() {
        let a = (IpAddr::V4("10.0.0.0".parse().unwrap()), 24);
        let b = (IpAddr::V4("10.0.0.128".parse().unwrap()), 25);
        assert!(networks_overlap(a, b));
    }

    #[tracing_test::traced_test]
    #[test]
    fn build_ni_plan_logs_route_shadowed_for_the_losing_connection() {
        let tenant = TenantId::try_from("C0001").unwrap();
        let ni_id = NetworkInstanceId::downlink(&tenant, 0);

        let mut ni = NetworkInstance {
            ni_type: config::NiType::Downlink,
            metadata: Default::default(),
            connections: Default::default(),
        };
        ni.connections.insert(
            ConnId::new(0),
            Connection {
                id: ConnId::new(0),
                interface_addrs: None,
                routes: vec![config::RouteSpec {
                    to: IpNetSpec::V4("10.0.0.0/24".parse().unwrap()),
                    via: None,
                    nptv6: false,
                    nptv6_prefix: None,
                }],
                config: ConnectionConfig::Physical(config::PhysicalConfig {
                    interface_name: "eth0".to_string(),
                }),
            },
        );
        ni.connections.insert(
            ConnId::new(1),
            Connection {
                id: ConnId::new(1),
                interface_addrs: None,
                routes: vec![config::RouteSpec {
                    to: IpNetSpec::V4("10.0.0.128/25".parse().unwrap()),
                    via: None,
                    nptv6: false,
                    nptv6_prefix: None,
                }],
                config: ConnectionConfig::Physical(config::PhysicalConfig {
                    interface_name: "eth1".to_string(),
                }),
            },
        );

        let nptv6_pool: Ipv6Net = "fdff::/12".parse().unwrap();
        let plan = build_ni_plan(&tenant, &ni_id, &ni, nptv6_pool, &HashMap::new()).unwrap();

        let conn0 = plan.connections.iter().find(|c| c.id == ConnId::new(0)).unwrap();
        let conn1 = plan.connections.iter().find(|c| c.id == ConnId::new(1)).unwrap();
        assert_eq!(conn0.routes.len(), 1, "lower connection id keeps its route");
        assert!(conn1.routes.is_empty(), "higher connection id's overlapping route is shadowed");
        assert!(tracing_test::internal::logs_with_scope_contain("reconciler", "RouteShadowed"));
    }

    #[test]
    fn disjoint_routes_do_not_overlap() {
        let a = (IpAddr::V4("10.0.0.0".parse().unwrap()), 24);
        let b = (IpAddr::V4("10.0.1.0".parse().unwrap()), 24);
        assert!(!networks_overlap(a, b));
    }

    #[test]
    fn v6_overlap_uses_shorter_prefix() {
        let a = (IpAddr::V6("fd00:1::".parse().unwrap()), 32);
        let b = (IpAddr::V6("fd00:1:2::".parse().unwrap()), 48);
        assert!(networks_overlap(a, b));
    }

    #[test]
    fn fallback_if_id_never_collides_with_allocator_range() {
        let tenant = TenantId::try_from("DEFAULT").unwrap();
        let ni = NetworkInstanceId::try_from("EXTERNAL").unwrap();
        let id = fallback_if_id(&tenant, &ni, ConnId::new(0));
        assert_eq!(id & 0x8000_0000, 0x8000_0000);
    }

    #[test]
    fn ipnet_display_matches_underlying_net_display() {
        let v4 = IpNetSpec::V4("10.0.0.0/24".parse().unwrap());
        assert_eq!(ipnet_spec_display(&v4), "10.0.0.0/24");
    }

    #[test]
    fn build_ni_plan_suppresses_the_higher_connection_id_on_overlap() {
        use config::{Connection, Mode, NiType, PhysicalConfig, RouteSpec, ServiceConfig};
        use std::collections::BTreeMap;

        let tenant = TenantId::try_from("C0001").unwrap();
        let ni_id = NetworkInstanceId::downlink(&tenant, 0);
        let route = RouteSpec {
            to: IpNetSpec::V4("10.0.0.0/24".parse().unwrap()),
            via: None,
            nptv6: false,
            nptv6_prefix: None,
        };
        let mut connections = BTreeMap::new();
        connections.insert(
            ConnId::new(0),
            Connection {
                id: ConnId::new(0),
                interface_addrs: None,
                routes: vec![route.clone()],
                config: ConnectionConfig::Physical(PhysicalConfig {
                    interface_name: "eth0".to_string(),
                }),
            },
        );
        connections.insert(
            ConnId::new(1),
            Connection {
                id: ConnId::new(1),
                interface_addrs: None,
                routes: vec![RouteSpec {
                    to: IpNetSpec::V4("10.0.0.128/25".parse().unwrap()),
                    ..route
                }],
                config: ConnectionConfig::Physical(PhysicalConfig {
                    interface_name: "eth1".to_string(),
                }),
            },
        );
        let ni = NetworkInstance {
            ni_type: NiType::Downlink,
            metadata: BTreeMap::new(),
            connections,
        };

        let _service = ServiceConfig {
            mode: Mode::Hub,
            prefixes: config::AllocatorPrefixes {
                prefix_downlink_interface_v4: "100.64.0.0/16".parse().unwrap(),
                prefix_downlink_interface_v6: "fd00:1::/32".parse().unwrap(),
                prefix_downlink_nat64: "fdcc:0::/32".parse().unwrap(),
                prefix_downlink_nptv6: "fdff::/12".parse().unwrap(),
            },
            bgp: config::BgpGlobals {
                asn: 4_200_000_001,
                router_id: "10.0.0.1".parse().unwrap(),
                bfd: false,
                neighbors: vec![],
            },
        };

        let plan = build_ni_plan(
            &tenant,
            &ni_id,
            &ni,
            "fdff::/12".parse().unwrap(),
            &HashMap::new(),
        )
        .unwrap();

        let total_routes: usize = plan.connections.iter().map(|c| c.routes.len()).sum();
        assert_eq!(total_routes, 1);
        assert_eq!(plan.connections[0].routes.len(), 1);
        assert!(plan.connections[1].routes.is_empty());
    }
}
