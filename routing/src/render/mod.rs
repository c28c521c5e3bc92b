// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Render a complete routing-daemon configuration from a [`Snapshot`] (§4.7).

pub mod bgp;
pub mod builder;
pub mod prefixlist;
pub mod routemap;

use std::collections::BTreeSet;

use alloc::ConnectionPrefixes;
use config::{NetworkInstanceId, NiType, Snapshot};
use ipnet::IpNet;

pub use builder::{ConfigBuilder, Render};
use prefixlist::{IpVer, PrefixList, PrefixListAction, PrefixListEntry, PrefixListMatchLen};

/// The management supernet management-path routes are drawn from (§4.7's worked example).
const MANAGEMENT_SUPERNET: &str = "fd00::/16";

/// The name of the core NI's VRF, used as the BGP instance's `vrf` clause.
const CORE_VRF: &str = NetworkInstanceId::CORE;

/// Build `UPLINK-PL-IN`: accepts management prefixes specific enough to identify individual
/// peers (§4.7).
#[must_use]
pub fn render_prefix_lists(allocated: &[ConnectionPrefixes]) -> ConfigBuilder {
    let inbound = PrefixList {
        name: "UPLINK-PL-IN".to_string(),
        ipver: IpVer::V6,
        entries: vec![PrefixListEntry {
            seq: 10,
            action: PrefixListAction::Permit,
            prefix: Some(MANAGEMENT_SUPERNET.parse().expect("valid constant")),
            len_match: Some(PrefixListMatchLen::Ge(128)),
        }],
    };

    let mut entries = vec![PrefixListEntry {
        seq: 10,
        action: PrefixListAction::Permit,
        prefix: Some("2000::/3".parse().expect("valid constant")),
        len_match: Some(PrefixListMatchLen::Ge(32)),
    }];
    let mut seq = 20;
    // NAT64 /96s and NPTv6 /48s in deterministic (sorted) order so the rendered config is stable
    // byte-for-byte across reconciliation passes (§8 invariant 1: idempotence).
    let nat64: BTreeSet<IpNet> = allocated.iter().map(|a| IpNet::V6(a.nat64)).collect();
    for prefix in nat64 {
        entries.push(PrefixListEntry {
            seq,
            action: PrefixListAction::Permit,
            prefix: Some(prefix),
            len_match: None,
        });
        seq += 10;
    }
    let outbound = PrefixList {
        name: "UPLINK-PL-OUT".to_string(),
        ipver: IpVer::V6,
        entries,
    };

    let mut cfg = ConfigBuilder::new();
    cfg += inbound.render(&());
    cfg += outbound.render(&());
    cfg
}

/// Render every neighbor's inbound/outbound route-maps (§4.7, §8 S6).
#[must_use]
pub fn render_route_maps(snapshot: &Snapshot) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    for neighbor in &snapshot.service.bgp.neighbors {
        let in_name = format!("UPLINK-RM-IN-{}", neighbor.address);
        let out_name = format!("UPLINK-RM-OUT-{}", neighbor.address);
        cfg += routemap::inbound_local_preference(&in_name, neighbor.priority).render(&());
        for entry in routemap::outbound_as_path_prepend(&out_name, snapshot.service.bgp.asn, neighbor.priority)
        {
            cfg += entry.render(&());
        }
    }
    cfg
}

/// Render the complete routing-daemon configuration for this snapshot: a BGP instance per core
/// NI, the uplink peer-group and neighbors, and the `UPLINK-PL-*`/`UPLINK-RM-*` prefix-lists and
/// route-maps derived from the allocator prefixes in use (§4.7).
///
/// `allocated` is every downlink connection's [`ConnectionPrefixes`], as produced by
/// [`alloc::allocate_all`].
#[must_use]
pub fn render_config(snapshot: &Snapshot, allocated: &[ConnectionPrefixes]) -> String {
    let mut cfg = ConfigBuilder::new();
    cfg += format!("! vpnc routing config, generation {}", snapshot.generation);
    cfg += "log stdout";
    cfg += render_prefix_lists(allocated);
    cfg += render_route_maps(snapshot);
    cfg += bgp::BgpInstance {
        vrf: CORE_VRF,
        globals: &snapshot.service.bgp,
    }
    .render(&());
    cfg.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{AllocatorPrefixes, BgpGlobals, BgpNeighbor, Mode};
    use std::net::Ipv4Addr;

    fn snapshot() -> Snapshot {
        Snapshot::empty(config::ServiceConfig {
            mode: Mode::Hub,
            prefixes: AllocatorPrefixes {
                prefix_downlink_interface_v4: "100.64.0.0/16".parse().unwrap(),
                prefix_downlink_interface_v6: "fd00:1::/32".parse().unwrap(),
                prefix_downlink_nat64: "fdcc:0::/32".parse().unwrap(),
                prefix_downlink_nptv6: "fdff::/12".parse().unwrap(),
            },
            bgp: BgpGlobals {
                asn: 4_200_000_001,
                router_id: Ipv4Addr::new(10, 0, 0, 1),
                bfd: false,
                neighbors: vec![
                    BgpNeighbor {
                        address: "fd00::1".parse().unwrap(),
                        asn: 4_200_000_000,
                        priority: 0,
                    },
                    BgpNeighbor {
                        address: "fd00::2".parse().unwrap(),
                        asn: 4_200_000_000,
                        priority: 1,
                    },
                ],
            },
        })
    }

    #[test]
    fn render_is_deterministic_across_identical_runs() {
        let snap = snapshot();
        let a = render_config(&snap, &[]);
        let b = render_config(&snap, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn render_includes_both_neighbors_and_their_route_maps() {
        let snap = snapshot();
        let out = render_config(&snap, &[]);
        assert!(out.contains("neighbor fd00::1 remote-as 4200000000"));
        assert!(out.contains("neighbor fd00::2 remote-as 4200000000"));
        assert!(out.contains("route-map UPLINK-RM-IN-fd00::1"));
        assert!(out.contains("route-map UPLINK-RM-IN-fd00::2"));
    }

    #[test]
    fn prefix_lists_include_global_unicast_and_nat64() {
        let allocated = vec![ConnectionPrefixes {
            v4_iface: "100.64.0.0/28".parse().unwrap(),
            v6_iface: "fd00:1::/64".parse().unwrap(),
            nat64: "fdcc:0:c:1:0::/96".parse().unwrap(),
        }];
        let out = render_prefix_lists(&allocated).finish();
        assert!(out.contains("permit 2000::/3 ge 32"));
        assert!(out.contains("permit fdcc:0:c:1:0::/96"));
    }
}
