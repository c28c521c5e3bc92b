// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP instance, uplink peer-group, and per-neighbor rendering (§4.7).

use config::BgpGlobals;

use super::builder::{ConfigBuilder, Render};

/// The uplink peer-group's name, shared by every neighbor.
pub const UPLINK_PEER_GROUP: &str = "UPLINK";

/// Render the `router bgp <asn>` instance for a core network instance, with the uplink
/// peer-group (timers 10/30, advertisement-interval 0, optional BFD) and one neighbor per
/// configured peer, each bound to `UPLINK-PL-IN`/`OUT` and its own in/out route-maps.
pub struct BgpInstance<'a> {
    /// The VRF this instance belongs to (the core NI's namespace name).
    pub vrf: &'a str,
    /// Service-level BGP globals and neighbor list.
    pub globals: &'a BgpGlobals,
}

impl Render for BgpInstance<'_> {
    type Context = ();

    fn render(&self, (): &Self::Context) -> ConfigBuilder {
        let mut cfg = ConfigBuilder::new();
        cfg += format!(
            "router bgp {} vrf {}",
            self.globals.asn, self.vrf
        );
        cfg += format!(" bgp router-id {}", self.globals.router_id);
        cfg += format!(" neighbor {UPLINK_PEER_GROUP} peer-group");
        cfg += format!(" neighbor {UPLINK_PEER_GROUP} timers 10 30");
        cfg += format!(" neighbor {UPLINK_PEER_GROUP} advertisement-interval 0");
        if self.globals.bfd {
            cfg += format!(" neighbor {UPLINK_PEER_GROUP} bfd");
        }
        for neighbor in &self.globals.neighbors {
            let addr = neighbor.address;
            cfg += format!(" neighbor {addr} peer-group {UPLINK_PEER_GROUP}");
            cfg += format!(" neighbor {addr} remote-as {}", neighbor.asn);
            cfg += " address-family ipv6 unicast";
            cfg += format!("  neighbor {addr} activate");
            cfg += format!(
                "  neighbor {addr} prefix-list UPLINK-PL-IN in"
            );
            cfg += format!(
                "  neighbor {addr} prefix-list UPLINK-PL-OUT out"
            );
            cfg += format!(
                "  neighbor {addr} route-map UPLINK-RM-IN-{addr} in"
            );
            cfg += format!(
                "  neighbor {addr} route-map UPLINK-RM-OUT-{addr} out"
            );
            cfg += " exit-address-family";
        }
        cfg += "exit";
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::BgpNeighbor;
    use std::net::Ipv4Addr;

    fn globals() -> BgpGlobals {
        BgpGlobals {
            asn: 4_200_000_001,
            router_id: Ipv4Addr::new(10, 0, 0, 1),
            bfd: true,
            neighbors: vec![BgpNeighbor {
                address: "fd00::1".parse().unwrap(),
                asn: 4_200_000_000,
                priority: 0,
            }],
        }
    }

    #[test]
    fn renders_peer_group_timers_and_bfd() {
        let globals = globals();
        let instance = BgpInstance {
            vrf: "CORE",
            globals: &globals,
        };
        let rendered = instance.render(&()).finish();
        assert!(rendered.contains("neighbor UPLINK timers 10 30"));
        assert!(rendered.contains("neighbor UPLINK advertisement-interval 0"));
        assert!(rendered.contains("neighbor UPLINK bfd"));
        assert!(rendered.contains("neighbor fd00::1 remote-as 4200000000"));
    }
}
