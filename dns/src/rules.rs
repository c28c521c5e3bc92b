// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Rewrite-rule computation for the netfilter DNS hook (§4.8).
//!
//! "A records whose answer lies in `remote_v4_net` are returned as AAAA in `nat64_v6 +
//! a.b.c.d`; AAAA records whose answer lies in `remote_v6_net` are rewritten to `nptv6_v6 +
//! suffix`." This module computes that rule set per downlink NI; pushing it over the control
//! channel is [`crate::control::DnsControl`]'s job.

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr};

use alloc::{AllocKey, ConnectionPrefixes, nptv6_prefix};
use ipnet::{Ipv4Net, Ipv6Net};

use config::{ConnId, IpNetSpec, NetworkInstanceId, NiType, Snapshot, TenantId};

/// One rewrite rule the DNS hook applies to answers it intercepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteRule {
    /// An A record whose address falls in `match_v4` is synthesized into an AAAA answer in
    /// `nat64_v6`.
    Nat64Synthesis {
        /// The remote v4 network this rule applies to.
        match_v4: Ipv4Net,
        /// The connection's NAT64 /96.
        nat64_v6: Ipv6Net,
    },
    /// An AAAA record whose address falls in `match_v6` has its prefix rewritten to `nptv6_v6`,
    /// keeping the host bits.
    Nptv6Rewrite {
        /// The remote v6 network this rule applies to.
        match_v6: Ipv6Net,
        /// The NPTv6 prefix to translate into.
        nptv6_v6: Ipv6Net,
    },
}

impl RewriteRule {
    /// Apply this rule to an A record's address, if it matches. Returns `None` if `self` is not
    /// a [`RewriteRule::Nat64Synthesis`] or `addr` falls outside `match_v4`.
    #[must_use]
    pub fn rewrite_v4(&self, addr: Ipv4Addr) -> Option<Ipv6Addr> {
        let RewriteRule::Nat64Synthesis { match_v4, nat64_v6 } = self else {
            return None;
        };
        if !match_v4.contains(&addr) {
            return None;
        }
        let mut segments = nat64_v6.network().segments();
        let octets = addr.octets();
        segments[6] = u16::from_be_bytes([octets[0], octets[1]]);
        segments[7] = u16::from_be_bytes([octets[2], octets[3]]);
        Some(Ipv6Addr::from(segments))
    }

    /// Apply this rule to an AAAA record's address, if it matches. Returns `None` if `self` is
    /// not a [`RewriteRule::Nptv6Rewrite`] or `addr` falls outside `match_v6`.
    #[must_use]
    pub fn rewrite_v6(&self, addr: Ipv6Addr) -> Option<Ipv6Addr> {
        let RewriteRule::Nptv6Rewrite { match_v6, nptv6_v6 } = self else {
            return None;
        };
        if !match_v6.contains(&addr) {
            return None;
        }
        let prefix_len = u32::from(nptv6_v6.prefix_len());
        let mask: u128 = if prefix_len == 0 {
            0
        } else {
            !0u128 << (128 - prefix_len)
        };
        let prefix_bits = u128::from_be_bytes(nptv6_v6.network().octets()) & mask;
        let suffix_bits = u128::from_be_bytes(addr.octets()) & !mask;
        Some(Ipv6Addr::from((prefix_bits | suffix_bits).to_be_bytes()))
    }
}

/// The full rewrite-rule set for one downlink network instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NiRewriteRules {
    /// The tenant owning this NI.
    pub tenant: TenantId,
    /// The network instance these rules apply to.
    pub ni: NetworkInstanceId,
    /// The rules themselves, in no particular order.
    pub rules: Vec<RewriteRule>,
}

/// Compute the rewrite-rule set for every downlink NI with NAT64 or NPTv6 routes (§4.8).
///
/// `allocated` is the allocator's per-connection output ([`alloc::allocate_all`]); connections
/// missing from it (non-downlink NIs, or NIs the allocator algebra doesn't apply to) contribute
/// no rules.
#[must_use]
pub fn compute_rules(
    snapshot: &Snapshot,
    allocated: &HashMap<(TenantId, NetworkInstanceId, ConnId), ConnectionPrefixes>,
) -> Vec<NiRewriteRules> {
    let mut by_ni: BTreeMap<(TenantId, NetworkInstanceId), Vec<RewriteRule>> = BTreeMap::new();

    for (tenant, ni_id, ni) in snapshot.network_instances() {
        if ni.ni_type != NiType::Downlink {
            continue;
        }
        for (conn_id, conn) in &ni.connections {
            let Some(key) = AllocKey::new(tenant, ni_id, *conn_id) else {
                continue;
            };
            let Some(prefixes) = allocated.get(&(tenant.clone(), ni_id.clone(), *conn_id)) else {
                continue;
            };
            for (route_index, route) in conn.routes.iter().enumerate() {
                let rule = match route.to {
                    IpNetSpec::V4(net) => RewriteRule::Nat64Synthesis {
                        match_v4: net,
                        nat64_v6: prefixes.nat64,
                    },
                    IpNetSpec::V6(net) if route.nptv6 => {
                        let nptv6_v6 = match route.nptv6_prefix {
                            Some(explicit) => explicit,
                            None => {
                                let pool = snapshot.service.prefixes.prefix_downlink_nptv6;
                                #[allow(clippy::cast_possible_truncation)]
                                let route_index = route_index as u16;
                                match nptv6_prefix(pool, key, route_index, net.prefix_len()) {
                                    Ok(p) => p,
                                    Err(_) => continue,
                                }
                            }
                        };
                        RewriteRule::Nptv6Rewrite {
                            match_v6: net,
                            nptv6_v6,
                        }
                    }
                    IpNetSpec::V6(_) => continue,
                };
                by_ni
                    .entry((tenant.clone(), ni_id.clone()))
                    .or_default()
                    .push(rule);
            }
        }
    }

    by_ni
        .into_iter()
        .map(|((tenant, ni), rules)| NiRewriteRules { tenant, ni, rules })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nat64_synthesis_embeds_v4_octets_in_low_32_bits() {
        let rule = RewriteRule::Nat64Synthesis {
            match_v4: "192.0.2.0/24".parse().unwrap(),
            nat64_v6: "fdcc:0:c:1:0::/96".parse().unwrap(),
        };
        let synthesized = rule.rewrite_v4(Ipv4Addr::new(192, 0, 2, 8)).unwrap();
        assert_eq!(synthesized, "fdcc:0:c:1:0:0:c000:208".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn nat64_synthesis_ignores_addresses_outside_match() {
        let rule = RewriteRule::Nat64Synthesis {
            match_v4: "192.0.2.0/24".parse().unwrap(),
            nat64_v6: "fdcc:0:c:1:0::/96".parse().unwrap(),
        };
        assert!(rule.rewrite_v4(Ipv4Addr::new(10, 0, 0, 1)).is_none());
    }

    #[test]
    fn nptv6_rewrite_keeps_host_bits_and_swaps_prefix() {
        let rule = RewriteRule::Nptv6Rewrite {
            match_v6: "2001:db8::/32".parse().unwrap(),
            nptv6_v6: "fdff:1:2::/48".parse().unwrap(),
        };
        let rewritten = rule.rewrite_v6("2001:db8::1234".parse().unwrap()).unwrap();
        assert_eq!(rewritten, "fdff:1:2::1234".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn nptv6_rewrite_ignores_addresses_outside_match() {
        let rule = RewriteRule::Nptv6Rewrite {
            match_v6: "2001:db8::/32".parse().unwrap(),
            nptv6_v6: "fdff:1:2::/48".parse().unwrap(),
        };
        assert!(rule.rewrite_v6("2001:db9::1".parse().unwrap()).is_none());
    }
}
