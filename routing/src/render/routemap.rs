// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Inbound/outbound BGP route-map rendering (§4.7): local-preference on the way in, AS-path
//! prepending on the way out, with an extra blackhole penalty.

use super::builder::{ConfigBuilder, Render};

/// `permit`/`deny` for a route-map entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RouteMapAction {
    /// Accept matching routes (after applying any `set` clauses).
    Permit,
}

/// One sequenced route-map entry.
#[derive(Clone, Debug)]
pub struct RouteMapEntry {
    /// The route-map's name, e.g. `UPLINK-RM-IN-fd00::1`.
    pub name: String,
    /// Sequence number.
    pub seq: u32,
    /// `permit`/`deny`.
    pub action: RouteMapAction,
    /// `match ...` clauses, already rendered.
    pub matches: Vec<String>,
    /// `set ...` clauses, already rendered.
    pub sets: Vec<String>,
}

impl Render for RouteMapEntry {
    type Context = ();

    fn render(&self, (): &Self::Context) -> ConfigBuilder {
        let mut cfg = ConfigBuilder::new();
        let action = match self.action {
            RouteMapAction::Permit => "permit",
        };
        cfg += format!("route-map {} {action} {}", self.name, self.seq);
        for m in &self.matches {
            cfg += format!(" match {m}");
        }
        for s in &self.sets {
            cfg += format!(" set {s}");
        }
        cfg += "exit";
        cfg
    }
}

/// Build the inbound route-map entry for one neighbor: `local-preference = 100 - 10*priority`
/// (§4.7, §8 S6).
#[must_use]
pub fn inbound_local_preference(name: &str, priority: u8) -> RouteMapEntry {
    let local_pref = 100i32 - 10 * i32::from(priority);
    RouteMapEntry {
        name: name.to_string(),
        seq: 10,
        action: RouteMapAction::Permit,
        matches: vec![],
        sets: vec![format!("local-preference {local_pref}")],
    }
}

/// Build the outbound route-map pair for one neighbor: prepend the local ASN `priority` times
/// on the normal path, and `10 * priority` times when the next hop is a blackhole (§4.7).
#[must_use]
pub fn outbound_as_path_prepend(name: &str, local_asn: u32, priority: u8) -> Vec<RouteMapEntry> {
    let normal_prepend = std::iter::repeat_n(local_asn.to_string(), usize::from(priority))
        .collect::<Vec<_>>()
        .join(" ");
    let blackhole_prepend =
        std::iter::repeat_n(local_asn.to_string(), usize::from(priority) * 10)
            .collect::<Vec<_>>()
            .join(" ");

    let mut entries = Vec::new();
    if priority > 0 {
        entries.push(RouteMapEntry {
            name: name.to_string(),
            seq: 5,
            action: RouteMapAction::Permit,
            matches: vec!["ip next-hop blackhole".to_string()],
            sets: vec![format!("as-path prepend {blackhole_prepend}")],
        });
    }
    entries.push(RouteMapEntry {
        name: name.to_string(),
        seq: 10,
        action: RouteMapAction::Permit,
        matches: vec![],
        sets: if priority > 0 {
            vec![format!("as-path prepend {normal_prepend}")]
        } else {
            vec![]
        },
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_inbound_local_preference_matches_priorities_0_and_1() {
        assert_eq!(
            inbound_local_preference("UPLINK-RM-IN", 0).sets,
            vec!["local-preference 100".to_string()]
        );
        assert_eq!(
            inbound_local_preference("UPLINK-RM-IN", 1).sets,
            vec!["local-preference 90".to_string()]
        );
    }

    #[test]
    fn s6_outbound_prepends_local_asn_priority_times() {
        let entries = outbound_as_path_prepend("UPLINK-RM-OUT", 4_200_000_001, 1);
        let normal = entries.last().unwrap();
        assert_eq!(normal.sets, vec!["as-path prepend 4200000001".to_string()]);
        let blackhole = &entries[0];
        assert_eq!(
            blackhole.sets,
            vec![
                (0..10)
                    .map(|_| "4200000001")
                    .collect::<Vec<_>>()
                    .join(" ")
            ]
            .into_iter()
            .map(|s| format!("as-path prepend {s}"))
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn priority_zero_has_no_prepend_entries() {
        let entries = outbound_as_path_prepend("UPLINK-RM-OUT", 4_200_000_001, 0);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].sets.is_empty());
    }
}
