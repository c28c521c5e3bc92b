// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `UPLINK-PL-IN`/`UPLINK-PL-OUT` prefix-list rendering (§4.7).

use ipnet::IpNet;

use super::builder::{ConfigBuilder, Render, Rendered};

/// Whether a prefix-list entry matches the IPv4 or IPv6 family.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IpVer {
    /// `ip prefix-list`.
    V4,
    /// `ipv6 prefix-list`.
    V6,
}

impl Rendered for IpVer {
    fn rendered(&self) -> String {
        match self {
            IpVer::V4 => "ip".to_string(),
            IpVer::V6 => "ipv6".to_string(),
        }
    }
}

/// `permit`/`deny`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PrefixListAction {
    /// Accept matching prefixes.
    Permit,
    /// Reject matching prefixes.
    Deny,
}

impl Rendered for PrefixListAction {
    fn rendered(&self) -> String {
        match self {
            PrefixListAction::Permit => "permit".to_string(),
            PrefixListAction::Deny => "deny".to_string(),
        }
    }
}

/// An optional `ge`/`le` prefix-length qualifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PrefixListMatchLen {
    /// `ge <len>`: match this prefix or any more specific one.
    Ge(u8),
    /// `le <len>`: match this prefix or any less specific one.
    Le(u8),
}

impl Rendered for PrefixListMatchLen {
    fn rendered(&self) -> String {
        match self {
            PrefixListMatchLen::Ge(len) => format!("ge {len}"),
            PrefixListMatchLen::Le(len) => format!("le {len}"),
        }
    }
}

/// One sequenced entry in a prefix-list.
#[derive(Clone, Debug)]
pub struct PrefixListEntry {
    /// Sequence number (rendering order, also FRR's insertion key).
    pub seq: u32,
    /// `permit`/`deny`.
    pub action: PrefixListAction,
    /// The prefix to match, or `any`.
    pub prefix: Option<IpNet>,
    /// An optional `ge`/`le` length qualifier.
    pub len_match: Option<PrefixListMatchLen>,
}

impl Render for PrefixListEntry {
    type Context = (String, IpVer);

    fn render(&self, (name, ver): &Self::Context) -> ConfigBuilder {
        let prefix = self
            .prefix
            .map_or_else(|| "any".to_string(), |p| p.to_string());
        let mut line = format!(
            "{} prefix-list {name} seq {} {} {prefix}",
            ver.rendered(),
            self.seq,
            self.action.rendered(),
        );
        if let Some(len_match) = &self.len_match {
            line.push(' ');
            line.push_str(&len_match.rendered());
        }
        let mut cfg = ConfigBuilder::new();
        cfg += line;
        cfg
    }
}

/// A named, ordered prefix-list.
#[derive(Clone, Debug)]
pub struct PrefixList {
    /// The list's name, e.g. `UPLINK-PL-OUT`.
    pub name: String,
    /// Address family this list matches.
    pub ipver: IpVer,
    /// The list's entries, in rendering order.
    pub entries: Vec<PrefixListEntry>,
}

impl Render for PrefixList {
    type Context = ();

    fn render(&self, (): &Self::Context) -> ConfigBuilder {
        let mut cfg = ConfigBuilder::new();
        for entry in &self.entries {
            cfg += entry.render(&(self.name.clone(), self.ipver));
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_any_with_ge_qualifier() {
        let list = PrefixList {
            name: "UPLINK-PL-OUT".to_string(),
            ipver: IpVer::V6,
            entries: vec![PrefixListEntry {
                seq: 10,
                action: PrefixListAction::Permit,
                prefix: Some("2000::/3".parse().unwrap()),
                len_match: Some(PrefixListMatchLen::Ge(32)),
            }],
        };
        let rendered = list.render(&()).finish();
        assert_eq!(
            rendered,
            "ipv6 prefix-list UPLINK-PL-OUT seq 10 permit 2000::/3 ge 32\n"
        );
    }
}
