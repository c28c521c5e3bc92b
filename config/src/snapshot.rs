// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `Snapshot`: a validated, point-in-time view of the active configuration (§3 glossary).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ConnId, NetworkInstanceId, TenantId};
use crate::model::{Connection, NetworkInstance, ServiceConfig, Tenant};

/// A validated, point-in-time view of the configuration store.
///
/// The reconciler treats the published `Snapshot` as the single source of truth (§4.1).
/// `Snapshot`s are cheap to clone (wrapped in an `Arc` by [`crate::watch`]) and compare by value,
/// which is what lets the reconciler diff desired-vs-previous state without re-reading any file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The monotonically increasing generation number of this snapshot, bumped on every commit.
    pub generation: u64,
    /// The `DEFAULT` tenant's service-level configuration.
    pub service: ServiceConfig,
    /// All tenants, including `DEFAULT`, keyed by id.
    pub tenants: BTreeMap<TenantId, Tenant>,
}

impl Snapshot {
    /// An empty snapshot at generation 0, useful as a zero value before the first load.
    #[must_use]
    pub fn empty(service: ServiceConfig) -> Self {
        Snapshot {
            generation: 0,
            service,
            tenants: BTreeMap::new(),
        }
    }

    /// Iterate over every `(tenant, ni_id, ni)` triple in the snapshot.
    pub fn network_instances(
        &self,
    ) -> impl Iterator<Item = (&TenantId, &NetworkInstanceId, &NetworkInstance)> {
        self.tenants.iter().flat_map(|(tid, tenant)| {
            tenant
                .network_instances
                .iter()
                .map(move |(nid, ni)| (tid, nid, ni))
        })
    }

    /// Iterate over every `(tenant, ni_id, conn_id, connection)` quadruple in the snapshot.
    pub fn connections(
        &self,
    ) -> impl Iterator<Item = (&TenantId, &NetworkInstanceId, ConnId, &Connection)> {
        self.network_instances().flat_map(|(tid, nid, ni)| {
            ni.connections
                .iter()
                .map(move |(cid, conn)| (tid, nid, *cid, conn))
        })
    }

    /// Look up a single connection by its full identity.
    #[must_use]
    pub fn connection(
        &self,
        tenant: &TenantId,
        ni: &NetworkInstanceId,
        conn: ConnId,
    ) -> Option<&Connection> {
        self.tenants
            .get(tenant)?
            .network_instances
            .get(ni)?
            .connections
            .get(&conn)
    }
}

/// A single difference between two snapshots, as returned by `commit --diff` (§4.1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SnapshotDiffEntry {
    /// A tenant was added.
    TenantAdded(TenantId),
    /// A tenant was removed.
    TenantRemoved(TenantId),
    /// A tenant's content changed (any field inside it).
    TenantChanged(TenantId),
    /// The service config changed.
    ServiceChanged,
}

/// The structured diff between a pre- and post-commit snapshot (§4.1).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// The ordered list of changes, tenants before the service config.
    pub entries: Vec<SnapshotDiffEntry>,
}

impl SnapshotDiff {
    /// `true` if there is no difference at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compute the diff between two snapshots.
    #[must_use]
    pub fn compute(before: &Snapshot, after: &Snapshot) -> Self {
        let mut entries = Vec::new();
        for (id, tenant) in &after.tenants {
            match before.tenants.get(id) {
                None => entries.push(SnapshotDiffEntry::TenantAdded(id.clone())),
                Some(prev) if prev != tenant => {
                    entries.push(SnapshotDiffEntry::TenantChanged(id.clone()));
                }
                Some(_) => {}
            }
        }
        for id in before.tenants.keys() {
            if !after.tenants.contains_key(id) {
                entries.push(SnapshotDiffEntry::TenantRemoved(id.clone()));
            }
        }
        if before.service != after.service {
            entries.push(SnapshotDiffEntry::ServiceChanged);
        }
        SnapshotDiff { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AllocatorPrefixes, BgpGlobals, Mode};
    use std::net::Ipv4Addr;

    fn svc() -> ServiceConfig {
        ServiceConfig {
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
                neighbors: vec![],
            },
        }
    }

    #[test]
    fn diff_detects_tenant_added_and_removed() {
        let before = Snapshot::empty(svc());
        let mut after = before.clone();
        after.generation = 1;
        let tenant = Tenant {
            id: TenantId::try_from("C0001").unwrap(),
            name: "acme".to_string(),
            metadata: Default::default(),
            network_instances: Default::default(),
        };
        after.tenants.insert(tenant.id.clone(), tenant);

        let diff = SnapshotDiff::compute(&before, &after);
        assert_eq!(diff.entries.len(), 1);
        assert!(matches!(diff.entries[0], SnapshotDiffEntry::TenantAdded(_)));

        let diff_back = SnapshotDiff::compute(&after, &before);
        assert!(matches!(
            diff_back.entries[0],
            SnapshotDiffEntry::TenantRemoved(_)
        ));
    }

    #[test]
    fn diff_is_empty_for_identical_snapshots() {
        let s = Snapshot::empty(svc());
        assert!(SnapshotDiff::compute(&s, &s).is_empty());
    }
}
