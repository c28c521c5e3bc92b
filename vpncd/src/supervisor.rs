// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The reconcile loop (§5): a config snapshot arrives, the allocator's prefix map is recomputed,
//! and every network instance is brought into line with its plan — distinct NIs run concurrently
//! (bounded by a semaphore), the same NI never reconciles twice at once (`NiLockRegistry`), and a
//! failed apply is retried with a capped exponential backoff instead of being dropped, since
//! spec'd `DEGRADED` connections keep retrying rather than giving up (§5: "schedule retry with
//! exponential backoff capped at 5 minutes").
//!
//! Mirrors `dataplane-mgmt::processor::confbuild`'s "build desired state, then apply" shape,
//! generalized to per-NI granularity and fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use config::{ConnId, NetworkInstanceId, Snapshot, TenantId};
use dataplane::Manager;
use dataplane::interface::Interface;
use drivers::ConnState;
use reconciler::{ConnPlan, DriverTable, NiLockRegistry, NiPlan, apply_ni, build_ni_plan, teardown_ni};
use rekon::backoff::Backoff;
use status::{ConnStateView, ConnectionStatus, Nat64Entry, NatStatus, Nptv6Entry, StatusSnapshot, StatusStore, TransportKind};
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_CAP: Duration = Duration::from_secs(300);

fn retry_backoff() -> Backoff {
    Backoff::new(RETRY_BASE, RETRY_CAP)
}

fn transport_kind(desired: &reconciler::AnyConnDesired) -> TransportKind {
    match desired {
        reconciler::AnyConnDesired::Physical(_) => TransportKind::Physical,
        reconciler::AnyConnDesired::Ipsec(_) => TransportKind::Ipsec,
        reconciler::AnyConnDesired::Wireguard(_) => TransportKind::Wireguard,
        reconciler::AnyConnDesired::Ssh(_) => TransportKind::Ssh,
    }
}

fn remote_addrs(desired: &reconciler::AnyConnDesired) -> Vec<std::net::IpAddr> {
    match desired {
        reconciler::AnyConnDesired::Ipsec(d) => d.remote_addrs.clone(),
        reconciler::AnyConnDesired::Wireguard(d) => d.remote_addrs.clone(),
        reconciler::AnyConnDesired::Ssh(d) => d.remote_addrs.clone(),
        reconciler::AnyConnDesired::Physical(_) => Vec::new(),
    }
}

/// Owns every piece of shared, long-lived state the reconcile loop touches: the per-NI lock
/// registry and driver tables (§5 invariants i/ii), the daemon's root-namespace netlink handle,
/// per-NI retry bookkeeping, and the published status snapshot.
pub struct Supervisor {
    root_manager: Manager<Interface>,
    locks: NiLockRegistry,
    drivers: Mutex<HashMap<NetworkInstanceId, DriverTable>>,
    permits: Arc<Semaphore>,
    status: Arc<StatusStore>,
    status_state: Mutex<StatusSnapshot>,
    retry_attempts: Mutex<HashMap<(TenantId, NetworkInstanceId), u32>>,
    known_nis: Mutex<HashSet<(TenantId, NetworkInstanceId)>>,
    last_snapshot: Mutex<Option<(Arc<Snapshot>, Arc<HashMap<(TenantId, NetworkInstanceId, ConnId), alloc::ConnectionPrefixes>>)>>,
    /// Each NI's last-applied plan shape, kept so a removed NI can be torn down the same way it
    /// was built instead of against an empty stand-in plan (`teardown_ni` only tears down drivers
    /// and NAT rules named in `plan.connections`).
    last_plans: Mutex<HashMap<(TenantId, NetworkInstanceId), (String, Vec<ConnPlan>)>>,
}

impl Supervisor {
    /// Build a supervisor around a root-namespace netlink handle and the shared status store.
    #[must_use]
    pub fn new(root_manager: Manager<Interface>, status: Arc<StatusStore>, max_concurrent_nis: usize) -> Self {
        Supervisor {
            root_manager,
            locks: NiLockRegistry::new(),
            drivers: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent_nis.max(1))),
            status,
            status_state: Mutex::new(StatusSnapshot::default()),
            retry_attempts: Mutex::new(HashMap::new()),
            known_nis: Mutex::new(HashSet::new()),
            last_snapshot: Mutex::new(None),
            last_plans: Mutex::new(HashMap::new()),
        }
    }

    /// Drive the reconcile loop until `shutdown` reports `true`, then tear every known network
    /// instance down in reverse dependency order (downlinks, then core, then external) and
    /// return (§5: "tears down NIs in reverse dependency order ... and exits").
    pub async fn run(self: Arc<Self>, mut snapshot_rx: config::SnapshotRx, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = snapshot_rx.changed() => {
                    if changed.is_err() {
                        info!("config snapshot channel closed, shutting down reconcile loop");
                        break;
                    }
                    let snapshot = snapshot_rx.borrow_and_update().clone();
                    self.clone().reconcile_snapshot(snapshot).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown().await;
    }

    async fn reconcile_snapshot(self: Arc<Self>, snapshot: Arc<Snapshot>) {
        let allocated = match alloc::allocate_all(&snapshot) {
            Ok(allocated) => Arc::new(allocated),
            Err(e) => {
                error!(error = %e, "allocator rejected snapshot generation {}, keeping prior state", snapshot.generation);
                return;
            }
        };

        *self.last_snapshot.lock().await = Some((snapshot.clone(), allocated.clone()));
        let generation = snapshot.generation;
        self.with_status_state(|state| state.generation = generation).await;

        let current: HashSet<(TenantId, NetworkInstanceId)> = snapshot
            .network_instances()
            .map(|(tenant, ni, _)| (tenant.clone(), ni.clone()))
            .collect();

        let removed: Vec<(TenantId, NetworkInstanceId)> = {
            let known = self.known_nis.lock().await;
            known.difference(&current).cloned().collect()
        };

        let mut joins = Vec::new();
        for (tenant, ni) in removed {
            let this = self.clone();
            joins.push(tokio::spawn(async move { this.teardown_one(&tenant, &ni).await }));
        }

        for (tenant, ni_id, ni) in snapshot.network_instances() {
            let this = self.clone();
            let snapshot = snapshot.clone();
            let allocated = allocated.clone();
            let tenant = tenant.clone();
            let ni_id = ni_id.clone();
            let ni = ni.clone();
            joins.push(tokio::spawn(async move {
                this.apply_one(tenant, ni_id, ni, &snapshot, &allocated).await;
            }));
        }

        for join in joins {
            if let Err(e) = join.await {
                warn!(error = %e, "reconcile task panicked");
            }
        }

        *self.known_nis.lock().await = current;
    }

    async fn apply_one(
        self: &Arc<Self>,
        tenant: TenantId,
        ni_id: NetworkInstanceId,
        ni: config::NetworkInstance,
        snapshot: &Snapshot,
        allocated: &HashMap<(TenantId, NetworkInstanceId, ConnId), alloc::ConnectionPrefixes>,
    ) {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        let _ni_guard = self.locks.lock_ni(&ni_id).await;

        let plan = match build_ni_plan(&tenant, &ni_id, &ni, snapshot.service.prefixes.prefix_downlink_nptv6, allocated) {
            Ok(plan) => plan,
            Err(e) => {
                error!(tenant = %tenant, ni = %ni_id, error = %e, "failed to build ni plan");
                return;
            }
        };

        self.last_plans
            .lock()
            .await
            .insert((tenant.clone(), ni_id.clone()), (plan.netns_name.clone(), plan.connections.clone()));

        // `apply_ni` calls `ns_ensure` internally and doesn't expose it as a separate step, so the
        // global namespace lock (§5 invariant ii) is held for the whole pass rather than just
        // around the netns create/delete: distinct NIs still never contend on `lock_ni`, but two
        // namespace operations never race against each other either.
        let _ns_guard = self.locks.lock_namespaces().await;
        let mut drivers = self.drivers.lock().await;
        let table = drivers.entry(ni_id.clone()).or_default();
        let result = apply_ni(&plan, &self.root_manager, table).await;
        let states = self.observe_states(table, &plan).await;
        drop(drivers);

        match result {
            Ok(()) => {
                self.retry_attempts.lock().await.remove(&(tenant.clone(), ni_id.clone()));
                self.publish_ni_status(&tenant, &ni_id, &plan, &states).await;
            }
            Err(e) => {
                error!(tenant = %tenant, ni = %ni_id, error = %e, "reconcile failed, scheduling retry");
                self.publish_ni_status(&tenant, &ni_id, &plan, &states).await;
                self.schedule_retry(tenant, ni_id);
            }
        }
    }

    async fn observe_states(&self, table: &mut DriverTable, plan: &NiPlan) -> HashMap<ConnId, ConnState> {
        let mut states = HashMap::new();
        for conn in &plan.connections {
            if let Some(driver) = table.get_mut(&conn.id) {
                match driver.observe().await {
                    Ok(state) => {
                        states.insert(conn.id, state);
                    }
                    Err(e) => warn!(conn = %conn.id, error = %e, "failed to observe connection state"),
                }
            }
        }
        states
    }

    fn schedule_retry(self: &Arc<Self>, tenant: TenantId, ni_id: NetworkInstanceId) {
        let this = self.clone();
        tokio::spawn(async move {
            let attempt = {
                let mut attempts = this.retry_attempts.lock().await;
                let entry = attempts.entry((tenant.clone(), ni_id.clone())).or_insert(0);
                let attempt = *entry;
                *entry = entry.saturating_add(1);
                attempt
            };
            tokio::time::sleep(retry_backoff().delay_for(attempt)).await;

            let still_attempted = this.retry_attempts.lock().await.contains_key(&(tenant.clone(), ni_id.clone()));
            if !still_attempted {
                return;
            }
            let Some((snapshot, allocated)) = this.last_snapshot.lock().await.clone() else {
                return;
            };
            let Some(ni) = snapshot.tenants.get(&tenant).and_then(|t| t.network_instances.get(&ni_id)).cloned() else {
                return;
            };
            info!(tenant = %tenant, ni = %ni_id, attempt, "retrying failed reconcile");
            this.apply_one(tenant, ni_id, ni, &snapshot, &allocated).await;
        });
    }

    async fn teardown_one(self: &Arc<Self>, tenant: &TenantId, ni_id: &NetworkInstanceId) {
        let _ni_guard = self.locks.lock_ni(ni_id).await;
        let _ns_guard = self.locks.lock_namespaces().await;
        let mut drivers = self.drivers.lock().await;
        let Some(mut table) = drivers.remove(ni_id) else {
            return;
        };
        drop(drivers);

        let (netns_name, connections) = self
            .last_plans
            .lock()
            .await
            .remove(&(tenant.clone(), ni_id.clone()))
            .unwrap_or_else(|| (ni_id.as_str().to_string(), Vec::new()));
        let plan = NiPlan {
            tenant: tenant.clone(),
            ni: ni_id.clone(),
            netns_name,
            connections,
        };
        if let Err(e) = teardown_ni(&plan, &mut table).await {
            error!(tenant = %tenant, ni = %ni_id, error = %e, "teardown failed");
        } else {
            info!(tenant = %tenant, ni = %ni_id, "network instance torn down");
        }
        self.retry_attempts.lock().await.remove(&(tenant.clone(), ni_id.clone()));
        self.clear_ni_status(tenant, ni_id).await;
    }

    async fn publish_ni_status(&self, tenant: &TenantId, ni_id: &NetworkInstanceId, plan: &NiPlan, states: &HashMap<ConnId, ConnState>) {
        let mut connections = Vec::new();
        let mut nat64 = Vec::new();
        let mut nptv6 = Vec::new();
        for conn in &plan.connections {
            let state = states
                .get(&conn.id)
                .copied()
                .map(ConnStateView::from)
                .unwrap_or(if matches!(conn.driver, reconciler::AnyConnDesired::Physical(_)) {
                    ConnStateView::Active
                } else {
                    ConnStateView::Idle
                });
            connections.push(ConnectionStatus {
                tenant: tenant.clone(),
                ni: ni_id.clone(),
                conn: conn.id,
                transport: transport_kind(&conn.driver),
                state,
                interface: conn.interface.as_ref().map(|i| i.name.to_string()),
                addresses: conn.addresses.iter().map(|a| a.address).collect(),
                remote: remote_addrs(&conn.driver),
                reason: None,
            });
            if let Some(prefix) = conn.nat64 {
                nat64.push(Nat64Entry {
                    tenant: tenant.clone(),
                    ni: ni_id.clone(),
                    conn: conn.id,
                    prefix,
                });
            }
            for (from, to) in &conn.nptv6 {
                nptv6.push(Nptv6Entry {
                    tenant: tenant.clone(),
                    ni: ni_id.clone(),
                    conn: conn.id,
                    from: *from,
                    to: *to,
                });
            }
        }

        self.with_status_state(|state| {
            state.connections.retain(|c| !(&c.tenant == tenant && &c.ni == ni_id));
            state.connections.extend(connections);
            state.nat.nat64.retain(|n| !(&n.tenant == tenant && &n.ni == ni_id));
            state.nat.nptv6.retain(|n| !(&n.tenant == tenant && &n.ni == ni_id));
            state.nat.nat64.extend(nat64);
            state.nat.nptv6.extend(nptv6);
        })
        .await;
    }

    async fn clear_ni_status(&self, tenant: &TenantId, ni_id: &NetworkInstanceId) {
        self.with_status_state(|state| {
            state.connections.retain(|c| !(&c.tenant == tenant && &c.ni == ni_id));
            state.nat.nat64.retain(|n| !(&n.tenant == tenant && &n.ni == ni_id));
            state.nat.nptv6.retain(|n| !(&n.tenant == tenant && &n.ni == ni_id));
        })
        .await;
    }

    /// Update the routing-daemon neighbor summary (called from the routing-poll task).
    pub async fn publish_bgp(&self, neighbors: Vec<routing::NeighborStatus>) {
        self.with_status_state(|state| {
            state.bgp.neighbors = neighbors;
        })
        .await;
    }

    /// Record an SA-reap failure on the status surface (called from the IKE monitor task).
    pub async fn push_reap_failure(&self, failure: status::ReapFailure) {
        const MAX_RETAINED: usize = 64;
        self.with_status_state(|state| {
            state.reap_failures.push(failure);
            let len = state.reap_failures.len();
            if len > MAX_RETAINED {
                state.reap_failures.drain(0..len - MAX_RETAINED);
            }
        })
        .await;
    }

    /// Mutate the write-side status aggregate under lock, then republish the whole snapshot so
    /// every background task's last update is visible without one task's publish clobbering
    /// another's fields (§5: "coalescing ... last-writer-wins for snapshots/neighbor-state").
    async fn with_status_state(&self, mutate: impl FnOnce(&mut StatusSnapshot)) {
        let mut state = self.status_state.lock().await;
        mutate(&mut state);
        self.status.publish(state.clone());
    }

    async fn shutdown(self: &Arc<Self>) {
        let known: Vec<(TenantId, NetworkInstanceId)> = self.known_nis.lock().await.iter().cloned().collect();
        let (downlinks, other): (Vec<_>, Vec<_>) = known.into_iter().partition(|(_, ni)| ni.downlink_index().is_some());
        let (core, external): (Vec<_>, Vec<_>) = other.into_iter().partition(|(_, ni)| ni.as_str() == NetworkInstanceId::CORE);

        for (tenant, ni) in downlinks.into_iter().chain(core).chain(external) {
            self.teardown_one(&tenant, &ni).await;
        }
    }
}
