// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ordered apply/teardown orchestrator (§4.5 step 3): namespace, then links, then addresses,
//! then transport, then routes, then NAT64/NPTv6; reverse order on teardown.
//!
//! Every netlink call here runs inside the NI's own namespace, entered fresh for each pass via
//! [`dataplane::netns::in_netns`] (the same one-shot pattern `drivers::wireguard` uses): a
//! namespace-bound `rtnetlink` socket is only servable by the runtime that created it, so rather
//! than try to keep one alive across reconcile passes, every pass opens its own, does all of its
//! netlink work, and lets it go when the pass returns. The one exception is `root_manager`,
//! created once at startup against the daemon's own (root) namespace and handed in by the
//! caller, whose creating runtime is the daemon's own long-lived one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use config::ConnId;
use dataplane::addr::{addr_ensure, addr_flush};
use dataplane::errors::DataplaneError;
use dataplane::interface::{Interface, InterfaceProperties};
use dataplane::nat64::{Nat64Pool, nat64_instance_ensure, nat64_instance_remove};
use dataplane::netns::{in_netns, ns_delete, ns_ensure};
use dataplane::nptv6::{nptv6_rule_ensure, nptv6_rule_remove};
use dataplane::route::{route_ensure, route_flush};
use dataplane::{Manager, manager_of};
use drivers::{ConnState, IpsecDriver, PhysicalDriver, SshDriver, SwanctlControl, WireguardDriver};
use rekon::{Observe, Op, Reconcile, Remove};
use rtnetlink::Handle;
use tracing::{info, warn};

use crate::driver_handle::{AnyConnDesired, AnyConnDriver};
use crate::errors::{ReconcilerError, ReconcilerResult};
use crate::plan::{ConnPlan, NiPlan};

/// Live driver instances for one NI's connections, keyed by connection id and kept by the
/// caller across reconcile passes so stateful drivers (the SSH child process, IPsec's last-seen
/// PSK) survive between passes. Physical connections are deliberately absent from this table:
/// `PhysicalDriver` only holds netlink handles bound to one pass's ephemeral connection, so it's
/// rebuilt fresh every pass from the kernel's own observed state instead.
pub type DriverTable = HashMap<ConnId, AnyConnDriver>;

fn netns_path_of(netns_name: &str) -> PathBuf {
    PathBuf::from(format!("/var/run/netns/{netns_name}"))
}

fn connection_error(context: &'static str, e: impl std::fmt::Display) -> ReconcilerError {
    ReconcilerError::Dataplane(DataplaneError::command(context, e.to_string()))
}

/// Open a fresh `rtnetlink` socket bound to whatever namespace the calling thread is currently
/// in, and drive it on the current (one-shot) runtime for the rest of `exec`'s lifetime.
async fn with_local_handle<F, Fut, Out>(exec: F) -> ReconcilerResult<Out>
where
    F: FnOnce(Handle) -> Fut,
    Fut: Future<Output = ReconcilerResult<Out>>,
{
    let (connection, handle, _) = rtnetlink::new_connection()
        .map_err(|e| connection_error("rtnetlink new_connection", e))?;
    tokio::spawn(connection);
    exec(handle).await
}

async fn reconcile_connection_links(
    handle: &Handle,
    ni_manager: &Manager<Interface>,
    conn: &ConnPlan,
) -> ReconcilerResult<()> {
    let Some(spec) = &conn.interface else {
        return Ok(());
    };

    let observed = ni_manager.observe().await;
    let existing = observed.iter().find(|i| i.name == spec.name);
    if let Some(op) = ni_manager.reconcile(spec, existing).await {
        match op {
            Op::Create(result) => result.map_err(DataplaneError::from)?,
            Op::Update(result) => result.map_err(DataplaneError::from)?,
            Op::Remove(result) => result.map_err(DataplaneError::from)?,
        }
    }

    let observed = ni_manager.observe().await;
    let Some(interface) = observed.into_iter().find(|i| i.name == spec.name) else {
        warn!(link = %spec.name, "link missing immediately after reconcile");
        return Ok(());
    };
    let index = interface.index;

    for address in &conn.addresses {
        addr_ensure(handle, index, *address)
            .await
            .map_err(ReconcilerError::Dataplane)?;
    }
    addr_flush(handle, index, &conn.addresses)
        .await
        .map_err(ReconcilerError::Dataplane)?;

    for route in &conn.routes {
        route_ensure(handle, index, *route)
            .await
            .map_err(ReconcilerError::Dataplane)?;
    }
    route_flush(handle, index, &conn.routes)
        .await
        .map_err(ReconcilerError::Dataplane)?;

    Ok(())
}

async fn reconcile_connection_translation(netns_name: &str, conn: &ConnPlan) -> ReconcilerResult<()> {
    if let Some(nat64) = conn.nat64 {
        nat64_instance_ensure(
            netns_name,
            Nat64Pool {
                prefix: nat64.network(),
            },
        )
        .await
        .map_err(ReconcilerError::Dataplane)?;
    }
    for (src, dst) in &conn.nptv6 {
        nptv6_rule_ensure(netns_name, *src, *dst)
            .await
            .map_err(ReconcilerError::Dataplane)?;
    }
    Ok(())
}

fn new_stateful_driver(desired: &AnyConnDesired, netns_path: &std::path::Path) -> AnyConnDriver {
    match desired {
        AnyConnDesired::Ipsec(_) => {
            AnyConnDriver::Ipsec(IpsecDriver::new(SwanctlControl::new("swanctl".to_string())))
        }
        AnyConnDesired::Wireguard(_) => {
            AnyConnDriver::Wireguard(WireguardDriver::new(netns_path.to_path_buf()))
        }
        AnyConnDesired::Ssh(_) => AnyConnDriver::Ssh(SshDriver::default()),
        AnyConnDesired::Physical(_) => {
            unreachable!("physical connections never go through new_stateful_driver")
        }
    }
}

/// Bring one network instance's kernel and driver state into line with `plan` (§4.5 step 3).
///
/// `root_manager` is the daemon's single netlink handle bound to the root namespace, used only
/// to locate physical links that haven't yet been moved into this NI.
pub async fn apply_ni(
    plan: &NiPlan,
    root_manager: &Manager<Interface>,
    drivers: &mut DriverTable,
) -> ReconcilerResult<()> {
    ns_ensure(&plan.netns_name).map_err(ReconcilerError::Dataplane)?;
    let netns_path = netns_path_of(&plan.netns_name);
    let netns_path_for_kernel = netns_path.clone();

    let netns_name = plan.netns_name.clone();
    let connections: Vec<ConnPlan> = plan.connections.clone();
    let root_manager_for_physical: Manager<Interface> = manager_of(root_manager);

    let physical_outcomes: Vec<(ConnId, ConnState)> = tokio::task::spawn_blocking(move || {
        in_netns(&netns_path_for_kernel, move || async move {
            with_local_handle(move |handle| async move {
                let handle = Arc::new(handle);
                let ni_manager: Manager<Interface> = Manager::new(handle.clone());

                let mut physical_outcomes = Vec::new();
                for conn in &connections {
                    reconcile_connection_links(&handle, &ni_manager, conn).await?;
                    reconcile_connection_translation(&netns_name, conn).await?;

                    if let AnyConnDesired::Physical(desired) = &conn.driver {
                        let mut physical = PhysicalDriver::new(
                            manager_of(&root_manager_for_physical),
                            ni_manager.clone(),
                        );
                        let state = physical
                            .apply(desired)
                            .await
                            .map_err(ReconcilerError::Driver)?;
                        physical_outcomes.push((conn.id, state));
                    }
                }
                Ok(physical_outcomes)
            })
            .await
        })
    })
    .await
    .map_err(|e| connection_error("netns task", format!("panicked: {e}")))??;

    for (conn_id, state) in physical_outcomes {
        info!(ni = %plan.ni, conn = %conn_id, ?state, "physical connection placed");
    }

    for conn in &plan.connections {
        if matches!(conn.driver, AnyConnDesired::Physical(_)) {
            continue;
        }
        let driver = drivers
            .entry(conn.id)
            .or_insert_with(|| new_stateful_driver(&conn.driver, &netns_path));
        let state = driver.apply(&conn.driver).await?;
        info!(ni = %plan.ni, conn = %conn.id, ?state, "connection applied");
    }

    Ok(())
}

/// Tear down one network instance's drivers and kernel state, reverse of [`apply_ni`]'s order
/// (§4.5/§5: drivers first, then translation rules, then addresses/routes/links, then the
/// namespace itself).
pub async fn teardown_ni(plan: &NiPlan, drivers: &mut DriverTable) -> ReconcilerResult<()> {
    for conn in plan.connections.iter().rev() {
        if let Some(mut driver) = drivers.remove(&conn.id) {
            driver.teardown().await?;
        }
    }

    let netns_path = netns_path_of(&plan.netns_name);
    let netns_name = plan.netns_name.clone();
    let has_connections = !plan.connections.is_empty();
    let nptv6_mappings: Vec<(ipnet::Ipv6Net, ipnet::Ipv6Net)> = plan
        .connections
        .iter()
        .flat_map(|c| c.nptv6.iter().copied())
        .collect();

    tokio::task::spawn_blocking(move || {
        in_netns(&netns_path, move || async move {
            with_local_handle(move |handle| async move {
                let handle = Arc::new(handle);
                let ni_manager: Manager<Interface> = Manager::new(handle);

                for (src, dst) in &nptv6_mappings {
                    nptv6_rule_remove(&netns_name, *src, *dst)
                        .await
                        .map_err(ReconcilerError::Dataplane)?;
                }

                if has_connections {
                    nat64_instance_remove(&netns_name)
                        .await
                        .map_err(ReconcilerError::Dataplane)?;
                }

                let observed = ni_manager.observe().await;
                for interface in observed {
                    if matches!(interface.properties, InterfaceProperties::Xfrm(_)) {
                        manager_of::<Interface>(&ni_manager)
                            .remove(&interface)
                            .await
                            .map_err(DataplaneError::from)?;
                    }
                }

                Ok(())
            })
            .await
        })
    })
    .await
    .map_err(|e| connection_error("netns task", format!("panicked: {e}")))??;

    ns_delete(&plan.netns_name).map_err(ReconcilerError::Dataplane)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netns_path_follows_the_ip_netns_convention() {
        assert_eq!(
            netns_path_of("C0001-00"),
            PathBuf::from("/var/run/netns/C0001-00")
        );
    }
}
