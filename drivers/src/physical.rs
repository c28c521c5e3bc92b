// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The physical connection driver (§4.4): move a pre-existing link into the connection's
//! namespace, or leave it if it's already there; teardown moves it back to the root namespace.

use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use dataplane::interface::{Interface, InterfaceAssociation};
use dataplane::{Manager, manager_of};
use net::InterfaceName;
use rekon::{Observe, Update};
use tracing::{info, warn};

use crate::driver::ConnectionDriver;
use crate::errors::{DriverError, DriverResult};
use crate::state::ConnState;

/// The desired state of a physical connection: the name of the pre-existing link and the
/// namespace it should live in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhysicalDesired {
    /// The name of the link to move, as it exists in the root namespace today.
    pub interface_name: InterfaceName,
    /// The path of the target namespace's bind-mount file, e.g. `/var/run/netns/C0001-00`.
    pub netns_path: PathBuf,
}

/// Drives a single physical connection: moves `interface_name` into the connection's namespace
/// on `apply`, moves it back to the root namespace on `teardown`.
///
/// Physical links are never created or destroyed by this daemon (§4.4): this driver only
/// relocates a link the operator already provisioned. Two [`Manager<Interface>`]s are required
/// because moving a link crosses namespaces: `root_manager`'s netlink handle is bound to the
/// root namespace (where the link starts out), `ni_manager`'s to the connection's namespace
/// (where it ends up, and where `teardown` looks it up again).
pub struct PhysicalDriver {
    root_manager: Manager<Interface>,
    ni_manager: Manager<Interface>,
    interface_name: Option<InterfaceName>,
    state: ConnState,
}

impl PhysicalDriver {
    /// Build a driver bound to the root namespace's and the connection's namespace's netlink
    /// handles.
    #[must_use]
    pub fn new(root_manager: Manager<Interface>, ni_manager: Manager<Interface>) -> Self {
        PhysicalDriver {
            root_manager,
            ni_manager,
            interface_name: None,
            state: ConnState::Idle,
        }
    }
}

async fn move_via(
    manager: &Manager<Interface>,
    observed: &Interface,
    target_ns: &Path,
) -> DriverResult<()> {
    let ns_file = tokio::fs::File::open(target_ns).await.map_err(|e| {
        DriverError::transient(format!("opening namespace {}: {e}", target_ns.display()))
    })?;
    #[allow(clippy::cast_possible_wrap)]
    let fd = ns_file.as_raw_fd() as i32;
    manager_of::<InterfaceAssociation>(manager)
        .update(Some(fd), observed)
        .await?;
    Ok(())
}

impl ConnectionDriver for PhysicalDriver {
    type Desired = PhysicalDesired;

    async fn apply(&mut self, desired: &PhysicalDesired) -> DriverResult<ConnState> {
        self.state = ConnState::Connecting;
        self.interface_name = Some(desired.interface_name.clone());

        if self
            .ni_manager
            .observe()
            .await
            .into_iter()
            .any(|i| i.name == desired.interface_name)
        {
            self.state = ConnState::Active;
            return Ok(self.state);
        }

        let Some(observed) = self
            .root_manager
            .observe()
            .await
            .into_iter()
            .find(|i| i.name == desired.interface_name)
        else {
            warn!(
                interface = %desired.interface_name,
                "physical link not present in root namespace, cannot move it yet"
            );
            self.state = ConnState::Configured;
            return Ok(self.state);
        };

        move_via(&self.root_manager, &observed, &desired.netns_path).await?;
        info!(
            interface = %desired.interface_name,
            netns = %desired.netns_path.display(),
            "moved physical link into connection namespace"
        );
        self.state = ConnState::Active;
        Ok(self.state)
    }

    async fn observe(&mut self) -> DriverResult<ConnState> {
        Ok(self.state)
    }

    async fn teardown(&mut self) -> DriverResult<()> {
        if self.state == ConnState::Idle {
            return Ok(());
        }
        if let Some(name) = &self.interface_name {
            if let Some(observed) = self
                .ni_manager
                .observe()
                .await
                .into_iter()
                .find(|i| &i.name == name)
            {
                move_via(&self.ni_manager, &observed, Path::new("/proc/1/ns/net")).await?;
            }
        }
        self.state = ConnState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_carries_namespace_path() {
        let desired = PhysicalDesired {
            interface_name: InterfaceName::try_from("eth3").unwrap(),
            netns_path: PathBuf::from("/var/run/netns/C0001-00"),
        };
        assert_eq!(desired.netns_path, PathBuf::from("/var/run/netns/C0001-00"));
    }
}
