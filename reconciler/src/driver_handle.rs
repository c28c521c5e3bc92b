// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tagged dispatch across the four connection drivers (§4.4).
//!
//! Each driver's [`ConnectionDriver::Desired`] is a distinct type, so a connection's driver
//! can't be named as `Box<dyn ConnectionDriver<Desired = _>>` without picking one `Desired` for
//! all four. [`AnyConnDesired`]/[`AnyConnDriver`] carry the variant tag instead, mirroring the
//! way `dataplane::interface::InterfaceProperties` tags kernel-observed link kinds rather than
//! trying to unify them behind one trait object.

use drivers::{
    ConnectionDriver, DriverResult, IpsecDesired, IpsecDriver, PhysicalDesired, PhysicalDriver,
    SshDesired, SshDriver, SwanctlControl, WireguardDesired, WireguardDriver,
};

use crate::errors::{ReconcilerError, ReconcilerResult};

/// The desired state of one connection's transport, tagged by connection type.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyConnDesired {
    /// IPsec/IKEv2 tunnel desired state.
    Ipsec(IpsecDesired),
    /// WireGuard tunnel desired state.
    Wireguard(WireguardDesired),
    /// SSH tunnel desired state.
    Ssh(SshDesired),
    /// Physical link placement desired state.
    Physical(PhysicalDesired),
}

/// The live driver instance for one connection, tagged by connection type.
///
/// Once a connection is first planned as one variant it stays that variant for its lifetime: a
/// `config.type` change is modeled as tearing down the old connection and creating a new one
/// under the same `ConnId`, not as a variant swap in place (§4.4 has no notion of transport
/// migration).
pub enum AnyConnDriver {
    /// Drives an [`AnyConnDesired::Ipsec`].
    Ipsec(IpsecDriver<SwanctlControl>),
    /// Drives an [`AnyConnDesired::Wireguard`].
    Wireguard(WireguardDriver),
    /// Drives an [`AnyConnDesired::Ssh`].
    Ssh(SshDriver),
    /// Drives an [`AnyConnDesired::Physical`].
    Physical(PhysicalDriver),
}

impl AnyConnDriver {
    /// Apply `desired` to this connection's transport, mismatched variants are a programming
    /// error in the caller (a plan's driver handle must be built alongside its desired state, see
    /// `engine.rs`).
    pub async fn apply(&mut self, desired: &AnyConnDesired) -> ReconcilerResult<drivers::ConnState> {
        let result = match (self, desired) {
            (AnyConnDriver::Ipsec(driver), AnyConnDesired::Ipsec(desired)) => {
                driver.apply(desired).await
            }
            (AnyConnDriver::Wireguard(driver), AnyConnDesired::Wireguard(desired)) => {
                driver.apply(desired).await
            }
            (AnyConnDriver::Ssh(driver), AnyConnDesired::Ssh(desired)) => {
                driver.apply(desired).await
            }
            (AnyConnDriver::Physical(driver), AnyConnDesired::Physical(desired)) => {
                driver.apply(desired).await
            }
            _ => return Err(mismatch()),
        };
        Ok(result.map_err(ReconcilerError::Driver)?)
    }

    /// Observe this connection's transport without installing anything.
    pub async fn observe(&mut self) -> ReconcilerResult<drivers::ConnState> {
        let result = match self {
            AnyConnDriver::Ipsec(driver) => driver.observe().await,
            AnyConnDriver::Wireguard(driver) => driver.observe().await,
            AnyConnDriver::Ssh(driver) => driver.observe().await,
            AnyConnDriver::Physical(driver) => driver.observe().await,
        };
        Ok(result.map_err(ReconcilerError::Driver)?)
    }

    /// Tear down all kernel/daemon footprint this driver owns.
    pub async fn teardown(&mut self) -> ReconcilerResult<()> {
        let result: DriverResult<()> = match self {
            AnyConnDriver::Ipsec(driver) => driver.teardown().await,
            AnyConnDriver::Wireguard(driver) => driver.teardown().await,
            AnyConnDriver::Ssh(driver) => driver.teardown().await,
            AnyConnDriver::Physical(driver) => driver.teardown().await,
        };
        Ok(result.map_err(ReconcilerError::Driver)?)
    }
}

fn mismatch() -> ReconcilerError {
    ReconcilerError::UnplannableConnection {
        tenant: String::new(),
        ni: String::new(),
        conn: 0,
        reason: "driver instance and desired state are different connection types".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net::InterfaceName;
    use std::path::PathBuf;

    #[tokio::test]
    async fn apply_rejects_mismatched_driver_and_desired() {
        let mut driver = AnyConnDriver::Physical(PhysicalDriver::new(
            dataplane::Manager::new(std::sync::Arc::new(
                rtnetlink::new_connection().unwrap().1,
            )),
            dataplane::Manager::new(std::sync::Arc::new(
                rtnetlink::new_connection().unwrap().1,
            )),
        ));
        let desired = AnyConnDesired::Ssh(drivers::SshDesired {
            remote_addrs: vec!["192.0.2.1".parse().unwrap()],
            remote_tunnel_id: 0,
            local_tunnel_id: 0,
            username: "vpnc".to_string(),
            remote_config: false,
            remote_config_interface: None,
        });
        assert!(driver.apply(&desired).await.is_err());
        let _ = InterfaceName::try_from("eth0");
        let _ = PathBuf::from("/tmp");
    }
}
