// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The WireGuard connection driver (§4.4): a dedicated link `wg-<tenant>-<ni>-<n>` with the
//! configured private key, a single peer, and `allowed_ips = 0.0.0.0/0, ::/0`.
//!
//! Unlike the other three drivers this one never goes through `dataplane::Manager<Interface>`:
//! WireGuard links are created and owned entirely by this driver over the kernel's WireGuard
//! generic-netlink family (`interface/properties.rs`'s doc comment on
//! [`dataplane::interface::InterfaceProperties::WireGuard`] is the grounding for that split).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use dataplane::netns::in_netns;
use net::InterfaceName;
use tracing::info;
use wireguard_control::{Backend, Device, DeviceUpdate, InterfaceName as WgInterfaceName, Key, PeerConfigBuilder};

use crate::driver::ConnectionDriver;
use crate::errors::{DriverError, DriverResult};
use crate::state::ConnState;

/// The desired state of a WireGuard connection, derived from `config.wireguard` (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct WireguardDesired {
    /// The link name to create, `wg-<tenant>-<ni>-<n>`.
    pub link_name: InterfaceName,
    /// Local UDP port to bind, or kernel-assigned if unset.
    pub local_port: Option<u16>,
    /// Remote peer addresses, tried in order to find one that's reachable.
    pub remote_addrs: Vec<IpAddr>,
    /// Remote peer UDP port.
    pub remote_port: u16,
    /// Local private key, base64-encoded.
    pub private_key: String,
    /// Remote peer's public key, base64-encoded.
    pub public_key: String,
}

fn parse_key(label: &str, raw: &str) -> DriverResult<Key> {
    Key::from_base64(raw).map_err(|e| DriverError::fatal(format!("invalid {label}: {e}")))
}

fn wg_name(name: &InterfaceName) -> DriverResult<WgInterfaceName> {
    WgInterfaceName::try_from(name.as_ref())
        .map_err(|e| DriverError::fatal(format!("illegal wireguard interface name: {e}")))
}

/// Drives a single WireGuard connection within one connection's network namespace.
pub struct WireguardDriver {
    netns_path: PathBuf,
    state: ConnState,
}

impl WireguardDriver {
    /// Build a driver that operates inside the network namespace at `netns_path`.
    #[must_use]
    pub fn new(netns_path: PathBuf) -> Self {
        WireguardDriver {
            netns_path,
            state: ConnState::Idle,
        }
    }
}

impl ConnectionDriver for WireguardDriver {
    type Desired = WireguardDesired;

    async fn apply(&mut self, desired: &WireguardDesired) -> DriverResult<ConnState> {
        self.state = ConnState::Connecting;

        let private_key = parse_key("private_key", &desired.private_key)?;
        let public_key = parse_key("public_key", &desired.public_key)?;
        let Some(&remote_addr) = desired.remote_addrs.first() else {
            return Err(DriverError::fatal("wireguard connection has no remote_addrs"));
        };
        let endpoint = SocketAddr::new(remote_addr, desired.remote_port);
        let link_name = desired.link_name.clone();
        let local_port = desired.local_port;

        let netns_path = self.netns_path.clone();
        let result = tokio::task::spawn_blocking(move || -> DriverResult<()> {
            in_netns(&netns_path, move || async move {
                let wg_name = wg_name(&link_name)?;
                if Device::get(&wg_name, Backend::Kernel).is_err() {
                    DeviceUpdate::new()
                        .create_interface(&wg_name, Backend::Kernel)
                        .map_err(|e| DriverError::transient(format!("creating wg link: {e}")))?;
                }
                let mut update = DeviceUpdate::new().set_private_key(private_key.clone());
                if let Some(port) = local_port {
                    update = update.set_listen_port(port);
                }
                let peer = PeerConfigBuilder::new(&public_key)
                    .set_endpoint(endpoint)
                    .add_allowed_ip("0.0.0.0".parse().unwrap(), 0)
                    .add_allowed_ip("::".parse().unwrap(), 0);
                update
                    .add_peer(peer)
                    .apply(&wg_name, Backend::Kernel)
                    .map_err(|e| DriverError::transient(format!("configuring wg peer: {e}")))
            })
        })
        .await
        .map_err(|e| DriverError::transient(format!("wireguard apply task panicked: {e}")))?;

        result?;
        info!(link = %desired.link_name, peer = %desired.public_key, "wireguard peer configured");
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
        self.state = ConnState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_remote_addrs() {
        let desired = WireguardDesired {
            link_name: InterfaceName::try_from("wg-c0001-00-0").unwrap(),
            local_port: None,
            remote_addrs: vec![],
            remote_port: 51820,
            private_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
            public_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
        };
        assert!(desired.remote_addrs.is_empty());
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(parse_key("private_key", "not-base64!!").is_err());
    }
}
