// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The IPsec connection driver (§4.4): generates a connection block per (tenant, ni, conn) in
//! the IKE daemon's config, keyed by an `if_id` shared with the dataplane's XFRM link so both
//! sides match; `initiation=start` maps to start+close actions, `initiation=none` to trap;
//! load/unload is atomic per connection; PSK rotation reloads the connection.
//!
//! The daemon's control channel is its own request/response protocol (e.g. strongSwan's vici);
//! this driver shells out to its CLI front-end the same idempotent way the `dataplane` crate
//! wraps `jool` and `ip -6 route` (§4.3): format the argv, run it, classify the exit/stderr.

use std::net::IpAddr;

use tokio::process::Command;
use tracing::{info, warn};

use crate::driver::ConnectionDriver;
use crate::errors::{DriverError, DriverResult};
use crate::state::ConnState;

/// A local or remote traffic selector, rendered into the generated connection block.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficSelectorSpec {
    /// The local-side prefix, `a.b.c.d/n` or `a:b::/n`.
    pub local: String,
    /// The remote-side prefix, `a.b.c.d/n` or `a:b::/n`.
    pub remote: String,
}

/// Whether this connection proactively initiates or only responds (§3, §4.4).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Initiation {
    /// `start`/`close` actions.
    Start,
    /// `trap` action.
    Trap,
}

/// The desired state of an IPsec connection, derived from `config.ipsec` (§3) plus the `if_id`
/// the allocator derives for this (tenant, ni, conn) tuple (§4.4).
#[derive(Clone, Debug, PartialEq)]
pub struct IpsecDesired {
    /// The name this connection block is loaded under (unique per (tenant, ni, conn)).
    pub name: String,
    /// The XFRM `if_id` shared with the dataplane's XFRM link for this connection.
    pub if_id: u32,
    /// Remote peer addresses, tried in order.
    pub remote_addrs: Vec<IpAddr>,
    /// Local IKE identity, if not the local address.
    pub local_id: Option<String>,
    /// Remote IKE identity, if not the remote address.
    pub remote_id: Option<String>,
    /// IKE SA proposal string.
    pub ike_proposal: String,
    /// IKE SA lifetime, in seconds.
    pub ike_lifetime: u32,
    /// CHILD SA proposal string.
    pub ipsec_proposal: String,
    /// CHILD SA lifetime, in seconds.
    pub ipsec_lifetime: u32,
    /// Whether this side initiates or only responds.
    pub initiation: Initiation,
    /// Pre-shared key.
    pub psk: String,
    /// Explicit traffic selectors, or `None` to derive selectors from the connection's routes.
    pub traffic_selectors: Option<Vec<TrafficSelectorSpec>>,
}

/// Render an IKE daemon connection block (swanctl.conf-style syntax) for `desired`.
///
/// Pure and deterministic: the same `desired` always renders the same text, mirroring the
/// routing driver's `render_config` (§4.7) and the allocator's pure-function contract (§4.2).
#[must_use]
pub fn render_conn(desired: &IpsecDesired) -> String {
    let mut out = String::new();
    out.push_str(&format!("connections.{} {{\n", desired.name));
    out.push_str(&format!(
        "  remote_addrs = {}\n",
        desired
            .remote_addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    ));
    if let Some(local_id) = &desired.local_id {
        out.push_str(&format!("  local.id = {local_id}\n"));
    }
    if let Some(remote_id) = &desired.remote_id {
        out.push_str(&format!("  remote.id = {remote_id}\n"));
    }
    out.push_str("  version = 2\n");
    out.push_str(&format!("  proposals = {}\n", desired.ike_proposal));
    out.push_str(&format!("  rekey_time = {}\n", desired.ike_lifetime));
    out.push_str(&format!("  if_id_in = {:#x}\n", desired.if_id));
    out.push_str(&format!("  if_id_out = {:#x}\n", desired.if_id));
    let action = match desired.initiation {
        Initiation::Start => "start",
        Initiation::Trap => "trap",
    };
    out.push_str(&format!("  local.auth = psk\n  remote.auth = psk\n  secret = {}\n", desired.psk));
    out.push_str("  children.child {\n");
    out.push_str(&format!("    esp_proposals = {}\n", desired.ipsec_proposal));
    out.push_str(&format!("    rekey_time = {}\n", desired.ipsec_lifetime));
    out.push_str(&format!(
        "    start_action = {action}\n    close_action = {}\n",
        if matches!(desired.initiation, Initiation::Start) {
            "close"
        } else {
            "none"
        }
    ));
    if let Some(selectors) = &desired.traffic_selectors {
        let locals = selectors
            .iter()
            .map(|ts| ts.local.clone())
            .collect::<Vec<_>>()
            .join(",");
        let remotes = selectors
            .iter()
            .map(|ts| ts.remote.clone())
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!("    local_ts = {locals}\n    remote_ts = {remotes}\n"));
    }
    out.push_str("  }\n}\n");
    out
}

/// The IKE daemon's connection-lifecycle control channel: load/unload a rendered connection
/// block, and initiate/terminate it (§4.4: "Load/unload via the daemon's control channel (atomic
/// per connection)"). Distinct from [`ike::IkeControl`], which only deletes individual SAs for
/// the dedup monitor (§4.6); this one owns connection-level configuration.
pub trait IpsecControl: Send + Sync {
    /// Load (or atomically replace) the connection block named `name`.
    fn load_conn(
        &self,
        name: &str,
        rendered: &str,
    ) -> impl Future<Output = DriverResult<()>> + Send;
    /// Remove a previously loaded connection block. Idempotent.
    fn unload_conn(&self, name: &str) -> impl Future<Output = DriverResult<()>> + Send;
    /// Ask the daemon to initiate the named connection's CHILD SA.
    fn initiate(&self, name: &str) -> impl Future<Output = DriverResult<()>> + Send;
    /// Ask the daemon to terminate the named connection's SAs. Idempotent.
    fn terminate(&self, name: &str) -> impl Future<Output = DriverResult<()>> + Send;
    /// `true` if the daemon reports an established CHILD SA for `name`.
    fn is_established(&self, name: &str) -> impl Future<Output = DriverResult<bool>> + Send;
}

/// An [`IpsecControl`] that shells out to `swanctl`, strongSwan's vici-backed control binary.
pub struct SwanctlControl {
    binary: String,
}

impl Default for SwanctlControl {
    fn default() -> Self {
        SwanctlControl {
            binary: "swanctl".to_string(),
        }
    }
}

impl SwanctlControl {
    /// Build a control client invoking a specific `swanctl`-compatible binary (tests substitute
    /// a fake binary here instead of mocking [`IpsecControl`] directly).
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        SwanctlControl {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> DriverResult<std::process::Output> {
        let display = format!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| DriverError::transient(format!("exec `{display}`: {e}")))
    }
}

impl IpsecControl for SwanctlControl {
    async fn load_conn(&self, name: &str, rendered: &str) -> DriverResult<()> {
        let path = format!("/etc/swanctl/conf.d/{name}.conf");
        tokio::fs::write(&path, rendered)
            .await
            .map_err(|e| DriverError::transient(format!("writing {path}: {e}")))?;
        let output = self.run(&["--load-conns"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::fatal(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn unload_conn(&self, name: &str) -> DriverResult<()> {
        let path = format!("/etc/swanctl/conf.d/{name}.conf");
        let _ = tokio::fs::remove_file(&path).await;
        let output = self.run(&["--load-conns"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::transient(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn initiate(&self, name: &str) -> DriverResult<()> {
        let output = self.run(&["--initiate", "--child", name]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::transient(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn terminate(&self, name: &str) -> DriverResult<()> {
        let output = self.run(&["--terminate", "--child", name]).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || stderr.contains("not found") {
            Ok(())
        } else {
            Err(DriverError::transient(stderr.trim().to_string()))
        }
    }

    async fn is_established(&self, name: &str) -> DriverResult<bool> {
        let output = self.run(&["--list-sas", "--ike", name]).await?;
        Ok(output.status.success() && !output.stdout.is_empty())
    }
}

/// Drives a single IPsec connection through a [`IpsecControl`] client.
pub struct IpsecDriver<C: IpsecControl> {
    control: C,
    loaded_name: Option<String>,
    last_psk: Option<String>,
    state: ConnState,
}

impl<C: IpsecControl> IpsecDriver<C> {
    /// Build a driver against a concrete control-channel client.
    #[must_use]
    pub fn new(control: C) -> Self {
        IpsecDriver {
            control,
            loaded_name: None,
            last_psk: None,
            state: ConnState::Idle,
        }
    }
}

impl<C: IpsecControl> ConnectionDriver for IpsecDriver<C> {
    type Desired = IpsecDesired;

    async fn apply(&mut self, desired: &IpsecDesired) -> DriverResult<ConnState> {
        self.state = ConnState::Connecting;
        let rendered = render_conn(desired);
        let psk_changed = self.last_psk.as_deref() != Some(desired.psk.as_str());
        let already_loaded = self.loaded_name.as_deref() == Some(desired.name.as_str());

        if !already_loaded || psk_changed {
            self.control.load_conn(&desired.name, &rendered).await?;
            self.loaded_name = Some(desired.name.clone());
            self.last_psk = Some(desired.psk.clone());
            if psk_changed && already_loaded {
                info!(name = %desired.name, "psk rotated, connection reloaded");
            }
        }

        if matches!(desired.initiation, Initiation::Start) {
            self.control.initiate(&desired.name).await?;
        }

        self.state = if self.control.is_established(&desired.name).await? {
            ConnState::Active
        } else {
            ConnState::Connecting
        };
        Ok(self.state)
    }

    async fn observe(&mut self) -> DriverResult<ConnState> {
        let Some(name) = &self.loaded_name else {
            self.state = ConnState::Idle;
            return Ok(self.state);
        };
        self.state = match self.control.is_established(name).await {
            Ok(true) => ConnState::Active,
            Ok(false) => ConnState::Degraded,
            Err(err) => {
                warn!(%err, "failed to poll ipsec connection state");
                return Err(err);
            }
        };
        Ok(self.state)
    }

    async fn teardown(&mut self) -> DriverResult<()> {
        if let Some(name) = self.loaded_name.take() {
            self.control.terminate(&name).await?;
            self.control.unload_conn(&name).await?;
        }
        self.last_psk = None;
        self.state = ConnState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn desired() -> IpsecDesired {
        IpsecDesired {
            name: "c0001-00-0".to_string(),
            if_id: 0x0001_0000,
            remote_addrs: vec!["192.0.2.1".parse().unwrap()],
            local_id: None,
            remote_id: None,
            ike_proposal: "aes256-sha256-modp2048".to_string(),
            ike_lifetime: 28800,
            ipsec_proposal: "aes256gcm16".to_string(),
            ipsec_lifetime: 3600,
            initiation: Initiation::Start,
            psk: "s3cret".to_string(),
            traffic_selectors: None,
        }
    }

    #[test]
    fn render_is_deterministic() {
        let d = desired();
        assert_eq!(render_conn(&d), render_conn(&d));
    }

    #[test]
    fn render_trap_uses_trap_action() {
        let mut d = desired();
        d.initiation = Initiation::Trap;
        let rendered = render_conn(&d);
        assert!(rendered.contains("start_action = trap"));
        assert!(rendered.contains("close_action = none"));
    }

    #[test]
    fn render_includes_if_id_both_directions() {
        let d = desired();
        let rendered = render_conn(&d);
        assert!(rendered.contains("if_id_in = 0x10000"));
        assert!(rendered.contains("if_id_out = 0x10000"));
    }

    #[derive(Default)]
    struct FakeControl {
        loads: Mutex<Vec<(String, String)>>,
        initiates: Mutex<Vec<String>>,
        terminates: Mutex<Vec<String>>,
        established: Mutex<bool>,
    }

    impl IpsecControl for FakeControl {
        async fn load_conn(&self, name: &str, rendered: &str) -> DriverResult<()> {
            self.loads
                .lock()
                .unwrap()
                .push((name.to_string(), rendered.to_string()));
            Ok(())
        }
        async fn unload_conn(&self, _name: &str) -> DriverResult<()> {
            Ok(())
        }
        async fn initiate(&self, name: &str) -> DriverResult<()> {
            self.initiates.lock().unwrap().push(name.to_string());
            *self.established.lock().unwrap() = true;
            Ok(())
        }
        async fn terminate(&self, name: &str) -> DriverResult<()> {
            self.terminates.lock().unwrap().push(name.to_string());
            *self.established.lock().unwrap() = false;
            Ok(())
        }
        async fn is_established(&self, _name: &str) -> DriverResult<bool> {
            Ok(*self.established.lock().unwrap())
        }
    }

    #[tokio::test]
    async fn apply_loads_once_then_skips_reload_without_psk_change() {
        let control = FakeControl::default();
        let mut driver = IpsecDriver::new(control);
        let d = desired();
        driver.apply(&d).await.unwrap();
        driver.apply(&d).await.unwrap();
        assert_eq!(driver.control.loads.lock().unwrap().len(), 1);
        assert_eq!(driver.state, ConnState::Active);
    }

    #[tokio::test]
    async fn psk_rotation_triggers_reload() {
        let control = FakeControl::default();
        let mut driver = IpsecDriver::new(control);
        let d = desired();
        driver.apply(&d).await.unwrap();
        let mut rotated = d.clone();
        rotated.psk = "new-secret".to_string();
        driver.apply(&rotated).await.unwrap();
        assert_eq!(driver.control.loads.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn trap_connection_never_initiates() {
        let control = FakeControl::default();
        let mut driver = IpsecDriver::new(control);
        let mut d = desired();
        d.initiation = Initiation::Trap;
        driver.apply(&d).await.unwrap();
        assert!(driver.control.initiates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn teardown_terminates_and_unloads() {
        let control = FakeControl::default();
        let mut driver = IpsecDriver::new(control);
        let d = desired();
        driver.apply(&d).await.unwrap();
        driver.teardown().await.unwrap();
        assert_eq!(driver.control.terminates.lock().unwrap().len(), 1);
        assert_eq!(driver.state, ConnState::Idle);
    }
}
