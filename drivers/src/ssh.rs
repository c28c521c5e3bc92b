// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The SSH connection driver (§4.4): a supervised `ssh -w` tunnel process creating a `tun`
//! device, restarted with exponential backoff (1,2,4,...,60s, reset after 60s stable). If
//! `remote_config=true`, the driver also pushes iptables forwarding rules into the remote host
//! over the tunnel.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use rekon::backoff::Backoff;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::driver::ConnectionDriver;
use crate::errors::{DriverError, DriverResult};
use crate::state::ConnState;

/// Restart backoff floor/ceiling (§4.4: "1,2,4,...,60s, reset on 60s stability").
const RESTART_BACKOFF: Backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
/// How long a tunnel has to stay up before the restart backoff resets to its floor.
const STABILITY_WINDOW: Duration = Duration::from_secs(60);

/// The desired state of an SSH connection, derived from `config.ssh` (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct SshDesired {
    /// Remote peer addresses, tried in order.
    pub remote_addrs: Vec<IpAddr>,
    /// The tunnel device id on the remote side (`ssh -w local:remote`).
    pub remote_tunnel_id: u8,
    /// The tunnel device id on the local side.
    pub local_tunnel_id: u8,
    /// SSH username.
    pub username: String,
    /// Whether the driver should push forwarding rules to the remote host.
    pub remote_config: bool,
    /// Interface name on the remote host the pushed forwarding rules should bind.
    pub remote_config_interface: Option<String>,
}

/// Supervises one `ssh -w` child process and reports its observed liveness as a [`ConnState`].
pub struct SshDriver {
    ssh_binary: String,
    child: Option<Child>,
    restart_attempts: u32,
    established_at: Option<Instant>,
    state: ConnState,
}

impl Default for SshDriver {
    fn default() -> Self {
        Self::new("ssh".to_string())
    }
}

impl SshDriver {
    /// Build a driver invoking `ssh_binary` (e.g. `autossh` or plain `ssh`) to create the tunnel.
    #[must_use]
    pub fn new(ssh_binary: String) -> Self {
        SshDriver {
            ssh_binary,
            child: None,
            restart_attempts: 0,
            established_at: None,
            state: ConnState::Idle,
        }
    }

    fn spawn(&self, desired: &SshDesired) -> DriverResult<Child> {
        let Some(&remote) = desired.remote_addrs.first() else {
            return Err(DriverError::fatal("ssh connection has no remote_addrs"));
        };
        let tunnel_spec = format!("{}:{}", desired.local_tunnel_id, desired.remote_tunnel_id);
        let mut command = Command::new(&self.ssh_binary);
        command
            .arg("-w")
            .arg(tunnel_spec)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("ServerAliveInterval=5")
            .arg(format!("{}@{}", desired.username, remote))
            .kill_on_drop(true);
        command.spawn().map_err(|e| {
            DriverError::transient(format!("spawning {}: {e}", self.ssh_binary))
        })
    }

    async fn push_remote_config(&self, desired: &SshDesired) -> DriverResult<()> {
        if !desired.remote_config {
            return Ok(());
        }
        let Some(&remote) = desired.remote_addrs.first() else {
            return Err(DriverError::fatal("ssh connection has no remote_addrs"));
        };
        let iface = desired
            .remote_config_interface
            .as_deref()
            .unwrap_or("tun0");
        let rule = format!(
            "iptables -A FORWARD -i {iface} -j ACCEPT && iptables -A FORWARD -o {iface} -j ACCEPT"
        );
        let output = Command::new("ssh")
            .arg(format!("{}@{}", desired.username, remote))
            .arg(rule)
            .output()
            .await
            .map_err(|e| DriverError::transient(format!("pushing remote config: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DriverError::fatal(format!(
                "remote host rejected forwarding rules: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl ConnectionDriver for SshDriver {
    type Desired = SshDesired;

    async fn apply(&mut self, desired: &SshDesired) -> DriverResult<ConnState> {
        if let Some(child) = &mut self.child {
            if child.try_wait().ok().flatten().is_none() {
                // Still running; nothing to do.
                return self.observe().await;
            }
        }

        self.state = ConnState::Connecting;
        let child = self.spawn(desired)?;
        self.child = Some(child);
        self.push_remote_config(desired).await?;
        self.state = ConnState::Active;
        self.established_at = Some(Instant::now());
        info!(username = %desired.username, "ssh tunnel started");
        Ok(self.state)
    }

    async fn observe(&mut self) -> DriverResult<ConnState> {
        let Some(child) = &mut self.child else {
            self.state = ConnState::Idle;
            return Ok(self.state);
        };
        match child.try_wait() {
            Ok(None) => {
                if let Some(since) = self.established_at {
                    if since.elapsed() >= STABILITY_WINDOW {
                        self.restart_attempts = 0;
                    }
                }
                self.state = ConnState::Active;
            }
            Ok(Some(status)) => {
                warn!(%status, "ssh tunnel process exited, scheduling restart");
                self.established_at = None;
                let delay = RESTART_BACKOFF.delay_for(self.restart_attempts);
                self.restart_attempts = self.restart_attempts.saturating_add(1);
                tokio::time::sleep(delay).await;
                self.state = ConnState::Degraded;
            }
            Err(e) => {
                return Err(DriverError::transient(format!("polling ssh child: {e}")));
            }
        }
        Ok(self.state)
    }

    async fn teardown(&mut self) -> DriverResult<()> {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.established_at = None;
        self.restart_attempts = 0;
        self.state = ConnState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> SshDesired {
        SshDesired {
            remote_addrs: vec!["192.0.2.9".parse().unwrap()],
            remote_tunnel_id: 4,
            local_tunnel_id: 0,
            username: "vpnc".to_string(),
            remote_config: false,
            remote_config_interface: None,
        }
    }

    #[test]
    fn rejects_empty_remote_addrs() {
        let driver = SshDriver::default();
        let mut d = desired();
        d.remote_addrs.clear();
        assert!(driver.spawn(&d).is_err());
    }

    #[test]
    fn restart_backoff_doubles_then_caps() {
        assert_eq!(RESTART_BACKOFF.delay_for(0), Duration::from_secs(1));
        assert_eq!(RESTART_BACKOFF.delay_for(1), Duration::from_secs(2));
        assert_eq!(RESTART_BACKOFF.delay_for(6), Duration::from_secs(60));
    }
}
