// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Poll BGP neighbor state from the routing daemon's control binary and republish it (§4.7:
//! "Neighbor state is polled and republished").

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Deserialize;
use tokio::process::Command;
use tracing::trace;

use crate::errors::{RoutingError, RoutingResult};

/// A neighbor's BGP session state, mirroring the routing daemon's own state machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub enum NeighborState {
    /// No session.
    Idle,
    /// TCP connecting.
    Connect,
    /// Listening for an inbound connection.
    Active,
    /// OPEN sent, awaiting peer's OPEN.
    OpenSent,
    /// OPEN confirmed, awaiting keepalive.
    OpenConfirm,
    /// Session up.
    Established,
    /// A state this daemon does not recognize.
    Unknown,
}

impl From<&str> for NeighborState {
    fn from(value: &str) -> Self {
        match value {
            "Idle" => NeighborState::Idle,
            "Connect" => NeighborState::Connect,
            "Active" => NeighborState::Active,
            "OpenSent" => NeighborState::OpenSent,
            "OpenConfirm" => NeighborState::OpenConfirm,
            "Established" => NeighborState::Established,
            _ => NeighborState::Unknown,
        }
    }
}

/// One neighbor's polled status, as republished on the status surface (§6).
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct NeighborStatus {
    /// The neighbor's address.
    pub address: IpAddr,
    /// The neighbor's remote ASN, as last reported.
    pub remote_asn: u32,
    /// Current session state.
    pub state: NeighborState,
    /// How long the session has been in its current state, if known.
    pub uptime_secs: Option<u64>,
}

#[derive(Deserialize)]
struct RawSummary {
    peers: BTreeMap<String, RawPeer>,
}

#[derive(Deserialize)]
struct RawPeer {
    #[serde(rename = "remoteAs")]
    remote_as: u32,
    state: String,
    #[serde(rename = "peerUptimeMsec")]
    peer_uptime_msec: Option<u64>,
}

/// Poll neighbor state by running `poll_command` (e.g. `vtysh -c "show bgp summary json"`) and
/// parsing its JSON output.
///
/// # Errors
///
/// Returns [`RoutingError::Control`] if the command can't be spawned, exits non-zero, or its
/// output isn't the expected JSON shape.
pub async fn poll_neighbors(poll_command: &[&str]) -> RoutingResult<Vec<NeighborStatus>> {
    let Some((program, args)) = poll_command.split_first() else {
        return Ok(Vec::new());
    };
    let display = poll_command.join(" ");
    trace!(command = %display, "exec");
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| RoutingError::Control {
            command: display.clone(),
            reason: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(RoutingError::Control {
            command: display,
            reason: format!("exit status {:?}", output.status.code()),
        });
    }
    let raw: RawSummary =
        serde_json::from_slice(&output.stdout).map_err(|e| RoutingError::Control {
            command: display,
            reason: format!("unparseable neighbor summary: {e}"),
        })?;

    let mut neighbors: Vec<NeighborStatus> = raw
        .peers
        .into_iter()
        .filter_map(|(addr, peer)| {
            let address = addr.parse().ok()?;
            Some(NeighborStatus {
                address,
                remote_asn: peer.remote_as,
                state: NeighborState::from(peer.state.as_str()),
                uptime_secs: peer.peer_uptime_msec.map(|ms| ms / 1000),
            })
        })
        .collect();
    neighbors.sort_by_key(|n| n.address);
    Ok(neighbors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_state_parses_known_values() {
        assert_eq!(NeighborState::from("Established"), NeighborState::Established);
        assert_eq!(NeighborState::from("bogus"), NeighborState::Unknown);
    }
}
