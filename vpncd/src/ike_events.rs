// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A concrete `Stream<Item = ike::SaEvent>` source.
//!
//! No crate in the pack models the IKE daemon's event transport (the vici protocol carries it
//! over strongSwan's own control socket); this connects to a Unix socket on which the daemon (or
//! a shim beside it) is expected to emit one JSON object per line, one event per line, and turns
//! that into the `Stream` `ike::run` consumes. Reconnects with the same backoff idiom used
//! elsewhere in this crate rather than giving up after one dropped connection.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ike::{SaEvent, SaEventKind, SaId, SaKey, SaKind};
use rekon::backoff::Backoff;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct WireSaEvent {
    local_id: Option<String>,
    remote_id: Option<String>,
    if_id: u32,
    sa_kind: WireSaKind,
    sa_id: String,
    kind: WireSaEventKind,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
enum WireSaKind {
    Ike,
    Child,
}

#[derive(Deserialize)]
enum WireSaEventKind {
    Installed,
    RekeyStart,
    Deleted,
}

impl From<WireSaEvent> for SaEvent {
    fn from(value: WireSaEvent) -> Self {
        SaEvent {
            key: SaKey {
                local_id: value.local_id,
                remote_id: value.remote_id,
                if_id: value.if_id,
            },
            sa_kind: match value.sa_kind {
                WireSaKind::Ike => SaKind::Ike,
                WireSaKind::Child => SaKind::Child,
            },
            sa_id: SaId::from(value.sa_id),
            kind: match value.kind {
                WireSaEventKind::Installed => SaEventKind::Installed,
                WireSaEventKind::RekeyStart => SaEventKind::RekeyStart,
                WireSaEventKind::Deleted => SaEventKind::Deleted,
            },
            created_at: value.created_at,
        }
    }
}

/// Connects to `socket_path` and forwards decoded events onto `tx` until the connection drops,
/// reconnecting with a capped exponential backoff (mirrors the SSH driver's restart schedule,
/// §4.4: "1,2,4,...,60s, reset after 60s stability").
async fn connect_and_forward(socket_path: &std::path::Path, tx: &mpsc::Sender<SaEvent>) -> std::io::Result<()> {
    let stream = UnixStream::connect(socket_path).await?;
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WireSaEvent>(&line) {
            Ok(wire) => {
                if tx.send(wire.into()).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => warn!(error = %e, "discarding malformed ike event"),
        }
    }
    Ok(())
}

/// Drive a long-lived connection to the IKE daemon's event socket, reconnecting on failure,
/// until `shutdown` resolves.
pub async fn run_event_source(socket_path: PathBuf, tx: mpsc::Sender<SaEvent>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
    let mut attempt = 0u32;
    loop {
        tokio::select! {
            () = async {
                match connect_and_forward(&socket_path, &tx).await {
                    Ok(()) => debug!(path = %socket_path.display(), "ike event source connection closed"),
                    Err(e) => warn!(path = %socket_path.display(), error = %e, "ike event source connection failed"),
                }
                tokio::time::sleep(backoff.delay_for(attempt)).await;
                attempt = attempt.saturating_add(1);
            } => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Build the channel-backed stream `ike::run` consumes, fed by [`run_event_source`] running on
/// its own task.
#[must_use]
pub fn spawn(
    socket_path: PathBuf,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> (ReceiverStream<SaEvent>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(run_event_source(socket_path, tx, shutdown));
    (ReceiverStream::new(rx), handle)
}
