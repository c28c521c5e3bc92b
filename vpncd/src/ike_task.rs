// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Wires the IKE event source ([`crate::ike_events`]) through [`ike::SaMonitor`] and
//! [`crate::ike_control::SwanctlIkeControl`], publishing reap failures to the status surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use ike::{SaEvent, SaMonitor, run as monitor_run};
use tokio::sync::watch;
use tracing::warn;

use crate::ike_control::SwanctlIkeControl;
use crate::ike_events;
use crate::supervisor::Supervisor;

/// Run the SA monitor until the event source's stream ends (the source itself only ends when
/// `shutdown` fires; see [`ike_events::run_event_source`]).
pub async fn run(
    supervisor: Arc<Supervisor>,
    events_sock: PathBuf,
    swanctl_binary: String,
    command_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) {
    let (stream, source_handle) = ike_events::spawn(events_sock, shutdown);
    let control = SwanctlIkeControl::new(swanctl_binary, command_timeout);
    let mut monitor = SaMonitor::default();

    let mut stream = std::pin::pin!(stream);
    let stream: std::pin::Pin<&mut (dyn Stream<Item = SaEvent> + Send)> = stream.as_mut();
    monitor_run(stream, &control, &mut monitor, |failed| {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            let report = status::ReapFailure::from_report(&failed.key, &failed.sa_id, &failed.reason);
            supervisor.push_reap_failure(report).await;
        });
    })
    .await;

    if let Err(e) = source_handle.await {
        warn!(error = %e, "ike event source task panicked");
    }
}
