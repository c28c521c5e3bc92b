// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deduplicate IKE/CHILD SAs, keeping the youngest, across rekeys (§4.6, §8 invariant 5).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, warn};

use rekon::backoff::{Backoff, RetryOutcome, retry};

use crate::control::IkeControl;
use crate::errors::SaReapFailed;
use crate::sa::{SaEvent, SaEventKind, SaId, SaKey, SaKind};

/// Default make-before-break rekey window: duplicate SAs observed within this long of a
/// `CHILD_REKEY` start for the same key are left alone (§4.6).
pub const DEFAULT_REKEY_WINDOW: Duration = Duration::from_secs(30);

/// Retry budget for a failed SA delete before reporting [`SaReapFailed`].
const REAP_ATTEMPTS: u32 = 5;

fn reap_backoff() -> Backoff {
    Backoff::new(Duration::from_millis(200), Duration::from_secs(5))
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Installed {
    sa_id: SaId,
    kind: SaKind,
    created_at: DateTime<Utc>,
}

/// Tracks installed IKE/CHILD SAs per `(local_id, remote_id, if_id)` and decides which excess
/// SAs must be reaped, keeping the youngest (§4.6, §8 invariant 5). Pure bookkeeping: deciding
/// what to delete is separated from actually deleting it so the dedup policy can be tested
/// without a fake control channel.
pub struct SaMonitor {
    rekey_window: Duration,
    installed: HashMap<SaKey, Vec<Installed>>,
    rekey_deadline: HashMap<SaKey, Instant>,
}

impl Default for SaMonitor {
    fn default() -> Self {
        SaMonitor::new(DEFAULT_REKEY_WINDOW)
    }
}

impl SaMonitor {
    /// Build a monitor with the given rekey-window duration.
    #[must_use]
    pub fn new(rekey_window: Duration) -> Self {
        SaMonitor {
            rekey_window,
            installed: HashMap::new(),
            rekey_deadline: HashMap::new(),
        }
    }

    /// Apply one event to the tracked state, returning the `(key, sa_id, kind)` triples that
    /// should now be deleted from the IKE daemon to restore the keep-youngest invariant.
    pub fn apply(&mut self, event: &SaEvent) -> Vec<(SaKey, SaId, SaKind)> {
        match event.kind {
            SaEventKind::RekeyStart => {
                self.rekey_deadline
                    .insert(event.key.clone(), Instant::now() + self.rekey_window);
                return Vec::new();
            }
            SaEventKind::Deleted => {
                if let Some(entry) = self.installed.get_mut(&event.key) {
                    entry.retain(|sa| sa.sa_id != event.sa_id);
                    if entry.is_empty() {
                        self.installed.remove(&event.key);
                    }
                }
                return Vec::new();
            }
            SaEventKind::Installed => {
                let entry = self.installed.entry(event.key.clone()).or_default();
                if let Some(existing) = entry.iter_mut().find(|sa| sa.sa_id == event.sa_id) {
                    existing.created_at = existing.created_at.max(event.created_at);
                } else {
                    entry.push(Installed {
                        sa_id: event.sa_id.clone(),
                        kind: event.sa_kind,
                        created_at: event.created_at,
                    });
                }
            }
        }

        if self.in_rekey_window(&event.key) {
            debug!(if_id = event.key.if_id, "duplicate within rekey window, not reaping");
            return Vec::new();
        }
        self.rekey_deadline.remove(&event.key);
        self.reap_excess(&event.key)
    }

    fn in_rekey_window(&self, key: &SaKey) -> bool {
        self.rekey_deadline
            .get(key)
            .is_some_and(|deadline| Instant::now() < *deadline)
    }

    fn reap_excess(&mut self, key: &SaKey) -> Vec<(SaKey, SaId, SaKind)> {
        let Some(entry) = self.installed.get_mut(key) else {
            return Vec::new();
        };
        let mut to_delete = Vec::new();
        for kind in [SaKind::Ike, SaKind::Child] {
            let mut of_kind: Vec<&Installed> = entry.iter().filter(|sa| sa.kind == kind).collect();
            if of_kind.len() <= 1 {
                continue;
            }
            of_kind.sort_by_key(|sa| sa.created_at);
            #[allow(clippy::unwrap_used)] // of_kind.len() > 1 guarantees a last element
            let youngest = of_kind.last().unwrap().sa_id.clone();
            for sa in &of_kind {
                if sa.sa_id != youngest {
                    to_delete.push((kind, sa.sa_id.clone()));
                }
            }
        }
        entry.retain(|sa| !to_delete.iter().any(|(_, sa_id)| *sa_id == sa.sa_id));
        to_delete
            .into_iter()
            .map(|(kind, sa_id)| (key.clone(), sa_id, kind))
            .collect()
    }
}

/// Drive `events` through a [`SaMonitor`], reaping excess SAs via `control` with a 5-attempt
/// retry budget, and calling `on_reap_failed` when the budget is exhausted (§4.6, §7
/// `SAReapFailed`).
pub async fn run<C: IkeControl>(
    mut events: std::pin::Pin<&mut (dyn futures::Stream<Item = SaEvent> + Send)>,
    control: &C,
    monitor: &mut SaMonitor,
    mut on_reap_failed: impl FnMut(SaReapFailed),
) {
    while let Some(event) = events.next().await {
        let to_delete = monitor.apply(&event);
        for (key, sa_id, kind) in to_delete {
            reap_one(control, &key, &sa_id, kind, &mut on_reap_failed).await;
        }
    }
}

async fn reap_one<C: IkeControl>(
    control: &C,
    key: &SaKey,
    sa_id: &SaId,
    kind: SaKind,
    on_reap_failed: &mut impl FnMut(SaReapFailed),
) {
    let outcome = retry(reap_backoff(), REAP_ATTEMPTS, || control.delete_sa(key, sa_id, kind)).await;
    match outcome {
        RetryOutcome::Succeeded(()) => {
            debug!(if_id = key.if_id, sa_id = %sa_id, "reaped duplicate sa");
        }
        RetryOutcome::Exhausted(err) => {
            warn!(if_id = key.if_id, sa_id = %sa_id, error = %err, "sa reap exhausted retry budget");
            on_reap_failed(SaReapFailed {
                key: key.clone(),
                sa_id: sa_id.clone(),
                reason: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn key() -> SaKey {
        SaKey {
            local_id: Some("local@example".to_string()),
            remote_id: Some("remote@example".to_string()),
            if_id: 42,
        }
    }

    fn installed(sa_id: &str, kind: SaKind, created_at: DateTime<Utc>) -> SaEvent {
        SaEvent {
            key: key(),
            sa_kind: kind,
            sa_id: SaId::from(sa_id),
            kind: SaEventKind::Installed,
            created_at,
        }
    }

    #[test]
    fn duplicate_child_sas_reap_all_but_youngest() {
        let mut monitor = SaMonitor::new(DEFAULT_REKEY_WINDOW);
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let t1 = t0 + chrono::Duration::seconds(5);

        assert!(monitor.apply(&installed("sa-1", SaKind::Child, t0)).is_empty());
        let to_delete = monitor.apply(&installed("sa-2", SaKind::Child, t1));

        assert_eq!(to_delete, vec![(key(), SaId::from("sa-1"), SaKind::Child)]);
    }

    #[test]
    fn youngest_survives_regardless_of_arrival_order() {
        let mut monitor = SaMonitor::new(DEFAULT_REKEY_WINDOW);
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let t1 = t0 + chrono::Duration::seconds(5);

        // The younger SA arrives first; the older arrives second and must be the one reaped.
        assert!(monitor.apply(&installed("sa-young", SaKind::Child, t1)).is_empty());
        let to_delete = monitor.apply(&installed("sa-old", SaKind::Child, t0));

        assert_eq!(to_delete, vec![(key(), SaId::from("sa-old"), SaKind::Child)]);
    }

    #[test]
    fn duplicates_within_rekey_window_are_not_reaped() {
        let mut monitor = SaMonitor::new(Duration::from_secs(30));
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let t1 = t0 + chrono::Duration::seconds(1);

        monitor.apply(&SaEvent {
            key: key(),
            sa_kind: SaKind::Child,
            sa_id: SaId::from("sa-old"),
            kind: SaEventKind::RekeyStart,
            created_at: t0,
        });
        assert!(monitor.apply(&installed("sa-old", SaKind::Child, t0)).is_empty());
        let to_delete = monitor.apply(&installed("sa-new", SaKind::Child, t1));
        assert!(to_delete.is_empty(), "duplicates mid-rekey must be left alone");
    }

    #[test]
    fn ike_and_child_sas_dedup_independently() {
        let mut monitor = SaMonitor::new(DEFAULT_REKEY_WINDOW);
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let t1 = t0 + chrono::Duration::seconds(1);

        assert!(monitor.apply(&installed("ike-1", SaKind::Ike, t0)).is_empty());
        // A single IKE_SA plus a single CHILD_SA is not a duplicate of anything.
        assert!(monitor.apply(&installed("child-1", SaKind::Child, t1)).is_empty());
    }

    #[derive(Default)]
    struct FakeControl {
        deleted: Mutex<Vec<SaId>>,
    }

    impl IkeControl for FakeControl {
        async fn delete_sa(&self, _key: &SaKey, sa_id: &SaId, _kind: SaKind) -> crate::errors::IkeResult<()> {
            #[allow(clippy::unwrap_used)]
            self.deleted.lock().unwrap().push(sa_id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn reap_one_succeeds_without_reporting_failure() {
        let control = FakeControl::default();
        let mut failures = Vec::new();
        reap_one(&control, &key(), &SaId::from("sa-1"), SaKind::Child, &mut |f| failures.push(f)).await;
        #[allow(clippy::unwrap_used)]
        assert_eq!(*control.deleted.lock().unwrap(), vec![SaId::from("sa-1")]);
        assert!(failures.is_empty());
    }

    struct AlwaysFails;

    impl IkeControl for AlwaysFails {
        async fn delete_sa(&self, _key: &SaKey, _sa_id: &SaId, _kind: SaKind) -> crate::errors::IkeResult<()> {
            Err(crate::errors::IkeError::control("daemon unreachable"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_sa_reap_failed() {
        let mut failures = Vec::new();
        reap_one(&AlwaysFails, &key(), &SaId::from("sa-1"), SaKind::Child, &mut |f| failures.push(f)).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sa_id, SaId::from("sa-1"));
    }
}
