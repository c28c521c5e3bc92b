// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A cheaply-cloneable, lock-free handle on the most recently published [`StatusSnapshot`].
//!
//! Mirrors `config::watch::SnapshotRx`'s "last-writer-wins" contract (§5: "neighbor-state are
//! last-writer-wins"), but for status reads rather than config writes: `arc-swap` is used instead
//! of a `tokio::sync::watch` channel since readers here (HTTP handlers) don't need to wait for a
//! new value, only ever see the latest one.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::StatusSnapshot;

/// Published status state, shared between the supervisor (writer) and the HTTP handlers
/// (readers) behind an `Arc`.
#[derive(Default)]
pub struct StatusStore {
    current: ArcSwap<StatusSnapshot>,
}

impl StatusStore {
    /// Build an empty store, reporting generation 0 and no connections until the supervisor
    /// publishes its first snapshot.
    #[must_use]
    pub fn new() -> Self {
        StatusStore {
            current: ArcSwap::from_pointee(StatusSnapshot::default()),
        }
    }

    /// Replace the published snapshot. Called by the supervisor after every reconcile pass and
    /// every routing-daemon poll.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<StatusSnapshot> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_replaces_the_prior_snapshot() {
        let store = StatusStore::new();
        assert_eq!(store.current().generation, 0);

        store.publish(StatusSnapshot {
            generation: 7,
            ..Default::default()
        });
        assert_eq!(store.current().generation, 7);
    }
}
