// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Filesystem watcher over `active/`, publishing debounced [`Snapshot`]s (§4.1, §5).

use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::errors::ConfigResult;
use crate::snapshot::Snapshot;
use crate::store::Store;

/// How long to wait after the last filesystem event before reloading, so that the several
/// renames a single commit produces collapse into one reload (§4.1: "debounced to coalesce
/// bursts of renames from a single commit into one `Snapshot` publish").
const DEBOUNCE: Duration = Duration::from_millis(200);

/// A live handle on the most recently published [`Snapshot`].
///
/// Backed by a [`tokio::sync::watch`] channel: this gives exactly the last-writer-wins
/// coalescing semantics §5 specifies for snapshot delivery — a slow subscriber observes only the
/// latest snapshot, never a backlog.
pub type SnapshotRx = watch::Receiver<Arc<Snapshot>>;

/// Start watching `active/` for changes, publishing every successfully validated reload.
///
/// The returned receiver already holds the result of an initial [`Store::load_active`] call.
/// Reload failures (a transient bad write caught mid-rename, or a commit that somehow slipped an
/// invalid config past validation) are logged and do not update the published snapshot — the
/// watcher keeps the last good snapshot live rather than propagating a momentarily-broken one.
///
/// # Errors
///
/// Returns the error from the initial [`Store::load_active`] call, or a [`notify`] setup failure
/// wrapped as [`crate::errors::ConfigError::Io`].
pub fn watch_active(store: Store, active_dir: std::path::PathBuf) -> ConfigResult<SnapshotRx> {
    let initial = Arc::new(store.load_active()?);
    let (tx, rx) = watch::channel(initial);

    let (raw_tx, raw_rx) = std::sync::mpsc::channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(raw_tx)
        .map_err(|e| crate::errors::ConfigError::invalid(active_dir.display().to_string(), e.to_string()))?;
    watcher
        .watch(&active_dir, RecursiveMode::NonRecursive)
        .map_err(|e| crate::errors::ConfigError::invalid(active_dir.display().to_string(), e.to_string()))?;

    std::thread::Builder::new()
        .name("vpnc-config-watch".to_string())
        .spawn(move || {
            // keep the watcher alive for the lifetime of this thread
            let _watcher = watcher;
            loop {
                let Ok(first) = raw_rx.recv() else {
                    debug!("config watch channel closed, stopping watcher thread");
                    return;
                };
                if let Err(e) = first {
                    warn!("config watch error: {e}");
                    continue;
                }
                // drain and coalesce any further events that land within the debounce window
                while raw_rx.recv_timeout(DEBOUNCE).is_ok() {}

                match store.load_active() {
                    Ok(snapshot) => {
                        debug!("published config generation {}", snapshot.generation);
                        if tx.send(Arc::new(snapshot)).is_err() {
                            debug!("no subscribers left, stopping watcher thread");
                            return;
                        }
                    }
                    Err(e) => error!("active config reload failed, keeping prior snapshot: {e}"),
                }
            }
        })
        .map_err(|e| crate::errors::ConfigError::invalid(active_dir.display().to_string(), e.to_string()))?;

    Ok(rx)
}
