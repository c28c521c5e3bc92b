// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Atomically write the rendered config and trigger a reload (§4.7: "writes the config atomically
//! and issues a reload; it does not restart the daemon"), generalizing the `frr-reload.py`/
//! `frrmi` control-binary pattern to whichever routing daemon is configured.

use std::path::Path;

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::errors::{RoutingError, RoutingResult};

/// Write `rendered` to `config_path` via rename-into-place, then invoke `reload_command` (e.g.
/// `/usr/lib/frr/frr-reload.py --reload`) to apply it without restarting the daemon.
///
/// # Errors
///
/// Returns [`RoutingError::Write`] if the atomic replace fails, or [`RoutingError::Control`] if
/// the reload command can't be spawned, and [`RoutingError::Rejected`] if it reports a
/// configuration rejection (a non-empty, non-whitespace stderr on a nonzero exit).
pub async fn reload(config_path: &Path, rendered: &str, reload_command: &[&str]) -> RoutingResult<()> {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tokio::task::spawn_blocking({
        let dir = dir.to_path_buf();
        move || NamedTempFile::new_in(dir)
    })
    .await
    .map_err(|e| RoutingError::Write {
        path: config_path.display().to_string(),
        source: std::io::Error::other(e),
    })?
    .map_err(|e| RoutingError::Write {
        path: config_path.display().to_string(),
        source: e,
    })?;

    {
        use std::io::Write;
        tmp.write_all(rendered.as_bytes())
            .map_err(|e| RoutingError::Write {
                path: config_path.display().to_string(),
                source: e,
            })?;
    }
    tmp.persist(config_path).map_err(|e| RoutingError::Write {
        path: config_path.display().to_string(),
        source: e.error,
    })?;
    debug!(path = %config_path.display(), "routing config written");

    let Some((program, args)) = reload_command.split_first() else {
        return Ok(());
    };
    let display = reload_command.join(" ");
    trace!(command = %display, "exec");
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| RoutingError::Control {
            command: display.clone(),
            reason: e.to_string(),
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Err(RoutingError::Control {
            command: display,
            reason: format!("exit status {:?}", output.status.code()),
        })
    } else {
        Err(RoutingError::Rejected(stderr))
    }
}
