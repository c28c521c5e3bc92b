// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An [`ike::IkeControl`] that shells out to `swanctl`, the same idempotent
//! format-argv/run/classify-exit idiom `drivers::ipsec::SwanctlControl` uses for connection
//! lifecycle control, applied here to individual SA deletes for the dedup monitor (§4.6).

use ike::{IkeControl, IkeError, IkeResult, SaId, SaKey, SaKind};
use tokio::process::Command;
use tokio::time::Duration;
use tracing::debug;

/// Deletes individual IKE/CHILD SAs via `swanctl --terminate --ike-id|--child-id <id>`.
pub struct SwanctlIkeControl {
    binary: String,
    timeout: Duration,
}

impl SwanctlIkeControl {
    /// Build a control client invoking `binary`, aborting any single invocation after `timeout`.
    #[must_use]
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        SwanctlIkeControl {
            binary: binary.into(),
            timeout,
        }
    }
}

impl IkeControl for SwanctlIkeControl {
    async fn delete_sa(&self, key: &SaKey, sa_id: &SaId, kind: SaKind) -> IkeResult<()> {
        let id_flag = match kind {
            SaKind::Ike => "--ike-id",
            SaKind::Child => "--child-id",
        };
        let display = format!("{} --terminate {id_flag} {}", self.binary, sa_id);
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(["--terminate", id_flag, sa_id.0.as_str()])
                .output(),
        )
        .await
        .map_err(|_| IkeError::control(format!("`{display}` timed out after {:?}", self.timeout)))?
        .map_err(|e| IkeError::control(format!("exec `{display}`: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || stderr.contains("not found") {
            debug!(if_id = key.if_id, sa_id = %sa_id, ?kind, "sa terminated");
            Ok(())
        } else {
            Err(IkeError::control(stderr.trim().to_string()))
        }
    }
}
