// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The IKE daemon's control-channel contract the monitor reaps duplicate SAs through (§5: "IKE
//! daemon's control channel is serialized by a single worker").

use crate::errors::IkeResult;
use crate::sa::{SaId, SaKey, SaKind};

/// Deletes SAs from the IKE daemon. Implemented against e.g. strongSwan's `vici` control socket;
/// a single worker task owns the channel so requests are serialized (§5).
pub trait IkeControl: Send + Sync {
    /// Terminate the named SA. Idempotent: deleting an SA that is already gone succeeds.
    fn delete_sa(
        &self,
        key: &SaKey,
        sa_id: &SaId,
        kind: SaKind,
    ) -> impl Future<Output = IkeResult<()>> + Send;
}
