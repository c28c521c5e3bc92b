// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error kinds raised talking to the IKE daemon's control channel (§7).

use thiserror::Error;

use crate::sa::SaKey;

/// Everything that can go wrong driving the IKE daemon's control channel.
#[derive(Debug, Error)]
pub enum IkeError {
    /// The control channel rejected the request or could not be reached.
    #[error("ike control channel: {reason}")]
    Control {
        /// What went wrong, as reported by the channel or the transport.
        reason: String,
    },
}

impl IkeError {
    /// Build an [`IkeError::Control`] from a displayable reason.
    pub fn control(reason: impl Into<String>) -> Self {
        IkeError::Control {
            reason: reason.into(),
        }
    }
}

/// Convenience alias for IKE control-channel results.
pub type IkeResult<T> = Result<T, IkeError>;

/// Reported through the status surface when an excess SA survives the retry budget (§7
/// `SAReapFailed`): the daemon left it alone until the next event gives it another chance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SaReapFailed {
    /// The `(local_id, remote_id, if_id)` the excess SA belongs to.
    pub key: SaKey,
    /// The SA that could not be deleted.
    pub sa_id: crate::sa::SaId,
    /// The control channel's last rejection reason.
    pub reason: String,
}
