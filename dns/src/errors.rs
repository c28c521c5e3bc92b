// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors raised talking to the netfilter DNS hook's local control channel (§4.8).

use thiserror::Error;

/// Everything that can go wrong pushing rewrite rules to the DNS hook.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The control channel rejected the push or could not be reached.
    #[error("dns hook control channel error: {reason}")]
    Control {
        /// What went wrong.
        reason: String,
    },
}

impl DnsError {
    /// Build a [`DnsError::Control`] from a reason.
    #[must_use]
    pub fn control(reason: impl Into<String>) -> Self {
        DnsError::Control {
            reason: reason.into(),
        }
    }
}

/// Result alias for DNS-doctor operations.
pub type DnsResult<T> = Result<T, DnsError>;
