// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error kinds raised by connection drivers (§7 `DriverTransient`/`DriverFatal`/`KernelBusy`).

use thiserror::Error;

/// Everything that can go wrong applying, observing or tearing down a connection driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Timeout or disconnect talking to the IKE daemon, `wg` netlink family, SSH child, or
    /// kernel. Recovered locally with exponential backoff; the connection goes `DEGRADED`.
    #[error("transient driver error: {reason}")]
    Transient {
        /// What went wrong.
        reason: String,
    },
    /// The configuration was rejected by a subordinate daemon (bad proposal, key mismatch).
    /// Logged; the connection stays `CONFIGURED` carrying this reason.
    #[error("driver rejected configuration: {reason}")]
    Fatal {
        /// Why the configuration was rejected.
        reason: String,
    },
    /// A retryable `EBUSY`/`EEXIST` from rtnetlink, retried up to 3 times before becoming
    /// [`DriverError::Transient`].
    #[error("kernel busy: {reason}")]
    KernelBusy {
        /// The underlying kernel complaint.
        reason: String,
    },
}

impl DriverError {
    /// Build a [`DriverError::Transient`] from a reason.
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        DriverError::Transient {
            reason: reason.into(),
        }
    }

    /// Build a [`DriverError::Fatal`] from a reason.
    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        DriverError::Fatal {
            reason: reason.into(),
        }
    }

    /// Build a [`DriverError::KernelBusy`] from a reason.
    #[must_use]
    pub fn kernel_busy(reason: impl Into<String>) -> Self {
        DriverError::KernelBusy {
            reason: reason.into(),
        }
    }
}

impl From<rtnetlink::Error> for DriverError {
    fn from(value: rtnetlink::Error) -> Self {
        DriverError::transient(value.to_string())
    }
}

/// Result alias for connection driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
