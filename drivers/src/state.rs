// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The per-connection state machine every driver reports into (§4.4).

/// A connection's state, as reported by a driver's `apply`/`observe`.
///
/// Transitions: `apply` from [`ConnState::Idle`]/[`ConnState::Configured`] installs config and
/// moves to [`ConnState::Connecting`]; `observe` (or an inbound event) moves to
/// [`ConnState::Active`] once the transport reports establishment, to [`ConnState::Degraded`] on
/// loss. `teardown` is valid from any state and reaches [`ConnState::Idle`] once all kernel
/// objects are gone.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ConnState {
    /// No configuration has been installed.
    Idle,
    /// Configuration is installed but the transport has not yet been asked to connect.
    Configured,
    /// The transport has been asked to establish and hasn't reported success or failure yet.
    Connecting,
    /// The transport reports the connection is up.
    Active,
    /// The transport reports the connection has been lost; retried with backoff.
    Degraded,
}

impl ConnState {
    /// `true` if this state means the connection is usable for traffic.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, ConnState::Active)
    }
}
