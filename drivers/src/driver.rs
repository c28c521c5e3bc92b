// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The shared connection-driver contract (§4.4): `apply(desired) -> ActualState`,
//! `observe() -> ActualState`, `teardown()`.

use crate::errors::DriverResult;
use crate::state::ConnState;

/// A connection driver owns exactly one connection's transport lifecycle.
///
/// Implementations never hold a lock across a blocking or kernel call; the reconciler serializes
/// calls into a given driver instance on the owning NI's lock (§5).
pub trait ConnectionDriver: Send + Sync {
    /// The transport-specific configuration this driver installs on `apply`.
    type Desired: Send + Sync;

    /// Install `desired`, transitioning out of [`ConnState::Idle`]/[`ConnState::Configured`]
    /// towards [`ConnState::Connecting`].
    ///
    /// Idempotent: calling `apply` again with the same `desired` while already
    /// [`ConnState::Active`] or [`ConnState::Connecting`] performs no redundant work.
    fn apply(
        &mut self,
        desired: &Self::Desired,
    ) -> impl Future<Output = DriverResult<ConnState>> + Send;

    /// Observe the transport's current state without installing anything.
    fn observe(&mut self) -> impl Future<Output = DriverResult<ConnState>> + Send;

    /// Tear down all kernel/daemon footprint for this connection. Valid from any state; reaches
    /// [`ConnState::Idle`] once every kernel object this driver owns is gone.
    fn teardown(&mut self) -> impl Future<Output = DriverResult<()>> + Send;
}
