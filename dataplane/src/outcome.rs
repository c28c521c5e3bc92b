// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The three-valued result every idempotent primitive reports (§4.3).

use std::fmt::{Display, Formatter};

/// What an idempotent dataplane primitive actually did to reconcile a requirement.
///
/// The reconciler uses this, rather than a bare success/failure, to decide which events to
/// emit (e.g. it only logs `RouteShadowed`/interface-changed notices on [`PrimitiveOutcome::Changed`]
/// or [`PrimitiveOutcome::Created`], never on [`PrimitiveOutcome::Unchanged`]).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PrimitiveOutcome {
    /// The observed state already matched the requirement; nothing was sent to the kernel.
    Unchanged,
    /// An existing kernel object was modified to match the requirement.
    Changed,
    /// The kernel object did not exist and was created.
    Created,
}

impl PrimitiveOutcome {
    /// `true` unless the outcome is [`PrimitiveOutcome::Unchanged`].
    #[must_use]
    pub fn is_change(self) -> bool {
        !matches!(self, PrimitiveOutcome::Unchanged)
    }
}

impl Display for PrimitiveOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PrimitiveOutcome::Unchanged => "unchanged",
            PrimitiveOutcome::Changed => "changed",
            PrimitiveOutcome::Created => "created",
        })
    }
}
