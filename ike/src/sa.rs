// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The identity and event types the SA monitor dedups over (§4.6).

use chrono::{DateTime, Utc};

/// The key an IKE/CHILD SA is deduplicated under: a connection's local/remote IKE identities and
/// its XFRM `if_id` (the same `if_id` the dataplane's XFRM primitive assigns, §4.3/§4.4).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SaKey {
    /// The connection's configured `local_id`, if any.
    pub local_id: Option<String>,
    /// The connection's configured `remote_id`, if any.
    pub remote_id: Option<String>,
    /// The XFRM interface id correlating this connection's IKE_SA and CHILD_SA.
    pub if_id: u32,
}

/// Which kind of security association an event or installed-SA record refers to: the outer
/// IKE_SA or an inner CHILD_SA. Each is deduplicated independently, since a CHILD_SA rekey does
/// not imply its parent IKE_SA duplicated too.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SaKind {
    /// The IKE_SA itself.
    Ike,
    /// A CHILD_SA negotiated under an IKE_SA.
    Child,
}

/// An opaque SA identifier as reported by the IKE daemon (e.g. strongSwan's unique id).
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SaId(pub String);

impl std::fmt::Display for SaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SaId {
    fn from(value: String) -> Self {
        SaId(value)
    }
}

impl From<&str> for SaId {
    fn from(value: &str) -> Self {
        SaId(value.to_string())
    }
}

/// What happened to an SA, as reported by the IKE daemon's event stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaEventKind {
    /// An SA was installed: an IKE_SA `CONNECT`, or a CHILD_SA `CHILD_UPDATE` (initial install
    /// or the new half of a rekey).
    Installed,
    /// A `CHILD_REKEY` began: duplicates observed for this key within the rekey window are
    /// make-before-break, not a leak, and are left alone.
    RekeyStart,
    /// An SA was deleted (by the daemon itself, the peer, or a prior reap).
    Deleted,
}

/// One event from the IKE daemon's event stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SaEvent {
    /// The connection this SA belongs to.
    pub key: SaKey,
    /// Which SA within that connection.
    pub sa_kind: SaKind,
    /// The SA's id.
    pub sa_id: SaId,
    /// What happened.
    pub kind: SaEventKind,
    /// When the daemon reported the SA as created. Ignored for [`SaEventKind::RekeyStart`] and
    /// [`SaEventKind::Deleted`].
    pub created_at: DateTime<Utc>,
}
