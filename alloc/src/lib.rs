// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deterministic prefix allocation (spec §4.2).
//!
//! The allocator is a pure function of `(tenant, ni, conn, service prefixes)`: it never touches
//! the kernel or the config store, and two calls with the same inputs always return the same
//! output (§8 law: "Prefix allocation is a pure function"). Conflicts — two connections deriving
//! the same sub-prefix because a service pool is too small for the configured tenant count — are
//! not silently resolved; they surface as [`AllocError::Collision`] so the caller can fail fast,
//! per §4.2: "conflicts surface as assertion failures (fail-fast, config is wrong)."

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod hash;
mod iface;
mod ifid;
mod nat64;
mod nptv6;

use std::collections::HashMap;

use config::{AllocatorPrefixes, ConnId, NetworkInstanceId, Snapshot, TenantId};
use ipnet::{Ipv4Net, Ipv6Net};
use thiserror::Error;

pub use iface::{v4_interface_prefix, v6_interface_prefix};
pub use ifid::if_id;
pub use nat64::nat64_prefix;
pub use nptv6::nptv6_prefix;

/// Everything that can go wrong while allocating a prefix (§7 `AllocatorExhausted`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// A service prefix did not carry the prefix length §3 requires of it.
    #[error("{pool} must be a /{expected}, got /{actual}")]
    WrongPoolSize {
        /// Which pool (`prefix_downlink_*` field name).
        pool: &'static str,
        /// The length §3 requires.
        expected: u8,
        /// The length actually configured.
        actual: u8,
    },
    /// Two distinct connections (or routes) derived the same sub-prefix: the service pools are
    /// too small for the configured tenant/connection count.
    #[error("allocator collision: {a} and {b} both derive {prefix}")]
    Collision {
        /// A human-readable identity of the first claimant.
        a: String,
        /// A human-readable identity of the second claimant.
        b: String,
        /// The colliding prefix.
        prefix: String,
    },
}

/// Result alias for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// The full set of allocator-assigned prefixes for one connection (§4.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionPrefixes {
    /// The connection's interface IPv4 address pool, a /28 carved from
    /// `prefix_downlink_interface_v4`.
    pub v4_iface: Ipv4Net,
    /// The connection's interface IPv6 address pool, a /64 carved from
    /// `prefix_downlink_interface_v6`.
    pub v6_iface: Ipv6Net,
    /// The connection's NAT64 /96, carved from `prefix_downlink_nat64`.
    pub nat64: Ipv6Net,
}

/// The identity inputs the allocator algebra is keyed on (§4.2): tenant letter/number, the
/// zero-based index of the NI within its tenant, and the connection id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AllocKey {
    /// `t_letter`: the tenant id's leading letter as a hex nibble (`c` or `d`).
    pub t_letter: u8,
    /// `t_num`: the tenant's 4-digit number.
    pub t_num: u16,
    /// `n_num`: the NI's zero-based index within the tenant.
    pub n_num: u16,
    /// `c_num`: the connection id.
    pub c_num: u8,
}

impl AllocKey {
    /// Derive an [`AllocKey`] from a tenant id, NI id, and connection id.
    ///
    /// Returns `None` for NIs that don't participate in the allocator algebra at all (`DEFAULT`'s
    /// `EXTERNAL`/`CORE`/`ENDPOINT`, which carry no per-tenant prefixes).
    #[must_use]
    pub fn new(tenant: &TenantId, ni: &NetworkInstanceId, conn: ConnId) -> Option<Self> {
        // `tenant.letter()` returns the raw ASCII letter ('c', 'd', ...); the allocator algebra
        // packs it as a hex nibble (0xc, 0xd, ...), so convert once at this boundary rather than
        // carrying the ASCII value into the bit-packing in `nat64`/`nptv6`.
        let t_letter = tenant.letter()? as u8 - b'a' + 10;
        let t_num = tenant.number()?;
        let n_num = ni.downlink_index()?;
        Some(AllocKey {
            t_letter,
            t_num,
            n_num,
            c_num: conn.to_u8(),
        })
    }
}

/// Allocate the per-connection prefix set from the service's allocator pools (§4.2).
///
/// # Errors
///
/// Returns [`AllocError::WrongPoolSize`] if any service pool doesn't carry the exact length §3
/// declares for it.
pub fn allocate_connection(prefixes: &AllocatorPrefixes, key: AllocKey) -> AllocResult<ConnectionPrefixes> {
    Ok(ConnectionPrefixes {
        v4_iface: v4_interface_prefix(prefixes.prefix_downlink_interface_v4, key)?,
        v6_iface: v6_interface_prefix(prefixes.prefix_downlink_interface_v6, key)?,
        nat64: nat64_prefix(prefixes.prefix_downlink_nat64, key)?,
    })
}

/// Allocate every connection's prefixes for the whole snapshot, checking for collisions.
///
/// This is the entry point the reconciler and the routing-daemon driver use: it walks every
/// downlink connection in hub mode, derives its [`ConnectionPrefixes`], and fails fast
/// (`AllocError::Collision`) the moment two distinct connections would derive the same
/// sub-prefix, rather than silently allowing two tenants to collide on the wire.
///
/// # Errors
///
/// Returns [`AllocError::WrongPoolSize`] or [`AllocError::Collision`], per above.
pub fn allocate_all(
    snapshot: &Snapshot,
) -> AllocResult<HashMap<(TenantId, NetworkInstanceId, ConnId), ConnectionPrefixes>> {
    let mut out = HashMap::new();
    let mut claimed_v4: HashMap<Ipv4Net, String> = HashMap::new();
    let mut claimed_v6_iface: HashMap<Ipv6Net, String> = HashMap::new();
    let mut claimed_nat64: HashMap<Ipv6Net, String> = HashMap::new();

    for (tenant, ni, conn, _) in snapshot.connections() {
        let Some(key) = AllocKey::new(tenant, ni, conn) else {
            continue;
        };
        let identity = format!("{tenant}/{ni}/{conn}");
        let allocated = allocate_connection(&snapshot.service.prefixes, key)?;

        claim(&mut claimed_v4, allocated.v4_iface, &identity)?;
        claim(&mut claimed_v6_iface, allocated.v6_iface, &identity)?;
        claim(&mut claimed_nat64, allocated.nat64, &identity)?;

        out.insert((tenant.clone(), ni.clone(), conn), allocated);
    }
    Ok(out)
}

fn claim<K: Eq + std::hash::Hash + std::fmt::Display + Copy>(
    claimed: &mut HashMap<K, String>,
    prefix: K,
    identity: &str,
) -> AllocResult<()> {
    match claimed.insert(prefix, identity.to_string()) {
        None => Ok(()),
        Some(prior) if prior == identity => Ok(()),
        Some(prior) => Err(AllocError::Collision {
            a: prior,
            b: identity.to_string(),
            prefix: prefix.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an [`AllocKey`] from an ASCII tenant letter (`b'c'`, `b'd'`, ...), converting it to
    /// the hex-nibble value the struct field actually holds, the same conversion
    /// `AllocKey::new` applies at its boundary.
    fn key(ascii_letter: u8, t_num: u16, n_num: u16, c_num: u8) -> AllocKey {
        AllocKey {
            t_letter: ascii_letter - b'a' + 10,
            t_num,
            n_num,
            c_num,
        }
    }

    #[test]
    fn s1_nat64_matches_worked_example() {
        // spec §8 S1: prefix_downlink_nat64 = fdcc:0::/32, tenant C0001, NI index 0, conn 0
        // -> fdcc:0:c:1:0::/96
        let pool: Ipv6Net = "fdcc:0::/32".parse().unwrap();
        let prefix = nat64_prefix(pool, key(b'c', 1, 0, 0)).unwrap();
        assert_eq!(prefix, "fdcc:0:c:1:0::/96".parse::<Ipv6Net>().unwrap());
    }

    #[test]
    fn distinct_connections_never_collide_on_nat64() {
        let pool: Ipv6Net = "fdcc:0::/32".parse().unwrap();
        let a = nat64_prefix(pool, key(b'c', 1, 0, 0)).unwrap();
        let b = nat64_prefix(pool, key(b'c', 1, 0, 1)).unwrap();
        let c = nat64_prefix(pool, key(b'd', 1, 0, 0)).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn allocation_is_a_pure_function() {
        let pool: Ipv6Net = "fdcc:0::/32".parse().unwrap();
        let k = key(b'c', 42, 3, 7);
        assert_eq!(nat64_prefix(pool, k), nat64_prefix(pool, k));
    }

    #[test]
    fn wrong_pool_size_is_rejected() {
        let pool: Ipv6Net = "fdcc::/40".parse().unwrap();
        assert!(matches!(
            nat64_prefix(pool, key(b'c', 1, 0, 0)),
            Err(AllocError::WrongPoolSize { .. })
        ));
    }
}
