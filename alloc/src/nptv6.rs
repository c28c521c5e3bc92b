// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-route NPTv6 sub-allocation (§4.2, §9 open question).
//!
//! `prefix_downlink_nptv6` is a /12; the connection's base /48 is carved out of it by packing
//! `(t_letter, t_num, n_num, c_num)` into the 36 bits between /12 and /48 as nibbles rather than
//! full 16-bit groups (unlike [`crate::nat64`], there isn't room for four full groups in 36
//! bits): 4 bits of `t_letter`, 16 of `t_num`, 8 of `n_num`, 8 of `c_num`.
//!
//! §3 requires the allocated prefix to have the same length as the route's `to` prefix when that
//! length is exactly /48. The open question in §9 is what to do otherwise; this implementation
//! picks the longest-matching carve-out documented here and in `DESIGN.md`:
//!
//! - `to` shorter than /48 (e.g. /40): the base /48 is truncated to that length. Distinct
//!   connections can then share a truncated prefix if their base /48s agree on the common
//!   prefix — a real limitation of declaring a route coarser than the per-connection /48, logged
//!   as a collision by [`crate::allocate_all`]'s callers rather than silently merged.
//! - `to` exactly /48: the base /48 is returned unchanged.
//! - `to` longer than /48 (e.g. /52, as in §8 S2): the extra bits are filled from the route's
//!   index within the connection's route list, so a connection with several NPTv6 routes gets
//!   distinct sub-prefixes instead of colliding on the same /48.

use ipnet::Ipv6Net;
use std::net::Ipv6Addr;

use crate::{AllocError, AllocKey, AllocResult};

const POOL_LEN: u8 = 12;
const BASE_LEN: u8 = 48;

fn to_bits(addr: Ipv6Addr) -> u128 {
    u128::from_be_bytes(addr.octets())
}

fn from_bits(bits: u128) -> Ipv6Addr {
    Ipv6Addr::from(bits.to_be_bytes())
}

/// Derive the NPTv6 sub-prefix for one route of one connection.
///
/// # Errors
///
/// Returns [`AllocError::WrongPoolSize`] if `pool` is not a /12.
pub fn nptv6_prefix(
    pool: Ipv6Net,
    key: AllocKey,
    route_index: u16,
    desired_len: u8,
) -> AllocResult<Ipv6Net> {
    if pool.prefix_len() != POOL_LEN {
        return Err(AllocError::WrongPoolSize {
            pool: "prefix_downlink_nptv6",
            expected: POOL_LEN,
            actual: pool.prefix_len(),
        });
    }

    let offset: u128 = (u128::from(key.t_letter & 0xf) << 32)
        | (u128::from(key.t_num) << 16)
        | (u128::from(key.n_num & 0xff) << 8)
        | u128::from(key.c_num);
    let shift = 128 - u32::from(POOL_LEN) - 36;
    let base = to_bits(pool.network()) | (offset << shift);

    let bits = match desired_len.cmp(&BASE_LEN) {
        std::cmp::Ordering::Less => {
            let mask = !0u128 << (128 - u32::from(desired_len));
            base & mask
        }
        std::cmp::Ordering::Equal => base,
        std::cmp::Ordering::Greater => {
            let extra = desired_len - BASE_LEN;
            let extra = extra.min(16);
            let route_bits = u128::from(route_index) << (128 - u32::from(BASE_LEN) - u32::from(extra));
            base | route_bits
        }
    };

    let len = desired_len.min(128);
    #[allow(clippy::unwrap_used)] // len is clamped to a legal IPv6 prefix length above
    Ok(Ipv6Net::new(from_bits(bits), len).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tenant letter 'd' as the hex-nibble value [`AllocKey::new`] actually produces, not the raw
    /// ASCII byte.
    fn key() -> AllocKey {
        AllocKey {
            t_letter: b'd' - b'a' + 10,
            t_num: 1,
            n_num: 1,
            c_num: 0,
        }
    }

    #[test]
    fn base_48_is_a_pure_function() {
        let pool: Ipv6Net = "fdff::/12".parse().unwrap();
        let a = nptv6_prefix(pool, key(), 0, 48).unwrap();
        let b = nptv6_prefix(pool, key(), 0, 48).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.prefix_len(), 48);
    }

    #[test]
    fn longer_routes_get_distinct_suffixes_from_route_index() {
        let pool: Ipv6Net = "fdff::/12".parse().unwrap();
        let a = nptv6_prefix(pool, key(), 0, 52).unwrap();
        let b = nptv6_prefix(pool, key(), 1, 52).unwrap();
        assert_eq!(a.prefix_len(), 52);
        assert_ne!(a, b);
    }

    #[test]
    fn shorter_route_truncates_the_base() {
        let pool: Ipv6Net = "fdff::/12".parse().unwrap();
        let full = nptv6_prefix(pool, key(), 0, 48).unwrap();
        let short = nptv6_prefix(pool, key(), 0, 40).unwrap();
        assert_eq!(short.prefix_len(), 40);
        assert!(full.network() >= short.network());
    }
}
