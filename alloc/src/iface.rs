// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-connection interface address pools: one /28 (v4) and one /64 (v6), carved from
//! `prefix_downlink_interface_v4`/`_v6` and bound to the connection's XFRM/WireGuard link (§4.2).

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};

use crate::hash::mix;
use crate::{AllocError, AllocKey, AllocResult};

/// Carve the connection's /28 out of the service's `prefix_downlink_interface_v4` /16.
///
/// The /16 → /28 carve only has 12 bits of room, not enough to hold `(t_letter, t_num, n_num,
/// c_num)` as distinct fields, so the connection's identity is spread across those 12 bits with
/// [`mix`]; [`crate::allocate_all`] is responsible for detecting the resulting (rare) collisions.
///
/// # Errors
///
/// Returns [`AllocError::WrongPoolSize`] if `pool` is not a /16.
pub fn v4_interface_prefix(pool: Ipv4Net, key: AllocKey) -> AllocResult<Ipv4Net> {
    if pool.prefix_len() != 16 {
        return Err(AllocError::WrongPoolSize {
            pool: "prefix_downlink_interface_v4",
            expected: 16,
            actual: pool.prefix_len(),
        });
    }
    let offset = mix(key) & 0x0fff; // 12 bits: /16 -> /28
    let base = u32::from(pool.network());
    let addr = Ipv4Addr::from(base | (offset << 4));
    #[allow(clippy::unwrap_used)] // 28 is a legal IPv4 prefix length by construction
    Ok(Ipv4Net::new(addr, 28).unwrap())
}

/// Carve the connection's /64 out of the service's `prefix_downlink_interface_v6` /32.
///
/// The /32 → /64 carve has exactly 32 bits of room, so the full [`mix`] output is used directly.
///
/// # Errors
///
/// Returns [`AllocError::WrongPoolSize`] if `pool` is not a /32.
pub fn v6_interface_prefix(pool: Ipv6Net, key: AllocKey) -> AllocResult<Ipv6Net> {
    if pool.prefix_len() != 32 {
        return Err(AllocError::WrongPoolSize {
            pool: "prefix_downlink_interface_v6",
            expected: 32,
            actual: pool.prefix_len(),
        });
    }
    let offset = mix(key);
    let mut segments = pool.network().segments();
    segments[2] = (offset >> 16) as u16;
    segments[3] = offset as u16;
    let addr = Ipv6Addr::from(segments);
    #[allow(clippy::unwrap_used)] // 64 is a legal IPv6 prefix length by construction
    Ok(Ipv6Net::new(addr, 64).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c_num: u8) -> AllocKey {
        AllocKey {
            t_letter: b'c' - b'a' + 10,
            t_num: 1,
            n_num: 0,
            c_num,
        }
    }

    #[test]
    fn v4_prefix_is_a_pure_function_and_inside_the_pool() {
        let pool: Ipv4Net = "100.64.0.0/16".parse().unwrap();
        let a = v4_interface_prefix(pool, key(0)).unwrap();
        let b = v4_interface_prefix(pool, key(0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.prefix_len(), 28);
        assert!(pool.contains(&a.network()));
    }

    #[test]
    fn v6_prefix_is_inside_the_pool() {
        let pool: Ipv6Net = "fd00:1::/32".parse().unwrap();
        let a = v6_interface_prefix(pool, key(3)).unwrap();
        assert_eq!(a.prefix_len(), 64);
        assert!(pool.contains(&a.network()));
    }
}
