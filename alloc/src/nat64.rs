// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `nat64_v6 = prefix_downlink_nat64 + (t_letter:t_num:n_num:c_num)` as a /96 (§4.2).

use ipnet::Ipv6Net;

use crate::{AllocError, AllocKey, AllocResult};

/// Derive the per-connection NAT64 /96 from the service's `prefix_downlink_nat64` pool.
///
/// The pool's own two fixed 16-bit groups are kept verbatim; the next four groups are the
/// connection's `t_letter`, `t_num`, `n_num` and `c_num` each placed in a full 16-bit group
/// (matching §8 S1's worked example: `fdcc:0::/32` + `C0001`/NI 0/conn 0 = `fdcc:0:c:1:0::/96`).
///
/// # Errors
///
/// Returns [`AllocError::WrongPoolSize`] if `pool` is not a /32.
pub fn nat64_prefix(pool: Ipv6Net, key: AllocKey) -> AllocResult<Ipv6Net> {
    if pool.prefix_len() != 32 {
        return Err(AllocError::WrongPoolSize {
            pool: "prefix_downlink_nat64",
            expected: 32,
            actual: pool.prefix_len(),
        });
    }
    let mut segments = pool.network().segments();
    segments[2] = u16::from(key.t_letter);
    segments[3] = key.t_num;
    segments[4] = key.n_num;
    segments[5] = u16::from(key.c_num);
    segments[6] = 0;
    segments[7] = 0;
    let addr = std::net::Ipv6Addr::from(segments);
    #[allow(clippy::unwrap_used)] // 96 is a legal IPv6 prefix length by construction
    Ok(Ipv6Net::new(addr, 96).unwrap())
}
