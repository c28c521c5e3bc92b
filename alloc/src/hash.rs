// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A plain FNV-1a mix used to spread a connection's identity across an interface pool that's
//! too small to hold the full `(t_letter, t_num, n_num, c_num)` tuple as distinct bit fields
//! (unlike the NAT64 /96 and NPTv6 /48, which have the exact bit budget §4.2's worked examples
//! need — see `nat64.rs`/`nptv6.rs`). Collisions are expected to be rare, not impossible; the
//! caller is responsible for detecting them ([`crate::allocate_all`]).

use crate::AllocKey;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Mix `key` down to a 32-bit value.
#[must_use]
pub fn mix(key: AllocKey) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in [
        key.t_letter,
        (key.t_num >> 8) as u8,
        key.t_num as u8,
        (key.n_num >> 8) as u8,
        key.n_num as u8,
        key.c_num,
    ] {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_is_deterministic() {
        let key = AllocKey {
            t_letter: b'c' - b'a' + 10,
            t_num: 1,
            n_num: 0,
            c_num: 0,
        };
        assert_eq!(mix(key), mix(key));
    }

    #[test]
    fn mix_distinguishes_distinct_keys() {
        let a = AllocKey {
            t_letter: b'c' - b'a' + 10,
            t_num: 1,
            n_num: 0,
            c_num: 0,
        };
        let b = AllocKey {
            t_letter: b'c' - b'a' + 10,
            t_num: 1,
            n_num: 0,
            c_num: 1,
        };
        assert_ne!(mix(a), mix(b));
    }
}
