// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `if_id = (t_letter:t_num:n_num:c_num)` packed into 32 bits (§4.4: "Each block uses a unique
//! `if_id` derived from (tenant-letter, tenant-num, ni-index, conn-id) so that the XFRM link
//! matches on both sides").
//!
//! Unlike the prefix allocations, `if_id` never leaves the local host — it only has to agree
//! between the IKE daemon's connection config and the dataplane's XFRM primitive on this same
//! machine — so an exact (rather than collision-checked) field packing is sufficient.

use crate::AllocKey;

/// Derive the XFRM `if_id` for a connection's tuple.
///
/// `n_num` is truncated to its low 8 bits: `NetworkInstanceId::downlink` renders NI indices as
/// two decimal digits (`00..99`), comfortably inside that range.
#[must_use]
pub fn if_id(key: AllocKey) -> u32 {
    // `t_letter` holds the hex-nibble value (0xc, 0xd, ...), not the raw ASCII letter.
    let letter_bit = u32::from(key.t_letter == b'd' - b'a' + 10);
    let t_num = u32::from(key.t_num) & 0x3FFF;
    let n_num = u32::from(key.n_num) & 0xFF;
    let c_num = u32::from(key.c_num);
    (letter_bit << 30) | (t_num << 16) | (n_num << 8) | c_num
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER_C: u8 = b'c' - b'a' + 10;
    const LETTER_D: u8 = b'd' - b'a' + 10;

    #[test]
    fn distinct_tuples_derive_distinct_ids() {
        let a = AllocKey {
            t_letter: LETTER_C,
            t_num: 1,
            n_num: 0,
            c_num: 0,
        };
        let b = AllocKey {
            t_letter: LETTER_C,
            t_num: 1,
            n_num: 0,
            c_num: 1,
        };
        assert_ne!(if_id(a), if_id(b));
    }

    #[test]
    fn letter_distinguishes_otherwise_identical_tuples() {
        let c = AllocKey {
            t_letter: LETTER_C,
            t_num: 7,
            n_num: 2,
            c_num: 3,
        };
        let d = AllocKey {
            t_letter: LETTER_D,
            t_num: 7,
            n_num: 2,
            c_num: 3,
        };
        assert_ne!(if_id(c), if_id(d));
    }

    #[test]
    fn is_deterministic() {
        let key = AllocKey {
            t_letter: LETTER_C,
            t_num: 42,
            n_num: 3,
            c_num: 9,
        };
        assert_eq!(if_id(key), if_id(key));
    }
}
