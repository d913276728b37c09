// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Memcomparable key encoding.
//!
//! Storage nodes persist keys in an encoded, order-preserving form and the
//! metadata service indexes regions by that form. A raw application key has
//! to be encoded before it can be used to look up the region that owns it.
//!
//! # Format
//!
//! The key is split into groups of 8 bytes. Each group is written followed
//! by a marker byte `0xFF - pad`, where `pad` is the number of zero bytes
//! appended to fill the group. The last group is always padded, so a key
//! whose length is a multiple of 8 ends with a group of 8 zero bytes and the
//! marker `0xF7`.

/// Number of payload bytes per encoded group.
const GROUP_SIZE: usize = 8;

/// Marker byte for a full group.
const MARKER: u8 = 0xFF;

/// Padding byte.
const PAD: u8 = 0x00;

/// Encodes `key` into its memcomparable form.
///
/// The encoding preserves lexicographic order: for any two keys `a < b`,
/// `encode_bytes(a) < encode_bytes(b)`.
#[must_use]
pub fn encode_bytes(key: &[u8]) -> Vec<u8> {
    let groups = key.len() / GROUP_SIZE + 1;
    let mut out = Vec::with_capacity(groups * (GROUP_SIZE + 1));

    let mut idx = 0;
    while idx <= key.len() {
        let remain = key.len() - idx;
        let pad = if remain >= GROUP_SIZE {
            out.extend_from_slice(&key[idx..idx + GROUP_SIZE]);
            0
        } else {
            out.extend_from_slice(&key[idx..]);
            out.resize(out.len() + GROUP_SIZE - remain, PAD);
            GROUP_SIZE - remain
        };
        out.push(MARKER - pad as u8);
        idx += GROUP_SIZE;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_empty_key() {
        assert_eq!(encode_bytes(b""), vec![0, 0, 0, 0, 0, 0, 0, 0, 0xF7]);
    }

    #[test]
    fn test_encode_short_key() {
        assert_eq!(encode_bytes(&[1, 2, 3]), vec![1, 2, 3, 0, 0, 0, 0, 0, 0xFA]);
    }

    #[test]
    fn test_encode_full_group_gets_trailing_pad_group() {
        let key = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(
            encode_bytes(&key),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0xF7]
        );
    }

    #[test]
    fn test_encode_multi_group() {
        let key = [9u8; 9];
        let encoded = encode_bytes(&key);
        assert_eq!(encoded.len(), 18);
        assert_eq!(encoded[8], 0xFF);
        assert_eq!(encoded[9], 9);
        assert_eq!(encoded[17], 0xF8);
    }

    #[test]
    fn test_encoding_preserves_order() {
        let keys: Vec<&[u8]> = vec![
            b"",
            b"\x00",
            b"a",
            b"a\x00",
            b"abcdefgh",
            b"abcdefgh\x00",
            b"abcdefghi",
            b"b",
            b"\xff\xff",
        ];
        for pair in keys.windows(2) {
            assert!(
                encode_bytes(pair[0]) < encode_bytes(pair[1]),
                "order broken between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }
}
