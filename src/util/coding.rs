// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-width integer encoding for cell records and header integer fields.
//!
//! This crate does not endian-convert. All fixed-width integers below are
//! encoded in the host's native byte order, matching the deflated-cell-record
//! definition of `(DIM+1)` machine-word integers per cell, written in the
//! producer's own endianness.

/// Decodes a native-order `i64` from `src[0..8]`.
#[inline]
pub fn decode_fixed_i64(src: &[u8]) -> i64 {
    i64::from_ne_bytes(src[..8].try_into().expect("8-byte slice"))
}

#[inline]
pub fn put_fixed_i64(dst: &mut Vec<u8>, value: i64) {
    dst.extend_from_slice(&value.to_ne_bytes());
}

#[inline]
pub fn decode_fixed_u64(src: &[u8]) -> u64 {
    u64::from_ne_bytes(src[..8].try_into().expect("8-byte slice"))
}

#[inline]
pub fn put_fixed_u64(dst: &mut Vec<u8>, value: u64) {
    dst.extend_from_slice(&value.to_ne_bytes());
}

/// Encodes a slice of cell-record integers (coordinates followed by level)
/// as a flat native-order byte buffer, one `i64` each.
pub fn encode_records(records: &[i64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(records.len() * 8);
    for &r in records {
        put_fixed_i64(&mut buf, r);
    }
    buf
}

/// Inverse of [`encode_records`]. `buf.len()` must be a multiple of 8.
pub fn decode_records(buf: &[u8]) -> Vec<i64> {
    debug_assert_eq!(buf.len() % 8, 0, "record buffer is not word-aligned");
    buf.chunks_exact(8).map(decode_fixed_i64).collect()
}
