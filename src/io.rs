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

//! The collective I/O protocol.
//!
//! Two idioms recur through every block operation in `crate::context` and
//! are factored out here rather than copy-pasted per call site:
//!
//! - **`broadcast_result`-style uniform abort**: a helper that takes
//!   `value_on_root` and returns `value_on_all`. Every collective call uses
//!   this once per rank-0 phase to avoid deadlock if a phase aborts.
//!   [`broadcast_status`] and [`broadcast_payload`] are this crate's two
//!   instances: the first when only success/failure needs to reach every
//!   rank, the second when rank 0 additionally has a byte payload (parsed
//!   header, read payload) every rank needs a copy of.
//! - **Collective payload I/O reduction**: payload I/O of `F` blocks is
//!   collective, so the underlying implementation reports an error on
//!   every rank and must be reduced (logical-OR) before aborting.
//!   [`reduce_payload_result`] is that reduction.

use log::{debug, error};

use crate::collective::{broadcast_vec, Collective, ErrorClass};
use crate::util::status::{ForestErr, Result, Status};

fn encode_status_tag(status: Status) -> Vec<u8> {
    match status {
        Status::Io => vec![0],
        Status::CountError => vec![1],
        Status::Arg => vec![2],
        Status::Underlying(ErrorClass::Io) => vec![3],
        Status::Underlying(ErrorClass::Other(code)) => {
            let mut buf = vec![4];
            buf.extend_from_slice(&code.to_ne_bytes());
            buf
        }
    }
}

/// Returns the decoded status and the number of bytes of `buf` it consumed.
fn decode_status_tag(buf: &[u8]) -> (Status, usize) {
    match buf.first() {
        Some(0) => (Status::Io, 1),
        Some(1) => (Status::CountError, 1),
        Some(2) => (Status::Arg, 1),
        Some(3) => (Status::Underlying(ErrorClass::Io), 1),
        Some(4) => {
            let code = i32::from_ne_bytes(buf[1..5].try_into().expect("4-byte error code"));
            (Status::Underlying(ErrorClass::Other(code)), 5)
        }
        _ => (Status::Io, 1),
    }
}

fn encode_outcome(result: &Result<Vec<u8>>) -> Vec<u8> {
    match result {
        Ok(bytes) => {
            let mut buf = Vec::with_capacity(bytes.len() + 1);
            buf.push(0u8);
            buf.extend_from_slice(bytes);
            buf
        }
        Err(e) => {
            let mut buf = vec![1u8];
            buf.extend(encode_status_tag(e.status()));
            buf.extend_from_slice(e.description().as_bytes());
            buf
        }
    }
}

fn decode_outcome(buf: &[u8]) -> Result<Vec<u8>> {
    match buf.first() {
        Some(0) => Ok(buf[1..].to_vec()),
        _ => {
            let (status, consumed) = decode_status_tag(&buf[1..]);
            let msg = String::from_utf8_lossy(&buf[1 + consumed..]).into_owned();
            Err(ForestErr::new(status, Some(&msg)))
        }
    }
}

/// Runs `compute` on rank 0 only, logs the rank-0 diagnostic line on
/// failure, and broadcasts success/failure so every rank returns the same
/// `Result`: rank 0's own error message, or the error it received from
/// rank 0.
pub fn broadcast_status(comm: &dyn Collective, compute: impl FnOnce() -> Result<()>) -> Result<()> {
    let result = if comm.is_root() { compute().map(|()| Vec::new()) } else { Ok(Vec::new()) };
    broadcast_payload_result(comm, result)
}

/// Like [`broadcast_status`], but rank 0's success value is a byte buffer
/// (a parsed header's payload, a freshly read block) that every rank needs
/// a copy of. Rank 0 reads and validates, then broadcasts the parsed user
/// string and global cell count and validation status.
pub fn broadcast_payload(comm: &dyn Collective, compute: impl FnOnce() -> Result<Vec<u8>>) -> Result<Vec<u8>> {
    let result = if comm.is_root() { compute() } else { Ok(Vec::new()) };
    broadcast_payload_result(comm, result)
}

fn broadcast_payload_result(comm: &dyn Collective, result: Result<Vec<u8>>) -> Result<Vec<u8>> {
    if comm.is_root() {
        if let Err(e) = &result {
            error!("rank 0: {e}");
        }
    }
    let outgoing = if comm.is_root() { encode_outcome(&result) } else { Vec::new() };
    let incoming = broadcast_vec(comm, outgoing);
    decode_outcome(&incoming)
}

/// Collective reduction for `F`-block payload I/O: every rank ran its own
/// disjoint-offset read/write and may have failed
/// independently; logical-OR the failures so every rank aborts together
/// even though only some ranks actually hit an error.
///
/// On global failure, a rank that locally succeeded gets a generic
/// [`Status::CountError`]-free synchronization error rather than fabricating
/// detail it does not have; a rank that failed locally keeps its own error.
pub fn reduce_payload_result(comm: &dyn Collective, local: Result<usize>, expected: usize) -> Result<usize> {
    let local_failed = match &local {
        Ok(n) => *n != expected,
        Err(_) => true,
    };
    let local_count_mismatch = matches!(&local, Ok(n) if *n != expected);
    let any_failed = comm.all_reduce_or(local_failed);
    if !any_failed {
        return local;
    }
    match local {
        Err(e) => Err(e),
        Ok(n) if local_count_mismatch => Err(ForestErr::count_error(format!(
            "collective field I/O transferred {n} bytes, expected {expected}"
        ))),
        Ok(_) => Err(ForestErr::io("a peer rank reported a collective field I/O failure")),
    }
}

pub(crate) fn log_cursor_advance(accessed_bytes: u64, payload_len: usize, pad_len: usize) {
    debug!(
        "cursor advances by {} (64 header + {payload_len} payload + {pad_len} pad) to {}",
        64 + payload_len + pad_len,
        accessed_bytes + 64 + payload_len as u64 + pad_len as u64
    );
}
