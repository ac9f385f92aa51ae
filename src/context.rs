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

//! The per-process file context and offset bookkeeping, and the
//! block-level collective protocol built on top of it.
//!
//! `CreateOptions`/`ReadOptions` bundle the small set of optional knobs
//! `Context::create`/`open_read_bound`/`open_read_unbound` take, the way
//! `Options`/`ReadOptions`/`WriteOptions` bundle theirs elsewhere. Every
//! block operation goes through the `ParallelFile`/`ParallelStorage` split
//! for positioned collective I/O.

use log::debug;

use crate::collective::Collective;
use crate::header::{
    BlockHeader, BlockKind, Dim, FileHeader, BLOCK_HEADER_LEN, FILE_HEADER_BODY_LEN,
    FILE_HEADER_REGION_LEN,
};
use crate::io::{broadcast_payload, broadcast_status, log_cursor_advance, reduce_payload_result};
use crate::storage::{ParallelFile, ParallelStorage};
use crate::util::pad;
use crate::util::status::{ForestErr, Result};

/// The optional knobs `Context::create` takes beyond the required
/// communicator, storage, path, dimension, and partition vector.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub version: String,
    pub user_string: String,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn user_string(mut self, user_string: impl Into<String>) -> Self {
        self.user_string = user_string.into();
        self
    }
}

/// The optional knobs `Context::open_read_bound`/`open_read_unbound` take.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub expected_version: Option<String>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }
}

/// Whether this context owns its partition vector (copied at
/// `create`/`open_read_unbound`) or borrows one from a caller-held forest
/// (`open_read_bound`).
pub enum GfqOwnership<'g> {
    Owned(Vec<u64>),
    Borrowed(&'g [u64]),
    /// `open_read_unbound`'s state before any field read supplies or
    /// computes a partition. A subsequent field read without a
    /// user-supplied `gfq` computes a uniform partition, uses it for that
    /// one call, and does not store it.
    Unbound,
}

impl<'g> GfqOwnership<'g> {
    fn as_slice(&self) -> Option<&[u64]> {
        match self {
            GfqOwnership::Owned(v) => Some(v),
            GfqOwnership::Borrowed(s) => Some(s),
            GfqOwnership::Unbound => None,
        }
    }
}

/// Computes the uniform partition `gfq[r] = floor(global_num_cells * r / size)`,
/// the conventional default partition real adaptive-mesh forests fall back
/// on when no explicit one is supplied. No remainder redistribution beyond
/// the plain floor division is applied.
pub fn gfq_uniform(global_num_cells: u64, size: i32) -> Vec<u64> {
    assert!(size > 0, "communicator size must be positive");
    (0..=size as u64)
        .map(|r| ((global_num_cells as u128 * r as u128) / size as u128) as u64)
        .collect()
}

fn local_slice_bounds(gfq: &[u64], rank: i32, elem_size: usize) -> (u64, usize) {
    let r = rank as usize;
    let lo = gfq[r];
    let hi = gfq[r + 1];
    (lo * elem_size as u64, ((hi - lo) as usize) * elem_size)
}

fn write_exact(file: &mut impl ParallelFile, offset: u64, buf: &[u8]) -> Result<()> {
    let n = file.write_at(offset, buf)?;
    if n != buf.len() {
        return Err(ForestErr::count_error(format!("wrote {n} of {} bytes", buf.len())));
    }
    Ok(())
}

fn read_exact_at(file: &impl ParallelFile, offset: u64, buf: &mut [u8]) -> Result<()> {
    let n = file.read_at(offset, buf)?;
    if n != buf.len() {
        return Err(ForestErr::count_error(format!("read {n} of {} bytes", buf.len())));
    }
    Ok(())
}

fn kind_byte(kind: BlockKind) -> u8 {
    match kind {
        BlockKind::Header => 0,
        BlockKind::Field => 1,
    }
}

fn kind_from_byte(b: u8) -> BlockKind {
    if b == 0 {
        BlockKind::Header
    } else {
        BlockKind::Field
    }
}

fn encode_header_and_payload(bh: &BlockHeader, payload: &[u8]) -> Vec<u8> {
    let us = bh.user_string.as_bytes();
    let mut out = Vec::with_capacity(1 + 8 + 8 + us.len() + payload.len());
    out.push(kind_byte(bh.kind));
    out.extend_from_slice(&bh.size.to_ne_bytes());
    out.extend_from_slice(&(us.len() as u64).to_ne_bytes());
    out.extend_from_slice(us);
    out.extend_from_slice(payload);
    out
}

fn decode_header_and_payload(buf: &[u8]) -> (BlockHeader, Vec<u8>) {
    let kind = kind_from_byte(buf[0]);
    let size = u64::from_ne_bytes(buf[1..9].try_into().expect("8-byte size"));
    let us_len = u64::from_ne_bytes(buf[9..17].try_into().expect("8-byte length")) as usize;
    let user_string = String::from_utf8_lossy(&buf[17..17 + us_len]).into_owned();
    let payload = buf[17 + us_len..].to_vec();
    (BlockHeader { kind, size, user_string }, payload)
}

/// One entry of [`Context::info`]'s report: a block's header fields without
/// its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub kind: BlockKind,
    pub size: u64,
    pub user_string: String,
}

fn info_from_file(file: &impl ParallelFile) -> Result<Vec<BlockInfo>> {
    let file_len = file.len()?;
    let mut blocks = Vec::new();
    let mut offset = FILE_HEADER_REGION_LEN as u64;
    loop {
        if offset + BLOCK_HEADER_LEN as u64 > file_len {
            break;
        }
        let mut raw = vec![0u8; BLOCK_HEADER_LEN];
        match file.read_at(offset, &mut raw) {
            Ok(n) if n == BLOCK_HEADER_LEN => {}
            _ => break,
        }
        let bh = match BlockHeader::decode(&raw, None) {
            Ok(bh) => bh,
            Err(_) => break,
        };
        let (pad_len, _) = pad::pad_for_default(bh.size as usize);
        let block_total = BLOCK_HEADER_LEN as u64 + bh.size + pad_len as u64;
        if offset + block_total > file_len {
            break;
        }
        blocks.push(BlockInfo { kind: bh.kind, size: bh.size, user_string: bh.user_string });
        offset += block_total;
    }
    Ok(blocks)
}

/// Metadata introspection on a path that has no open [`Context`]: a
/// read-only, single-process walk that needs neither a communicator nor a
/// `Context`.
pub fn read_info<S: ParallelStorage>(storage: &S, path: &str) -> Result<Vec<BlockInfo>> {
    let file = storage.open_read(path)?;
    info_from_file(&file)
}

/// Per-process handle over one open forest data file: the communicator,
/// the file, the cursor (`accessed_bytes`), the call counter, and the
/// partition vector's ownership.
pub struct Context<'c, 'g, F: ParallelFile> {
    comm: &'c dyn Collective,
    file: F,
    dim: Dim,
    gfq: GfqOwnership<'g>,
    global_num_cells: u64,
    accessed_bytes: u64,
    num_calls: u64,
    closed: bool,
}

impl<'c, 'g, F: ParallelFile> Context<'c, 'g, F> {
    #[inline]
    fn block_header_offset(&self) -> u64 {
        FILE_HEADER_REGION_LEN as u64 + self.accessed_bytes
    }

    fn advance_cursor(&mut self, payload_len: usize, pad_len: usize) {
        log_cursor_advance(self.accessed_bytes, payload_len, pad_len);
        self.accessed_bytes += BLOCK_HEADER_LEN as u64 + payload_len as u64 + pad_len as u64;
        self.num_calls += 1;
    }

    #[inline]
    pub fn accessed_bytes(&self) -> u64 {
        self.accessed_bytes
    }

    #[inline]
    pub fn num_calls(&self) -> u64 {
        self.num_calls
    }

    #[inline]
    pub fn dim(&self) -> Dim {
        self.dim
    }

    #[inline]
    pub fn global_num_cells(&self) -> u64 {
        self.global_num_cells
    }

    #[inline]
    pub fn rank(&self) -> i32 {
        self.comm.rank()
    }

    #[inline]
    pub fn size(&self) -> i32 {
        self.comm.size()
    }

    /// Create-for-write: collectively opens `path` for write-create, has
    /// rank 0 emit the file header and its fixed 16-byte alignment pad,
    /// and broadcasts success/failure so every rank either starts with
    /// `accessed_bytes = 0` or aborts uniformly.
    pub fn create<S>(
        comm: &'c dyn Collective,
        storage: &S,
        path: &str,
        dim: Dim,
        gfq: Vec<u64>,
        opts: CreateOptions,
    ) -> Result<Context<'c, 'static, S::File>>
    where
        S: ParallelStorage<File = F>,
    {
        assert_eq!(gfq.first().copied(), Some(0), "gfq must start at 0");
        assert!(gfq.windows(2).all(|w| w[0] <= w[1]), "gfq must be monotonic non-decreasing");
        let global_num_cells = *gfq.last().expect("gfq is non-empty");

        let mut opened: Option<S::File> = None;
        broadcast_status(comm, || {
            let mut file = storage.create(path)?;
            let header = FileHeader {
                dim,
                version: opts.version.clone(),
                user_string: opts.user_string.clone(),
                global_num_cells,
            };
            let body = header.encode()?;
            write_exact(&mut file, 0, &body)?;
            let (_, pad_bytes) = pad::pad_for(FILE_HEADER_BODY_LEN, pad::DEFAULT_DIVISOR);
            write_exact(&mut file, FILE_HEADER_BODY_LEN as u64, &pad_bytes)?;
            opened = Some(file);
            Ok(())
        })?;

        let file = match opened {
            Some(file) => file,
            None => storage.open_write(path)?,
        };

        debug!("created {path} for {} cells across {} ranks", global_num_cells, comm.size());
        Ok(Context {
            comm,
            file,
            dim,
            gfq: GfqOwnership::Owned(gfq),
            global_num_cells,
            accessed_bytes: 0,
            num_calls: 0,
            closed: false,
        })
    }

    /// Open-for-read, bound to a forest: rank 0 reads and validates the
    /// file header, and the parsed bytes (plus any failure) are replicated
    /// to every rank. `gfq` is borrowed, not copied, and must outlive the
    /// returned context.
    pub fn open_read_bound<S>(
        comm: &'c dyn Collective,
        storage: &S,
        path: &str,
        expected_global_num_cells: u64,
        gfq: &'g [u64],
        opts: ReadOptions,
    ) -> Result<Context<'c, 'g, S::File>>
    where
        S: ParallelStorage<File = F>,
    {
        let mut opened: Option<S::File> = None;
        let body = broadcast_payload(comm, || {
            let file = storage.open_read(path)?;
            let mut body = vec![0u8; FILE_HEADER_BODY_LEN];
            read_exact_at(&file, 0, &mut body)?;
            let header = FileHeader::decode(&body)?;
            if let Some(expected_version) = &opts.expected_version {
                if &header.version != expected_version {
                    return Err(ForestErr::io("file version does not match caller's expected version"));
                }
            }
            if header.global_num_cells != expected_global_num_cells {
                return Err(ForestErr::io(format!(
                    "file records {} global cells, forest expects {expected_global_num_cells}",
                    header.global_num_cells
                )));
            }
            opened = Some(file);
            Ok(body)
        })?;
        let header = FileHeader::decode(&body)?;

        let file = match opened {
            Some(file) => file,
            None => storage.open_read(path)?,
        };

        Ok(Context {
            comm,
            file,
            dim: header.dim,
            gfq: GfqOwnership::Borrowed(gfq),
            global_num_cells: header.global_num_cells,
            accessed_bytes: 0,
            num_calls: 0,
            closed: false,
        })
    }

    /// Open-for-read, unbound: same header validation, but no
    /// `global_num_cells` check against a caller forest, and no `gfq`
    /// captured. A later `read_field` computes a uniform partition for
    /// that one call, or the caller can pass an explicit one to
    /// `read_field_ext`.
    pub fn open_read_unbound<S>(
        comm: &'c dyn Collective,
        storage: &S,
        path: &str,
        opts: ReadOptions,
    ) -> Result<Context<'c, 'static, S::File>>
    where
        S: ParallelStorage<File = F>,
    {
        let mut opened: Option<S::File> = None;
        let body = broadcast_payload(comm, || {
            let file = storage.open_read(path)?;
            let mut body = vec![0u8; FILE_HEADER_BODY_LEN];
            read_exact_at(&file, 0, &mut body)?;
            let header = FileHeader::decode(&body)?;
            if let Some(expected_version) = &opts.expected_version {
                if &header.version != expected_version {
                    return Err(ForestErr::io("file version does not match caller's expected version"));
                }
            }
            opened = Some(file);
            Ok(body)
        })?;
        let header = FileHeader::decode(&body)?;

        let file = match opened {
            Some(file) => file,
            None => storage.open_read(path)?,
        };

        Ok(Context {
            comm,
            file,
            dim: header.dim,
            gfq: GfqOwnership::Unbound,
            global_num_cells: header.global_num_cells,
            accessed_bytes: 0,
            num_calls: 0,
            closed: false,
        })
    }

    /// Write header block: rank 0 writes the block header, the payload,
    /// and the pad; every rank advances the cursor identically.
    pub fn write_header(&mut self, payload: &[u8], user_string: &str) -> Result<()> {
        assert!(!self.closed, "write_header called on a closed context");
        let header_offset = self.block_header_offset();
        let block_header =
            BlockHeader { kind: BlockKind::Header, size: payload.len() as u64, user_string: user_string.to_owned() };
        let (pad_len, pad_bytes) = pad::pad_for_default(payload.len());
        let comm = self.comm;

        broadcast_status(comm, || {
            let encoded = block_header.encode()?;
            write_exact(&mut self.file, header_offset, &encoded)?;
            write_exact(&mut self.file, header_offset + BLOCK_HEADER_LEN as u64, payload)?;
            write_exact(&mut self.file, header_offset + BLOCK_HEADER_LEN as u64 + payload.len() as u64, &pad_bytes)
        })?;

        self.advance_cursor(payload.len(), pad_len);
        Ok(())
    }

    /// Read header block: rank 0 reads header + payload + pad, validates,
    /// and the bytes are broadcast whole to every rank.
    pub fn read_header(&mut self) -> Result<(BlockHeader, Vec<u8>)> {
        assert!(!self.closed, "read_header called on a closed context");
        let header_offset = self.block_header_offset();
        let comm = self.comm;

        let encoded = broadcast_payload(comm, || {
            let mut raw = vec![0u8; BLOCK_HEADER_LEN];
            read_exact_at(&self.file, header_offset, &mut raw)?;
            let bh = BlockHeader::decode(&raw, None)?;
            if bh.kind != BlockKind::Header {
                return Err(ForestErr::io("expected an H block"));
            }
            let payload_offset = header_offset + BLOCK_HEADER_LEN as u64;
            let mut payload = vec![0u8; bh.size as usize];
            read_exact_at(&self.file, payload_offset, &mut payload)?;
            let (pad_len, _) = pad::pad_for_default(payload.len());
            let mut pad_region = vec![0u8; pad_len];
            read_exact_at(&self.file, payload_offset + payload.len() as u64, &mut pad_region)?;
            if !pad::is_valid_pad(&pad_region) {
                return Err(ForestErr::io("malformed pad after header block"));
            }
            Ok(encode_header_and_payload(&bh, &payload))
        })?;

        let (bh, payload) = decode_header_and_payload(&encoded);
        let (pad_len, _) = pad::pad_for_default(bh.size as usize);
        self.advance_cursor(bh.size as usize, pad_len);
        Ok((bh, payload))
    }

    /// Read header block, skip variant (null-payload branch): reads only
    /// the block-header metadata, validates type `H`, and advances the
    /// cursor. Never touches the payload or pad bytes.
    pub fn skip_header(&mut self) -> Result<BlockHeader> {
        assert!(!self.closed, "skip_header called on a closed context");
        let header_offset = self.block_header_offset();
        let comm = self.comm;

        let raw = broadcast_payload(comm, || {
            let mut raw = vec![0u8; BLOCK_HEADER_LEN];
            read_exact_at(&self.file, header_offset, &mut raw)?;
            let bh = BlockHeader::decode(&raw, None)?;
            if bh.kind != BlockKind::Header {
                return Err(ForestErr::io("expected an H block"));
            }
            Ok(raw)
        })?;
        let bh = BlockHeader::decode(&raw, None)?;
        let (pad_len, _) = pad::pad_for_default(bh.size as usize);
        self.advance_cursor(bh.size as usize, pad_len);
        Ok(bh)
    }

    /// Write field block: rank 0 writes the block header; every rank
    /// writes its own disjoint slice at `gfq[rank] * elem_size`; rank 0
    /// writes the pad. Requires a context with a bound `gfq`
    /// (`create`/`open_read_bound`).
    pub fn write_field(&mut self, local_data: &[u8], elem_size: usize, user_string: &str) -> Result<()> {
        assert!(!self.closed, "write_field called on a closed context");
        let gfq = self
            .gfq
            .as_slice()
            .expect("write_field requires a context with a bound gfq (create or open_read_bound)");
        let rank = self.comm.rank();
        let (rank_offset, local_len) = local_slice_bounds(gfq, rank, elem_size);
        assert_eq!(local_data.len(), local_len, "local_data length does not match this rank's partition range");

        let header_offset = self.block_header_offset();
        let payload_offset = header_offset + BLOCK_HEADER_LEN as u64;
        let total_payload_len = self.global_num_cells as usize * elem_size;
        let comm = self.comm;

        let block_header = BlockHeader { kind: BlockKind::Field, size: elem_size as u64, user_string: user_string.to_owned() };
        broadcast_status(comm, || {
            let encoded = block_header.encode()?;
            write_exact(&mut self.file, header_offset, &encoded)
        })?;

        let local_result = self.file.write_at(payload_offset + rank_offset, local_data);
        reduce_payload_result(comm, local_result, local_data.len())?;

        let (pad_len, pad_bytes) = pad::pad_for_default(total_payload_len);
        broadcast_status(comm, || write_exact(&mut self.file, payload_offset + total_payload_len as u64, &pad_bytes))?;

        self.advance_cursor(total_payload_len, pad_len);
        Ok(())
    }

    fn read_field_with_gfq(&mut self, elem_size: usize, gfq: &[u64]) -> Result<Vec<u8>> {
        assert!(!self.closed, "read_field called on a closed context");
        let header_offset = self.block_header_offset();
        let comm = self.comm;

        let header_bytes = broadcast_payload(comm, || {
            let mut raw = vec![0u8; BLOCK_HEADER_LEN];
            read_exact_at(&self.file, header_offset, &mut raw)?;
            let bh = BlockHeader::decode(&raw, Some(elem_size as u64))?;
            if bh.kind != BlockKind::Field {
                return Err(ForestErr::io("expected an F block"));
            }
            Ok(raw)
        })?;
        BlockHeader::decode(&header_bytes, Some(elem_size as u64))?;

        let total_payload_len = self.global_num_cells as usize * elem_size;
        let payload_offset = header_offset + BLOCK_HEADER_LEN as u64;
        let (rank_offset, local_len) = local_slice_bounds(gfq, comm.rank(), elem_size);

        let mut local_buf = vec![0u8; local_len];
        let local_result = self.file.read_at(payload_offset + rank_offset, &mut local_buf);
        reduce_payload_result(comm, local_result, local_len)?;

        let (pad_len, _) = pad::pad_for_default(total_payload_len);
        broadcast_status(comm, || {
            let mut pad_region = vec![0u8; pad_len];
            read_exact_at(&self.file, payload_offset + total_payload_len as u64, &mut pad_region)?;
            if !pad::is_valid_pad(&pad_region) {
                return Err(ForestErr::io("malformed pad after field block"));
            }
            Ok(())
        })?;

        self.advance_cursor(total_payload_len, pad_len);
        Ok(local_buf)
    }

    /// Read field block, bound to this context's own `gfq` (owned or
    /// borrowed), or a freshly computed uniform partition when this
    /// context was opened unbound.
    pub fn read_field(&mut self, elem_size: usize) -> Result<Vec<u8>> {
        match self.gfq.as_slice() {
            Some(gfq) => {
                let gfq = gfq.to_vec();
                self.read_field_with_gfq(elem_size, &gfq)
            }
            None => {
                let gfq = gfq_uniform(self.global_num_cells, self.comm.size());
                self.read_field_with_gfq(elem_size, &gfq)
            }
        }
    }

    /// Read field block, with a caller-supplied `gfq` that overrides
    /// whatever this context is bound to (or isn't). The single call does
    /// not alter the context's own partition state.
    pub fn read_field_ext(&mut self, elem_size: usize, gfq: &[u64]) -> Result<Vec<u8>> {
        self.read_field_with_gfq(elem_size, gfq)
    }

    /// Read field block, skip variant: reads only the block header,
    /// validates `elem_size` and type `F`, and advances the cursor without
    /// touching payload or pad bytes.
    pub fn skip_field(&mut self, elem_size: usize) -> Result<BlockHeader> {
        assert!(!self.closed, "skip_field called on a closed context");
        let header_offset = self.block_header_offset();
        let comm = self.comm;

        let raw = broadcast_payload(comm, || {
            let mut raw = vec![0u8; BLOCK_HEADER_LEN];
            read_exact_at(&self.file, header_offset, &mut raw)?;
            let bh = BlockHeader::decode(&raw, Some(elem_size as u64))?;
            if bh.kind != BlockKind::Field {
                return Err(ForestErr::io("expected an F block"));
            }
            Ok(raw)
        })?;
        let bh = BlockHeader::decode(&raw, Some(elem_size as u64))?;
        let total_payload_len = self.global_num_cells as usize * elem_size;
        let (pad_len, _) = pad::pad_for_default(total_payload_len);
        self.advance_cursor(total_payload_len, pad_len);
        Ok(bh)
    }

    /// Metadata introspection over the blocks already written/read so far
    /// in this open file: a forward-only walk using only block headers,
    /// stopping at the first block that cannot be fully read rather than
    /// reporting a truncated one.
    pub fn info(&self) -> Result<Vec<BlockInfo>> {
        info_from_file(&self.file)
    }

    /// Releases this context. Calling this explicitly is the normal path:
    /// every successful open must be paired with exactly one close. `Drop`
    /// below is a safety net for the case where a caller never reaches it.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        debug!("context closed after {} calls, {} bytes", self.num_calls, self.accessed_bytes);
        Ok(())
    }
}

/// A context that goes out of scope without an explicit `close()` (an
/// early `?` return, a panic unwind) still releases cleanly. This does not
/// change the "exactly one close per open" contract: `close()` remains the
/// path that reports an error code, and `Drop` only ever runs the
/// identical bookkeeping with no result to report.
impl<'c, 'g, F: ParallelFile> Drop for Context<'c, 'g, F> {
    fn drop(&mut self) {
        if !self.closed {
            debug!("context dropped without explicit close() after {} calls", self.num_calls);
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::SingleRankCollective;
    use crate::storage::mem::MemStorage;

    #[test]
    fn scenario_1_empty_file() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0], CreateOptions::new().user_string("hello"))
            .unwrap();
        ctx.close().unwrap();

        let file = storage.open_read("f").unwrap();
        assert_eq!(file.len().unwrap(), 112);
        let mut whole = vec![0u8; 112];
        file.read_at(0, &mut whole).unwrap();
        assert_eq!(&whole[0..7], b"p4data0");
        assert_eq!(whole[7], b'\n');
        assert_eq!(&whole[80..96], b"0000000000000000");
        assert_eq!(whole[96], b'\n');
        assert_eq!(whole[111], b'\n');
        assert!(whole[97..111].iter().all(|&b| b == b' '));
    }

    #[test]
    fn scenario_2_header_block() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let mut ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0], CreateOptions::new()).unwrap();
        ctx.write_header(b"0123456789", "").unwrap();
        let (expected_pad, _) = pad::pad_for_default(10);
        assert_eq!(ctx.accessed_bytes(), 64 + 10 + expected_pad as u64);
        ctx.close().unwrap();

        let file = storage.open_read("f").unwrap();
        let mut block_start = vec![0u8; 2 + 13 + 1];
        file.read_at(112, &mut block_start).unwrap();
        assert_eq!(&block_start[0..2], b"H ");
        assert_eq!(&block_start[2..15], b"0000000000010");
        let total = 112 + 64 + 10 + expected_pad as u64;
        assert_eq!(file.len().unwrap(), total);
    }

    #[test]
    fn scenario_3_field_block_two_ranks() {
        let storage = MemStorage::new();
        let group = SingleRankCollective::group(2);
        let gfq = vec![0u64, 3, 6];

        let mut ctx0 =
            Context::create(&group[0], &storage, "f", Dim::Two, gfq.clone(), CreateOptions::new()).unwrap();
        let mut ctx1 = {
            // rank 1 joins the already-created file the same way a real
            // collective open would (see `ParallelStorage::open_write`).
            let file = storage.open_write("f").unwrap();
            Context {
                comm: &group[1],
                file,
                dim: Dim::Two,
                gfq: GfqOwnership::Owned(gfq.clone()),
                global_num_cells: 6,
                accessed_bytes: 0,
                num_calls: 0,
                closed: false,
            }
        };

        let rank0_data: Vec<u8> = [1u32; 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let rank1_data: Vec<u8> = [2u32; 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        ctx0.write_field(&rank0_data, 4, "").unwrap();
        ctx1.write_field(&rank1_data, 4, "").unwrap();

        assert_eq!(ctx0.accessed_bytes(), 64 + 24 + 8);
        ctx0.close().unwrap();
        ctx1.close().unwrap();

        let file = storage.open_read("f").unwrap();
        let mut payload = vec![0u8; 24];
        file.read_at(112 + 64, &mut payload).unwrap();
        assert_eq!(
            payload,
            vec![
                1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0
            ]
        );
    }

    #[test]
    fn scenario_5_global_count_mismatch_is_rejected() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0, 6], CreateOptions::new()).unwrap();
        ctx.close().unwrap();

        let gfq = vec![0u64, 7];
        let result = Context::open_read_bound(&comm, &storage, "f", 7, &gfq, ReadOptions::new());
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().status(), crate::util::status::Status::Io);
    }

    #[test]
    fn header_round_trips_through_write_and_read() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let mut ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0], CreateOptions::new()).unwrap();
        ctx.write_header(b"payload-bytes", "notes").unwrap();
        ctx.close().unwrap();

        let gfq = vec![0u64];
        let mut ctx = Context::open_read_bound(&comm, &storage, "f", 0, &gfq, ReadOptions::new()).unwrap();
        let (bh, payload) = ctx.read_header().unwrap();
        assert_eq!(bh.kind, BlockKind::Header);
        assert_eq!(payload, b"payload-bytes");
        assert_eq!(bh.user_string, "notes");
        ctx.close().unwrap();
    }

    #[test]
    fn skip_header_advances_cursor_without_reading_payload() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let mut ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0], CreateOptions::new()).unwrap();
        ctx.write_header(b"0123456789", "").unwrap();
        let after_write = ctx.accessed_bytes();
        ctx.close().unwrap();

        let gfq = vec![0u64];
        let mut ctx = Context::open_read_bound(&comm, &storage, "f", 0, &gfq, ReadOptions::new()).unwrap();
        let bh = ctx.skip_header().unwrap();
        assert_eq!(bh.size, 10);
        assert_eq!(ctx.accessed_bytes(), after_write);
        ctx.close().unwrap();
    }

    #[test]
    fn field_round_trips_on_a_single_rank() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let mut ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0, 3], CreateOptions::new()).unwrap();
        let data: Vec<u8> = (0..3u32).flat_map(|v| v.to_ne_bytes()).collect();
        ctx.write_field(&data, 4, "").unwrap();
        ctx.close().unwrap();

        let gfq = vec![0u64, 3];
        let mut ctx = Context::open_read_bound(&comm, &storage, "f", 3, &gfq, ReadOptions::new()).unwrap();
        let read_back = ctx.read_field(4).unwrap();
        assert_eq!(read_back, data);
        ctx.close().unwrap();
    }

    #[test]
    fn read_field_ext_overrides_an_unbound_context() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let mut ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0, 4], CreateOptions::new()).unwrap();
        let data: Vec<u8> = (0..4u32).flat_map(|v| v.to_ne_bytes()).collect();
        ctx.write_field(&data, 4, "").unwrap();
        ctx.close().unwrap();

        let mut ctx = Context::open_read_unbound(&comm, &storage, "f", ReadOptions::new()).unwrap();
        let read_back = ctx.read_field_ext(4, &[0, 4]).unwrap();
        assert_eq!(read_back, data);
        ctx.close().unwrap();
    }

    #[test]
    fn info_reports_blocks_written_so_far() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let mut ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0], CreateOptions::new()).unwrap();
        ctx.write_header(b"abc", "one").unwrap();
        ctx.write_header(b"defgh", "two").unwrap();
        ctx.close().unwrap();

        let blocks = read_info(&storage, "f").unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].size, 3);
        assert_eq!(blocks[0].user_string, "one");
        assert_eq!(blocks[1].size, 5);
        assert_eq!(blocks[1].user_string, "two");
    }

    #[test]
    fn info_stops_at_truncated_trailing_block() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let mut ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0], CreateOptions::new()).unwrap();
        ctx.write_header(b"abc", "one").unwrap();
        ctx.close().unwrap();

        // Truncate the file mid-way through a second, never-completed block.
        {
            let mut file = storage.open_write("f").unwrap();
            let (_, pad) = pad::pad_for_default(3);
            let second_block_header_offset = 112 + 64 + 3 + pad.len() as u64;
            let bh = BlockHeader { kind: BlockKind::Header, size: 100, user_string: String::new() };
            write_exact(&mut file, second_block_header_offset, &bh.encode().unwrap()).unwrap();
            write_exact(&mut file, second_block_header_offset + BLOCK_HEADER_LEN as u64, b"short").unwrap();
        }

        let blocks = read_info(&storage, "f").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].user_string, "one");
    }

    #[test]
    fn drop_without_close_does_not_panic() {
        let comm = SingleRankCollective::singleton();
        let storage = MemStorage::new();
        let ctx = Context::create(&comm, &storage, "f", Dim::Two, vec![0], CreateOptions::new()).unwrap();
        drop(ctx);
    }

    #[test]
    fn gfq_uniform_matches_scenario_4_repartition() {
        assert_eq!(gfq_uniform(6, 3), vec![0, 2, 4, 6]);
    }
}
