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

//! Positioned file I/O, the storage collaborator behind the collective
//! block protocol.
//!
//! A narrow file/storage trait pair: open-for-write-create, open-for-read,
//! and `read_at`/`write_at` at an absolute byte offset, each reporting the
//! exact byte count transferred so the caller can distinguish a short
//! transfer (`Status::CountError`) from a hard error.

pub mod mem;
pub mod posix;

use crate::util::status::Result;

/// A single open file, already positioned by absolute offset on every call.
/// Reads and writes advance strictly forward, enforced by callers always
/// passing an advancing offset, not by this trait, since `info()` and
/// skip-protocol reads still need forward random access within one
/// sequential pass.
pub trait ParallelFile {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read. A short read (fewer bytes than
    /// requested, short of EOF semantics the caller already accounts for)
    /// is reported as a plain count, never as an error. Callers translate
    /// "count < requested" into `Status::CountError` themselves, since only
    /// they know whether a short read was expected (e.g. at EOF during
    /// `info()`'s tolerant walk).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf.len()` bytes at `offset`, returning the number of bytes
    /// actually written.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize>;

    /// Current file size in bytes.
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Opens files by path. Exactly one of [`ParallelStorage::create`] /
/// [`ParallelStorage::open_read`] is called per context, matching the
/// "exactly one close pairs with exactly one open" discipline every
/// context observes.
pub trait ParallelStorage {
    type File: ParallelFile;

    /// Creates (truncating if present) a file for write, mirroring
    /// `Context::create`'s "open the file for write-create".
    ///
    /// This is the one non-collective open in the subsystem: exactly one
    /// rank (rank 0, see `crate::context::Context::create`) calls it; every
    /// other rank joins the same file afterward via
    /// [`ParallelStorage::open_write`], the way a real MPI-IO job issues one
    /// collective `MPI_File_open` with `MPI_MODE_CREATE` rather than having
    /// every rank race to truncate the same path.
    fn create(&self, path: &str) -> Result<Self::File>;

    /// Opens an already-created file for positioned reads and writes,
    /// without truncating it. The handle every non-root rank obtains once
    /// rank 0's [`ParallelStorage::create`] has succeeded.
    fn open_write(&self, path: &str) -> Result<Self::File>;

    /// Opens an existing file read-only.
    fn open_read(&self, path: &str) -> Result<Self::File>;
}
