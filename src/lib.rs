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

//! Parallel serialization of partitioned quadtree/octree forests.
//!
//! This crate implements two tightly coupled problems:
//!
//! 1. **Forest deflation/inflation** ([`forest::deflate`], [`forest::inflate`]):
//!    converting an in-memory, tree-structured, partitioned forest to a flat,
//!    partition-independent sequence of per-cell records, and reconstructing
//!    an equivalent forest from such a sequence on an arbitrary (possibly
//!    different) number of ranks with possibly different partition
//!    boundaries.
//! 2. **A parallel data-file format** ([`context`], [`io`], [`header`]): a
//!    self-describing, text-readable-header, binary file layout supporting
//!    collective writing and reading of global header blocks and per-cell
//!    data arrays, with strict padding rules, resumable append semantics,
//!    and collective error synchronization.
//!
//! The forest refinement/coarsening/balance algorithms, the mesh
//! connectivity graph's actual neighbor topology, the spatial
//! coordinate/level-bit layout of individual cells, and driver programs are
//! all out of scope. This crate consumes them only through the
//! [`forest::Connectivity`] trait and plain integer coordinates
//! ([`forest::Coord`]). The collective transport and positioned file I/O
//! this subsystem needs are likewise abstraction boundaries
//! ([`collective::Collective`], [`storage::ParallelStorage`]), not a hard
//! MPI dependency: downstream consumers without an MPI toolchain on `PATH`
//! can still build and test against [`collective::SingleRankCollective`]
//! and [`storage::mem::MemStorage`], and enable the `mpi-transport` feature
//! to get [`collective::MpiCollective`] for real jobs.
//!
//! This crate does not endian-convert, compress, encrypt, checksum, or
//! index payloads, and it never seeks backwards: writes are append-only
//! relative to the current logical position, reads advance strictly
//! forward.

#![allow(clippy::too_many_arguments)]

pub mod collective;
pub mod context;
pub mod forest;
pub mod header;
pub mod io;
pub mod storage;
pub mod util;

#[cfg(test)]
mod testutil;

pub use collective::{Collective, ErrorClass, SingleRankCollective};
pub use context::{BlockInfo, Context, CreateOptions, GfqOwnership, ReadOptions};
pub use forest::{Cell, Connectivity, Coord, Forest, Tree, TrivialConnectivity};
pub use header::{BlockHeader, BlockKind, Dim, FileHeader};
pub use storage::{ParallelFile, ParallelStorage};
pub use util::status::{ForestErr, Result, Status};

#[cfg(feature = "mpi-transport")]
pub use collective::MpiCollective;
