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

//! The collective-communication boundary.
//!
//! Everything above this module talks to `dyn Collective`, never to `mpi`
//! directly, the same way storage-consuming code never talks to `std::fs`
//! directly but to `dyn Storage`/`dyn File`. That keeps the core protocol in
//! `crate::io` testable with [`SingleRankCollective`] instead of a real MPI
//! runtime.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::trace;

/// The canonical, implementation-independent error class an external
/// translator produces. `Io` covers permission denied / no such file /
/// device errors collapsed to one bucket: any error class the external I/O
/// primitive produces passes through unchanged. "Unchanged" here means this
/// crate never *recovers* from it differently per sub-case, not that it
/// preserves the OS-specific errno distinctions upstream of this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Io,
    Other(i32),
}

impl ErrorClass {
    pub fn from_raw_os_error(raw: Option<i32>) -> Self {
        match raw {
            Some(code) => ErrorClass::Other(code),
            None => ErrorClass::Io,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Io => write!(f, "I/O error"),
            ErrorClass::Other(code) => write!(f, "OS error {code}"),
        }
    }
}

/// The collective operations this subsystem needs from an MPI-like
/// transport: rank/size identity, a byte broadcast from an arbitrary root,
/// and a logical-OR all-reduce used to detect a failure on *any* rank of a
/// collective payload I/O call: payload I/O of `F` blocks is collective, so
/// the underlying implementation reports an error on every rank and must be
/// reduced (logical-OR) before aborting.
pub trait Collective {
    fn rank(&self) -> i32;
    fn size(&self) -> i32;

    #[inline]
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Broadcasts `payload` from `root` to every rank. On `root`, `payload`
    /// holds the data to send; on every other rank its initial contents
    /// are ignored and it is overwritten with the received bytes. Every
    /// rank must call this the same number of times with the same `root`,
    /// in the same order: every public operation here is collective.
    fn broadcast_bytes_from(&self, root: i32, payload: &mut Vec<u8>);

    #[inline]
    fn broadcast_bytes(&self, payload: &mut Vec<u8>) {
        self.broadcast_bytes_from(0, payload)
    }

    /// Reduces `local` across all ranks with logical OR.
    fn all_reduce_or(&self, local: bool) -> bool;
}

/// Length-prefixed broadcast built on [`Collective::broadcast_bytes`]: rank
/// 0 supplies `payload`, every rank (including rank 0) gets back the same
/// bytes: a broadcast of a byte buffer from rank 0, for when the receiver
/// does not already know the length.
pub fn broadcast_vec(comm: &dyn Collective, payload: Vec<u8>) -> Vec<u8> {
    let mut len_buf = if comm.is_root() {
        (payload.len() as u64).to_ne_bytes().to_vec()
    } else {
        vec![0u8; 8]
    };
    comm.broadcast_bytes(&mut len_buf);
    let len = u64::from_ne_bytes(len_buf.try_into().expect("8-byte length prefix")) as usize;

    let mut buf = if comm.is_root() { payload } else { vec![0u8; len] };
    debug_assert_eq!(buf.len(), len);
    comm.broadcast_bytes(&mut buf);
    trace!("broadcast_vec: {} bytes from rank 0", buf.len());
    buf
}

/// A lightweight, zero-dependency stand-in for a real communicator. Every
/// unit test in this crate runs against this implementation instead of a
/// real MPI runtime.
///
/// Multi-rank scenarios are modeled by constructing one instance per
/// simulated rank with [`SingleRankCollective::group`] (all instances in a
/// group share a broadcast mailbox) and driving them, rank 0 first, against
/// a shared [`crate::storage::mem::MemStorage`] file (see `crate::io`
/// tests). Field-block payload I/O never needs the mailbox at all: every
/// rank writes/reads its own offset-disjoint slice, so two
/// `SingleRankCollective`s in the same group reproduce the exact bytes a
/// true multi-process run would produce without any value actually
/// crossing between them. Metadata broadcasts (the parsed file header, on
/// `open_read`) do need it, which is what the mailbox is for.
///
/// `all_reduce_or` is the identity function here rather than a true
/// barrier-synchronized reduction: a collective field I/O failure fails
/// identically on every rank (e.g. a short write against the same shared
/// `MemStorage`), so `OR` over identical locals equals any one of them.
/// Modeling one rank failing while others succeed would need a real
/// barrier, which this stand-in does not provide.
#[derive(Clone)]
pub struct SingleRankCollective {
    rank: i32,
    size: i32,
    mailbox: Arc<Mutex<Vec<u8>>>,
}

impl SingleRankCollective {
    /// Builds one instance per rank of a `size`-rank group, sharing a
    /// single broadcast mailbox.
    pub fn group(size: i32) -> Vec<Self> {
        assert!(size > 0, "communicator size must be positive");
        let mailbox = Arc::new(Mutex::new(Vec::new()));
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: mailbox.clone(),
            })
            .collect()
    }

    pub fn singleton() -> Self {
        Self::group(1).into_iter().next().expect("group(1) is non-empty")
    }
}

impl Collective for SingleRankCollective {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn broadcast_bytes_from(&self, root: i32, payload: &mut Vec<u8>) {
        assert!((0..self.size).contains(&root), "root out of range");
        if self.rank == root {
            *self.mailbox.lock().unwrap() = payload.clone();
        } else {
            let mailbox = self.mailbox.lock().unwrap();
            payload.clear();
            payload.extend_from_slice(&mailbox);
        }
    }

    fn all_reduce_or(&self, local: bool) -> bool {
        local
    }
}

/// A real communicator, backed by `rsmpi`'s [`mpi::topology::SimpleCommunicator`].
#[cfg(feature = "mpi-transport")]
pub struct MpiCollective<'c> {
    comm: &'c mpi::topology::SimpleCommunicator,
}

#[cfg(feature = "mpi-transport")]
impl<'c> MpiCollective<'c> {
    pub fn new(comm: &'c mpi::topology::SimpleCommunicator) -> Self {
        Self { comm }
    }
}

#[cfg(feature = "mpi-transport")]
impl<'c> Collective for MpiCollective<'c> {
    fn rank(&self) -> i32 {
        use mpi::traits::Communicator;
        self.comm.rank()
    }

    fn size(&self) -> i32 {
        use mpi::traits::Communicator;
        self.comm.size()
    }

    fn broadcast_bytes_from(&self, root: i32, payload: &mut Vec<u8>) {
        use mpi::traits::{Communicator, Root};
        let root_process = self.comm.process_at_rank(root);
        root_process.broadcast_into(payload.as_mut_slice());
    }

    fn all_reduce_or(&self, local: bool) -> bool {
        use mpi::collective::SystemOperation;
        use mpi::traits::CommunicatorCollectives;
        let local = local as u8;
        let mut global = 0u8;
        self.comm.all_reduce_into(&local, &mut global, &SystemOperation::logical_or());
        global != 0
    }
}
