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

//! The inflate half of forest deflate/inflate.
//!
//! Reconstructs an equivalent forest from a record array plus the global
//! partition metadata (`gfq`, `pertree`). The inverse of
//! [`crate::forest::deflate::deflate`], but on a possibly different number
//! of ranks with possibly different partition boundaries than the forest
//! that was deflated.

use log::trace;

use crate::collective::{broadcast_vec, Collective};
use crate::forest::{Cell, Connectivity, Coord, Forest, Tree};
use crate::header::Dim;
use crate::util::coding::decode_records;
use crate::util::status::{ForestErr, Result};

/// Finds the largest tree index `t` with `pertree[t] <= value`.
///
/// A tree equal to `pertree[t]` on its lower boundary is considered to
/// begin at that rank, so the bisection predicate is strict-less-than on
/// the upper bound, i.e. `pertree[t] <= value`, not `pertree[t] < value`.
/// This is exactly [`slice::partition_point`]'s "count of elements
/// satisfying `p <= value`" minus one.
fn bisect_pertree(pertree: &[u64], value: u64) -> usize {
    let count = pertree.partition_point(|&p| p <= value);
    count.saturating_sub(1)
}

fn check_partition(gfq: &[u64], pertree: &[u64]) -> Result<()> {
    if gfq.is_empty() || gfq[0] != 0 {
        return Err(ForestErr::arg("gfq must start at 0"));
    }
    if !gfq.windows(2).all(|w| w[0] <= w[1]) {
        return Err(ForestErr::arg("gfq must be monotonic non-decreasing"));
    }
    if pertree.is_empty() || pertree[0] != 0 {
        return Err(ForestErr::arg("pertree must start at 0"));
    }
    if !pertree.windows(2).all(|w| w[0] <= w[1]) {
        return Err(ForestErr::arg("pertree must be monotonic non-decreasing"));
    }
    if gfq.last() != pertree.last() {
        return Err(ForestErr::arg("gfq[P] must equal pertree[T]"));
    }
    Ok(())
}

/// Reconstructs a [`Forest`] from `records` (and, optionally, `data`) plus
/// the global partition vectors `gfq` (size `P+1`) and `pertree` (size
/// `T+1`).
#[allow(clippy::too_many_arguments)]
pub fn inflate(
    dim: Dim,
    connectivity: Box<dyn Connectivity>,
    rank: i32,
    size: i32,
    gfq: &[u64],
    pertree: &[u64],
    records: &[i64],
    data: Option<&[u8]>,
    data_size: usize,
) -> Result<Forest> {
    check_partition(gfq, pertree)?;
    assert!((rank as usize) + 1 < gfq.len(), "rank out of range for gfq");

    let local_num_cells = gfq[rank as usize + 1] - gfq[rank as usize];
    let record_width = match dim {
        Dim::Two => 3,
        Dim::Three => 4,
    };
    if records.len() != record_width * local_num_cells as usize {
        return Err(ForestErr::arg(format!(
            "record array has {} entries, expected {}",
            records.len(),
            record_width * local_num_cells as usize
        )));
    }
    if let Some(d) = data {
        if d.len() != local_num_cells as usize * data_size {
            return Err(ForestErr::arg(format!(
                "data array has {} bytes, expected {}",
                d.len(),
                local_num_cells as usize * data_size
            )));
        }
    }

    let num_trees = connectivity.num_trees();
    let mut forest = Forest {
        dim,
        connectivity,
        rank,
        size,
        gfq: gfq.to_vec(),
        trees: (0..num_trees).map(|_| Tree::new_empty()).collect(),
        data_size,
        first_local_tree: -1,
        last_local_tree: -2,
        local_num_cells,
        global_num_cells: *gfq.last().expect("gfq non-empty"),
        revision: 0,
    };

    if local_num_cells == 0 {
        trace!("rank {rank}: no local cells, {num_trees} empty trees allocated");
        return Ok(forest);
    }

    let lo = gfq[rank as usize];
    let hi = gfq[rank as usize + 1] - 1;
    let t1 = bisect_pertree(pertree, lo);
    let t2 = bisect_pertree(pertree, hi);
    forest.first_local_tree = t1 as i64;
    forest.last_local_tree = t2 as i64;

    let mut gtreeskip = lo - pertree[t1];
    let mut remaining_local = local_num_cells;
    let mut record_cursor = 0usize;
    let mut data_cursor = 0usize;

    for t in t1..=t2 {
        let tree_global_count = pertree[t + 1] - pertree[t];
        let take = (tree_global_count - gtreeskip).min(remaining_local);

        for _ in 0..take {
            let rec = &records[record_cursor..record_cursor + record_width];
            record_cursor += record_width;
            let level = rec[record_width - 1];
            let coord = match dim {
                Dim::Two => Coord::new2(rec[0], rec[1]),
                Dim::Three => Coord::new3(rec[0], rec[1], rec[2]),
            };
            let cell_data = data.map(|d| {
                let slice = &d[data_cursor..data_cursor + data_size];
                data_cursor += data_size;
                slice.to_vec()
            });
            forest.trees[t].record_cell(Cell::new(coord, level, cell_data));
        }

        remaining_local -= take;
        gtreeskip = 0;
    }

    let decoded_total: usize = forest.trees[t1..=t2].iter().map(|t| t.cells.len()).sum();
    assert_eq!(
        decoded_total as u64, local_num_cells,
        "decoded cell count does not match local_num_cells"
    );
    assert_eq!(remaining_local, 0, "inflate did not consume the full local range");

    Ok(forest)
}

/// Inflate via [`decode_records`] and a raw native-order byte buffer,
/// for callers (e.g. [`crate::context`]) that hold the wire-format bytes
/// rather than an already-parsed `&[i64]`.
#[allow(clippy::too_many_arguments)]
pub fn inflate_from_bytes(
    dim: Dim,
    connectivity: Box<dyn Connectivity>,
    rank: i32,
    size: i32,
    gfq: &[u64],
    pertree: &[u64],
    record_bytes: &[u8],
    data: Option<&[u8]>,
    data_size: usize,
) -> Result<Forest> {
    let records = decode_records(record_bytes);
    inflate(dim, connectivity, rank, size, gfq, pertree, &records, data, data_size)
}

/// The first cell's spatial position (coordinate + level) on this rank,
/// used by [`publish_first_positions`]. `None` when the rank holds no
/// local cells.
fn local_first_position(forest: &Forest) -> Option<(Coord, i64)> {
    if !forest.has_local_cells() {
        return None;
    }
    let tree = &forest.trees[forest.first_local_tree as usize];
    tree.cells.first().map(|c| (c.coord, c.level))
}

/// Invokes the external global-partition helper to publish first-cell
/// positions for all ranks. Each rank's first local cell position is
/// broadcast from that rank to every other rank, in rank order, producing
/// a `size`-length vector every rank agrees on, with `None` for a rank
/// with no local cells.
///
/// This is the one point in the deflate/inflate engine that needs the
/// collective boundary; every other step of inflate is pure.
pub fn publish_first_positions(comm: &dyn Collective, forest: &Forest) -> Vec<Option<(Coord, i64)>> {
    let width = forest.record_width();
    let mut positions = Vec::with_capacity(comm.size() as usize);
    for root in 0..comm.size() {
        let local = if comm.rank() == root {
            local_first_position(forest)
        } else {
            None
        };
        let payload = match (comm.rank() == root, local) {
            (true, Some((coord, level))) => {
                let mut buf = Vec::with_capacity(width * 8 + 1);
                buf.push(1u8);
                for c in coord.as_slice() {
                    buf.extend_from_slice(&c.to_ne_bytes());
                }
                buf.extend_from_slice(&level.to_ne_bytes());
                buf
            }
            (true, None) => vec![0u8],
            (false, _) => vec![0u8; width * 8 + 1],
        };
        let received = broadcast_vec(comm, payload);
        if received[0] == 0 {
            positions.push(None);
            continue;
        }
        let mut words = received[1..].chunks_exact(8).map(|c| {
            i64::from_ne_bytes(c.try_into().expect("8-byte word"))
        });
        let coord = match forest.dim {
            Dim::Two => Coord::new2(words.next().unwrap(), words.next().unwrap()),
            Dim::Three => Coord::new3(
                words.next().unwrap(),
                words.next().unwrap(),
                words.next().unwrap(),
            ),
        };
        let level = words.next().unwrap();
        positions.push(Some((coord, level)));
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::SingleRankCollective;
    use crate::forest::TrivialConnectivity;

    #[test]
    fn bisect_prefers_lower_boundary_tie() {
        let pertree = vec![0, 4, 4, 10];
        // value 4 lands exactly on tree 2's lower boundary (and tree 1's
        // upper boundary); the tie-break picks the tree that *begins*
        // there.
        assert_eq!(bisect_pertree(&pertree, 4), 2);
        assert_eq!(bisect_pertree(&pertree, 3), 0);
        assert_eq!(bisect_pertree(&pertree, 9), 2);
    }

    #[test]
    fn zero_local_cells_still_allocates_all_trees() {
        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(3));
        let gfq = vec![0u64, 0, 6];
        let pertree = vec![0u64, 6];
        let forest = inflate(Dim::Two, connectivity, 0, 2, &gfq, &pertree, &[], None, 0).unwrap();
        assert_eq!(forest.trees.len(), 3);
        assert_eq!(forest.first_local_tree, -1);
        assert_eq!(forest.last_local_tree, -2);
        assert_eq!(forest.local_num_cells, 0);
    }

    #[test]
    fn splits_a_tree_across_ranks() {
        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(1));
        let gfq = vec![0u64, 3, 6];
        let pertree = vec![0u64, 6];
        let records_rank0 = vec![0, 0, 0, 1, 0, 0, 2, 0, 0];
        let forest0 =
            inflate(Dim::Two, connectivity, 0, 2, &gfq, &pertree, &records_rank0, None, 0).unwrap();
        assert_eq!(forest0.first_local_tree, 0);
        assert_eq!(forest0.last_local_tree, 0);
        assert_eq!(forest0.trees[0].cells.len(), 3);

        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(1));
        let records_rank1 = vec![3, 0, 0, 4, 0, 0, 5, 0, 0];
        let forest1 =
            inflate(Dim::Two, connectivity, 1, 2, &gfq, &pertree, &records_rank1, None, 0).unwrap();
        assert_eq!(forest1.first_local_tree, 0);
        assert_eq!(forest1.last_local_tree, 0);
        assert_eq!(forest1.trees[0].cells.len(), 3);
        assert_eq!(forest1.trees[0].cells[0].coord.as_slice(), &[3, 0]);
    }

    #[test]
    fn rejects_mismatched_record_length() {
        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(1));
        let gfq = vec![0u64, 3];
        let pertree = vec![0u64, 3];
        let bad_records = vec![0, 0, 0];
        assert!(inflate(Dim::Two, connectivity, 0, 1, &gfq, &pertree, &bad_records, None, 0).is_err());
    }

    #[test]
    fn publish_first_positions_single_rank() {
        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(1));
        let gfq = vec![0u64, 2];
        let pertree = vec![0u64, 2];
        let records = vec![7, 9, 3, 8, 10, 4];
        let forest =
            inflate(Dim::Two, connectivity, 0, 1, &gfq, &pertree, &records, None, 0).unwrap();
        let comm = SingleRankCollective::singleton();
        let positions = publish_first_positions(&comm, &forest);
        assert_eq!(positions.len(), 1);
        let (coord, level) = positions[0].unwrap();
        assert_eq!(coord.as_slice(), &[7, 9]);
        assert_eq!(level, 3);
    }

    #[test]
    fn publish_first_positions_reports_none_for_empty_rank() {
        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(2));
        let gfq = vec![0u64, 0];
        let pertree = vec![0u64, 0];
        let forest = inflate(Dim::Two, connectivity, 0, 1, &gfq, &pertree, &[], None, 0).unwrap();
        let comm = SingleRankCollective::singleton();
        let positions = publish_first_positions(&comm, &forest);
        assert_eq!(positions, vec![None]);
    }
}
