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

//! Synthetic forest/connectivity builders for tests.
//!
//! Generates randomized fixtures with `rand` rather than hand-writing every
//! test case's bytes. Here the randomness is over cell counts per tree and
//! over coordinates, not over string keys.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::forest::{Cell, Coord, Forest, TrivialConnectivity};
use crate::header::Dim;

/// A whole, unpartitioned forest plus the metadata needed to deflate it on
/// any number of ranks: its `pertree` vector and total cell count.
pub struct SyntheticForest {
    pub dim: Dim,
    pub num_trees: usize,
    /// `pertree[t]` is the cumulative cell count up to (not including) tree
    /// `t`; `pertree[num_trees]` is the global cell count.
    pub pertree: Vec<u64>,
    /// Every cell's `(tree, coord, level)`, in global storage order.
    pub cells: Vec<(usize, Coord, i64)>,
}

/// Builds a synthetic forest of `num_trees` trees with `cells_per_tree`
/// cells each (levels and coordinates pseudo-random but deterministic for a
/// given `seed`), useful for exercising deflate/inflate round-trips without
/// depending on the out-of-scope geometry/refinement layer.
pub fn synthetic_forest(dim: Dim, num_trees: usize, cells_per_tree: usize, seed: u64) -> SyntheticForest {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pertree = Vec::with_capacity(num_trees + 1);
    let mut cells = Vec::new();
    pertree.push(0u64);
    for t in 0..num_trees {
        for _ in 0..cells_per_tree {
            let level = rng.gen_range(0..=10);
            let coord = match dim {
                Dim::Two => Coord::new2(rng.gen_range(0..1 << 10), rng.gen_range(0..1 << 10)),
                Dim::Three => Coord::new3(
                    rng.gen_range(0..1 << 10),
                    rng.gen_range(0..1 << 10),
                    rng.gen_range(0..1 << 10),
                ),
            };
            cells.push((t, coord, level));
        }
        pertree.push(pertree[t] + cells_per_tree as u64);
    }
    SyntheticForest { dim, num_trees, pertree, cells }
}

impl SyntheticForest {
    pub fn global_num_cells(&self) -> u64 {
        *self.pertree.last().expect("pertree is non-empty")
    }

    /// The record array a caller holding the global `[lo, hi)` cell range
    /// would pass to `inflate` on some rank.
    pub fn records_for_range(&self, lo: u64, hi: u64) -> Vec<i64> {
        let mut out = Vec::new();
        for &(_, coord, level) in &self.cells[lo as usize..hi as usize] {
            out.extend_from_slice(coord.as_slice());
            out.push(level);
        }
        out
    }

    /// Builds a [`Forest`] for `rank` of `size` using a uniform partition of
    /// this synthetic forest's global cells, for tests that need an actual
    /// in-memory `Forest` rather than just records.
    pub fn inflate_uniform(&self, rank: i32, size: i32) -> crate::util::status::Result<Forest> {
        let gfq = crate::context::gfq_uniform(self.global_num_cells(), size);
        let lo = gfq[rank as usize];
        let hi = gfq[rank as usize + 1];
        let records = self.records_for_range(lo, hi);
        let connectivity: Box<dyn crate::forest::Connectivity> = Box::new(TrivialConnectivity(self.num_trees));
        crate::forest::inflate::inflate(
            self.dim,
            connectivity,
            rank,
            size,
            &gfq,
            &self.pertree,
            &records,
            None,
            0,
        )
    }
}

/// Flattens a forest back into `(tree, coord, level)` triples in global
/// storage order, the inverse of how [`synthetic_forest`] built `cells`.
/// Used by round-trip tests to compare an inflated-then-deflated forest
/// against the original without depending on `PartialEq` for [`Forest`]
/// (which has no derivable equality because it owns a `dyn Connectivity`).
pub fn flatten(forest: &Forest) -> Vec<(Coord, i64)> {
    let mut out = Vec::new();
    if forest.has_local_cells() {
        for t in forest.first_local_tree..=forest.last_local_tree {
            for cell in &forest.trees[t as usize].cells {
                out.push((cell.coord, cell.level));
            }
        }
    }
    out
}

pub fn cell_at(coord: Coord, level: i64) -> Cell {
    Cell::new(coord, level, None)
}

/// Routes this crate's `log` output (the rank-0 diagnostic line, cursor and
/// dispatch tracing) through the test harness instead of stdout, so
/// `cargo test -- --nocapture` with `RUST_LOG` set shows it attributed to
/// the failing test. Safe to call from multiple tests; `try_init` ignores
/// the "already initialized" error from a prior call in the same binary.
pub fn init_test_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_forest_has_expected_shape() {
        let sf = synthetic_forest(Dim::Two, 3, 4, 7);
        assert_eq!(sf.pertree, vec![0, 4, 8, 12]);
        assert_eq!(sf.cells.len(), 12);
        assert_eq!(sf.global_num_cells(), 12);
    }

    #[test]
    fn records_for_range_matches_cell_slice() {
        let sf = synthetic_forest(Dim::Two, 2, 3, 1);
        let records = sf.records_for_range(1, 4);
        assert_eq!(records.len(), 3 * 3);
    }

    #[test]
    fn inflate_uniform_produces_the_requested_local_count() {
        let sf = synthetic_forest(Dim::Two, 2, 5, 42);
        let forest = sf.inflate_uniform(0, 2).unwrap();
        assert_eq!(forest.local_num_cells, 5);
    }
}
