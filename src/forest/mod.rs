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

//! The forest data model and the deflate/inflate conversion between an
//! in-memory forest and a flat per-cell record sequence.
//!
//! The connectivity graph, the spatial coordinate/level-bit layout of an
//! individual cell, and the refinement/coarsening/balance algorithms are
//! all out of scope: they are referenced here only through the
//! [`Connectivity`] trait and a cell's plain integer coordinates.

pub mod deflate;
pub mod inflate;

use crate::header::Dim;

/// A placeholder for the external geometry layer's actual maximum
/// refinement level. The exact value is a property of the out-of-scope
/// coordinate/level-bit layout; this crate only needs *some* upper bound
/// to validate levels against and to tag a tree's computed first/last
/// descendant, so it picks the conventional value used by real
/// adaptive-mesh forests of this kind.
pub const QMAXLEVEL: i64 = 30;

/// The out-of-scope connectivity graph of trees, referenced here only
/// through the one fact inflate's tree-allocation step needs: how many
/// trees the forest has, so it can create a tree object for every tree
/// index `0..T-1`.
pub trait Connectivity {
    fn num_trees(&self) -> usize;
}

/// A connectivity graph of `n` unconnected trees, useful for tests and for
/// single-tree forests. Real neighbor topology is out of scope.
#[derive(Debug, Clone, Copy)]
pub struct TrivialConnectivity(pub usize);

impl Connectivity for TrivialConnectivity {
    fn num_trees(&self) -> usize {
        self.0
    }
}

/// A cell's integer spatial coordinates: two components in 2D, three in
/// 3D. A single runtime-tagged representation rather than two
/// near-duplicate monomorphized trees for the 2D and 3D cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    components: [i64; 3],
    dim: Dim,
}

impl Coord {
    pub fn new2(x: i64, y: i64) -> Self {
        Coord {
            components: [x, y, 0],
            dim: Dim::Two,
        }
    }

    pub fn new3(x: i64, y: i64, z: i64) -> Self {
        Coord {
            components: [x, y, z],
            dim: Dim::Three,
        }
    }

    #[inline]
    pub fn dim(&self) -> Dim {
        self.dim
    }

    /// The `DIM` coordinate components, in storage order.
    #[inline]
    pub fn as_slice(&self) -> &[i64] {
        match self.dim {
            Dim::Two => &self.components[..2],
            Dim::Three => &self.components[..3],
        }
    }
}

/// A leaf of a tree: the quantum of per-cell data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub coord: Coord,
    pub level: i64,
    /// Present only when the forest carries a uniform-size user-data
    /// payload and the caller asked for it.
    pub data: Option<Vec<u8>>,
}

impl Cell {
    pub fn new(coord: Coord, level: i64, data: Option<Vec<u8>>) -> Self {
        assert!((0..=QMAXLEVEL).contains(&level), "level out of range");
        Cell { coord, level, data }
    }

    /// The deepest cell at `QMAXLEVEL` that starts at this cell's
    /// coordinate. The out-of-scope space-filling-curve math is not
    /// reproduced here; this crate only needs a stable, callable stand-in
    /// to carry through tree construction's first-descendant computation.
    pub fn first_descendant(&self) -> Cell {
        Cell {
            coord: self.coord,
            level: QMAXLEVEL,
            data: None,
        }
    }

    /// The deepest cell at `QMAXLEVEL` that ends within this cell. See
    /// [`Cell::first_descendant`].
    pub fn last_descendant(&self) -> Cell {
        Cell {
            coord: self.coord,
            level: QMAXLEVEL,
            data: None,
        }
    }
}

/// One tree in the forest: an ordered sequence of cells plus the
/// per-level histogram and descendant bookkeeping inflate maintains while
/// decoding.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub cells: Vec<Cell>,
    /// `level_counts[l]` is the number of cells at refinement level `l`.
    pub level_counts: Vec<u64>,
    pub maxlevel: i64,
    pub first_descendant: Option<Cell>,
    pub last_descendant: Option<Cell>,
}

impl Tree {
    pub fn new_empty() -> Self {
        Tree {
            cells: Vec::new(),
            level_counts: vec![0; (QMAXLEVEL + 1) as usize],
            maxlevel: -1,
            first_descendant: None,
            last_descendant: None,
        }
    }

    pub(crate) fn record_cell(&mut self, cell: Cell) {
        self.level_counts[cell.level as usize] += 1;
        if cell.level > self.maxlevel {
            self.maxlevel = cell.level;
        }
        if self.first_descendant.is_none() {
            self.first_descendant = Some(cell.first_descendant());
        }
        self.last_descendant = Some(cell.last_descendant());
        self.cells.push(cell);
    }
}

/// A partitioned collection of adaptive trees over a connectivity graph.
pub struct Forest {
    pub dim: Dim,
    pub connectivity: Box<dyn Connectivity>,
    pub rank: i32,
    pub size: i32,
    /// Size `P+1` monotonic prefix sum of per-rank cell counts.
    pub gfq: Vec<u64>,
    pub trees: Vec<Tree>,
    /// `0` when the forest carries no per-cell user data.
    pub data_size: usize,
    /// `-1` when this rank holds no local cells.
    pub first_local_tree: i64,
    /// `-2` when this rank holds no local cells.
    pub last_local_tree: i64,
    pub local_num_cells: u64,
    pub global_num_cells: u64,
    /// Reset to `0` by [`inflate::inflate`].
    pub revision: u64,
}

impl Forest {
    /// `(DIM + 1)`: the coordinate components plus the level, per record.
    #[inline]
    pub fn record_width(&self) -> usize {
        match self.dim {
            Dim::Two => 3,
            Dim::Three => 4,
        }
    }

    #[inline]
    pub fn has_local_cells(&self) -> bool {
        self.first_local_tree >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coord_round_trips_components() {
        let c2 = Coord::new2(1, 2);
        assert_eq!(c2.as_slice(), &[1, 2]);
        assert_eq!(c2.dim(), Dim::Two);

        let c3 = Coord::new3(1, 2, 3);
        assert_eq!(c3.as_slice(), &[1, 2, 3]);
        assert_eq!(c3.dim(), Dim::Three);
    }

    #[test]
    fn tree_records_level_histogram_and_descendants() {
        let mut tree = Tree::new_empty();
        tree.record_cell(Cell::new(Coord::new2(0, 0), 2, None));
        tree.record_cell(Cell::new(Coord::new2(4, 0), 5, None));
        assert_eq!(tree.level_counts[2], 1);
        assert_eq!(tree.level_counts[5], 1);
        assert_eq!(tree.maxlevel, 5);
        assert!(tree.first_descendant.is_some());
        assert!(tree.last_descendant.is_some());
    }

    #[test]
    #[should_panic]
    fn cell_rejects_out_of_range_level() {
        Cell::new(Coord::new2(0, 0), QMAXLEVEL + 1, None);
    }
}
