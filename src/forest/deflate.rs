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

//! The deflate half of forest deflate/inflate.
//!
//! Flattens a partitioned forest into a per-cell record array and,
//! optionally, a per-cell user-data array. A straight walk over
//! `[first_local_tree, last_local_tree]`, in stored cell order, carrying
//! no tree-boundary information (the caller already has `pertree`/`gfq`).

use super::Forest;

/// The output of [`deflate`]: the flat record array, and the user-data
/// array when requested.
pub struct Deflated {
    /// Length `(DIM+1) * local_num_cells`: coordinates then level, per
    /// cell, trees in `[first_local_tree, last_local_tree]` ascending,
    /// cells within a tree in stored order.
    pub records: Vec<i64>,
    /// `Some` of length `local_num_cells * data_size` iff `with_data` was
    /// set and the forest carries user data.
    pub data: Option<Vec<u8>>,
}

pub fn deflate(forest: &Forest, with_data: bool) -> Deflated {
    let width = forest.record_width();
    let mut records = Vec::with_capacity(width * forest.local_num_cells as usize);
    let want_data = with_data && forest.data_size > 0;
    let mut data = want_data.then(|| Vec::with_capacity(forest.data_size * forest.local_num_cells as usize));

    if forest.has_local_cells() {
        for t in forest.first_local_tree..=forest.last_local_tree {
            let tree = &forest.trees[t as usize];
            for cell in &tree.cells {
                records.extend_from_slice(cell.coord.as_slice());
                records.push(cell.level);
                if let Some(buf) = data.as_mut() {
                    match &cell.data {
                        Some(cd) => {
                            debug_assert_eq!(cd.len(), forest.data_size);
                            buf.extend_from_slice(cd);
                        }
                        None => buf.resize(buf.len() + forest.data_size, 0),
                    }
                }
            }
        }
    }

    debug_assert_eq!(records.len(), width * forest.local_num_cells as usize);
    Deflated { records, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::inflate::inflate;
    use crate::forest::{Connectivity, TrivialConnectivity};
    use crate::header::Dim;

    fn single_tree_forest() -> Forest {
        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(1));
        let gfq = vec![0u64, 4];
        let pertree = vec![0u64, 4];
        let records = vec![
            0, 0, 0, // cell 0: (0,0) level 0
            4, 0, 1, // cell 1: (4,0) level 1
            4, 4, 1, // cell 2: (4,4) level 1
            8, 8, 2, // cell 3: (8,8) level 2
        ];
        inflate(Dim::Two, connectivity, 0, 1, &gfq, &pertree, &records, None, 0).unwrap()
    }

    #[test]
    fn deflate_reproduces_inflated_records() {
        let forest = single_tree_forest();
        let deflated = deflate(&forest, false);
        assert_eq!(
            deflated.records,
            vec![0, 0, 0, 4, 0, 1, 4, 4, 1, 8, 8, 2]
        );
        assert!(deflated.data.is_none());
    }

    #[test]
    fn deflate_without_data_flag_never_allocates_data_array() {
        let forest = single_tree_forest();
        let deflated = deflate(&forest, true);
        // data_size is 0 for this fixture, so no data array even though requested.
        assert!(deflated.data.is_none());
    }

    #[test]
    fn empty_local_range_deflates_to_empty_records() {
        let connectivity: Box<dyn Connectivity> = Box::new(TrivialConnectivity(2));
        let gfq = vec![0u64, 4, 4];
        let pertree = vec![0u64, 4, 4];
        let records = vec![];
        let forest = inflate(Dim::Two, connectivity, 1, 2, &gfq, &pertree, &records, None, 0).unwrap();
        let deflated = deflate(&forest, false);
        assert!(deflated.records.is_empty());
    }
}
