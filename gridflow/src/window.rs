/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Halo exchange.
//!
//! A [`Window`] holds the cells of one partition of a rank 2 array plus
//! a halo: the cells of neighbouring partitions within a radius. The
//! halo is requested from the partitions intersecting it. Fragments
//! owned by another locality are copied out there and transferred
//! encoded; the window is complete once all fragments arrived, in
//! whatever order.

use futures::future::BoxFuture;
use futures::future::FutureExt;
use futures::future::try_join_all;
use gridslice::Hyperslab;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::error::Error;
use crate::error::Result;
use crate::partition::HaloFragment;
use crate::policy::InputPolicy;

/// The cells of a partition surrounded by a halo. Cells are `None` if
/// they are no-data, or lie outside the array and the halo policy does
/// not fill them.
#[derive(Debug, Clone)]
pub(crate) struct Window<T> {
    origin: [usize; 2],
    rows: usize,
    cols: usize,
    radius: [usize; 2],
    cells: Vec<Option<T>>,
}

impl<T: Element> Window<T> {
    /// Gather the window of partition `partition` of `array`, with a
    /// halo of `radius` cells.
    pub(crate) async fn gather(
        array: &PartitionedArray<T>,
        partition: usize,
        radius: [usize; 2],
        policy: InputPolicy<T>,
    ) -> Result<Self> {
        if array.rank() != 2 {
            return Err(Error::UnsupportedRank {
                op: "halo exchange",
                expected: 2,
                got: array.rank(),
            });
        }
        let tiling = array.tiling();
        let slab = tiling.partition_slab(partition);
        let (origin, count) = (slab.start(), slab.count());
        let (rows, cols) = (count[0], count[1]);
        let padded_cols = cols + 2 * radius[1];
        let mut window = Window {
            origin: [origin[0], origin[1]],
            rows,
            cols,
            radius,
            cells: vec![policy.halo.fill(); (rows + 2 * radius[0]) * padded_cols],
        };

        let grown = slab.grown(&radius, tiling.shape());
        let fragments = tiling
            .partitions_intersecting(&grown)
            .into_iter()
            .map(|source| fetch(array, source, tiling.locality(partition), &grown))
            .collect::<Result<Vec<_>>>()?;
        for fragment in try_join_all(fragments).await? {
            for (index, &value) in fragment.slab.points().zip(&fragment.values) {
                let row = index[0] + radius[0] - window.origin[0];
                let col = index[1] + radius[1] - window.origin[1];
                window.cells[row * padded_cols + col] = policy.valid(value);
            }
        }
        Ok(window)
    }
}

impl<T: Copy> Window<T> {
    /// The number of rows of the partition.
    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn cols(&self) -> usize {
        self.cols
    }

    /// Global index of the partition's first cell.
    pub(crate) fn origin(&self) -> [usize; 2] {
        self.origin
    }

    /// The cell at `(row, col)` relative to the partition origin. Rows
    /// and columns may reach into the halo.
    pub(crate) fn get(&self, row: isize, col: isize) -> Option<T> {
        let row = row + self.radius[0] as isize;
        let col = col + self.radius[1] as isize;
        let padded_cols = (self.cols + 2 * self.radius[1]) as isize;
        if row < 0 || col < 0 || col >= padded_cols {
            return None;
        }
        self.cells
            .get((row * padded_cols + col) as usize)
            .copied()
            .flatten()
    }

    /// Whether the cell at `(row, col)`, relative to the partition
    /// origin, lies within the array.
    pub(crate) fn within_array(&self, row: isize, col: isize, shape: &gridslice::Shape) -> bool {
        let row = self.origin[0] as isize + row;
        let col = self.origin[1] as isize + col;
        shape.contains_signed(&[row, col])
    }
}

/// A future of the cells of partition `source` within `region`. The
/// copy is made on the locality owning the partition.
fn fetch<T: Element>(
    array: &PartitionedArray<T>,
    source: usize,
    destination_locality: usize,
    region: &Hyperslab,
) -> Result<BoxFuture<'static, Result<HaloFragment<T>>>> {
    let tiling = array.tiling();
    let Some(slab) = region.intersection(&tiling.partition_slab(source))? else {
        return Ok(futures::future::ready(Ok(HaloFragment {
            slab: Hyperslab::contiguous(vec![0, 0], vec![0, 0]),
            values: Vec::new(),
        }))
        .boxed());
    };
    let partition = array.partition(source);
    let owner = tiling.locality(source);
    if owner == destination_locality {
        return Ok(async move {
            let values = partition.await?.gather(&slab)?;
            Ok(HaloFragment { slab, values })
        }
        .boxed());
    }
    let bytes = array.runtime().spawn_at(owner, async move {
        let values = partition.await?.gather(&slab)?;
        HaloFragment { slab, values }.to_bytes()
    });
    Ok(async move { HaloFragment::from_bytes(&bytes.await?) }.boxed())
}
