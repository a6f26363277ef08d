/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The tiling of an array into partitions.
//!
//! A tiling is a grid: along every dimension the array is cut at a
//! sorted list of boundaries, and every grid cell is one partition.
//! Partitions are numbered in row-major order over the grid. The
//! boundaries are complemented by per-dimension lookup tables from
//! coordinate to grid position, so that resolving the partition owning
//! an index takes constant time.

use gridslice::Hyperslab;
use gridslice::Index;
use gridslice::Shape;
use gridslice::ShapeError;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::runtime::Placement;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tiling {
    shape: Shape,
    grid: Shape,
    /// Per dimension, the `grid[d] + 1` cut positions, from 0 to the extent.
    boundaries: Vec<Vec<usize>>,
    /// Per dimension, the grid position of every coordinate.
    lookup: Vec<Vec<usize>>,
    localities: Vec<usize>,
}

impl Tiling {
    /// Tile `shape` with partitions of `partition_shape`. Along each
    /// dimension there are `max(1, extent / partition_extent)`
    /// partitions; the last one absorbs the remainder.
    pub fn regular(
        shape: &Shape,
        partition_shape: &Shape,
        nr_localities: usize,
        placement: Placement,
    ) -> Result<Self> {
        if partition_shape.rank() != shape.rank() {
            return Err(Error::Tiling {
                shape: shape.clone(),
                reason: format!("partition shape {} has a different rank", partition_shape),
            });
        }
        if partition_shape.extents().contains(&0) {
            return Err(Error::Tiling {
                shape: shape.clone(),
                reason: format!("partition shape {} has a zero extent", partition_shape),
            });
        }
        if shape.is_empty() {
            return Ok(Self::single(shape, 0));
        }
        let boundaries = shape
            .extents()
            .iter()
            .zip(partition_shape.extents())
            .map(|(&extent, &partition_extent)| {
                let count = (extent / partition_extent).max(1);
                let mut cuts: Vec<usize> = (0..count).map(|i| i * partition_extent).collect();
                cuts.push(extent);
                cuts
            })
            .collect();
        Ok(Self::from_boundaries(shape, boundaries, |grid| {
            placement.assign(grid, nr_localities)
        }))
    }

    /// The tiling formed by explicitly given partitions, each an
    /// `(origin, shape)` pair. Also returns, for each partition of the
    /// tiling in linear order, the position of the corresponding input.
    pub fn from_partitions(
        shape: &Shape,
        partitions: &[(Index, Shape, usize)],
    ) -> Result<(Self, Vec<usize>)> {
        let fail = |reason: String| Error::Tiling {
            shape: shape.clone(),
            reason,
        };
        for (origin, partition_shape, _) in partitions {
            if origin.len() != shape.rank() || partition_shape.rank() != shape.rank() {
                return Err(fail(format!(
                    "partition at {:?} of shape {} has the wrong rank",
                    origin, partition_shape
                )));
            }
        }
        if shape.is_empty() {
            return match partitions {
                [(origin, partition_shape, locality)]
                    if origin.iter().all(|&o| o == 0) && partition_shape == shape =>
                {
                    Ok((Self::single(shape, *locality), vec![0]))
                }
                _ => Err(fail("an empty array has exactly one partition".to_string())),
            };
        }
        if let Some((origin, partition_shape, _)) = partitions.iter().find(|(_, s, _)| s.is_empty())
        {
            return Err(fail(format!(
                "partition at {:?} of shape {} is empty",
                origin, partition_shape
            )));
        }

        let boundaries: Vec<Vec<usize>> = (0..shape.rank())
            .map(|d| {
                partitions
                    .iter()
                    .map(|(origin, _, _)| origin[d])
                    .chain(std::iter::once(shape.extent(d)))
                    .sorted()
                    .dedup()
                    .collect()
            })
            .collect();
        if boundaries.iter().any(|cuts| cuts[0] != 0) {
            return Err(fail("no partition starts at the array origin".to_string()));
        }
        let grid = Shape::from(boundaries.iter().map(|b| b.len() - 1).collect::<Vec<_>>());
        if partitions.len() != grid.volume() {
            return Err(fail(format!(
                "{} partitions do not form a {} grid",
                partitions.len(),
                grid
            )));
        }

        let mut order = vec![None; grid.volume()];
        let mut localities = vec![0; grid.volume()];
        for (position, (origin, partition_shape, locality)) in partitions.iter().enumerate() {
            let cell: Vec<usize> = (0..shape.rank())
                .map(|d| boundaries[d].binary_search(&origin[d]).unwrap_or(0))
                .collect();
            let fits = (0..shape.rank()).all(|d| {
                boundaries[d].get(cell[d] + 1)
                    == Some(&(origin[d] + partition_shape.extent(d)))
            });
            if !fits {
                return Err(fail(format!(
                    "partition at {:?} of shape {} does not align with its neighbours",
                    origin, partition_shape
                )));
            }
            let linear = grid.linear_index(&cell)?;
            if order[linear].replace(position).is_some() {
                return Err(fail(format!("partitions overlap at {:?}", origin)));
            }
            localities[linear] = *locality;
        }
        let order = order
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| fail("partitions leave a gap".to_string()))?;
        let tiling = Self::from_boundaries(shape, boundaries, |_| localities);
        Ok((tiling, order))
    }

    fn single(shape: &Shape, locality: usize) -> Self {
        Self {
            shape: shape.clone(),
            grid: Shape::from(vec![1; shape.rank()]),
            boundaries: shape.extents().iter().map(|&e| vec![0, e]).collect(),
            lookup: shape.extents().iter().map(|&e| vec![0; e]).collect(),
            localities: vec![locality],
        }
    }

    fn from_boundaries(
        shape: &Shape,
        boundaries: Vec<Vec<usize>>,
        localities: impl FnOnce(&Shape) -> Vec<usize>,
    ) -> Self {
        let grid = Shape::from(boundaries.iter().map(|b| b.len() - 1).collect::<Vec<_>>());
        let lookup = boundaries
            .iter()
            .map(|cuts| {
                cuts.iter()
                    .tuple_windows()
                    .enumerate()
                    .flat_map(|(position, (lo, hi))| std::iter::repeat_n(position, hi - lo))
                    .collect()
            })
            .collect();
        let localities = localities(&grid);
        Self {
            shape: shape.clone(),
            grid,
            boundaries,
            lookup,
            localities,
        }
    }

    /// The shape of the tiled array.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The number of partitions along each dimension.
    pub fn grid(&self) -> &Shape {
        &self.grid
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn nr_partitions(&self) -> usize {
        self.localities.len()
    }

    /// The position of partition `partition` in the partition grid.
    pub fn grid_position(&self, partition: usize) -> Index {
        self.grid.coordinates(partition).unwrap_or_default()
    }

    pub fn partition_origin(&self, partition: usize) -> Index {
        self.grid_position(partition)
            .iter()
            .zip(&self.boundaries)
            .map(|(&p, cuts)| cuts[p])
            .collect()
    }

    pub fn partition_shape(&self, partition: usize) -> Shape {
        Shape::from(
            self.grid_position(partition)
                .iter()
                .zip(&self.boundaries)
                .map(|(&p, cuts)| cuts[p + 1] - cuts[p])
                .collect::<Vec<_>>(),
        )
    }

    pub fn partition_slab(&self, partition: usize) -> Hyperslab {
        Hyperslab::contiguous(
            self.partition_origin(partition),
            self.partition_shape(partition).extents().to_vec(),
        )
    }

    /// The locality owning `partition`.
    pub fn locality(&self, partition: usize) -> usize {
        self.localities[partition]
    }

    /// The linear index of the partition starting at `origin`.
    pub fn linear_partition_index(&self, origin: &[usize]) -> Option<usize> {
        if origin.len() != self.rank() {
            return None;
        }
        let position: Vec<usize> = origin
            .iter()
            .zip(&self.boundaries)
            .map(|(o, cuts)| cuts.binary_search(o).ok())
            .collect::<Option<_>>()?;
        self.grid.linear_index(&position).ok()
    }

    /// The partition owning the cell at `index`.
    pub fn partition_at(&self, index: &[usize]) -> Result<usize> {
        if !self.shape.contains(index) {
            return Err(ShapeError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            }
            .into());
        }
        let position: Vec<usize> = index
            .iter()
            .zip(&self.lookup)
            .map(|(&i, table)| table[i])
            .collect();
        Ok(self.grid.linear_index(&position)?)
    }

    /// The partition at grid offset `offset` from `partition`, if any.
    pub fn neighbour(&self, partition: usize, offset: &[isize]) -> Option<usize> {
        let position: Vec<isize> = self
            .grid_position(partition)
            .iter()
            .zip(offset)
            .map(|(&p, &o)| p as isize + o)
            .collect();
        if !self.grid.contains_signed(&position) {
            return None;
        }
        let position: Vec<usize> = position.into_iter().map(|p| p as usize).collect();
        self.grid.linear_index(&position).ok()
    }

    /// The partitions that intersect the contiguous hyperslab `slab`.
    pub fn partitions_intersecting(&self, slab: &Hyperslab) -> Vec<usize> {
        if slab.is_empty() || !slab.is_within(&self.shape) {
            return Vec::new();
        }
        let ranges: Vec<std::ops::RangeInclusive<usize>> = slab
            .start()
            .iter()
            .zip(slab.end())
            .zip(&self.lookup)
            .map(|((&start, end), table)| table[start]..=table[end - 1])
            .collect();
        ranges
            .into_iter()
            .multi_cartesian_product()
            .filter_map(|position| self.grid.linear_index(&position).ok())
            .collect()
    }

    /// Whether `other` cuts the same array along the same boundaries.
    pub fn same_partitioning(&self, other: &Tiling) -> bool {
        self.shape == other.shape && self.boundaries == other.boundaries
    }

    /// Fail unless `other` cuts the same array along the same boundaries.
    pub fn check_same_partitioning(&self, other: &Tiling) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            });
        }
        if self.boundaries != other.boundaries {
            return Err(Error::PartitioningMismatch {
                reason: format!(
                    "partition grids {} and {} differ",
                    self.grid, other.grid
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gridslice::shape;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_regular() {
        let tiling = Tiling::regular(&shape![10, 7], &shape![3, 3], 1, Placement::Blocked).unwrap();
        assert_eq!(tiling.grid(), &shape![3, 2]);
        assert_eq!(tiling.partition_shape(0), shape![3, 3]);
        assert_eq!(tiling.partition_shape(1), shape![3, 4]);
        assert_eq!(tiling.partition_shape(5), shape![4, 4]);
        assert_eq!(tiling.partition_origin(5), vec![6, 3]);
        assert_eq!(tiling.partition_at(&[9, 6]).unwrap(), 5);
        assert_eq!(tiling.partition_at(&[2, 3]).unwrap(), 1);
        assert!(tiling.partition_at(&[10, 0]).is_err());
        assert_eq!(tiling.linear_partition_index(&[6, 3]), Some(5));
        assert_eq!(tiling.linear_partition_index(&[6, 2]), None);
    }

    #[test]
    fn test_last_partition_absorbs_remainder() {
        let tiling = Tiling::regular(&shape![40, 20], &shape![16, 8], 3, Placement::Blocked).unwrap();
        assert_eq!(tiling.grid(), &shape![2, 2]);
        assert_eq!(tiling.nr_partitions(), 4);
        assert_eq!(tiling.partition_shape(0), shape![16, 8]);
        assert_eq!(tiling.partition_shape(1), shape![16, 12]);
        assert_eq!(tiling.partition_shape(2), shape![24, 8]);
        assert_eq!(tiling.partition_shape(3), shape![24, 12]);
        assert_eq!(tiling.partition_origin(3), vec![16, 8]);
    }

    #[test]
    fn test_small_and_empty() {
        let tiling = Tiling::regular(&shape![2, 2], &shape![5, 5], 1, Placement::Blocked).unwrap();
        assert_eq!(tiling.nr_partitions(), 1);
        assert_eq!(tiling.partition_shape(0), shape![2, 2]);

        let tiling = Tiling::regular(&shape![0, 4], &shape![2, 2], 3, Placement::Blocked).unwrap();
        assert_eq!(tiling.nr_partitions(), 1);
        assert_eq!(tiling.partition_shape(0), shape![0, 4]);

        assert!(Tiling::regular(&shape![4, 4], &shape![0, 2], 1, Placement::Blocked).is_err());
        assert!(Tiling::regular(&shape![4, 4], &shape![2], 1, Placement::Blocked).is_err());
    }

    #[test]
    fn test_neighbours() {
        let tiling = Tiling::regular(&shape![6, 6], &shape![2, 2], 1, Placement::Blocked).unwrap();
        assert_eq!(tiling.neighbour(4, &[-1, -1]), Some(0));
        assert_eq!(tiling.neighbour(4, &[1, 1]), Some(8));
        assert_eq!(tiling.neighbour(0, &[-1, 0]), None);
        assert_eq!(tiling.neighbour(2, &[0, 1]), None);

        let slab = Hyperslab::contiguous(vec![1, 1], vec![2, 4]);
        assert_eq!(tiling.partitions_intersecting(&slab), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_from_partitions() {
        let shape = shape![4, 5];
        let parts = vec![
            (vec![0, 2], shape![4, 3], 1),
            (vec![0, 0], shape![4, 2], 0),
        ];
        let (tiling, order) = Tiling::from_partitions(&shape, &parts).unwrap();
        assert_eq!(order, vec![1, 0]);
        assert_eq!(tiling.locality(1), 1);
        assert_eq!(tiling.partition_at(&[3, 4]).unwrap(), 1);

        // Gap.
        let parts = vec![(vec![0, 0], shape![4, 2], 0), (vec![0, 3], shape![4, 2], 0)];
        assert!(Tiling::from_partitions(&shape, &parts).is_err());
        // Overlap.
        let parts = vec![(vec![0, 0], shape![4, 3], 0), (vec![0, 2], shape![4, 3], 0)];
        assert!(Tiling::from_partitions(&shape, &parts).is_err());
        // Duplicate.
        let parts = vec![(vec![0, 0], shape![4, 5], 0), (vec![0, 0], shape![4, 5], 0)];
        assert!(Tiling::from_partitions(&shape, &parts).is_err());
    }

    #[test]
    fn test_same_partitioning() {
        let a = Tiling::regular(&shape![6, 6], &shape![2, 2], 1, Placement::Blocked).unwrap();
        let b = Tiling::regular(&shape![6, 6], &shape![2, 2], 2, Placement::RoundRobin).unwrap();
        let c = Tiling::regular(&shape![6, 6], &shape![3, 3], 1, Placement::Blocked).unwrap();
        let d = Tiling::regular(&shape![6, 5], &shape![2, 2], 1, Placement::Blocked).unwrap();
        assert!(a.same_partitioning(&b));
        assert!(matches!(
            a.check_same_partitioning(&c),
            Err(Error::PartitioningMismatch { .. })
        ));
        assert!(matches!(
            a.check_same_partitioning(&d),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn partitions_exactly_cover_the_array(
            extents in prop::collection::vec(0usize..20, 1..=3),
            partition_extents in prop::collection::vec(1usize..8, 3),
            nr_localities in 1usize..5,
        ) {
            let shape = Shape::from(extents.clone());
            let partition_shape = Shape::from(partition_extents[..extents.len()].to_vec());
            let tiling = Tiling::regular(&shape, &partition_shape, nr_localities, Placement::Hilbert).unwrap();

            let mut owners = vec![0usize; shape.volume()];
            for partition in 0..tiling.nr_partitions() {
                prop_assert!(tiling.locality(partition) < nr_localities);
                let slab = tiling.partition_slab(partition);
                prop_assert!(slab.is_within(&shape));
                for index in slab.points() {
                    owners[shape.linear_index(&index).unwrap()] += 1;
                    prop_assert_eq!(tiling.partition_at(&index).unwrap(), partition);
                }
                for (d, &extent) in slab.count().iter().enumerate() {
                    if !shape.is_empty() {
                        prop_assert!(extent < 2 * partition_shape.extent(d) || tiling.grid().extent(d) == 1);
                    }
                }
            }
            prop_assert!(owners.iter().all(|&n| n == 1));
        }
    }
}
