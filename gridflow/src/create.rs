/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Creating arrays.

use std::sync::Arc;

use gridslice::Shape;
use rand::Rng;
use rand::SeedableRng;
use rand::distributions::uniform::SampleUniform;
use rand::rngs::StdRng;

use crate::array::PartitionedArray;
use crate::array::regular_tiling;
use crate::array::spawn_partitions;
use crate::element::Element;
use crate::error::Error;
use crate::error::Result;
use crate::partition::Partition;
use crate::runtime::Runtime;

/// An array of `shape`, partitioned by `partition_shape`, with every
/// element set to `fill`.
pub fn create_partitioned_array<T: Element>(
    runtime: &Runtime,
    shape: impl Into<Shape>,
    partition_shape: impl Into<Shape>,
    fill: T,
) -> Result<PartitionedArray<T>> {
    let tiling = Arc::new(regular_tiling(
        runtime,
        &shape.into(),
        &partition_shape.into(),
    )?);
    Ok(spawn_partitions(runtime, &tiling, "create", |i| {
        let partition = Partition::filled(
            tiling.partition_origin(i),
            tiling.partition_shape(i),
            tiling.locality(i),
            fill,
        );
        async move { Ok(partition) }
    }))
}

/// An array of values drawn uniformly from `[min, max]`.
///
/// Every partition draws from its own generator, seeded from `seed`
/// and the partition's position, so the result depends on the
/// partitioning but not on scheduling.
pub fn uniform<T>(
    runtime: &Runtime,
    shape: impl Into<Shape>,
    partition_shape: impl Into<Shape>,
    min: T,
    max: T,
    seed: u64,
) -> Result<PartitionedArray<T>>
where
    T: Element + SampleUniform,
{
    if !(min <= max) {
        return Err(Error::invalid_argument(format!(
            "uniform: empty range [{}, {}]",
            min, max
        )));
    }
    let tiling = Arc::new(regular_tiling(
        runtime,
        &shape.into(),
        &partition_shape.into(),
    )?);
    Ok(spawn_partitions(runtime, &tiling, "uniform", |i| {
        let (origin, shape, locality) = (
            tiling.partition_origin(i),
            tiling.partition_shape(i),
            tiling.locality(i),
        );
        let partition_seed = seed ^ (i as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        async move {
            let mut rng = StdRng::seed_from_u64(partition_seed);
            let data = (0..shape.volume())
                .map(|_| rng.gen_range(min..=max))
                .collect();
            Partition::new(origin, shape, locality, data)
        }
    }))
}

/// An array, partitioned like `array`, holding at every cell the
/// cell's index along `dimension`.
pub fn cell_index<T>(array: &PartitionedArray<T>, dimension: usize) -> Result<PartitionedArray<u64>> {
    if dimension >= array.rank() {
        return Err(Error::invalid_argument(format!(
            "cell_index: dimension {} of a rank {} array",
            dimension,
            array.rank()
        )));
    }
    let tiling = Arc::clone(array.tiling());
    Ok(array.spawn_partitions("cell_index", |i| {
        let slab = tiling.partition_slab(i);
        let locality = tiling.locality(i);
        async move {
            let data = slab.points().map(|index| index[dimension] as u64).collect();
            Partition::new(slab.start().to_vec(), slab.shape(), locality, data)
        }
    }))
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::test_utils;

    #[tokio::test]
    async fn test_create() {
        let runtime = test_utils::runtime(2);
        let array = create_partitioned_array(&runtime, shape![5, 5], shape![2, 2], 3i32).unwrap();
        assert_eq!(array.nr_partitions(), 4);
        assert_eq!(array.to_buffer().await.unwrap(), vec![3; 25]);
    }

    #[tokio::test]
    async fn test_uniform() {
        let runtime = test_utils::runtime(2);
        let a = uniform(&runtime, shape![20, 20], shape![10, 10], -1.0f64, 1.0, 42).unwrap();
        let b = uniform(&runtime, shape![20, 20], shape![10, 10], -1.0f64, 1.0, 42).unwrap();
        let values = a.to_buffer().await.unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(values, b.to_buffer().await.unwrap());

        let ints = uniform(&runtime, shape![50], shape![10], 3u8, 3, 0).unwrap();
        assert_eq!(ints.to_buffer().await.unwrap(), vec![3; 50]);

        assert!(matches!(
            uniform(&runtime, shape![5], shape![5], 2i32, 1, 0),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_cell_index() {
        let runtime = test_utils::runtime(1);
        let array = create_partitioned_array(&runtime, shape![3, 4], shape![2, 2], 0u8).unwrap();
        let rows = cell_index(&array, 0).unwrap();
        let cols = cell_index(&array, 1).unwrap();
        assert_eq!(
            rows.to_buffer().await.unwrap(),
            vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]
        );
        assert_eq!(
            cols.to_buffer().await.unwrap(),
            vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]
        );
        assert!(cell_index(&array, 2).is_err());
    }
}
