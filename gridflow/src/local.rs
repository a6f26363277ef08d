/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Local (elementwise) operations.
//!
//! A local operation spawns one task per output partition. The task
//! waits for the corresponding partition of each array argument, or for
//! the value of each scalar argument, and applies the element function.
//! Partition tasks do not depend on each other.

use std::sync::Arc;

use futures::try_join;

use crate::array::PartitionedArray;
use crate::array::spawn_partitions;
use crate::error::Result;
use crate::partition::Partition;
use crate::scalar::Operand;
use crate::scalar::template;

pub mod arithmetic;
pub mod compare;
pub mod math;
pub mod misc;

pub use arithmetic::*;
pub use compare::*;
pub use math::*;
pub use misc::*;

/// Apply `f` to every element of `input`.
pub(crate) fn unary<T, R, F>(op: &'static str, input: &PartitionedArray<T>, f: F) -> PartitionedArray<R>
where
    T: Copy + Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let f = Arc::new(f);
    input.spawn_partitions(op, |i| {
        let partition = input.partition(i);
        let f = Arc::clone(&f);
        async move {
            let partition = partition.await?;
            let data = partition.data().iter().map(|&value| f(value)).collect();
            Partition::new(
                partition.origin().to_vec(),
                partition.shape().clone(),
                partition.locality(),
                data,
            )
        }
    })
}

/// Apply `f` to every pair of elements of `a` and `b`. At least one
/// argument must be an array; scalars are broadcast.
pub(crate) fn binary<T, U, R, F>(
    op: &'static str,
    a: &Operand<T>,
    b: &Operand<U>,
    f: F,
) -> Result<PartitionedArray<R>>
where
    T: Copy + Send + Sync + 'static,
    U: Copy + Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: Fn(T, U) -> R + Send + Sync + 'static,
{
    let (runtime, tiling) = template(op, [a.layout(), b.layout()])?;
    let f = Arc::new(f);
    Ok(spawn_partitions(&runtime, &tiling, op, |i| {
        let (a, b) = (a.values(i), b.values(i));
        let slab = tiling.partition_slab(i);
        let locality = tiling.locality(i);
        let f = Arc::clone(&f);
        async move {
            let (a, b) = try_join!(a, b)?;
            let data = (0..slab.volume()).map(|j| f(a.get(j), b.get(j))).collect();
            Partition::new(slab.start().to_vec(), slab.shape(), locality, data)
        }
    }))
}

/// Apply `f` to every triple of elements of `a`, `b` and `c`.
pub(crate) fn ternary<A, B, C, R, F>(
    op: &'static str,
    a: &Operand<A>,
    b: &Operand<B>,
    c: &Operand<C>,
    f: F,
) -> Result<PartitionedArray<R>>
where
    A: Copy + Send + Sync + 'static,
    B: Copy + Send + Sync + 'static,
    C: Copy + Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: Fn(A, B, C) -> R + Send + Sync + 'static,
{
    let (runtime, tiling) = template(op, [a.layout(), b.layout(), c.layout()])?;
    let f = Arc::new(f);
    Ok(spawn_partitions(&runtime, &tiling, op, |i| {
        let (a, b, c) = (a.values(i), b.values(i), c.values(i));
        let slab = tiling.partition_slab(i);
        let locality = tiling.locality(i);
        let f = Arc::clone(&f);
        async move {
            let (a, b, c) = try_join!(a, b, c)?;
            let data = (0..slab.volume())
                .map(|j| f(a.get(j), b.get(j), c.get(j)))
                .collect();
            Partition::new(slab.start().to_vec(), slab.shape(), locality, data)
        }
    }))
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::error::Error;
    use crate::scalar::Scalar;
    use crate::test_utils;

    #[tokio::test]
    async fn test_binary_broadcast() {
        let runtime = test_utils::runtime(2);
        let array =
            PartitionedArray::from_buffer(&runtime, shape![2, 3], shape![1, 3], vec![1, 2, 3, 4, 5, 6])
                .unwrap();
        let result = binary("test", &Operand::from(&array), &Operand::from(10i32), |a, b| a * b).unwrap();
        assert_eq!(result.to_buffer().await.unwrap(), vec![10, 20, 30, 40, 50, 60]);
        assert!(result.tiling().same_partitioning(array.tiling()));

        let pending = Scalar::from_future(async { Ok(1i32) });
        let result = binary("test", &Operand::from(pending), &Operand::from(&array), |a, b| b - a).unwrap();
        assert_eq!(result.to_buffer().await.unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_scalars_only() {
        assert!(matches!(
            binary("test", &Operand::from(1u8), &Operand::from(2u8), |a, b| a + b),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_mismatched_partitioning() {
        let runtime = test_utils::runtime(1);
        let a = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![0u8; 4]).unwrap();
        let b = PartitionedArray::from_buffer(&runtime, shape![4], shape![4], vec![0u8; 4]).unwrap();
        let c = PartitionedArray::from_buffer(&runtime, shape![5], shape![2], vec![0u8; 5]).unwrap();
        assert!(matches!(
            binary("test", &Operand::from(&a), &Operand::from(&b), |x, y| x + y),
            Err(Error::PartitioningMismatch { .. })
        ));
        assert!(matches!(
            binary("test", &Operand::from(&a), &Operand::from(&c), |x, y| x + y),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_input_propagates() {
        let runtime = test_utils::runtime(1);
        let input = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![1u8; 4]).unwrap();
        let failing: PartitionedArray<u8> = input.spawn_partitions("failing", |i| {
            let partition = input.partition(i);
            async move {
                if i == 1 {
                    return Err(Error::invalid_argument("bad partition"));
                }
                Ok(Arc::unwrap_or_clone(partition.await?))
            }
        });
        let result = unary("negate", &failing, |v: u8| v.wrapping_neg());
        assert!(matches!(
            result.wait().await,
            Err(Error::InvalidArgument { .. })
        ));
    }
}
