/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Partitioned arrays.
//!
//! A [`PartitionedArray`] is a logical array split into partitions
//! according to a [`Tiling`]. Each partition is a shared future: an
//! operation returns its output array immediately, and a task of a
//! later operation waits only for the partitions it reads.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::TryFutureExt;
use gridslice::Index;
use gridslice::Shape;
use gridslice::Slice;
use tracing::Instrument;

use crate::element::Element;
use crate::error::Error;
use crate::error::Result;
use crate::partition::Partition;
use crate::partition::PartitionFuture;
use crate::runtime::Runtime;
use crate::sync::group::Status;
use crate::sync::group::TaskGroup;
use crate::tiling::Tiling;

/// A logical array whose partitions are computed concurrently.
pub struct PartitionedArray<T> {
    runtime: Runtime,
    tiling: Arc<Tiling>,
    partitions: Arc<Vec<PartitionFuture<T>>>,
    group: TaskGroup,
}

// Cloning shares the partition futures, so no `T: Clone` bound.
impl<T> Clone for PartitionedArray<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            tiling: Arc::clone(&self.tiling),
            partitions: Arc::clone(&self.partitions),
            group: self.group.clone(),
        }
    }
}

fn ready<T: Send + Sync + 'static>(partition: Partition<T>) -> PartitionFuture<T> {
    futures::future::ready(Ok(Arc::new(partition)))
        .boxed()
        .shared()
}

impl<T: Element> PartitionedArray<T> {
    /// An array over `buffer`, a row-major buffer of `shape`, split into
    /// partitions of `partition_shape`.
    pub fn from_buffer(
        runtime: &Runtime,
        shape: impl Into<Shape>,
        partition_shape: impl Into<Shape>,
        buffer: Vec<T>,
    ) -> Result<Self> {
        let shape = shape.into();
        if buffer.len() != shape.volume() {
            return Err(gridslice::SliceError::LengthMismatch {
                expected: shape.volume(),
                got: buffer.len(),
            }
            .into());
        }
        let tiling = regular_tiling(runtime, &shape, &partition_shape.into())?;
        let dense = Slice::new_row_major(shape.extents().to_vec());
        let partitions = (0..tiling.nr_partitions())
            .map(|i| {
                let values = dense
                    .hyperslab(&tiling.partition_slab(i))?
                    .gather(&buffer)?;
                let partition = Partition::new(
                    tiling.partition_origin(i),
                    tiling.partition_shape(i),
                    tiling.locality(i),
                    values,
                )?;
                Ok(ready(partition))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            runtime: runtime.clone(),
            tiling: Arc::new(tiling),
            partitions: Arc::new(partitions),
            group: TaskGroup::completed("from_buffer"),
        })
    }

    /// An array made of explicitly given partitions. Fails unless the
    /// partitions exactly tile `shape`.
    pub fn from_partitions(
        runtime: &Runtime,
        shape: impl Into<Shape>,
        partitions: Vec<Partition<T>>,
    ) -> Result<Self> {
        let shape = shape.into();
        let layout: Vec<(Index, Shape, usize)> = partitions
            .iter()
            .map(|p| {
                (
                    p.origin().to_vec(),
                    p.shape().clone(),
                    p.locality() % runtime.nr_localities(),
                )
            })
            .collect();
        let (tiling, order) = Tiling::from_partitions(&shape, &layout)?;
        let mut partitions: Vec<Option<Partition<T>>> = partitions.into_iter().map(Some).collect();
        let partitions = order
            .into_iter()
            .enumerate()
            .map(|(linear, position)| {
                let partition = partitions[position].take().ok_or_else(|| Error::Tiling {
                    shape: shape.clone(),
                    reason: "partition used twice".to_string(),
                })?;
                Ok(ready(partition.relocated(tiling.locality(linear))))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            runtime: runtime.clone(),
            tiling: Arc::new(tiling),
            partitions: Arc::new(partitions),
            group: TaskGroup::completed("from_partitions"),
        })
    }

    /// Copy the array into a row-major buffer, waiting for all
    /// partitions.
    pub async fn to_buffer(&self) -> Result<Vec<T>> {
        let partitions = self.partitions().await?;
        let mut buffer = vec![T::default(); self.shape().volume()];
        let dense = Slice::new_row_major(self.shape().extents().to_vec());
        for partition in partitions {
            dense
                .hyperslab(&partition.slab())?
                .scatter(&mut buffer, partition.data())?;
        }
        Ok(buffer)
    }

    /// The element at `index`.
    pub async fn get(&self, index: &[usize]) -> Result<T> {
        let partition = self.partition(self.tiling.partition_at(index)?).await?;
        Ok(*partition.get(index)?)
    }
}

impl<T> PartitionedArray<T> {
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn tiling(&self) -> &Arc<Tiling> {
        &self.tiling
    }

    pub fn shape(&self) -> &Shape {
        self.tiling.shape()
    }

    pub fn rank(&self) -> usize {
        self.tiling.rank()
    }

    pub fn nr_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// The future of partition `partition`, in linear partition order.
    pub fn partition(&self, partition: usize) -> PartitionFuture<T> {
        self.partitions[partition].clone()
    }

    /// The partition owning the cell at `index`.
    pub fn partition_at(&self, index: &[usize]) -> Result<PartitionFuture<T>> {
        Ok(self.partition(self.tiling.partition_at(index)?))
    }

    /// The task group of the operation that produced this array.
    pub fn group(&self) -> &TaskGroup {
        &self.group
    }

    pub fn status(&self) -> Status {
        self.group.status()
    }

    /// Cancel the tasks still computing partitions of this array.
    pub fn cancel(&self) {
        self.group.cancel()
    }

    /// Whether every partition is available.
    pub fn ready(&self) -> bool {
        self.partitions
            .iter()
            .all(|p| p.peek().is_some() || p.clone().now_or_never().is_some())
    }

    /// Wait for all partitions. If some partitions failed, the error of
    /// a failing partition is preferred over a cancellation.
    pub async fn wait(&self) -> Result<()> {
        self.partitions().await.map(|_| ())
    }

    /// All partitions, in linear partition order.
    pub async fn partitions(&self) -> Result<Vec<Arc<Partition<T>>>> {
        let results = futures::future::join_all(self.partitions.iter().cloned()).await;
        let mut cancelled = None;
        let mut partitions = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(partition) => partitions.push(partition),
                Err(err) if err.is_cancelled() => cancelled = Some(err),
                Err(err) => return Err(err),
            }
        }
        match cancelled {
            Some(err) => Err(err),
            None => Ok(partitions),
        }
    }

    /// Fail unless `other` has the same shape and partitioning.
    pub fn check_partitioning<U>(&self, other: &PartitionedArray<U>) -> Result<()> {
        self.tiling.check_same_partitioning(&other.tiling)
    }

    /// Create the output of an operation: for every partition of this
    /// array's tiling, spawn `task(partition)` on the locality owning
    /// it. Returns immediately.
    pub(crate) fn spawn_partitions<U, F, Fut>(&self, op: &'static str, task: F) -> PartitionedArray<U>
    where
        U: Send + Sync + 'static,
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<Partition<U>>> + Send + 'static,
    {
        spawn_partitions(&self.runtime, &self.tiling, op, task)
    }
}

impl<T> std::fmt::Debug for PartitionedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedArray")
            .field("shape", self.shape())
            .field("grid", self.tiling.grid())
            .field("status", &self.status())
            .finish()
    }
}

pub(crate) fn regular_tiling(
    runtime: &Runtime,
    shape: &Shape,
    partition_shape: &Shape,
) -> Result<Tiling> {
    Tiling::regular(
        shape,
        partition_shape,
        runtime.nr_localities(),
        runtime.config().placement(),
    )
}

/// Spawn one task per partition of `tiling`, producing a new array.
pub(crate) fn spawn_partitions<U, F, Fut>(
    runtime: &Runtime,
    tiling: &Arc<Tiling>,
    op: &'static str,
    mut task: F,
) -> PartitionedArray<U>
where
    U: Send + Sync + 'static,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Partition<U>>> + Send + 'static,
{
    let group = TaskGroup::new(op);
    let span = tracing::debug_span!("operation", op, nr_partitions = tiling.nr_partitions());
    let partitions = (0..tiling.nr_partitions())
        .map(|i| {
            let origin = tiling.partition_origin(i);
            let locality = tiling.locality(i);
            let task = task(i).instrument(tracing::debug_span!(
                parent: &span,
                "partition",
                partition = ?origin,
                locality
            ));
            group
                .spawn(runtime, locality, origin, task)
                .map_ok(Arc::new)
                .boxed()
                .shared()
        })
        .collect();
    group.close();
    PartitionedArray {
        runtime: runtime.clone(),
        tiling: Arc::clone(tiling),
        partitions: Arc::new(partitions),
        group,
    }
}

/// Spawn one task per partition of `tiling`, each producing a pair of
/// partitions. The two output arrays share one task group.
pub(crate) fn spawn_partition_pairs<A, B, F, Fut>(
    runtime: &Runtime,
    tiling: &Arc<Tiling>,
    op: &'static str,
    mut task: F,
) -> (PartitionedArray<A>, PartitionedArray<B>)
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<(Partition<A>, Partition<B>)>> + Send + 'static,
{
    let group = TaskGroup::new(op);
    let span = tracing::debug_span!("operation", op, nr_partitions = tiling.nr_partitions());
    let (first, second): (Vec<_>, Vec<_>) = (0..tiling.nr_partitions())
        .map(|i| {
            let origin = tiling.partition_origin(i);
            let locality = tiling.locality(i);
            let task = task(i).instrument(tracing::debug_span!(
                parent: &span,
                "partition",
                partition = ?origin,
                locality
            ));
            let pair = group
                .spawn(runtime, locality, origin, task)
                .map_ok(|(a, b)| (Arc::new(a), Arc::new(b)))
                .boxed()
                .shared();
            let first: PartitionFuture<A> = pair.clone().map_ok(|(a, _)| a).boxed().shared();
            let second: PartitionFuture<B> = pair.map_ok(|(_, b)| b).boxed().shared();
            (first, second)
        })
        .unzip();
    group.close();
    let first = PartitionedArray {
        runtime: runtime.clone(),
        tiling: Arc::clone(tiling),
        partitions: Arc::new(first),
        group: group.clone(),
    };
    let second = PartitionedArray {
        runtime: runtime.clone(),
        tiling: Arc::clone(tiling),
        partitions: Arc::new(second),
        group,
    };
    (first, second)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gridslice::shape;

    use super::*;
    use crate::test_utils;

    #[tokio::test]
    async fn test_buffer_round_trip() {
        let runtime = test_utils::runtime(2);
        let buffer: Vec<i32> = (0..35).collect();
        let array = PartitionedArray::from_buffer(&runtime, shape![5, 7], shape![2, 3], buffer.clone())
            .unwrap();
        assert_eq!(array.nr_partitions(), 4);
        assert!(array.ready());
        assert_eq!(array.to_buffer().await.unwrap(), buffer);
        assert_eq!(array.get(&[4, 6]).await.unwrap(), 34);
        assert_eq!(array.get(&[2, 3]).await.unwrap(), 17);
        assert!(array.get(&[5, 0]).await.is_err());
    }

    #[tokio::test]
    async fn test_from_buffer_length() {
        let runtime = test_utils::runtime(1);
        assert!(PartitionedArray::from_buffer(&runtime, shape![2, 2], shape![1, 1], vec![0u8; 3]).is_err());
    }

    #[tokio::test]
    async fn test_from_partitions() {
        let runtime = test_utils::runtime(2);
        let right = Partition::new(vec![0, 1], shape![2, 1], 1, vec![2.0, 4.0]).unwrap();
        let left = Partition::new(vec![0, 0], shape![2, 1], 0, vec![1.0, 3.0]).unwrap();
        let array = PartitionedArray::from_partitions(&runtime, shape![2, 2], vec![right, left]).unwrap();
        assert_eq!(array.to_buffer().await.unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

        let a = Partition::new(vec![0, 0], shape![2, 1], 0, vec![1.0, 3.0]).unwrap();
        assert!(matches!(
            PartitionedArray::from_partitions(&runtime, shape![2, 2], vec![a]),
            Err(Error::Tiling { .. })
        ));
    }

    #[tokio::test]
    async fn test_spawn_and_cancel() {
        let runtime = test_utils::runtime(2);
        let input = PartitionedArray::from_buffer(&runtime, shape![4], shape![1], vec![1u32; 4]).unwrap();

        let doubled = input.spawn_partitions("double", |i| {
            let partition = input.partition(i);
            async move {
                let partition = partition.await?;
                let data = partition.data().iter().map(|v| v * 2).collect();
                Partition::new(
                    partition.origin().to_vec(),
                    partition.shape().clone(),
                    partition.locality(),
                    data,
                )
            }
        });
        assert_eq!(doubled.to_buffer().await.unwrap(), vec![2; 4]);
        doubled.group().wait().await.unwrap();
        assert_eq!(doubled.status(), Status::Completed);

        let stuck: PartitionedArray<u32> = input.spawn_partitions("stuck", |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(Error::Cancelled)
        });
        assert!(!stuck.ready());
        stuck.cancel();
        assert_eq!(stuck.wait().await, Err(Error::Cancelled));
        assert_eq!(stuck.status(), Status::Cancelled);
    }

    #[tokio::test]
    async fn test_failure_preferred_over_cancellation() {
        let runtime = test_utils::runtime(1);
        let input = PartitionedArray::from_buffer(&runtime, shape![3], shape![1], vec![0u8; 3]).unwrap();
        let failing: PartitionedArray<u8> = input.spawn_partitions("failing", |i| async move {
            if i == 2 {
                Err(Error::invalid_argument("partition 2"))
            } else {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(Error::Cancelled)
            }
        });
        assert!(matches!(
            failing.wait().await,
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(failing.status(), Status::Failed);
    }
}
