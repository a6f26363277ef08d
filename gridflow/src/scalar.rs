/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Scalars and operands.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;

use crate::array::PartitionedArray;
use crate::error::Error;
use crate::error::Result;
use crate::partition::Partition;
use crate::runtime::Runtime;
use crate::tiling::Tiling;

/// A single value that may not have been computed yet, such as the
/// result of a global reduction. Scalars are cheap to clone and can be
/// awaited any number of times.
pub struct Scalar<T>(Shared<BoxFuture<'static, Result<T>>>);

impl<T> Clone for Scalar<T> {
    fn clone(&self) -> Self {
        Scalar(self.0.clone())
    }
}

impl<T: Clone + Send + Sync + 'static> Scalar<T> {
    /// A scalar that is ready.
    pub fn new(value: T) -> Self {
        Self::from_future(futures::future::ready(Ok(value)))
    }

    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Scalar(future.boxed().shared())
    }

    /// Wait for the value.
    pub async fn get(&self) -> Result<T> {
        self.0.clone().await
    }

    pub fn ready(&self) -> bool {
        self.0.peek().is_some() || self.0.clone().now_or_never().is_some()
    }
}

impl<T: Clone> Future for Scalar<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Scalar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.peek() {
            Some(value) => f.debug_tuple("Scalar").field(value).finish(),
            None => f.write_str("Scalar(<pending>)"),
        }
    }
}

/// An argument of a local or routing operation: an array, or a scalar
/// broadcast to every cell.
pub enum Operand<T> {
    Array(PartitionedArray<T>),
    Scalar(Scalar<T>),
}

impl<T> Clone for Operand<T> {
    fn clone(&self) -> Self {
        match self {
            Operand::Array(array) => Operand::Array(array.clone()),
            Operand::Scalar(scalar) => Operand::Scalar(scalar.clone()),
        }
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Operand<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Array(array) => array.fmt(f),
            Operand::Scalar(scalar) => scalar.fmt(f),
        }
    }
}

impl<T> From<PartitionedArray<T>> for Operand<T> {
    fn from(array: PartitionedArray<T>) -> Self {
        Operand::Array(array)
    }
}

impl<T> From<&PartitionedArray<T>> for Operand<T> {
    fn from(array: &PartitionedArray<T>) -> Self {
        Operand::Array(array.clone())
    }
}

impl<T> From<Scalar<T>> for Operand<T> {
    fn from(scalar: Scalar<T>) -> Self {
        Operand::Scalar(scalar)
    }
}

impl<T> From<&Scalar<T>> for Operand<T> {
    fn from(scalar: &Scalar<T>) -> Self {
        Operand::Scalar(scalar.clone())
    }
}

macro_rules! operand_from_value {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for Operand<$ty> {
            fn from(value: $ty) -> Self {
                Operand::Scalar(Scalar::new(value))
            }
        }
    )*};
}

operand_from_value!(u8, u32, u64, i32, i64, f32, f64);

/// The values of an operand within one partition.
pub(crate) enum Values<T> {
    Partition(Arc<Partition<T>>),
    Broadcast(T),
}

impl<T: Copy> Values<T> {
    pub(crate) fn get(&self, i: usize) -> T {
        match self {
            Values::Partition(partition) => partition.data()[i],
            Values::Broadcast(value) => *value,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Operand<T> {
    pub fn as_array(&self) -> Option<&PartitionedArray<T>> {
        match self {
            Operand::Array(array) => Some(array),
            Operand::Scalar(_) => None,
        }
    }

    pub(crate) fn layout(&self) -> Option<Layout<'_>> {
        self.as_array().map(|array| (array.runtime(), array.tiling()))
    }

    /// A future of this operand's values within partition `partition`.
    pub(crate) fn values(&self, partition: usize) -> BoxFuture<'static, Result<Values<T>>> {
        match self {
            Operand::Array(array) => array
                .partition(partition)
                .map(|result| result.map(Values::Partition))
                .boxed(),
            Operand::Scalar(scalar) => {
                let scalar = scalar.clone();
                async move { Ok(Values::Broadcast(scalar.get().await?)) }.boxed()
            }
        }
    }
}

/// The runtime and tiling of an array argument.
pub(crate) type Layout<'a> = (&'a Runtime, &'a Arc<Tiling>);

/// The layout of the first array argument, which fixes the runtime and
/// tiling of an operation's output. Fails if every argument is a
/// scalar, or if the array arguments are partitioned differently.
pub(crate) fn template<'a>(
    op: &'static str,
    layouts: impl IntoIterator<Item = Option<Layout<'a>>>,
) -> Result<(Runtime, Arc<Tiling>)> {
    let layouts: Vec<Layout<'a>> = layouts.into_iter().flatten().collect();
    let (runtime, tiling) = layouts
        .first()
        .copied()
        .ok_or_else(|| Error::invalid_argument(format!("{} needs at least one array argument", op)))?;
    for (_, other) in &layouts[1..] {
        tiling.check_same_partitioning(other)?;
    }
    Ok((runtime.clone(), Arc::clone(tiling)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scalar() {
        let scalar = Scalar::new(3.5f64);
        assert!(scalar.ready());
        assert_eq!(scalar.get().await.unwrap(), 3.5);
        assert_eq!(scalar.clone().await.unwrap(), 3.5);
        assert_eq!(format!("{:?}", scalar), "Scalar(Ok(3.5))");

        let (tx, rx) = tokio::sync::oneshot::channel::<i64>();
        let pending = Scalar::from_future(async move { rx.await.map_err(|_| Error::Cancelled) });
        assert!(!pending.ready());
        tx.send(7).unwrap();
        assert_eq!(pending.get().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_broadcast_values() {
        let operand: Operand<u8> = 4u8.into();
        assert!(operand.as_array().is_none());
        let values = operand.values(12).await.unwrap();
        assert_eq!(values.get(0), 4);
        assert_eq!(values.get(99), 4);
    }

    #[tokio::test]
    async fn test_operand_from_references() {
        let runtime = crate::test_utils::runtime(1);
        let array = PartitionedArray::from_buffer(&runtime, [1, 3], [1, 2], vec![1i32, 2, 3]).unwrap();
        let scalar = Scalar::new(5i32);

        let operand = Operand::from(&array);
        assert_eq!(operand.as_array().unwrap().tiling(), array.tiling());
        assert_eq!(operand.clone().values(0).await.unwrap().get(2), 3);

        let operand = Operand::from(&scalar);
        assert!(operand.as_array().is_none());
        assert_eq!(operand.values(0).await.unwrap().get(1), 5);
        // The originals stay usable.
        assert_eq!(array.to_buffer().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(scalar.get().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_template() {
        let runtime = crate::test_utils::runtime(1);
        let a = PartitionedArray::from_buffer(&runtime, [2, 2], [1, 2], vec![0u8; 4]).unwrap();
        let b = PartitionedArray::from_buffer(&runtime, [2, 2], [2, 1], vec![0u8; 4]).unwrap();
        let scalar: Operand<u8> = 1u8.into();
        let (_, tiling) = template("test", [scalar.layout(), Operand::from(&a).layout()]).unwrap();
        assert_eq!(tiling.grid(), a.tiling().grid());
        assert!(matches!(
            template("test", [scalar.layout()]),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            template("test", [Some((a.runtime(), a.tiling())), Some((b.runtime(), b.tiling()))]),
            Err(Error::PartitioningMismatch { .. })
        ));
    }
}
