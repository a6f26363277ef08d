/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Global reductions of an array to a [`Scalar`].
//!
//! Every partition is reduced on the locality owning it; the partial
//! results are combined as they arrive. No-data elements do not take
//! part. Reducing an array without valid elements yields no-data.

use std::sync::Arc;

use algebra::Count;
use algebra::Max;
use algebra::Min;
use algebra::Monoid;
use algebra::Semigroup;
use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::partition::Partition;
use crate::policy::InputPolicy;
use crate::policy::OutputPolicy;
use crate::runtime::AbortOnDrop;
use crate::scalar::Scalar;

/// Reduce `array`: every partition folds its valid elements into a
/// partial aggregate with `observe`, the partials are combined, and
/// `finish` maps the result to the output value.
fn reduce<T, A, R, O, F>(
    op: &'static str,
    input: InputPolicy<T>,
    array: &PartitionedArray<T>,
    observe: O,
    finish: F,
) -> Scalar<R>
where
    T: Element,
    A: Monoid + Send + 'static,
    R: Clone + Send + Sync + 'static,
    O: Fn(&mut A, T) + Send + Sync + 'static,
    F: FnOnce(A) -> R + Send + 'static,
{
    let array = array.clone();
    let observe = Arc::new(observe);
    Scalar::from_future(async move {
        let mut running = AbortOnDrop::default();
        let mut partials: FuturesUnordered<_> = (0..array.nr_partitions())
            .map(|i| {
                let partition = array.partition(i);
                let observe = Arc::clone(&observe);
                let task = array.runtime().spawn_at(array.tiling().locality(i), async move {
                    let partition: Arc<Partition<T>> = partition.await?;
                    let mut partial = A::empty();
                    for &value in partition.data() {
                        if !input.is_no_data(value) {
                            observe(&mut partial, value);
                        }
                    }
                    Ok(partial)
                });
                running.track(&task);
                task
            })
            .collect();
        let mut total = A::empty();
        let mut cancelled = None;
        while let Some(partial) = partials.next().await {
            match partial {
                Ok(partial) => total.combine_assign(&partial),
                Err(err) if err.is_cancelled() => cancelled = Some(err),
                Err(err) => return Err(err),
            }
        }
        if let Some(err) = cancelled {
            return Err(err);
        }
        tracing::debug!(op, nr_partitions = array.nr_partitions(), "reduced array");
        Ok(finish(total))
    })
}

/// A sum that records overflow and whether anything was added.
struct Total<T> {
    sum: Option<T>,
    count: u64,
}

impl<T: Element> Total<T> {
    fn observe(&mut self, value: T) {
        self.sum = self.sum.and_then(|sum| sum.add_checked(value));
        self.count += 1;
    }
}

impl<T: Element> Semigroup for Total<T> {
    fn combine(&self, other: &Self) -> Self {
        Total {
            sum: self.sum.zip(other.sum).and_then(|(a, b)| a.add_checked(b)),
            count: self.count + other.count,
        }
    }
}

impl<T: Element> Monoid for Total<T> {
    fn empty() -> Self {
        Total {
            sum: Some(T::zero()),
            count: 0,
        }
    }
}

/// The sum of the valid elements. Integer overflow, or a non-finite
/// float sum, yields no-data.
pub fn sum<T: Element>(array: &PartitionedArray<T>) -> Scalar<T> {
    sum_with(InputPolicy::defensive(), OutputPolicy::defensive(), array)
}

pub fn sum_with<T: Element>(
    input: InputPolicy<T>,
    output: OutputPolicy<T>,
    array: &PartitionedArray<T>,
) -> Scalar<T> {
    reduce(
        "sum",
        input,
        array,
        |total: &mut Total<T>, value| total.observe(value),
        move |total| output.output(total.sum.filter(|_| total.count > 0)),
    )
}

/// The smallest valid element.
pub fn minimum<T: Element>(array: &PartitionedArray<T>) -> Scalar<T> {
    minimum_with(InputPolicy::defensive(), OutputPolicy::defensive(), array)
}

pub fn minimum_with<T: Element>(
    input: InputPolicy<T>,
    output: OutputPolicy<T>,
    array: &PartitionedArray<T>,
) -> Scalar<T> {
    reduce(
        "minimum",
        input,
        array,
        |min: &mut Min<T>, value| min.observe(value),
        move |min| output.output(min.0),
    )
}

/// The largest valid element.
pub fn maximum<T: Element>(array: &PartitionedArray<T>) -> Scalar<T> {
    maximum_with(InputPolicy::defensive(), OutputPolicy::defensive(), array)
}

pub fn maximum_with<T: Element>(
    input: InputPolicy<T>,
    output: OutputPolicy<T>,
    array: &PartitionedArray<T>,
) -> Scalar<T> {
    reduce(
        "maximum",
        input,
        array,
        |max: &mut Max<T>, value| max.observe(value),
        move |max| output.output(max.0),
    )
}

/// The number of valid elements.
pub fn count_valid<T: Element>(array: &PartitionedArray<T>) -> Scalar<u64> {
    count_valid_with(InputPolicy::defensive(), array)
}

pub fn count_valid_with<T: Element>(input: InputPolicy<T>, array: &PartitionedArray<T>) -> Scalar<u64> {
    reduce(
        "count_valid",
        input,
        array,
        |count: &mut Count, _| count.observe(),
        |count| count.0,
    )
}
