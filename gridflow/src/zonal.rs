/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Zonal operations: aggregation of values per zone.
//!
//! A zonal operation runs in three steps:
//!
//! 1. every partition aggregates its own cells into a map from zone to
//!    partial aggregate, on the locality owning it;
//! 2. the partial maps are merged into one, in the order they become
//!    available;
//! 3. every output partition writes, at each cell, the final aggregate
//!    of the cell's zone.
//!
//! Aggregates form commutative monoids, so the merge order does not
//! matter for the result, except for floating point rounding: results
//! of floating point aggregations are not guaranteed to be bit-identical
//! between runs or partitionings.
//!
//! Cells with a no-data value, or outside the domain, do not contribute.
//! Cells with a no-data zone, or whose zone has no contributing cell,
//! are no-data in the output.

use std::sync::Arc;

use algebra::Count;
use algebra::Distinct;
use algebra::Histogram;
use algebra::Max;
use algebra::Mean;
use algebra::Min;
use algebra::Monoid;
use algebra::Semigroup;
use algebra::ZoneMap;
use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use futures::stream::FuturesUnordered;
use futures::try_join;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::element::FloatElement;
use crate::element::Ordered;
use crate::error::Result;
use crate::partition::Partition;
use crate::policy::BinaryPolicies;
use crate::policy::UnaryPolicies;
use crate::runtime::AbortOnDrop;

type Zones<Z, A> = Shared<BoxFuture<'static, Result<Arc<ZoneMap<Ordered<Z>, A>>>>>;

/// A sum that records overflow.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CheckedSum<T>(Option<T>);

impl<T: Element> Semigroup for CheckedSum<T> {
    fn combine(&self, other: &Self) -> Self {
        CheckedSum(self.0.zip(other.0).and_then(|(a, b)| a.add_checked(b)))
    }
}

impl<T: Element> Monoid for CheckedSum<T> {
    fn empty() -> Self {
        CheckedSum(Some(T::zero()))
    }
}

/// Aggregate `values` per zone of `zones`, then write the aggregate of
/// each cell's zone.
fn zonal<T, Z, A, R, O, F>(
    op: &'static str,
    policies: &BinaryPolicies<T, Z, R>,
    values: &PartitionedArray<T>,
    zones: &PartitionedArray<Z>,
    observe: O,
    finish: F,
) -> Result<PartitionedArray<R>>
where
    T: Element,
    Z: Element,
    R: Element,
    A: Monoid + Clone + Send + Sync + 'static,
    O: Fn(&mut A, T) + Send + Sync + 'static,
    F: Fn(&A) -> Option<R> + Send + Sync + 'static,
{
    values.check_partitioning(zones)?;
    let observe = Arc::new(observe);

    let merged: Zones<Z, A> = {
        let (values, zones, policies) = (values.clone(), zones.clone(), policies.clone());
        async move {
            let mut running = AbortOnDrop::default();
            let mut partials: FuturesUnordered<_> = (0..values.nr_partitions())
                .map(|i| {
                    let (value_partition, zone_partition) = (values.partition(i), zones.partition(i));
                    let (policies, observe) = (policies.clone(), Arc::clone(&observe));
                    let task = values.runtime().spawn_at(values.tiling().locality(i), async move {
                        let (value_partition, zone_partition) = try_join!(value_partition, zone_partition)?;
                        let mut partial = ZoneMap::<Ordered<Z>, A>::empty();
                        for (&value, &zone) in value_partition.data().iter().zip(zone_partition.data()) {
                            let (value_policy, zone_policy) = &policies.inputs;
                            if value_policy.is_no_data(value)
                                || zone_policy.is_no_data(zone)
                                || !policies.domain.within_domain(&(value, zone))
                            {
                                continue;
                            }
                            partial.update(Ordered(zone), |aggregate| observe(aggregate, value));
                        }
                        Ok(partial)
                    });
                    running.track(&task);
                    task
                })
                .collect();
            let mut merged = ZoneMap::empty();
            let mut cancelled = None;
            while let Some(partial) = partials.next().await {
                match partial {
                    Ok(partial) => merged.combine_assign(&partial),
                    Err(err) if err.is_cancelled() => cancelled = Some(err),
                    Err(err) => return Err(err),
                }
            }
            if let Some(err) = cancelled {
                return Err(err);
            }
            tracing::debug!(op, nr_zones = merged.len(), "merged partial zone aggregates");
            Ok(Arc::new(merged))
        }
        .boxed()
        .shared()
    };

    let finish = Arc::new(finish);
    Ok(zones.spawn_partitions(op, |i| {
        let zone_partition = zones.partition(i);
        let merged = merged.clone();
        let finish = Arc::clone(&finish);
        let policies = policies.clone();
        async move {
            let (zone_partition, merged) = try_join!(zone_partition, merged)?;
            let zone_policy = &policies.inputs.1;
            let data = zone_partition
                .data()
                .iter()
                .map(|&zone| {
                    if zone_policy.is_no_data(zone) {
                        return policies.outputs.no_data();
                    }
                    policies
                        .outputs
                        .output(merged.get(&Ordered(zone)).and_then(|aggregate| finish(aggregate)))
                })
                .collect();
            Partition::new(
                zone_partition.origin().to_vec(),
                zone_partition.shape().clone(),
                zone_partition.locality(),
                data,
            )
        }
    }))
}

macro_rules! zonal_op {
    (
        $(#[$doc:meta])*
        $name:ident, $name_with:ident, $bound:ident, $output:ty,
        $observe:expr, $finish:expr
    ) => {
        $(#[$doc])*
        pub fn $name<T: $bound, Z: Element>(
            values: &PartitionedArray<T>,
            zones: &PartitionedArray<Z>,
        ) -> Result<PartitionedArray<$output>> {
            $name_with(&BinaryPolicies::defensive(), values, zones)
        }

        pub fn $name_with<T: $bound, Z: Element>(
            policies: &BinaryPolicies<T, Z, $output>,
            values: &PartitionedArray<T>,
            zones: &PartitionedArray<Z>,
        ) -> Result<PartitionedArray<$output>> {
            zonal(stringify!($name), policies, values, zones, $observe, $finish)
        }
    };
}

zonal_op!(
    /// The sum of the values in each zone. Integer overflow is a range
    /// violation.
    zonal_sum,
    zonal_sum_with,
    Element,
    T,
    |sum: &mut CheckedSum<T>, value| sum.combine_assign(&CheckedSum(Some(value))),
    |sum: &CheckedSum<T>| sum.0
);

zonal_op!(
    /// The mean of the values in each zone.
    zonal_mean,
    zonal_mean_with,
    FloatElement,
    T,
    |mean: &mut Mean, value: T| mean.observe(value.into_f64()),
    |mean: &Mean| mean.value().and_then(T::try_from_f64)
);

zonal_op!(
    zonal_minimum,
    zonal_minimum_with,
    Element,
    T,
    |min: &mut Min<T>, value| min.observe(value),
    |min: &Min<T>| min.0
);

zonal_op!(
    zonal_maximum,
    zonal_maximum_with,
    Element,
    T,
    |max: &mut Max<T>, value| max.observe(value),
    |max: &Max<T>| max.0
);

zonal_op!(
    /// The most frequent value in each zone. Ties resolve to the
    /// smallest value.
    zonal_majority,
    zonal_majority_with,
    Element,
    T,
    |histogram: &mut Histogram<Ordered<T>>, value| histogram.observe(Ordered(value)),
    |histogram: &Histogram<Ordered<T>>| histogram.majority().map(|value| value.0)
);

zonal_op!(
    /// The number of distinct values in each zone.
    zonal_diversity,
    zonal_diversity_with,
    Element,
    u64,
    |distinct: &mut Distinct<Ordered<T>>, value| distinct.observe(Ordered(value)),
    |distinct: &Distinct<Ordered<T>>| Some(distinct.len() as u64)
);

/// The number of cells in each zone.
pub fn zonal_area<Z: Element>(zones: &PartitionedArray<Z>) -> Result<PartitionedArray<u64>> {
    zonal_area_with(&UnaryPolicies::defensive(), zones)
}

pub fn zonal_area_with<Z: Element>(
    policies: &UnaryPolicies<Z, u64>,
    zones: &PartitionedArray<Z>,
) -> Result<PartitionedArray<u64>> {
    let policies = BinaryPolicies {
        domain: {
            let domain = policies.domain.clone();
            crate::policy::DomainPolicy::new(move |(zone, _): &(Z, Z)| domain.within_domain(zone))
        },
        inputs: (policies.inputs, policies.inputs),
        outputs: policies.outputs,
    };
    zonal(
        "zonal_area",
        &policies,
        zones,
        zones,
        |count: &mut Count, _| count.observe(),
        |count: &Count| Some(count.0),
    )
}
