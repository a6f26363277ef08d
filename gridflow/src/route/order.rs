/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Routes through cells in order of decreasing value.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use futures::try_join;
use gridslice::Index;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::element::Ordered;
use crate::error::Result;
use crate::policy::InputPolicy;
use crate::route::RouteFragment;
use crate::route::RoutePartition;
use crate::route::SerialRoute;
use crate::route::first_n;
use crate::route::spawn_route_partition;
use crate::runtime::AbortOnDrop;
use crate::scalar::Operand;
use crate::scalar::Scalar;
use crate::sync::group::TaskGroup;
use crate::tiling::Tiling;

/// The id of the route of [`decreasing_order`].
pub const ROUTE_ID: u8 = 1;

#[derive(Debug, Clone, Copy)]
struct Candidate<T> {
    value: T,
    partition: usize,
    cell: usize,
}

impl<T: Element> Candidate<T> {
    /// Decreasing value, ties in increasing cell order.
    fn order(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then(self.partition.cmp(&other.partition))
            .then(self.cell.cmp(&other.cell))
    }
}

type Candidates<Z, T> = BTreeMap<Ordered<Z>, Vec<Candidate<T>>>;

/// The fragments of every partition, and the start of every route.
#[derive(Debug)]
struct Layout<Z> {
    fragments: Vec<Vec<RouteFragment<Z>>>,
    starts: Arc<Vec<(Z, Index)>>,
}

/// A single route, with id [`ROUTE_ID`], through the valid cells of
/// `value` in order of decreasing value, of at most `max_length` cells.
/// Equal values are visited in increasing partition, then cell order.
pub fn decreasing_order<T: Element>(
    value: &PartitionedArray<T>,
    max_length: usize,
) -> Result<SerialRoute<u8>> {
    decreasing_order_with(InputPolicy::defensive(), value, max_length)
}

pub fn decreasing_order_with<T: Element>(
    input: InputPolicy<T>,
    value: &PartitionedArray<T>,
    max_length: usize,
) -> Result<SerialRoute<u8>> {
    order(
        "decreasing_order",
        (InputPolicy::defensive(), input),
        Scalar::new(ROUTE_ID).into(),
        value,
        max_length,
    )
}

/// One route per zone through the valid cells of `value` in the zone,
/// in order of decreasing value, of at most `max_length` cells. The
/// route id is the zone. Cells with a no-data zone are not on a route.
pub fn decreasing_order_zones<Z: Element, T: Element>(
    zone: &PartitionedArray<Z>,
    value: &PartitionedArray<T>,
    max_length: usize,
) -> Result<SerialRoute<Z>> {
    decreasing_order_zones_with(
        (InputPolicy::defensive(), InputPolicy::defensive()),
        zone,
        value,
        max_length,
    )
}

pub fn decreasing_order_zones_with<Z: Element, T: Element>(
    inputs: (InputPolicy<Z>, InputPolicy<T>),
    zone: &PartitionedArray<Z>,
    value: &PartitionedArray<T>,
    max_length: usize,
) -> Result<SerialRoute<Z>> {
    zone.check_partitioning(value)?;
    order("decreasing_order_zones", inputs, zone.into(), value, max_length)
}

/// Mark the `n` cells with the highest values: 1 on those cells, no-data
/// elsewhere.
pub fn highest_n<T: Element>(value: &PartitionedArray<T>, n: usize) -> Result<PartitionedArray<u8>> {
    let route = decreasing_order(value, n)?;
    Ok(first_n(&route, n))
}

/// Mark the `n` cells with the highest values within every zone.
pub fn highest_n_zones<Z: Element, T: Element>(
    zone: &PartitionedArray<Z>,
    value: &PartitionedArray<T>,
    n: usize,
) -> Result<PartitionedArray<u8>> {
    let route = decreasing_order_zones(zone, value, n)?;
    Ok(first_n(&route, n))
}

fn order<Z: Element, T: Element>(
    op: &'static str,
    (zone_policy, value_policy): (InputPolicy<Z>, InputPolicy<T>),
    zone: Operand<Z>,
    value: &PartitionedArray<T>,
    max_length: usize,
) -> Result<SerialRoute<Z>> {
    let (runtime, tiling) = (value.runtime().clone(), Arc::clone(value.tiling()));

    let layout = {
        let (value, tiling) = (value.clone(), Arc::clone(&tiling));
        Scalar::from_future(async move {
            let mut running = AbortOnDrop::default();
            let candidates = (0..tiling.nr_partitions()).map(|i| {
                let (zones, values) = (zone.values(i), value.partition(i));
                let task = value.runtime().spawn_at(tiling.locality(i), async move {
                    let (zones, values) = try_join!(zones, values)?;
                    let mut candidates = Candidates::new();
                    for (cell, &value) in values.data().iter().enumerate() {
                        let (Some(zone), Some(value)) = (zone_policy.valid(zones.get(cell)), value_policy.valid(value))
                        else {
                            continue;
                        };
                        candidates
                            .entry(Ordered(zone))
                            .or_insert_with(Vec::new)
                            .push(Candidate {
                                value,
                                partition: i,
                                cell,
                            });
                    }
                    Ok(select(candidates, max_length))
                });
                running.track(&task);
                task
            });
            let candidates = try_join_all(candidates).await?;
            let layout = merge(&tiling, candidates, max_length);
            tracing::debug!(op, nr_routes = layout.starts.len(), "ordered cells");
            Ok(Arc::new(layout))
        })
    };

    let group = TaskGroup::new(op);
    let partitions = (0..tiling.nr_partitions())
        .map(|i| {
            let layout = layout.clone();
            let (origin, shape, locality) =
                (tiling.partition_origin(i), tiling.partition_shape(i), tiling.locality(i));
            spawn_route_partition(&runtime, &group, &tiling, i, async move {
                let layout = layout.get().await?;
                RoutePartition::new(origin, shape, locality, layout.fragments[i].clone())
            })
        })
        .collect();
    group.close();
    let starts = Scalar::from_future(async move { Ok(Arc::clone(&layout.get().await?.starts)) });
    Ok(SerialRoute::new(&runtime, &tiling, partitions, starts, group))
}

/// Keep the first `max_length` candidates of every zone.
fn select<Z: Element, T: Element>(mut candidates: Candidates<Z, T>, max_length: usize) -> Candidates<Z, T> {
    for zone in candidates.values_mut() {
        zone.sort_by(Candidate::order);
        zone.truncate(max_length);
    }
    candidates
}

/// Merge the candidates of all partitions and cut every route into
/// fragments.
fn merge<Z: Element, T: Element>(
    tiling: &Tiling,
    partitions: Vec<Candidates<Z, T>>,
    max_length: usize,
) -> Layout<Z> {
    let mut candidates = Candidates::new();
    for partition in partitions {
        for (zone, zone_candidates) in partition {
            candidates
                .entry(zone)
                .or_insert_with(Vec::new)
                .extend(zone_candidates);
        }
    }
    let candidates = select(candidates, max_length);

    let mut fragments = vec![Vec::new(); tiling.nr_partitions()];
    let mut starts = Vec::with_capacity(candidates.len());
    for (Ordered(route_id), route) in candidates {
        let runs: Vec<_> = route.chunk_by(|a, b| a.partition == b.partition).collect();
        let Some(first) = runs.first() else {
            continue;
        };
        starts.push((route_id, tiling.partition_origin(first[0].partition)));
        for (k, run) in runs.iter().enumerate() {
            let next = runs.get(k + 1).map(|next| tiling.partition_origin(next[0].partition));
            let cells = run.iter().map(|candidate| candidate.cell).collect();
            fragments[run[0].partition].push(RouteFragment::new(route_id, cells, next));
        }
    }
    Layout {
        fragments,
        starts: Arc::new(starts),
    }
}
