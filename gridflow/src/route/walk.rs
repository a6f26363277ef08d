/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Walks along serial routes.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::try_join;

use crate::array::PartitionedArray;
use crate::array::spawn_partitions;
use crate::element::Element;
use crate::element::Ordered;
use crate::error::Error;
use crate::error::Result;
use crate::partition::Partition;
use crate::policy::OutputPolicy;
use crate::policy::UnaryPolicies;
use crate::route::RouteFragment;
use crate::route::SerialRoute;
use crate::routing::communicator::Communicator;

/// Control over a route, passed from the walker of one fragment to the
/// walker of the next.
#[derive(Debug)]
struct Walk<Z, S> {
    route_id: Z,
    state: S,
}

/// Walk every route of `route`. Visiting a cell updates the state of
/// the walk over its route and yields the output value of the cell.
/// Cells not on a route are no-data.
fn walk<Z, X, S, R, I, Fut, V>(
    op: &'static str,
    route: &SerialRoute<Z>,
    output: OutputPolicy<R>,
    initial: S,
    mut input: I,
    visit: V,
) -> PartitionedArray<R>
where
    Z: Element,
    X: Send + 'static,
    S: Clone + Send + 'static,
    R: Element,
    I: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<X>> + Send + 'static,
    V: Fn(&X, usize, &mut S) -> Option<R> + Send + Sync + 'static,
{
    let visit = Arc::new(visit);
    let timeout = route.runtime().config().channel_receive_timeout();
    let mut communicators = Communicator::<Walk<Z, S>>::connect_all(route.tiling(), timeout).into_iter();
    let tiling = Arc::clone(route.tiling());
    spawn_partitions(route.runtime(), route.tiling(), op, |i| {
        let (partition, starts, input) = (route.partition(i), route.starts().clone(), input(i));
        let communicator = communicators.next();
        let (visit, tiling, initial) = (Arc::clone(&visit), Arc::clone(&tiling), initial.clone());
        async move {
            let (partition, starts, input) = try_join!(partition, starts, input)?;
            let mut communicator = communicator.ok_or_else(|| Error::ChannelClosed {
                partition: partition.origin().to_vec(),
            })?;
            let mut data = vec![output.no_data(); partition.shape().volume()];

            // The fragments of every route not visited yet, in route order.
            let mut pending: BTreeMap<Ordered<Z>, VecDeque<&RouteFragment<Z>>> = BTreeMap::new();
            for fragment in partition.fragments() {
                pending
                    .entry(Ordered(fragment.route_id()))
                    .or_default()
                    .push_back(fragment);
            }
            let mut nr_pending = partition.fragments().len();
            let mut ready: Vec<Walk<Z, S>> = starts
                .iter()
                .filter(|(_, start)| start.as_slice() == partition.origin())
                .map(|&(route_id, _)| Walk {
                    route_id,
                    state: initial.clone(),
                })
                .collect();

            loop {
                for Walk { route_id, mut state } in ready.drain(..) {
                    let fragment = pending
                        .get_mut(&Ordered(route_id))
                        .and_then(VecDeque::pop_front)
                        .ok_or_else(|| {
                            Error::invalid_argument(format!(
                                "route {} entered partition {:?} without fragments left",
                                route_id,
                                partition.origin()
                            ))
                        })?;
                    for &cell in fragment.cells() {
                        data[cell] = output.output(visit(&input, cell, &mut state));
                    }
                    nr_pending -= 1;
                    if let Some(next) = fragment.next() {
                        let next = tiling.linear_partition_index(next).ok_or_else(|| {
                            Error::invalid_argument(format!("no partition at origin {:?}", next))
                        })?;
                        communicator.send(next, Walk { route_id, state })?;
                    }
                }
                if nr_pending == 0 {
                    break;
                }
                ready.push(communicator.receive().await?);
            }
            communicator.close();
            Partition::new(
                partition.origin().to_vec(),
                partition.shape().clone(),
                partition.locality(),
                data,
            )
        }
    })
}

/// Mark the first `n` cells of every route: 1 on those cells, no-data
/// elsewhere.
pub fn first_n<Z: Element>(route: &SerialRoute<Z>, n: usize) -> PartitionedArray<u8> {
    walk(
        "first_n",
        route,
        OutputPolicy::defensive(),
        0usize,
        |_| futures::future::ready(Ok(())),
        move |_, _, nr_visited| {
            *nr_visited += 1;
            (*nr_visited <= n).then_some(1)
        },
    )
}

/// The running sum of `integrand` along every route, over at most the
/// first `max_nr_cells` cells of the route. Cells where the integrand is
/// no-data do not contribute and are no-data in the output.
pub fn integrate<Z: Element, T: Element>(
    route: &SerialRoute<Z>,
    integrand: &PartitionedArray<T>,
    max_nr_cells: usize,
) -> Result<PartitionedArray<T>> {
    integrate_with(&UnaryPolicies::defensive(), route, integrand, max_nr_cells)
}

/// Once the running sum falls out of range, the rest of the route is
/// no-data.
pub fn integrate_with<Z: Element, T: Element>(
    policies: &UnaryPolicies<T, T>,
    route: &SerialRoute<Z>,
    integrand: &PartitionedArray<T>,
    max_nr_cells: usize,
) -> Result<PartitionedArray<T>> {
    route.tiling().check_same_partitioning(integrand.tiling())?;
    let policies = policies.clone();
    Ok(walk(
        "integrate",
        route,
        policies.outputs,
        (0usize, Some(T::zero())),
        |i| integrand.partition(i),
        move |integrand: &Arc<Partition<T>>, cell, (nr_visited, sum)| {
            *nr_visited += 1;
            if *nr_visited > max_nr_cells {
                return None;
            }
            let value = policies
                .inputs
                .valid(integrand.data()[cell])
                .filter(|value| policies.domain.within_domain(value))?;
            *sum = policies.outputs.checked(sum.and_then(|sum| sum.add_checked(value)));
            *sum
        },
    ))
}
