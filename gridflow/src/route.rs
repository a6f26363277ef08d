/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Serial routes: ordered sequences of cells through an array.
//!
//! A [`SerialRoute`] holds any number of routes, each identified by a
//! route id. A route is cut into fragments: maximal runs of consecutive
//! route cells within one partition. Every partition of a route holds
//! the fragments of its own cells, in route order per route, and every
//! fragment but the last of its route names the partition holding the
//! continuation.
//!
//! Operations on routes walk them: a walker task per partition visits
//! a fragment once control reaches it, then passes control, together
//! with the state of the walk, to the walker owning the next fragment.
//! Only one fragment of a route is visited at a time, while different
//! routes are walked concurrently.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use futures::TryFutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use gridslice::Index;
use gridslice::Shape;
use serde::Deserialize;
use serde::Serialize;

use crate::element::Element;
use crate::element::Ordered;
use crate::error::Error;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::scalar::Scalar;
use crate::sync::group::Status;
use crate::sync::group::TaskGroup;
use crate::tiling::Tiling;

mod order;
mod walk;

pub use order::ROUTE_ID;
pub use order::decreasing_order;
pub use order::decreasing_order_with;
pub use order::decreasing_order_zones;
pub use order::decreasing_order_zones_with;
pub use order::highest_n;
pub use order::highest_n_zones;
pub use walk::first_n;
pub use walk::integrate;
pub use walk::integrate_with;

/// A run of consecutive cells of one route within one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteFragment<Z> {
    route_id: Z,
    /// Linear indices of the cells within the partition, in route order.
    cells: Vec<usize>,
    /// The origin of the partition holding the next fragment of the
    /// route, if any.
    next: Option<Index>,
}

impl<Z: Copy> RouteFragment<Z> {
    pub fn new(route_id: Z, cells: Vec<usize>, next: Option<Index>) -> Self {
        Self {
            route_id,
            cells,
            next,
        }
    }

    pub fn route_id(&self) -> Z {
        self.route_id
    }

    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    pub fn next(&self) -> Option<&[usize]> {
        self.next.as_deref()
    }

    /// Whether this fragment ends its route.
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// The fragments of all routes passing through one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePartition<Z> {
    origin: Index,
    shape: Shape,
    locality: usize,
    fragments: Vec<RouteFragment<Z>>,
}

impl<Z: Element> RoutePartition<Z> {
    pub fn new(
        origin: Index,
        shape: Shape,
        locality: usize,
        fragments: Vec<RouteFragment<Z>>,
    ) -> Result<Self> {
        shape.check_rank(&origin)?;
        if let Some(cell) = fragments
            .iter()
            .flat_map(|fragment| fragment.cells())
            .find(|&&cell| cell >= shape.volume())
        {
            return Err(Error::invalid_argument(format!(
                "route cell {} outside partition of shape {}",
                cell, shape
            )));
        }
        Ok(Self {
            origin,
            shape,
            locality,
            fragments,
        })
    }

    pub fn origin(&self) -> &[usize] {
        &self.origin
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn locality(&self) -> usize {
        self.locality
    }

    pub fn fragments(&self) -> &[RouteFragment<Z>] {
        &self.fragments
    }

    /// The fragments of route `route_id`, in route order.
    pub fn route_fragments(&self, route_id: Z) -> impl Iterator<Item = &RouteFragment<Z>> + '_ {
        self.fragments
            .iter()
            .filter(move |fragment| fragment.route_id.same(route_id))
    }

    /// The ids of the routes passing through this partition.
    pub fn route_ids(&self) -> Vec<Z> {
        let mut ids: Vec<_> = self.fragments.iter().map(|f| Ordered(f.route_id)).collect();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(|id| id.0).collect()
    }

    pub fn nr_cells(&self) -> usize {
        self.fragments.iter().map(|f| f.cells.len()).sum()
    }
}

pub type RoutePartitionFuture<Z> = Shared<BoxFuture<'static, Result<Arc<RoutePartition<Z>>>>>;

/// Routes through a partitioned array, with the array's tiling.
#[derive(Clone)]
pub struct SerialRoute<Z> {
    runtime: Runtime,
    tiling: Arc<Tiling>,
    partitions: Arc<Vec<RoutePartitionFuture<Z>>>,
    /// For every route: its id and the origin of the partition holding
    /// its first fragment.
    starts: Scalar<Arc<Vec<(Z, Index)>>>,
    group: TaskGroup,
}

impl<Z: Element> SerialRoute<Z> {
    /// A route over `tiling` whose partitions are computed by the tasks
    /// of `group`.
    pub(crate) fn new(
        runtime: &Runtime,
        tiling: &Arc<Tiling>,
        partitions: Vec<RoutePartitionFuture<Z>>,
        starts: Scalar<Arc<Vec<(Z, Index)>>>,
        group: TaskGroup,
    ) -> Self {
        Self {
            runtime: runtime.clone(),
            tiling: Arc::clone(tiling),
            partitions: Arc::new(partitions),
            starts,
            group,
        }
    }

    /// A route from ready partitions. `starts` holds the id of every
    /// route with the origin of the partition holding its first
    /// fragment.
    pub fn from_partitions(
        runtime: &Runtime,
        tiling: Arc<Tiling>,
        partitions: Vec<RoutePartition<Z>>,
        starts: Vec<(Z, Index)>,
    ) -> Result<Self> {
        if partitions.len() != tiling.nr_partitions() {
            return Err(Error::invalid_argument(format!(
                "{} route partitions for a tiling of {} partitions",
                partitions.len(),
                tiling.nr_partitions()
            )));
        }
        let partitions = partitions
            .into_iter()
            .map(|partition| {
                futures::future::ready(Ok::<_, Error>(Arc::new(partition)))
                    .boxed()
                    .shared()
            })
            .collect();
        Ok(Self::new(
            runtime,
            &tiling,
            partitions,
            Scalar::new(Arc::new(starts)),
            TaskGroup::completed("route"),
        ))
    }
}

impl<Z> SerialRoute<Z> {
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn tiling(&self) -> &Arc<Tiling> {
        &self.tiling
    }

    pub fn shape(&self) -> &Shape {
        self.tiling.shape()
    }

    pub fn nr_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// The future of route partition `partition`, in linear partition
    /// order.
    pub fn partition(&self, partition: usize) -> RoutePartitionFuture<Z> {
        self.partitions[partition].clone()
    }

    pub(crate) fn starts(&self) -> &Scalar<Arc<Vec<(Z, Index)>>> {
        &self.starts
    }

    pub fn status(&self) -> Status {
        self.group.status()
    }

    pub fn cancel(&self) {
        self.group.cancel()
    }
}

impl<Z: Element> SerialRoute<Z> {
    /// Wait for all route partitions.
    pub async fn wait(&self) -> Result<()> {
        futures::future::try_join_all(self.partitions.iter().cloned()).await?;
        Ok(())
    }

    /// The ids of all routes, in increasing order.
    pub async fn route_ids(&self) -> Result<Vec<Z>> {
        let starts = self.starts.get().await?;
        let mut ids: Vec<_> = starts.iter().map(|&(id, _)| Ordered(id)).collect();
        ids.sort();
        Ok(ids.into_iter().map(|id| id.0).collect())
    }

    /// The global indices of the cells of route `route_id`, in route
    /// order. Empty for an unknown route.
    pub async fn route_cells(&self, route_id: Z) -> Result<Vec<Index>> {
        let starts = self.starts.get().await?;
        let Some((_, start)) = starts.iter().find(|(id, _)| id.same(route_id)) else {
            return Ok(Vec::new());
        };
        let partitions = futures::future::try_join_all(self.partitions.iter().cloned()).await?;
        // The fragments of the route still to be visited, per partition.
        let mut pending: BTreeMap<usize, VecDeque<&RouteFragment<Z>>> = BTreeMap::new();
        for (i, partition) in partitions.iter().enumerate() {
            pending.insert(i, partition.route_fragments(route_id).collect());
        }

        let mut cells = Vec::new();
        let mut next = Some(start.clone());
        while let Some(origin) = next {
            let partition = self.tiling.linear_partition_index(&origin).ok_or_else(|| {
                Error::invalid_argument(format!("no partition at origin {:?}", origin))
            })?;
            let fragment = pending
                .get_mut(&partition)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "route {} continues into partition {:?} without fragments left",
                        route_id, origin
                    ))
                })?;
            let shape = partitions[partition].shape();
            for &cell in fragment.cells() {
                let local = shape.coordinates(cell)?;
                cells.push(origin.iter().zip(local).map(|(o, l)| o + l).collect());
            }
            next = fragment.next().map(<[usize]>::to_vec);
        }
        Ok(cells)
    }
}

impl<Z> std::fmt::Debug for SerialRoute<Z> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRoute")
            .field("shape", self.shape())
            .field("grid", self.tiling.grid())
            .field("status", &self.status())
            .finish()
    }
}

/// Wrap `future` as a route partition future spawned on `group`.
pub(crate) fn spawn_route_partition<Z, F>(
    runtime: &Runtime,
    group: &TaskGroup,
    tiling: &Tiling,
    partition: usize,
    future: F,
) -> RoutePartitionFuture<Z>
where
    Z: Element,
    F: std::future::Future<Output = Result<RoutePartition<Z>>> + Send + 'static,
{
    group
        .spawn(
            runtime,
            tiling.locality(partition),
            tiling.partition_origin(partition),
            future,
        )
        .map_ok(Arc::new)
        .boxed()
        .shared()
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::runtime::Placement;
    use crate::test_utils;

    #[tokio::test]
    async fn test_route_cells() {
        let runtime = test_utils::runtime(1);
        let tiling = Arc::new(Tiling::regular(&shape![2, 4], &shape![2, 2], 1, Placement::Blocked).unwrap());
        // Route 3 visits (0, 0), (1, 2), (1, 1), (0, 3); route 4 only (1, 0).
        let partitions = vec![
            RoutePartition::new(
                vec![0, 0],
                shape![2, 2],
                0,
                vec![
                    RouteFragment::new(3u32, vec![0], Some(vec![0, 2])),
                    RouteFragment::new(4, vec![2], None),
                    RouteFragment::new(3, vec![3], Some(vec![0, 2])),
                ],
            )
            .unwrap(),
            RoutePartition::new(
                vec![0, 2],
                shape![2, 2],
                0,
                vec![
                    RouteFragment::new(3, vec![2], Some(vec![0, 0])),
                    RouteFragment::new(3, vec![1], None),
                ],
            )
            .unwrap(),
        ];
        assert_eq!(partitions[0].route_ids(), vec![3, 4]);
        assert_eq!(partitions[0].nr_cells(), 3);

        let route = SerialRoute::from_partitions(&runtime, tiling, partitions, vec![(4, vec![0, 0]), (3, vec![0, 0])])
            .unwrap();
        route.wait().await.unwrap();
        assert_eq!(route.route_ids().await.unwrap(), vec![3, 4]);
        assert_eq!(
            route.route_cells(3).await.unwrap(),
            vec![vec![0, 0], vec![1, 2], vec![1, 1], vec![0, 3]]
        );
        assert_eq!(route.route_cells(4).await.unwrap(), vec![vec![1, 0]]);
        assert!(route.route_cells(5).await.unwrap().is_empty());
    }

    #[test]
    fn test_invalid_partition() {
        let result = RoutePartition::new(vec![0, 0], shape![2, 2], 0, vec![RouteFragment::new(1u8, vec![4], None)]);
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }
}
