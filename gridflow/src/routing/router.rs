/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Propagation of material through a flow graph spanning partitions.
//!
//! Every partition task builds the part of the flow graph it owns from
//! its flow direction cells plus a halo of one cell, which tells it how
//! many upstream cells drain into each of its cells. Cells whose
//! upstream cells all reported are ready; the task handles ready cells
//! in any order, passing each outflow to the downstream cell. Outflow
//! crossing into another partition is sent over that partition's
//! channel. When no cell is ready the task waits for its channel.

use std::future::Future;

use gridslice::Index;
use gridslice::Shape;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::error::Error;
use crate::error::Result;
use crate::partition::Partition;
use crate::policy::InputPolicy;
use crate::routing::FlowDirection;
use crate::routing::communicator::Communicator;
use crate::routing::validate::validate_flow_direction_with;
use crate::scalar::Scalar;
use crate::tiling::Tiling;
use crate::window::Window;

/// Where the outflow of a cell goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    /// A cell of the same partition.
    Local(usize),
    /// Cell `cell` of partition `partition`.
    Remote { partition: usize, cell: usize },
}

/// Outflow of one cell, sent to a downstream partition. `None` is
/// no-data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Inflow<M> {
    cell: usize,
    value: Option<M>,
}

/// The part of a flow graph within one partition.
#[derive(Debug, Clone)]
pub(crate) struct FlowGraph {
    origin: Index,
    shape: Shape,
    locality: usize,
    /// `None` for sinks, cells draining out of the array, and cells
    /// without a flow direction.
    downstream: Vec<Option<Target>>,
    inflow_count: Vec<u8>,
    no_data: Vec<bool>,
    /// The number of upstream cells in other partitions.
    nr_external: usize,
}

impl FlowGraph {
    /// Build the flow graph of `partition` of `flow_direction`.
    pub(crate) async fn gather(
        flow_direction: &PartitionedArray<u8>,
        partition: usize,
        policy: InputPolicy<u8>,
    ) -> Result<Self> {
        let window = Window::gather(flow_direction, partition, [1, 1], policy).await?;
        Self::new(&window, flow_direction.tiling(), partition)
    }

    fn new(window: &Window<u8>, tiling: &Tiling, partition: usize) -> Result<Self> {
        let (rows, cols) = (window.rows(), window.cols());
        let origin = window.origin();
        let shape = tiling.shape();
        let mut graph = FlowGraph {
            origin: origin.to_vec(),
            shape: tiling.partition_shape(partition),
            locality: tiling.locality(partition),
            downstream: Vec::with_capacity(rows * cols),
            inflow_count: vec![0; rows * cols],
            no_data: vec![false; rows * cols],
            nr_external: 0,
        };

        for row in 0..rows as isize {
            for col in 0..cols as isize {
                let cell = row as usize * cols + col as usize;
                let target = match window.get(row, col) {
                    None => {
                        graph.no_data[cell] = true;
                        None
                    }
                    Some(code) => {
                        let direction =
                            FlowDirection::from_code(code).ok_or_else(|| Error::InvalidFlowDirection {
                                value: code,
                                cell: graph.global_index(cell),
                            })?;
                        let (drow, dcol) = direction.offset();
                        let (row, col) = (row + drow, col + dcol);
                        if direction.is_sink() || !window.within_array(row, col, shape) {
                            None
                        } else if (0..rows as isize).contains(&row) && (0..cols as isize).contains(&col) {
                            Some(Target::Local(row as usize * cols + col as usize))
                        } else {
                            let global = [
                                (origin[0] as isize + row) as usize,
                                (origin[1] as isize + col) as usize,
                            ];
                            let partition = tiling.partition_at(&global)?;
                            let partition_origin = tiling.partition_origin(partition);
                            let partition_cols = tiling.partition_shape(partition).extent(1);
                            Some(Target::Remote {
                                partition,
                                cell: (global[0] - partition_origin[0]) * partition_cols
                                    + global[1]
                                    - partition_origin[1],
                            })
                        }
                    }
                };
                graph.downstream.push(target);

                for direction in FlowDirection::ALL.into_iter().filter(|d| !d.is_sink()) {
                    // The neighbour draining into this cell in `direction`.
                    let (drow, dcol) = direction.offset();
                    let (upstream_row, upstream_col) = (row - drow, col - dcol);
                    if window.get(upstream_row, upstream_col) != Some(direction.code()) {
                        continue;
                    }
                    graph.inflow_count[cell] += 1;
                    if !(0..rows as isize).contains(&upstream_row) || !(0..cols as isize).contains(&upstream_col)
                    {
                        graph.nr_external += 1;
                    }
                }
            }
        }
        Ok(graph)
    }

    pub(crate) fn len(&self) -> usize {
        self.downstream.len()
    }

    /// The number of cells draining into each cell.
    pub(crate) fn inflow_count(&self) -> &[u8] {
        &self.inflow_count
    }

    /// Whether the flow direction of `cell` is no-data.
    pub(crate) fn is_no_data(&self, cell: usize) -> bool {
        self.no_data[cell]
    }

    pub(crate) fn global_index(&self, cell: usize) -> Index {
        let cols = self.shape.extent(1).max(1);
        vec![self.origin[0] + cell / cols, self.origin[1] + cell % cols]
    }

    /// A partition of this graph's extent holding `data`.
    pub(crate) fn partition<T>(&self, data: Vec<T>) -> Result<Partition<T>> {
        Partition::new(self.origin.clone(), self.shape.clone(), self.locality, data)
    }

    /// A cell on a cycle among the cells in `pending`, the cells that
    /// still wait for upstream input.
    fn find_cycle(&self, pending: &[u8]) -> Option<usize> {
        // Cells are marked with the walk that visited them first.
        let mut walk = vec![usize::MAX; self.len()];
        for start in (0..self.len()).filter(|&cell| pending[cell] > 0) {
            if walk[start] != usize::MAX {
                continue;
            }
            let mut cell = start;
            loop {
                walk[cell] = start;
                match self.downstream[cell] {
                    Some(Target::Local(next)) if pending[next] > 0 => {
                        if walk[next] == start {
                            return Some(next);
                        }
                        if walk[next] != usize::MAX {
                            break;
                        }
                        cell = next;
                    }
                    _ => break,
                }
            }
        }
        None
    }
}

fn arrive<M: Element>(
    cell: usize,
    value: Option<M>,
    upstream: &mut [Option<M>],
    pending: &mut [u8],
    ready: &mut Vec<usize>,
) {
    upstream[cell] = upstream[cell]
        .zip(value)
        .and_then(|(sum, value)| sum.add_checked(value));
    pending[cell] -= 1;
    if pending[cell] == 0 {
        ready.push(cell);
    }
}

/// The flow graph of one partition, connected to the graphs of the
/// neighbouring partitions.
#[derive(Debug)]
pub(crate) struct Router<M> {
    graph: FlowGraph,
    communicator: Communicator<Inflow<M>>,
}

impl<M: Element> Router<M> {
    pub(crate) fn len(&self) -> usize {
        self.graph.len()
    }

    pub(crate) fn partition<T>(&self, data: Vec<T>) -> Result<Partition<T>> {
        self.graph.partition(data)
    }

    /// Visit every cell after all its upstream cells. `visit` receives
    /// the index of a cell and the sum of the outflows of its upstream
    /// cells, and returns the outflow of the cell. A `None` sum or
    /// outflow is no-data, which propagates downstream. Cells without
    /// a flow direction are skipped.
    pub(crate) async fn propagate(
        &mut self,
        mut visit: impl FnMut(usize, Option<M>) -> Option<M>,
    ) -> Result<()> {
        let graph = &self.graph;
        let mut pending = graph.inflow_count.clone();
        let mut upstream = vec![Some(M::zero()); graph.len()];
        let mut ready: Vec<usize> = (0..graph.len()).filter(|&i| pending[i] == 0).collect();
        let mut nr_external = graph.nr_external;
        let mut nr_done = 0;

        loop {
            while let Some(i) = ready.pop() {
                nr_done += 1;
                if graph.no_data[i] {
                    continue;
                }
                let outflow = visit(i, upstream[i]);
                match graph.downstream[i] {
                    Some(Target::Local(target)) => {
                        arrive(target, outflow, &mut upstream, &mut pending, &mut ready)
                    }
                    Some(Target::Remote { partition, cell }) => self.communicator.send(
                        partition,
                        Inflow {
                            cell,
                            value: outflow,
                        },
                    )?,
                    None => {}
                }
            }
            if nr_done == graph.len() {
                break;
            }
            if nr_external == 0 {
                let cell = graph
                    .find_cycle(&pending)
                    .or_else(|| pending.iter().position(|&count| count > 0))
                    .unwrap_or_default();
                return Err(Error::FlowDirectionCycle {
                    cell: graph.global_index(cell),
                });
            }
            let inflow = self.communicator.receive().await?;
            if pending.get(inflow.cell).copied().unwrap_or(0) == 0 {
                return Err(Error::invalid_argument(format!(
                    "unexpected inflow for cell {:?}",
                    graph.global_index(inflow.cell)
                )));
            }
            nr_external -= 1;
            arrive(inflow.cell, inflow.value, &mut upstream, &mut pending, &mut ready);
        }
        self.communicator.close();
        Ok(())
    }
}

/// Hands out the routers of the partitions of a flow direction array,
/// once the array passed validation if validation is enabled.
pub(crate) struct Routers<M> {
    flow_direction: PartitionedArray<u8>,
    policy: InputPolicy<u8>,
    validation: Option<Scalar<()>>,
    communicators: std::vec::IntoIter<Communicator<Inflow<M>>>,
}

impl<M: Element> Routers<M> {
    pub(crate) fn new(
        op: &'static str,
        flow_direction: &PartitionedArray<u8>,
        policy: InputPolicy<u8>,
    ) -> Result<Self> {
        check_rank(op, flow_direction)?;
        let config = flow_direction.runtime().config();
        let validation = config
            .validate_flow_direction()
            .then(|| validate_flow_direction_with(policy, flow_direction));
        let communicators =
            Communicator::connect(flow_direction.tiling(), config.channel_receive_timeout());
        Ok(Routers {
            flow_direction: flow_direction.clone(),
            policy,
            validation,
            communicators: communicators.into_iter(),
        })
    }

    /// The router of `partition`. Routers must be requested in linear
    /// partition order.
    pub(crate) fn router(&mut self, partition: usize) -> impl Future<Output = Result<Router<M>>> + Send + 'static {
        let communicator = self.communicators.next();
        let flow_direction = self.flow_direction.clone();
        let (policy, validation) = (self.policy, self.validation.clone());
        async move {
            if let Some(validation) = validation {
                validation.await?;
            }
            let graph = FlowGraph::gather(&flow_direction, partition, policy).await?;
            let communicator = communicator.ok_or_else(|| Error::ChannelClosed {
                partition: flow_direction.tiling().partition_origin(partition),
            })?;
            Ok(Router { graph, communicator })
        }
    }
}

pub(crate) fn check_rank<T>(op: &'static str, array: &PartitionedArray<T>) -> Result<()> {
    if array.rank() != 2 {
        return Err(Error::UnsupportedRank {
            op,
            expected: 2,
            got: array.rank(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::test_utils;

    // 3 x 4 cells in 2 partitions of 3 x 2, all draining east into the
    // last column, which drains south.
    fn flow_direction() -> PartitionedArray<u8> {
        let runtime = test_utils::runtime(2);
        #[rustfmt::skip]
        let codes = vec![
            6, 6, 6, 2,
            6, 6, 6, 2,
            6, 6, 6, 5,
        ];
        PartitionedArray::from_buffer(&runtime, shape![3, 4], shape![3, 2], codes).unwrap()
    }

    #[tokio::test]
    async fn test_flow_graph() {
        let flow_direction = flow_direction();
        let left = FlowGraph::gather(&flow_direction, 0, InputPolicy::defensive()).await.unwrap();
        assert_eq!(left.inflow_count(), &[0, 1, 0, 1, 0, 1]);
        assert_eq!(left.nr_external, 0);
        assert_eq!(left.downstream[0], Some(Target::Local(1)));
        assert_eq!(left.downstream[1], Some(Target::Remote { partition: 1, cell: 0 }));
        assert_eq!(left.downstream[5], Some(Target::Remote { partition: 1, cell: 4 }));

        let right = FlowGraph::gather(&flow_direction, 1, InputPolicy::defensive()).await.unwrap();
        assert_eq!(right.inflow_count(), &[1, 1, 1, 2, 1, 2]);
        assert_eq!(right.nr_external, 3);
        assert_eq!(right.downstream[5], None);
        assert_eq!(right.global_index(5), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_invalid_flow_direction() {
        let runtime = test_utils::runtime(1);
        let flow_direction =
            PartitionedArray::from_buffer(&runtime, shape![2, 2], shape![2, 2], vec![5u8, 0, 5, 5]).unwrap();
        assert_eq!(
            FlowGraph::gather(&flow_direction, 0, InputPolicy::defensive())
                .await
                .unwrap_err(),
            Error::InvalidFlowDirection {
                value: 0,
                cell: vec![0, 1]
            }
        );
    }

    #[tokio::test]
    async fn test_local_cycle() {
        let runtime = test_utils::runtime(1);
        // Cells 0 and 1 drain into each other; cell 2 drains into the
        // cycle, cell 3 is a sink.
        let flow_direction =
            PartitionedArray::from_buffer(&runtime, shape![2, 2], shape![2, 2], vec![6u8, 4, 8, 5]).unwrap();
        let graph = FlowGraph::gather(&flow_direction, 0, InputPolicy::defensive()).await.unwrap();
        let mut router = Router::<f64> {
            graph,
            communicator: Communicator::connect(flow_direction.tiling(), std::time::Duration::from_secs(5))
                .pop()
                .unwrap(),
        };
        let result = router.propagate(|_, upstream| upstream).await;
        assert!(matches!(
            result,
            Err(Error::FlowDirectionCycle { cell }) if cell == vec![0, 0] || cell == vec![0, 1]
        ));
    }
}
