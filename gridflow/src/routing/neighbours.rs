/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Operations on the direct neighbours in the flow graph. These only
//! need a halo of one cell, not propagation.

use futures::try_join;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::error::Error;
use crate::error::Result;
use crate::partition::Partition;
use crate::policy::InputPolicy;
use crate::policy::RoutingPolicies;
use crate::routing::FlowDirection;
use crate::routing::router::FlowGraph;
use crate::routing::router::check_rank;
use crate::window::Window;

/// The number of cells draining directly into every cell.
pub fn inflow_count(flow_direction: &PartitionedArray<u8>) -> Result<PartitionedArray<u8>> {
    inflow_count_with(InputPolicy::defensive(), flow_direction)
}

pub fn inflow_count_with(
    policy: InputPolicy<u8>,
    flow_direction: &PartitionedArray<u8>,
) -> Result<PartitionedArray<u8>> {
    check_rank("inflow_count", flow_direction)?;
    Ok(flow_direction.spawn_partitions("inflow_count", |i| {
        let flow_direction = flow_direction.clone();
        async move {
            let graph = FlowGraph::gather(&flow_direction, i, policy).await?;
            let counts = (0..graph.len())
                .map(|cell| {
                    if graph.is_no_data(cell) {
                        policy.no_data.no_data()
                    } else {
                        graph.inflow_count()[cell]
                    }
                })
                .collect();
            graph.partition(counts)
        }
    }))
}

/// The flow direction and material windows of a partition, with a
/// halo of one cell.
async fn windows<M: Element>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    material: &PartitionedArray<M>,
    partition: usize,
) -> Result<(Window<u8>, Window<M>)> {
    try_join!(
        Window::gather(flow_direction, partition, [1, 1], policies.flow_direction),
        Window::gather(material, partition, [1, 1], policies.material),
    )
}

fn direction(window: &Window<u8>, row: isize, col: isize) -> Result<Option<FlowDirection>> {
    let Some(code) = window.get(row, col) else {
        return Ok(None);
    };
    let [row0, col0] = window.origin();
    FlowDirection::from_code(code)
        .map(Some)
        .ok_or_else(|| Error::InvalidFlowDirection {
            value: code,
            cell: vec![(row0 as isize + row) as usize, (col0 as isize + col) as usize],
        })
}

/// The sum of the material of the cells draining directly into every
/// cell. No-data in any of those cells makes the sum no-data.
pub fn upstream<M: Element>(
    flow_direction: &PartitionedArray<u8>,
    material: &PartitionedArray<M>,
) -> Result<PartitionedArray<M>> {
    upstream_with(&RoutingPolicies::defensive(), flow_direction, material)
}

pub fn upstream_with<M: Element>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    material: &PartitionedArray<M>,
) -> Result<PartitionedArray<M>> {
    check_rank("upstream", flow_direction)?;
    flow_direction.check_partitioning(material)?;
    Ok(flow_direction.spawn_partitions("upstream", |i| {
        let (flow_direction, material, policies) = (flow_direction.clone(), material.clone(), policies.clone());
        async move {
            let (directions, values) = windows(&policies, &flow_direction, &material, i).await?;
            let mut data = Vec::with_capacity(directions.rows() * directions.cols());
            for row in 0..directions.rows() as isize {
                for col in 0..directions.cols() as isize {
                    let mut sum = direction(&directions, row, col)?
                        .and(values.get(row, col))
                        .map(|_| M::zero());
                    for inflowing in FlowDirection::ALL.into_iter().filter(|d| !d.is_sink()) {
                        let (drow, dcol) = inflowing.offset();
                        let (upstream_row, upstream_col) = (row - drow, col - dcol);
                        if directions.get(upstream_row, upstream_col) != Some(inflowing.code()) {
                            continue;
                        }
                        sum = sum
                            .zip(values.get(upstream_row, upstream_col))
                            .filter(|&(_, value)| policies.domain.within_domain(&[value]))
                            .and_then(|(sum, value)| sum.add_checked(value));
                    }
                    data.push(policies.output.output(sum));
                }
            }
            Partition::new(
                flow_direction.tiling().partition_origin(i),
                flow_direction.tiling().partition_shape(i),
                flow_direction.tiling().locality(i),
                data,
            )
        }
    }))
}

/// The material of the downstream cell of every cell. Sinks take their
/// own material; cells draining out of the array are no-data.
pub fn downstream<M: Element>(
    flow_direction: &PartitionedArray<u8>,
    material: &PartitionedArray<M>,
) -> Result<PartitionedArray<M>> {
    downstream_with(&RoutingPolicies::defensive(), flow_direction, material)
}

pub fn downstream_with<M: Element>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    material: &PartitionedArray<M>,
) -> Result<PartitionedArray<M>> {
    check_rank("downstream", flow_direction)?;
    flow_direction.check_partitioning(material)?;
    Ok(flow_direction.spawn_partitions("downstream", |i| {
        let (flow_direction, material, policies) = (flow_direction.clone(), material.clone(), policies.clone());
        async move {
            let (directions, values) = windows(&policies, &flow_direction, &material, i).await?;
            let mut data = Vec::with_capacity(directions.rows() * directions.cols());
            for row in 0..directions.rows() as isize {
                for col in 0..directions.cols() as isize {
                    let value = match (direction(&directions, row, col)?, values.get(row, col)) {
                        (Some(direction), Some(_)) => {
                            let (drow, dcol) = direction.offset();
                            values.get(row + drow, col + dcol)
                        }
                        _ => None,
                    };
                    let value = value.filter(|value| policies.domain.within_domain(&[*value]));
                    data.push(policies.output.output(value));
                }
            }
            Partition::new(
                flow_direction.tiling().partition_origin(i),
                flow_direction.tiling().partition_shape(i),
                flow_direction.tiling().locality(i),
                data,
            )
        }
    }))
}
