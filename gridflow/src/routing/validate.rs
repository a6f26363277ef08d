/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Detection of cycles in flow direction arrays.
//!
//! Every partition follows the flow path of each of its cells until it
//! terminates, leaves the partition, or returns to a cell on the same
//! path, which is a cycle. Cells on the partition border can be entered
//! from a neighbouring partition; for each of them the partition
//! reports the cell in another partition its path exits into, if any.
//! These exits form a condensed graph over border cells whose cycles
//! are exactly the cycles crossing partition boundaries.

use std::collections::HashMap;

use futures::future::try_join_all;
use gridslice::Index;
use serde::Deserialize;
use serde::Serialize;

use crate::array::PartitionedArray;
use crate::error::Error;
use crate::error::Result;
use crate::partition::Partition;
use crate::policy::InputPolicy;
use crate::routing::FlowDirection;
use crate::routing::router::check_rank;
use crate::runtime::AbortOnDrop;
use crate::scalar::Scalar;

/// For border cells whose flow path leaves the partition: the cell it
/// enters in another partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct BoundarySummary {
    exits: Vec<(Index, Index)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Check that following the flow direction from any cell terminates.
/// Resolves to [`Error::FlowDirectionCycle`] naming a cell on a cycle,
/// or [`Error::InvalidFlowDirection`] for a code that is not a
/// direction. No-data cells terminate paths.
pub fn validate_flow_direction(flow_direction: &PartitionedArray<u8>) -> Scalar<()> {
    validate_flow_direction_with(InputPolicy::defensive(), flow_direction)
}

pub fn validate_flow_direction_with(
    policy: InputPolicy<u8>,
    flow_direction: &PartitionedArray<u8>,
) -> Scalar<()> {
    let flow_direction = flow_direction.clone();
    Scalar::from_future(async move {
        check_rank("validate_flow_direction", &flow_direction)?;
        let shape = flow_direction.shape().clone();
        let mut running = AbortOnDrop::default();
        let summaries = (0..flow_direction.nr_partitions()).map(|i| {
            let partition = flow_direction.partition(i);
            let shape = shape.clone();
            let task = flow_direction
                .runtime()
                .spawn_at(flow_direction.tiling().locality(i), async move {
                    summarise(&*partition.await?, &shape, policy)
                });
            running.track(&task);
            task
        });
        let summaries = try_join_all(summaries).await?;

        let exits: HashMap<Index, Index> = summaries
            .into_iter()
            .flat_map(|summary| summary.exits)
            .collect();
        if let Some(cell) = find_cycle(&exits) {
            tracing::warn!(?cell, "flow direction contains a cycle");
            return Err(Error::FlowDirectionCycle { cell });
        }
        tracing::debug!(nr_boundary_exits = exits.len(), "validated flow direction");
        Ok(())
    })
}

/// Follow the flow path of every cell of `partition`.
fn summarise(
    partition: &Partition<u8>,
    shape: &gridslice::Shape,
    policy: InputPolicy<u8>,
) -> Result<BoundarySummary> {
    let (rows, cols) = (partition.shape().extent(0), partition.shape().extent(1));
    let origin = partition.origin();
    let global = |cell: usize| vec![origin[0] + cell / cols, origin[1] + cell % cols];

    let mut marks = vec![Mark::Unvisited; rows * cols];
    // Where the path of a visited cell leaves the partition, if it does.
    let mut exits: Vec<Option<Index>> = vec![None; rows * cols];
    let mut path = Vec::new();
    for start in 0..rows * cols {
        let mut cell = start;
        let exit = loop {
            match marks[cell] {
                Mark::Done => break exits[cell].clone(),
                Mark::OnPath => return Err(Error::FlowDirectionCycle { cell: global(cell) }),
                Mark::Unvisited => {}
            }
            marks[cell] = Mark::OnPath;
            path.push(cell);
            let Some(code) = policy.valid(partition.data()[cell]) else {
                break None;
            };
            let direction = FlowDirection::from_code(code).ok_or_else(|| Error::InvalidFlowDirection {
                value: code,
                cell: global(cell),
            })?;
            let (drow, dcol) = direction.offset();
            let (row, col) = ((cell / cols) as isize + drow, (cell % cols) as isize + dcol);
            let target = [origin[0] as isize + row, origin[1] as isize + col];
            if direction.is_sink() || !shape.contains_signed(&target) {
                break None;
            }
            if !(0..rows as isize).contains(&row) || !(0..cols as isize).contains(&col) {
                break Some(vec![target[0] as usize, target[1] as usize]);
            }
            cell = row as usize * cols + col as usize;
        };
        for cell in path.drain(..) {
            marks[cell] = Mark::Done;
            exits[cell] = exit.clone();
        }
    }

    let on_border = |cell: usize| {
        let (row, col) = (cell / cols, cell % cols);
        row == 0 || col == 0 || row + 1 == rows || col + 1 == cols
    };
    Ok(BoundarySummary {
        exits: (0..rows * cols)
            .filter(|&cell| on_border(cell))
            .filter_map(|cell| exits[cell].clone().map(|exit| (global(cell), exit)))
            .collect(),
    })
}

/// A cell on a cycle of the graph with edges `exits`, if any.
fn find_cycle(exits: &HashMap<Index, Index>) -> Option<Index> {
    let mut marks: HashMap<&Index, Mark> = HashMap::new();
    for start in exits.keys() {
        let mut path = Vec::new();
        let mut cell = start;
        loop {
            match marks.get(cell).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => break,
                Mark::OnPath => return Some(cell.clone()),
                Mark::Unvisited => {}
            }
            marks.insert(cell, Mark::OnPath);
            path.push(cell);
            match exits.get(cell) {
                Some(next) => cell = next,
                None => break,
            }
        }
        for cell in path {
            marks.insert(cell, Mark::Done);
        }
    }
    None
}
