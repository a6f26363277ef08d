/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Routing of material over a flow direction network.
//!
//! A flow direction array holds, for every cell, the [`FlowDirection`]
//! code of the neighbour it drains into. The cells and their downstream
//! neighbours form a forest whose roots are sinks and cells draining
//! out of the array.
//!
//! Accumulation operations visit cells in topological order: a cell is
//! visited once all of its upstream cells are. Each partition task
//! builds the flow graph of its own cells from a window with a one cell
//! halo. It visits the cells that are ready, and sends the material
//! leaving the partition to the task owning the downstream cell. The
//! tasks of an operation run concurrently and wait only on messages
//! from their neighbours, so routing proceeds in waves through the
//! partitions without a global barrier.
//!
//! A cycle in the flow direction would make tasks wait forever. Cycles
//! local to a partition are detected as soon as no cell is ready. When
//! [`Config::validate_flow_direction`](crate::config::Config::validate_flow_direction)
//! is set, every operation first runs [`validate_flow_direction`].
//! Otherwise a task waiting longer than the channel receive timeout
//! fails with [`Error::NonTerminatingFlowGraph`](crate::error::Error).
//!
//! No-data in the flow direction or the material makes the cell, and
//! every cell downstream of it, no-data.

mod accumulate;
pub(crate) mod communicator;
mod flow_direction;
mod kinematic;
mod neighbours;
pub(crate) mod router;
mod validate;

pub use accumulate::accu;
pub use accumulate::accu_capacity;
pub use accumulate::accu_capacity_with;
pub use accumulate::accu_fraction;
pub use accumulate::accu_fraction_with;
pub use accumulate::accu_threshold;
pub use accumulate::accu_threshold_with;
pub use accumulate::accu_with;
pub use flow_direction::FlowDirection;
pub use kinematic::kinematic_wave;
pub use kinematic::kinematic_wave_with;
pub use neighbours::downstream;
pub use neighbours::downstream_with;
pub use neighbours::inflow_count;
pub use neighbours::inflow_count_with;
pub use neighbours::upstream;
pub use neighbours::upstream_with;
pub use validate::validate_flow_direction;
pub use validate::validate_flow_direction_with;
