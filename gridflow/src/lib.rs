/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Gridflow is an engine for computations on partitioned raster arrays.
//!
//! An array is cut into rectangular partitions, each owned by one
//! locality of a [`Runtime`]. Operations spawn one task per output
//! partition and return immediately; every partition of the result is
//! a shared future, so chained operations pipeline without barriers.
//!
//! The operation families are:
//!
//! - [`local`]: elementwise operations;
//! - [`focal`]: neighbourhood operations, exchanging halos between
//!   partitions;
//! - [`zonal`]: aggregation keyed by a zone array;
//! - [`global`]: reductions to a [`Scalar`];
//! - [`routing`]: propagation of material along a flow direction
//!   network that crosses partition boundaries;
//! - [`route`]: serial routes through the array.
//!
//! Every operation `op` uses default [`policy`] settings; `op_with`
//! takes the policies explicitly.

pub mod array;
pub mod config;
pub mod create;
pub mod element;
pub mod error;
pub mod focal;
pub mod global;
pub mod kernel;
pub mod kind;
pub mod local;
pub mod partition;
pub mod policy;
pub mod route;
pub mod routing;
pub mod runtime;
pub mod scalar;
pub mod sync;
pub mod telemetry;
pub mod test_utils;
pub mod tiling;
mod window;
pub mod zonal;

pub use array::PartitionedArray;
pub use config::Config;
pub use create::cell_index;
pub use create::create_partitioned_array;
pub use create::uniform;
pub use element::Element;
pub use element::ElementType;
pub use element::FloatElement;
pub use error::Error;
pub use error::Result;
pub use kernel::Kernel;
pub use kind::AnyArray;
pub use kind::AnyBuffer;
pub use partition::Partition;
pub use route::SerialRoute;
pub use routing::FlowDirection;
pub use runtime::Placement;
pub use runtime::Runtime;
pub use scalar::Operand;
pub use scalar::Scalar;
pub use telemetry::initialize_logging;
pub use tiling::Tiling;
