/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Errors raised by gridflow operations.
//!
//! Domain and range violations are not errors: they turn into no-data
//! elements. The variants here are structural failures (bad tiling,
//! mismatched inputs, illegal flow graphs) and runtime failures
//! (failed or cancelled tasks). The type is `Clone` because a failed
//! partition is observed by every task that depends on it.

use std::time::Duration;

use gridslice::Index;
use gridslice::Shape;
use gridslice::ShapeError;
use gridslice::SliceError;

/// The type of error for gridflow operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Slice(#[from] SliceError),

    #[error("partitions do not tile {shape}: {reason}")]
    Tiling { shape: Shape, reason: String },

    #[error("shape mismatch: {left} vs {right}")]
    ShapeMismatch { left: Shape, right: Shape },

    #[error("partitioning mismatch: {reason}")]
    PartitioningMismatch { reason: String },

    #[error("invalid kernel: {reason}")]
    Kernel { reason: String },

    #[error("{op} requires arrays of rank {expected}, got rank {got}")]
    UnsupportedRank {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("flow direction contains a cycle through cell {cell:?}")]
    FlowDirectionCycle { cell: Index },

    #[error(
        "partition {partition:?} received no upstream material for {waited:?}; the flow graph does not terminate"
    )]
    NonTerminatingFlowGraph { partition: Index, waited: Duration },

    #[error("inbound channel of partition {partition:?} closed while input was still expected")]
    ChannelClosed { partition: Index },

    #[error("invalid flow direction {value} at cell {cell:?}")]
    InvalidFlowDirection { value: u8, cell: Index },

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("task for partition {partition:?} failed: {reason}")]
    TaskFailed { partition: Index, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error only records that a task was stopped
    /// because of a failure elsewhere.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for gridflow operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
