/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Arrays whose element type is only known at run time, as found at
//! the boundary with persistence and file format adapters.

// EnumAsInner generates code that triggers a false positive
// unused_assignments lint.
#![allow(unused_assignments)]

use enum_as_inner::EnumAsInner;
use gridslice::Shape;
use serde::Deserialize;
use serde::Serialize;

use crate::array::PartitionedArray;
use crate::element::ElementType;
use crate::error::Result;
use crate::runtime::Runtime;

/// A partitioned array of any supported element type.
#[derive(Clone, Debug, EnumAsInner)]
pub enum AnyArray {
    U8(PartitionedArray<u8>),
    U32(PartitionedArray<u32>),
    U64(PartitionedArray<u64>),
    I32(PartitionedArray<i32>),
    I64(PartitionedArray<i64>),
    F32(PartitionedArray<f32>),
    F64(PartitionedArray<f64>),
}

/// A row-major buffer of any supported element type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, EnumAsInner)]
#[serde(tag = "element_type", content = "values", rename_all = "lowercase")]
pub enum AnyBuffer {
    U8(Vec<u8>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! dispatch {
    ($value:expr, $binding:ident => $body:expr) => {
        match $value {
            AnyArray::U8($binding) => $body,
            AnyArray::U32($binding) => $body,
            AnyArray::U64($binding) => $body,
            AnyArray::I32($binding) => $body,
            AnyArray::I64($binding) => $body,
            AnyArray::F32($binding) => $body,
            AnyArray::F64($binding) => $body,
        }
    };
}

macro_rules! any_array_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<PartitionedArray<$ty>> for AnyArray {
            fn from(array: PartitionedArray<$ty>) -> Self {
                AnyArray::$variant(array)
            }
        }

        impl From<Vec<$ty>> for AnyBuffer {
            fn from(values: Vec<$ty>) -> Self {
                AnyBuffer::$variant(values)
            }
        }
    )*};
}

any_array_from!(
    u8 => U8,
    u32 => U32,
    u64 => U64,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

impl AnyArray {
    /// An array over a typed buffer.
    pub fn from_buffer(
        runtime: &Runtime,
        shape: impl Into<Shape>,
        partition_shape: impl Into<Shape>,
        buffer: AnyBuffer,
    ) -> Result<Self> {
        let (shape, partition_shape) = (shape.into(), partition_shape.into());
        Ok(match buffer {
            AnyBuffer::U8(values) => {
                PartitionedArray::from_buffer(runtime, shape, partition_shape, values)?.into()
            }
            AnyBuffer::U32(values) => {
                PartitionedArray::from_buffer(runtime, shape, partition_shape, values)?.into()
            }
            AnyBuffer::U64(values) => {
                PartitionedArray::from_buffer(runtime, shape, partition_shape, values)?.into()
            }
            AnyBuffer::I32(values) => {
                PartitionedArray::from_buffer(runtime, shape, partition_shape, values)?.into()
            }
            AnyBuffer::I64(values) => {
                PartitionedArray::from_buffer(runtime, shape, partition_shape, values)?.into()
            }
            AnyBuffer::F32(values) => {
                PartitionedArray::from_buffer(runtime, shape, partition_shape, values)?.into()
            }
            AnyBuffer::F64(values) => {
                PartitionedArray::from_buffer(runtime, shape, partition_shape, values)?.into()
            }
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            AnyArray::U8(_) => ElementType::U8,
            AnyArray::U32(_) => ElementType::U32,
            AnyArray::U64(_) => ElementType::U64,
            AnyArray::I32(_) => ElementType::I32,
            AnyArray::I64(_) => ElementType::I64,
            AnyArray::F32(_) => ElementType::F32,
            AnyArray::F64(_) => ElementType::F64,
        }
    }

    pub fn shape(&self) -> &Shape {
        dispatch!(self, array => array.shape())
    }

    pub async fn wait(&self) -> Result<()> {
        dispatch!(self, array => array.wait().await)
    }

    /// Wait for the array and copy it into a typed buffer.
    pub async fn to_buffer(&self) -> Result<AnyBuffer> {
        dispatch!(self, array => Ok(array.to_buffer().await?.into()))
    }
}

impl AnyBuffer {
    pub fn element_type(&self) -> ElementType {
        match self {
            AnyBuffer::U8(_) => ElementType::U8,
            AnyBuffer::U32(_) => ElementType::U32,
            AnyBuffer::U64(_) => ElementType::U64,
            AnyBuffer::I32(_) => ElementType::I32,
            AnyBuffer::I64(_) => ElementType::I64,
            AnyBuffer::F32(_) => ElementType::F32,
            AnyBuffer::F64(_) => ElementType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnyBuffer::U8(values) => values.len(),
            AnyBuffer::U32(values) => values.len(),
            AnyBuffer::U64(values) => values.len(),
            AnyBuffer::I32(values) => values.len(),
            AnyBuffer::I64(values) => values.len(),
            AnyBuffer::F32(values) => values.len(),
            AnyBuffer::F64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
