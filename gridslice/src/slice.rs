/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::iter::zip;

use serde::Deserialize;
use serde::Serialize;

use crate::Hyperslab;
use crate::Points;
use crate::Shape;

/// The type of error for slice operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SliceError {
    #[error("invalid dims: expected {expected}, got {got}")]
    InvalidDims { expected: usize, got: usize },

    #[error("stride in dimension {dim} is zero")]
    ZeroStride { dim: usize },

    #[error("index {index} out of range {total}")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("value {value} not in slice")]
    ValueNotInSlice { value: usize },

    #[error("noncontiguous hyperslab")]
    NonContiguous,

    #[error("buffer of length {len} too short for slice ending at {end}")]
    BufferTooShort { len: usize, end: usize },

    #[error("expected {expected} values, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// A strided view into the flat, row-major buffer of an
/// n-dimensional array.
///
/// Each coordinate maps to a buffer location through
/// ```text
/// location = offset + ∑ iₖ × strides[k]
/// ```
/// Partition buffers are dense row-major blocks; a `Slice` addresses a
/// sub-block of such a buffer without copying (for example the strip
/// of cells that a neighbouring partition needs as halo).
///
/// ```
/// # use gridslice::Slice;
/// # use gridslice::Hyperslab;
/// let dense = Slice::new_row_major(vec![4, 5]);
/// assert!(dense.iter().eq(0..20));
///
/// let block = dense
///     .hyperslab(&Hyperslab::contiguous(vec![1, 2], vec![2, 2]))
///     .unwrap();
/// assert_eq!(block.iter().collect::<Vec<_>>(), vec![7, 8, 12, 13]);
/// ```
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Slice {
    offset: usize,
    sizes: Vec<usize>,
    strides: Vec<usize>,
}

impl Slice {
    /// Create a new slice with the provided offset, sizes, and
    /// strides. Sizes and strides must have the same length.
    pub fn new(offset: usize, sizes: Vec<usize>, strides: Vec<usize>) -> Result<Self, SliceError> {
        if sizes.len() != strides.len() {
            return Err(SliceError::InvalidDims {
                expected: sizes.len(),
                got: strides.len(),
            });
        }
        Ok(Slice {
            offset,
            sizes,
            strides,
        })
    }

    /// A dense slice of the given sizes in row-major order.
    pub fn new_row_major(sizes: impl Into<Vec<usize>>) -> Self {
        let sizes = sizes.into();
        let strides = Shape::new(sizes.clone()).strides();
        Self {
            offset: 0,
            sizes,
            strides,
        }
    }

    pub fn num_dim(&self) -> usize {
        self.sizes.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn len(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the slice covers a single unbroken run of the buffer.
    pub fn is_contiguous(&self) -> bool {
        let mut expected_stride = 1;
        for (stride, size) in zip(self.strides.iter(), self.sizes.iter()).rev() {
            if *size != 1 && *stride != expected_stride {
                return false;
            }
            expected_stride *= *size
        }
        true
    }

    /// Return the buffer location of the provided coordinates.
    pub fn location(&self, coord: &[usize]) -> Result<usize, SliceError> {
        if coord.len() != self.sizes.len() {
            return Err(SliceError::InvalidDims {
                expected: self.sizes.len(),
                got: coord.len(),
            });
        }
        let mut location = self.offset;
        for (&i, &size, &stride) in itertools::izip!(coord, &self.sizes, &self.strides) {
            if i >= size {
                return Err(SliceError::IndexOutOfRange {
                    index: i,
                    total: size,
                });
            }
            location += i * stride;
        }
        Ok(location)
    }

    /// The location of the `index`th element in row-major iteration
    /// order.
    pub fn get(&self, index: usize) -> Result<usize, SliceError> {
        let total = self.len();
        if index >= total {
            return Err(SliceError::IndexOutOfRange { index, total });
        }
        let mut rest = index;
        let mut location = self.offset;
        for (&size, &stride) in zip(&self.sizes, &self.strides).rev() {
            location += (rest % size) * stride;
            rest /= size;
        }
        Ok(location)
    }

    /// One past the largest location addressed by this slice.
    pub fn end(&self) -> usize {
        if self.is_empty() {
            return self.offset;
        }
        self.offset
            + zip(&self.sizes, &self.strides)
                .map(|(size, stride)| (size - 1) * stride)
                .sum::<usize>()
            + 1
    }

    /// Iterate over buffer locations in row-major coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        Points::new(self.sizes.clone()).map(move |point| {
            self.offset
                + zip(&point, &self.strides)
                    .map(|(i, stride)| i * stride)
                    .sum::<usize>()
        })
    }

    /// Restrict the view to the region selected by `slab`, which is
    /// expressed in this slice's coordinates. The result is indexed
    /// from zero.
    pub fn hyperslab(&self, slab: &Hyperslab) -> Result<Slice, SliceError> {
        if slab.rank() != self.num_dim() {
            return Err(SliceError::InvalidDims {
                expected: self.num_dim(),
                got: slab.rank(),
            });
        }
        if !slab.is_within(&Shape::new(self.sizes.clone())) {
            return Err(SliceError::IndexOutOfRange {
                index: slab.end().into_iter().max().unwrap_or(0),
                total: self.sizes.iter().copied().max().unwrap_or(0),
            });
        }
        let offset = self.offset
            + zip(slab.start(), &self.strides)
                .map(|(start, stride)| start * stride)
                .sum::<usize>();
        let strides = zip(slab.stride(), &self.strides)
            .map(|(step, stride)| step * stride)
            .collect();
        Slice::new(offset, slab.count().to_vec(), strides)
    }

    /// Copy the elements addressed by this slice out of `buffer`, in
    /// row-major order.
    pub fn gather<T: Clone>(&self, buffer: &[T]) -> Result<Vec<T>, SliceError> {
        self.check_buffer(buffer.len())?;
        Ok(self.iter().map(|location| buffer[location].clone()).collect())
    }

    /// Write `values` (in row-major order) into the elements of
    /// `buffer` addressed by this slice.
    pub fn scatter<T: Clone>(&self, buffer: &mut [T], values: &[T]) -> Result<(), SliceError> {
        self.check_buffer(buffer.len())?;
        if values.len() != self.len() {
            return Err(SliceError::LengthMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        for (location, value) in zip(self.iter(), values) {
            buffer[location] = value.clone();
        }
        Ok(())
    }

    fn check_buffer(&self, len: usize) -> Result<(), SliceError> {
        let end = self.end();
        if end > len {
            return Err(SliceError::BufferTooShort { len, end });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::strategy::gen_shape_and_slab;

    #[test]
    fn test_row_major() {
        let s = Slice::new_row_major(vec![2, 3, 4]);
        assert_eq!(s.strides(), &[12, 4, 1]);
        assert!(s.is_contiguous());
        assert_eq!(s.location(&[1, 2, 3]).unwrap(), 23);
        assert_eq!(s.get(23).unwrap(), 23);
        assert!(s.location(&[2, 0, 0]).is_err());
        assert_eq!(s.end(), 24);
    }

    #[test]
    fn test_strided_hyperslab() {
        let s = Slice::new_row_major(vec![4, 6]);
        let slab = Hyperslab::new(vec![0, 1], vec![2, 3], vec![2, 2]).unwrap();
        let sub = s.hyperslab(&slab).unwrap();
        assert!(!sub.is_contiguous());
        assert_eq!(sub.iter().collect::<Vec<_>>(), vec![1, 3, 5, 13, 15, 17]);
        assert_eq!(sub.location(&[1, 2]).unwrap(), 17);
    }

    #[test]
    fn test_hyperslab_out_of_range() {
        let s = Slice::new_row_major(vec![4, 6]);
        let slab = Hyperslab::contiguous(vec![3, 0], vec![2, 6]);
        assert!(s.hyperslab(&slab).is_err());
    }

    #[test]
    fn test_gather_scatter() {
        let s = Slice::new_row_major(vec![3, 3]);
        let border = s
            .hyperslab(&Hyperslab::contiguous(vec![0, 2], vec![3, 1]))
            .unwrap();
        let buffer: Vec<i32> = (0..9).collect();
        assert_eq!(border.gather(&buffer).unwrap(), vec![2, 5, 8]);

        let mut target = vec![0; 9];
        border.scatter(&mut target, &[7, 7, 7]).unwrap();
        assert_eq!(target, vec![0, 0, 7, 0, 0, 7, 0, 0, 7]);
        assert!(matches!(
            border.scatter(&mut target, &[1]),
            Err(SliceError::LengthMismatch { .. })
        ));
        assert!(matches!(
            border.gather(&buffer[..4]),
            Err(SliceError::BufferTooShort { .. })
        ));
    }

    proptest! {
        #[test]
        fn hyperslab_agrees_with_points((shape, slab) in gen_shape_and_slab(3, 8)) {
            let dense = Slice::new_row_major(shape.extents().to_vec());
            let sub = dense.hyperslab(&slab).unwrap();
            let expected: Vec<usize> = slab
                .points()
                .map(|point| shape.linear_index(&point).unwrap())
                .collect();
            prop_assert_eq!(sub.iter().collect::<Vec<_>>(), expected);
        }
    }
}
