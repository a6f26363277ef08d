/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use itertools::izip;
use serde::Deserialize;
use serde::Serialize;

use crate::Index;
use crate::Points;
use crate::Shape;
use crate::SliceError;

/// A hyperslab selects a regular, possibly strided, sub-region of an
/// array: along every dimension `d` it covers the coordinates
/// `start[d] + k * stride[d]` for `k ∈ 0..count[d]`.
///
/// Hyperslabs address partition extents within the global array,
/// halo strips around partitions, and kernel windows.
///
/// ```
/// # use gridslice::Hyperslab;
/// let slab = Hyperslab::contiguous(vec![2, 3], vec![2, 2]);
/// assert_eq!(slab.volume(), 4);
/// assert_eq!(slab.end(), vec![4, 5]);
/// assert!(slab.contains(&[3, 4]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hyperslab {
    start: Vec<usize>,
    count: Vec<usize>,
    stride: Vec<usize>,
}

impl Hyperslab {
    /// Create a new hyperslab. All three vectors must have the same
    /// length and strides must be positive.
    pub fn new(start: Vec<usize>, count: Vec<usize>, stride: Vec<usize>) -> Result<Self, SliceError> {
        if count.len() != start.len() || stride.len() != start.len() {
            return Err(SliceError::InvalidDims {
                expected: start.len(),
                got: count.len().max(stride.len()),
            });
        }
        if let Some(dim) = stride.iter().position(|&s| s == 0) {
            return Err(SliceError::ZeroStride { dim });
        }
        Ok(Self {
            start,
            count,
            stride,
        })
    }

    /// A unit-stride hyperslab.
    pub fn contiguous(start: Vec<usize>, count: Vec<usize>) -> Self {
        let stride = vec![1; start.len()];
        debug_assert_eq!(start.len(), count.len());
        Self {
            start,
            count,
            stride,
        }
    }

    /// The hyperslab covering all of `shape`.
    pub fn of(shape: &Shape) -> Self {
        Self::contiguous(vec![0; shape.rank()], shape.extents().to_vec())
    }

    pub fn rank(&self) -> usize {
        self.start.len()
    }

    pub fn start(&self) -> &[usize] {
        &self.start
    }

    pub fn count(&self) -> &[usize] {
        &self.count
    }

    pub fn stride(&self) -> &[usize] {
        &self.stride
    }

    /// The shape of the selected region.
    pub fn shape(&self) -> Shape {
        Shape::new(self.count.clone())
    }

    pub fn volume(&self) -> usize {
        self.count.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    pub fn is_contiguous(&self) -> bool {
        self.stride.iter().all(|&s| s == 1)
    }

    /// One past the last selected coordinate, per dimension.
    pub fn end(&self) -> Vec<usize> {
        izip!(&self.start, &self.count, &self.stride)
            .map(|(start, count, stride)| match count {
                0 => *start,
                n => start + (n - 1) * stride + 1,
            })
            .collect()
    }

    pub fn contains(&self, index: &[usize]) -> bool {
        index.len() == self.rank()
            && izip!(index, &self.start, &self.count, &self.stride).all(
                |(&i, &start, &count, &stride)| {
                    i >= start && (i - start) % stride == 0 && (i - start) / stride < count
                },
            )
    }

    /// Whether the hyperslab lies entirely within `shape`.
    pub fn is_within(&self, shape: &Shape) -> bool {
        self.rank() == shape.rank()
            && (self.is_empty()
                || self
                    .end()
                    .iter()
                    .zip(shape.extents())
                    .all(|(end, extent)| end <= extent))
    }

    /// The intersection of two contiguous hyperslabs, or `None` if they
    /// are disjoint.
    pub fn intersection(&self, other: &Hyperslab) -> Result<Option<Hyperslab>, SliceError> {
        if self.rank() != other.rank() {
            return Err(SliceError::InvalidDims {
                expected: self.rank(),
                got: other.rank(),
            });
        }
        if !self.is_contiguous() || !other.is_contiguous() {
            return Err(SliceError::NonContiguous);
        }
        let mut start = Vec::with_capacity(self.rank());
        let mut count = Vec::with_capacity(self.rank());
        for (a0, a1, b0, b1) in izip!(&self.start, self.end(), &other.start, other.end()) {
            let lo = *a0.max(b0);
            let hi = a1.min(b1);
            if hi <= lo {
                return Ok(None);
            }
            start.push(lo);
            count.push(hi - lo);
        }
        Ok(Some(Hyperslab::contiguous(start, count)))
    }

    /// Express this hyperslab relative to `origin`, which must not lie
    /// beyond its start in any dimension.
    pub fn relative_to(&self, origin: &[usize]) -> Result<Hyperslab, SliceError> {
        if origin.len() != self.rank() {
            return Err(SliceError::InvalidDims {
                expected: self.rank(),
                got: origin.len(),
            });
        }
        let start = self
            .start
            .iter()
            .zip(origin)
            .map(|(s, o)| s.checked_sub(*o).ok_or(SliceError::ValueNotInSlice { value: *s }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Hyperslab {
            start,
            count: self.count.clone(),
            stride: self.stride.clone(),
        })
    }

    /// Shift the hyperslab by `offset`.
    pub fn translated(&self, offset: &[usize]) -> Hyperslab {
        Hyperslab {
            start: self.start.iter().zip(offset).map(|(s, o)| s + o).collect(),
            count: self.count.clone(),
            stride: self.stride.clone(),
        }
    }

    /// Grow a contiguous hyperslab by `radius` in every direction,
    /// clipped to `bounds`.
    pub fn grown(&self, radius: &[usize], bounds: &Shape) -> Hyperslab {
        let end = self.end();
        let (start, count) = izip!(&self.start, end, radius, bounds.extents())
            .map(|(&start, end, &radius, &extent)| {
                let lo = start.saturating_sub(radius);
                let hi = (end + radius).min(extent);
                (lo, hi.saturating_sub(lo))
            })
            .unzip();
        Hyperslab::contiguous(start, count)
    }

    /// Iterate over the absolute indices selected by this hyperslab.
    pub fn points(&self) -> impl Iterator<Item = Index> + '_ {
        Points::new(self.count.clone()).map(move |point| {
            izip!(point, &self.start, &self.stride)
                .map(|(k, start, stride)| start + k * stride)
                .collect()
        })
    }
}
