/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::Points;

/// A multidimensional index (one coordinate per dimension).
pub type Index = Vec<usize>;

/// The type of error for shape operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ShapeError {
    #[error("rank mismatch: expected {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    #[error("index {index:?} out of bounds for shape {shape}")]
    IndexOutOfBounds { index: Index, shape: Shape },

    #[error("linear index {index} out of range {volume}")]
    LinearIndexOutOfRange { index: usize, volume: usize },

    #[error("cannot parse shape `{input}`")]
    Parse { input: String },
}

/// The extents of a rank-`n` array, in row-major order (the last
/// dimension varies fastest).
///
/// A shape with a zero extent is empty: its volume is zero and
/// iterating over it yields no points.
///
/// ```
/// # use gridslice::Shape;
/// let shape = Shape::new(vec![3, 4]);
/// assert_eq!(shape.rank(), 2);
/// assert_eq!(shape.volume(), 12);
/// assert_eq!(shape.strides(), vec![4, 1]);
/// assert_eq!(shape.linear_index(&[2, 1]).unwrap(), 9);
/// assert_eq!(shape.coordinates(9).unwrap(), vec![2, 1]);
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    extents: Vec<usize>,
}

impl Shape {
    pub fn new(extents: impl Into<Vec<usize>>) -> Self {
        Self {
            extents: extents.into(),
        }
    }

    /// The zero-rank shape, containing a single element.
    pub fn scalar() -> Self {
        Self { extents: vec![] }
    }

    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn extent(&self, dim: usize) -> usize {
        self.extents[dim]
    }

    /// Number of elements.
    pub fn volume(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// Row-major strides for a dense buffer of this shape.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.rank()];
        for dim in (0..self.rank().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * self.extents[dim + 1];
        }
        strides
    }

    /// Whether the index lies within the shape.
    pub fn contains(&self, index: &[usize]) -> bool {
        index.len() == self.rank() && index.iter().zip(&self.extents).all(|(i, e)| i < e)
    }

    /// Whether the signed index lies within the shape.
    pub fn contains_signed(&self, index: &[isize]) -> bool {
        index.len() == self.rank()
            && index
                .iter()
                .zip(&self.extents)
                .all(|(&i, &e)| i >= 0 && (i as usize) < e)
    }

    /// The row-major linear index of `index`.
    pub fn linear_index(&self, index: &[usize]) -> Result<usize, ShapeError> {
        if index.len() != self.rank() {
            return Err(ShapeError::RankMismatch {
                expected: self.rank(),
                got: index.len(),
            });
        }
        if !self.contains(index) {
            return Err(ShapeError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.clone(),
            });
        }
        Ok(index
            .iter()
            .zip(&self.extents)
            .fold(0, |acc, (i, extent)| acc * extent + i))
    }

    /// The inverse of [`Shape::linear_index`].
    pub fn coordinates(&self, linear: usize) -> Result<Index, ShapeError> {
        let volume = self.volume();
        if linear >= volume {
            return Err(ShapeError::LinearIndexOutOfRange {
                index: linear,
                volume,
            });
        }
        let mut rest = linear;
        let mut index = vec![0; self.rank()];
        for (dim, extent) in self.extents.iter().enumerate().rev() {
            index[dim] = rest % extent;
            rest /= extent;
        }
        Ok(index)
    }

    /// Iterate over all indices of this shape in row-major order.
    pub fn points(&self) -> Points {
        Points::new(self.extents.clone())
    }

    /// Check that `other` has the same rank as `self`.
    pub fn check_rank(&self, other: &[usize]) -> Result<(), ShapeError> {
        if other.len() != self.rank() {
            return Err(ShapeError::RankMismatch {
                expected: self.rank(),
                got: other.len(),
            });
        }
        Ok(())
    }
}

impl From<Vec<usize>> for Shape {
    fn from(extents: Vec<usize>) -> Self {
        Self::new(extents)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(extents: [usize; N]) -> Self {
        Self::new(extents.to_vec())
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({})", self)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extents: Vec<String> = self.extents.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", extents.join("x"))
    }
}

/// Parses shapes written as `"500x400"` (braces optional).
impl FromStr for Shape {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('{').trim_end_matches('}');
        if trimmed.is_empty() {
            return Ok(Shape::scalar());
        }
        trimmed
            .split(['x', ','])
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(Shape::new)
            .map_err(|_| ShapeError::Parse {
                input: s.to_string(),
            })
    }
}

/// Construct a [`Shape`] from its extents.
///
/// ```
/// let s = gridslice::shape![4, 5];
/// assert_eq!(s.extents(), &[4, 5]);
/// ```
#[macro_export]
macro_rules! shape {
    ( $( $extent:expr ),* $(,)? ) => {
        $crate::Shape::new(vec![ $( $extent ),* ])
    };
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::strategy::gen_shape;

    #[test]
    fn test_basic() {
        let s = shape![2, 3, 4];
        assert_eq!(s.rank(), 3);
        assert_eq!(s.volume(), 24);
        assert_eq!(s.strides(), vec![12, 4, 1]);
        assert!(s.contains(&[1, 2, 3]));
        assert!(!s.contains(&[1, 3, 3]));
        assert!(!s.contains(&[1, 2]));
    }

    #[test]
    fn test_linear_index_errors() {
        let s = shape![2, 3];
        assert_eq!(
            s.linear_index(&[1]),
            Err(ShapeError::RankMismatch {
                expected: 2,
                got: 1
            })
        );
        assert!(matches!(
            s.linear_index(&[2, 0]),
            Err(ShapeError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            s.coordinates(6),
            Err(ShapeError::LinearIndexOutOfRange {
                index: 6,
                volume: 6
            })
        ));
    }

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert_eq!(s.volume(), 1);
        assert_eq!(s.linear_index(&[]).unwrap(), 0);
        assert_eq!(s.points().count(), 1);
    }

    #[test]
    fn test_empty() {
        let s = shape![0, 5];
        assert!(s.is_empty());
        assert_eq!(s.points().count(), 0);
    }

    #[test]
    fn test_parse_and_display() {
        let s: Shape = "500x400".parse().unwrap();
        assert_eq!(s, shape![500, 400]);
        assert_eq!(s.to_string(), "{500x400}");
        assert_eq!(s.to_string().parse::<Shape>().unwrap(), s);
        assert!("5xq".parse::<Shape>().is_err());
    }

    proptest! {
        #[test]
        fn linear_index_roundtrips_through_points(shape in gen_shape(4, 6)) {
            for (linear, point) in shape.points().enumerate() {
                prop_assert_eq!(shape.linear_index(&point).unwrap(), linear);
                prop_assert_eq!(shape.coordinates(linear).unwrap(), point);
            }
        }
    }
}
