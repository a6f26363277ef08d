/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Kernels for focal operations.

use gridslice::Shape;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// A dense array of weights with odd extents, centred on the cell a
/// focal operation computes. A weight of zero excludes a cell from the
/// neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    shape: Shape,
    weights: Vec<f64>,
}

impl Kernel {
    pub fn new(shape: impl Into<Shape>, weights: Vec<f64>) -> Result<Self> {
        let shape = shape.into();
        if shape.rank() == 0 {
            return Err(Error::Kernel {
                reason: "a kernel has at least one dimension".to_string(),
            });
        }
        if let Some(extent) = shape.extents().iter().find(|&&e| e % 2 == 0) {
            return Err(Error::Kernel {
                reason: format!("kernel {} has even extent {}", shape, extent),
            });
        }
        if weights.len() != shape.volume() {
            return Err(Error::Kernel {
                reason: format!(
                    "kernel {} needs {} weights, got {}",
                    shape,
                    shape.volume(),
                    weights.len()
                ),
            });
        }
        Ok(Self { shape, weights })
    }

    /// A square kernel of `2 * radius + 1` cells along both
    /// dimensions, every weight set to `weight`.
    pub fn box_kernel(radius: usize, weight: f64) -> Self {
        let size = 2 * radius + 1;
        Self {
            shape: Shape::from([size, size]),
            weights: vec![weight; size * size],
        }
    }

    /// A square kernel of `2 * radius + 1` cells along both
    /// dimensions: cells whose centre lies within `radius` of the
    /// kernel centre get `inside`, the others `outside`.
    pub fn circle(radius: usize, inside: f64, outside: f64) -> Self {
        let size = 2 * radius + 1;
        let r = radius as isize;
        let weights = (-r..=r)
            .flat_map(|dy| {
                (-r..=r).map(move |dx| {
                    if dy * dy + dx * dx <= r * r {
                        inside
                    } else {
                        outside
                    }
                })
            })
            .collect();
        Self {
            shape: Shape::from([size, size]),
            weights,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Per dimension, the number of cells between the centre and the
    /// kernel border.
    pub fn radius(&self) -> Vec<usize> {
        self.shape.extents().iter().map(|e| (e - 1) / 2).collect()
    }

    /// The weights, each with its offset from the centre, rank 2.
    pub(crate) fn offsets(&self) -> impl Iterator<Item = (isize, isize, f64)> + '_ {
        let radius = self.radius();
        let (ry, rx) = (radius[0] as isize, radius[1] as isize);
        let width = self.shape.extent(1);
        self.weights.iter().enumerate().map(move |(i, &w)| {
            (
                (i / width) as isize - ry,
                (i % width) as isize - rx,
                w,
            )
        })
    }
}
