/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Index arithmetic for dense n-dimensional arrays.
//!
//! Provides [`Shape`] (extents and row-major linearization),
//! [`Hyperslab`] (a regular sub-region of an array) and [`Slice`] (a
//! strided view into a flat buffer). The crate has no knowledge of
//! partitioning or element types; those live in `gridflow`.

mod hyperslab;
mod points;
mod shape;
mod slice;

/// A regular, possibly strided, sub-region of an array.
pub use hyperslab::Hyperslab;
/// Row-major iteration over all indices of a shape.
pub use points::Points;
pub use shape::Index;
/// Extents of an n-dimensional array.
pub use shape::Shape;
pub use shape::ShapeError;
/// Strided view into a flat buffer.
pub use slice::Slice;
pub use slice::SliceError;

/// Property-based generators for randomized test input.
#[cfg(test)]
pub mod strategy;
