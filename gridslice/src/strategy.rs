/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for [`Shape`] and [`Hyperslab`].
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::Hyperslab;
use crate::Shape;

/// Generates a random [`Shape`] of rank `1..=max_rank` with every
/// extent in `1..=max_extent`.
pub fn gen_shape(max_rank: usize, max_extent: usize) -> impl Strategy<Value = Shape> {
    prop::collection::vec(1..=max_extent, 1..=max_rank).prop_map(Shape::new)
}

/// Generates a pair `(shape, slab)` where `slab` is a non-empty,
/// possibly strided hyperslab lying within `shape`.
pub fn gen_shape_and_slab(
    max_rank: usize,
    max_extent: usize,
) -> impl Strategy<Value = (Shape, Hyperslab)> {
    gen_shape(max_rank, max_extent).prop_flat_map(|shape| {
        let dims: Vec<_> = shape
            .extents()
            .iter()
            .map(|&extent| {
                (0..extent, 1..=3usize).prop_flat_map(move |(start, stride)| {
                    let max_count = (extent - 1 - start) / stride + 1;
                    (1..=max_count).prop_map(move |count| (start, count, stride))
                })
            })
            .collect();
        (Just(shape), dims).prop_map(|(shape, dims)| {
            let (start, count, stride) = dims.into_iter().fold(
                (vec![], vec![], vec![]),
                |(mut start, mut count, mut stride), (s, c, t)| {
                    start.push(s);
                    count.push(c);
                    stride.push(t);
                    (start, count, stride)
                },
            );
            let slab = Hyperslab::new(start, count, stride)
                .expect("generated hyperslab has matching ranks and positive strides");
            (shape, slab)
        })
    })
}
