/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

#![deny(missing_docs)]

//! Algebraic structures for order-independent reduction.
//!
//! Zonal and global operations reduce every partition to a partial
//! aggregate and then merge the partials in whatever order they
//! become ready. That is only correct when the merge is associative
//! and commutative, so the aggregates here are
//! [`CommutativeMonoid`]s.
//!
//! # Quick Start
//!
//! ```rust
//! use algebra::Monoid;
//! use algebra::Semigroup;
//! use algebra::Sum;
//!
//! let partials = vec![Sum(3), Sum(4), Sum(5)];
//! assert_eq!(Sum::concat(partials), Sum(12));
//! assert_eq!(Sum(1).combine(&Sum::empty()), Sum(1));
//! ```
//!
//! # Provided Types
//!
//! - [`Sum<T>`]: numeric sum, identity zero.
//! - [`Count`]: number of observations.
//! - [`Min<T>`] / [`Max<T>`]: optional extremum, identity `None`.
//! - [`Mean`]: running sum and count.
//! - [`Histogram<K>`]: occurrence counts, with a majority query.
//! - [`Distinct<K>`]: set of distinct keys.
//! - [`ZoneMap<K, V>`]: pointwise map of aggregates keyed by zone.
//!
//! Floating-point merges are associative only up to rounding:
//! different merge orders may produce results that differ in the
//! last bits.

mod accumulators;
mod zone_map;

pub use accumulators::Count;
pub use accumulators::Distinct;
pub use accumulators::Histogram;
pub use accumulators::Max;
pub use accumulators::Mean;
pub use accumulators::Min;
pub use accumulators::Sum;
pub use zone_map::ZoneMap;

/// A **semigroup**: a type with an associative binary operation.
///
/// Laws (not enforced by type system):
///
/// - **Associative**:
///   `a.combine(b).combine(c) == a.combine(b.combine(c))`
pub trait Semigroup: Sized {
    /// Combine two elements associatively.
    fn combine(&self, other: &Self) -> Self;

    /// In-place combine.
    fn combine_assign(&mut self, other: &Self) {
        *self = self.combine(other);
    }
}

/// A **monoid**: a semigroup with an identity element.
///
/// Laws (not enforced by type system):
///
/// - **Left identity**: `empty().combine(a) == a`
/// - **Right identity**: `a.combine(empty()) == a`
pub trait Monoid: Semigroup {
    /// The identity element.
    fn empty() -> Self;

    /// Combine all elements of an iterator, starting from
    /// [`Monoid::empty`].
    fn concat<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter().fold(Self::empty(), |mut acc, x| {
            acc.combine_assign(&x);
            acc
        })
    }
}

/// A monoid whose operation is commutative, so partial results may be
/// merged in any order.
///
/// Additional law:
/// - **Commutative**: `a.combine(b) == b.combine(a)`
pub trait CommutativeMonoid: Monoid {}
