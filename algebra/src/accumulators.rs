/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Concrete accumulators: Sum, Count, Min, Max, Mean, Histogram,
//! Distinct.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use super::CommutativeMonoid;
use super::Monoid;
use super::Semigroup;

// Sum<T>: combine = +

/// Numeric sum.
///
/// # Example
/// ```
/// use algebra::Semigroup;
/// use algebra::Sum;
///
/// assert_eq!(Sum(2.5).combine(&Sum(1.5)), Sum(4.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Sum<T>(pub T);

impl<T: num_traits::Zero + Clone> Semigroup for Sum<T> {
    fn combine(&self, other: &Self) -> Self {
        Sum(self.0.clone() + other.0.clone())
    }
}

impl<T: num_traits::Zero + Clone> Monoid for Sum<T> {
    fn empty() -> Self {
        Sum(T::zero())
    }
}

impl<T: num_traits::Zero + Clone> CommutativeMonoid for Sum<T> {}

impl<T: num_traits::Zero + Clone> Default for Sum<T> {
    fn default() -> Self {
        Self::empty()
    }
}

// Count: combine = +

/// Number of observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Count(pub u64);

impl Count {
    /// Record one observation.
    pub fn observe(&mut self) {
        self.0 += 1;
    }
}

impl Semigroup for Count {
    fn combine(&self, other: &Self) -> Self {
        Count(self.0 + other.0)
    }
}

impl Monoid for Count {
    fn empty() -> Self {
        Count(0)
    }
}

impl CommutativeMonoid for Count {}

// Min<T> / Max<T>: combine = min / max, identity = None

/// The minimum of the observed values, or `None` if nothing was
/// observed.
///
/// Works for partially ordered types (floats); incomparable values
/// (NaN) never replace an existing minimum.
///
/// # Example
/// ```
/// use algebra::Min;
/// use algebra::Monoid;
///
/// let min = Min::concat([Min::of(4), Min::of(2), Min::empty()]);
/// assert_eq!(min.get(), Some(&2));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Min<T>(pub Option<T>);

impl<T> Min<T> {
    /// A minimum holding a single observation.
    pub fn of(value: T) -> Self {
        Min(Some(value))
    }

    /// The current minimum.
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl<T: PartialOrd + Clone> Min<T> {
    /// Record an observation.
    pub fn observe(&mut self, value: T) {
        match &self.0 {
            Some(current) if !(value < *current) => {}
            _ => self.0 = Some(value),
        }
    }
}

impl<T: PartialOrd + Clone> Semigroup for Min<T> {
    fn combine(&self, other: &Self) -> Self {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) if b < a => other.clone(),
            (Some(_), _) => self.clone(),
            (None, _) => other.clone(),
        }
    }
}

impl<T: PartialOrd + Clone> Monoid for Min<T> {
    fn empty() -> Self {
        Min(None)
    }
}

impl<T: PartialOrd + Clone> CommutativeMonoid for Min<T> {}

/// The maximum of the observed values, or `None` if nothing was
/// observed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Max<T>(pub Option<T>);

impl<T> Max<T> {
    /// A maximum holding a single observation.
    pub fn of(value: T) -> Self {
        Max(Some(value))
    }

    /// The current maximum.
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl<T: PartialOrd + Clone> Max<T> {
    /// Record an observation.
    pub fn observe(&mut self, value: T) {
        match &self.0 {
            Some(current) if !(value > *current) => {}
            _ => self.0 = Some(value),
        }
    }
}

impl<T: PartialOrd + Clone> Semigroup for Max<T> {
    fn combine(&self, other: &Self) -> Self {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) if b > a => other.clone(),
            (Some(_), _) => self.clone(),
            (None, _) => other.clone(),
        }
    }
}

impl<T: PartialOrd + Clone> Monoid for Max<T> {
    fn empty() -> Self {
        Max(None)
    }
}

impl<T: PartialOrd + Clone> CommutativeMonoid for Max<T> {}

// Mean: (sum, count)

/// Arithmetic mean, accumulated as a sum and a count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    /// A mean holding a single observation.
    pub fn of(value: f64) -> Self {
        Mean {
            sum: value,
            count: 1,
        }
    }

    /// Record an observation.
    pub fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Record an observation with a weight.
    pub fn observe_weighted(&mut self, value: f64, weight: f64) {
        self.sum += value * weight;
        self.count += 1;
    }

    /// The number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The mean, or `None` if nothing was observed.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl Semigroup for Mean {
    fn combine(&self, other: &Self) -> Self {
        Mean {
            sum: self.sum + other.sum,
            count: self.count + other.count,
        }
    }
}

impl Monoid for Mean {
    fn empty() -> Self {
        Mean::default()
    }
}

impl CommutativeMonoid for Mean {}

// Histogram<K>: pointwise + of counts

/// Occurrence counts per key.
///
/// # Example
/// ```
/// use algebra::Histogram;
///
/// let mut histogram = Histogram::default();
/// for key in [3, 1, 3, 1, 2] {
///     histogram.observe(key);
/// }
/// // Ties resolve to the smallest key.
/// assert_eq!(histogram.majority(), Some(&1));
/// assert_eq!(histogram.count(&3), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize",
    deserialize = "K: Ord + Deserialize<'de>"
))]
pub struct Histogram<K> {
    counts: BTreeMap<K, u64>,
}

impl<K> Default for Histogram<K> {
    fn default() -> Self {
        Histogram {
            counts: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> Histogram<K> {
    /// Record one occurrence of `key`.
    pub fn observe(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// The number of occurrences of `key`.
    pub fn count(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// The most frequent key. Ties resolve to the smallest key.
    pub fn majority(&self) -> Option<&K> {
        let mut best: Option<(&K, u64)> = None;
        for (key, &count) in &self.counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((key, count)),
            }
        }
        best.map(|(key, _)| key)
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing was observed.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<K: Ord + Clone> Semigroup for Histogram<K> {
    fn combine(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.combine_assign(other);
        result
    }

    fn combine_assign(&mut self, other: &Self) {
        for (key, count) in &other.counts {
            *self.counts.entry(key.clone()).or_insert(0) += count;
        }
    }
}

impl<K: Ord + Clone> Monoid for Histogram<K> {
    fn empty() -> Self {
        Histogram::default()
    }
}

impl<K: Ord + Clone> CommutativeMonoid for Histogram<K> {}

// Distinct<K>: set union

/// The set of distinct keys observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize",
    deserialize = "K: Ord + Deserialize<'de>"
))]
pub struct Distinct<K> {
    keys: BTreeSet<K>,
}

impl<K> Default for Distinct<K> {
    fn default() -> Self {
        Distinct {
            keys: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Clone> Distinct<K> {
    /// Record `key`.
    pub fn observe(&mut self, key: K) {
        self.keys.insert(key);
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing was observed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<K: Ord + Clone> Semigroup for Distinct<K> {
    fn combine(&self, other: &Self) -> Self {
        Distinct {
            keys: self.keys.union(&other.keys).cloned().collect(),
        }
    }

    fn combine_assign(&mut self, other: &Self) {
        self.keys.extend(other.keys.iter().cloned());
    }
}

impl<K: Ord + Clone> Monoid for Distinct<K> {
    fn empty() -> Self {
        Distinct::default()
    }
}

impl<K: Ord + Clone> CommutativeMonoid for Distinct<K> {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_min_max_ignore_nan() {
        let mut min = Min::empty();
        let mut max = Max::empty();
        for v in [2.0, f64::NAN, -1.0, 7.5] {
            min.observe(v);
            max.observe(v);
        }
        // The leading observation is never NaN here, so NaN never wins.
        assert_eq!(min.get(), Some(&-1.0));
        assert_eq!(max.get(), Some(&7.5));
    }

    #[test]
    fn test_mean() {
        let mut a = Mean::empty();
        assert_eq!(a.value(), None);
        a.observe(1.0);
        a.observe(2.0);
        let b = Mean::of(6.0);
        let merged = a.combine(&b);
        assert_eq!(merged.count(), 3);
        assert_eq!(merged.value(), Some(3.0));
    }

    #[test]
    fn test_histogram_majority() {
        let mut a = Histogram::empty();
        a.observe(5u32);
        a.observe(5);
        let mut b = Histogram::empty();
        b.observe(2u32);
        b.observe(2);
        b.observe(9);
        let merged = a.combine(&b);
        assert_eq!(merged.majority(), Some(&2));
        assert_eq!(merged.len(), 3);
        assert_eq!(Histogram::<u32>::empty().majority(), None);
    }

    #[test]
    fn test_distinct() {
        let mut a = Distinct::empty();
        a.observe(1);
        a.observe(1);
        let mut b = Distinct::empty();
        b.observe(2);
        assert_eq!(a.combine(&b).len(), 2);
    }

    proptest! {
        #[test]
        fn histogram_merge_commutes(
            xs in prop::collection::vec(0u8..6, 0..40),
            ys in prop::collection::vec(0u8..6, 0..40),
        ) {
            let mut a = Histogram::empty();
            xs.into_iter().for_each(|x| a.observe(x));
            let mut b = Histogram::empty();
            ys.into_iter().for_each(|y| b.observe(y));
            prop_assert_eq!(a.combine(&b), b.combine(&a));
        }

        #[test]
        fn integer_sum_is_order_independent(xs in prop::collection::vec(-1000i64..1000, 0..50)) {
            let forward = Sum::concat(xs.iter().copied().map(Sum));
            let backward = Sum::concat(xs.iter().rev().copied().map(Sum));
            prop_assert_eq!(forward, backward);
            prop_assert_eq!(forward.0, xs.iter().sum::<i64>());
        }
    }
}
