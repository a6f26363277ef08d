/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Pointwise map of aggregates.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Deserialize;
use serde::Serialize;

use super::CommutativeMonoid;
use super::Monoid;
use super::Semigroup;

/// A map from zone to aggregate, merged pointwise: keys present in
/// both operands have their aggregates combined, keys present in one
/// are carried over.
///
/// If `V` is a commutative monoid, so is `ZoneMap<K, V>`.
///
/// # Example
/// ```
/// use algebra::Semigroup;
/// use algebra::Sum;
/// use algebra::ZoneMap;
///
/// let mut a = ZoneMap::default();
/// a.observe(1, Sum(1));
/// a.observe(1, Sum(2));
/// let mut b = ZoneMap::default();
/// b.observe(1, Sum(7));
/// b.observe(2, Sum(5));
///
/// let merged = a.combine(&b);
/// assert_eq!(merged.get(&1), Some(&Sum(10)));
/// assert_eq!(merged.get(&2), Some(&Sum(5)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize, V: Serialize",
    deserialize = "K: Ord + Deserialize<'de>, V: Deserialize<'de>"
))]
pub struct ZoneMap<K, V> {
    zones: BTreeMap<K, V>,
}

impl<K, V> Default for ZoneMap<K, V> {
    fn default() -> Self {
        ZoneMap {
            zones: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Semigroup + Clone> ZoneMap<K, V> {
    /// Merge `value` into the aggregate of `zone`.
    pub fn observe(&mut self, zone: K, value: V) {
        match self.zones.entry(zone) {
            btree_map::Entry::Occupied(mut entry) => entry.get_mut().combine_assign(&value),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    /// Update the aggregate of `zone` in place, starting from the
    /// identity if the zone is new.
    pub fn update(&mut self, zone: K, f: impl FnOnce(&mut V))
    where
        V: Monoid,
    {
        f(self.zones.entry(zone).or_insert_with(V::empty));
    }

    /// The aggregate of `zone`.
    pub fn get(&self, zone: &K) -> Option<&V> {
        self.zones.get(zone)
    }

    /// The number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether no zone was observed.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Iterate over zones and their aggregates, in zone order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.zones.iter()
    }

    /// Map every aggregate to a final value.
    pub fn finish<U>(&self, f: impl Fn(&V) -> U) -> BTreeMap<K, U> {
        self.zones
            .iter()
            .map(|(zone, value)| (zone.clone(), f(value)))
            .collect()
    }
}

impl<K: Ord + Clone, V: Semigroup + Clone> Semigroup for ZoneMap<K, V> {
    fn combine(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.combine_assign(other);
        result
    }

    fn combine_assign(&mut self, other: &Self) {
        for (zone, value) in &other.zones {
            self.observe(zone.clone(), value.clone());
        }
    }
}

impl<K: Ord + Clone, V: Semigroup + Clone> Monoid for ZoneMap<K, V> {
    fn empty() -> Self {
        ZoneMap::default()
    }
}

impl<K: Ord + Clone, V: CommutativeMonoid + Clone> CommutativeMonoid for ZoneMap<K, V> {}
