/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

/// Iterates over all coordinate tuples in an N-dimensional space.
///
/// Given extents `[d₀, d₁, ..., dₖ₋₁]` this yields every index
/// `[i₀, i₁, ..., iₖ₋₁]` with `iⱼ ∈ 0..dⱼ`, in row-major order (last
/// dimension varies fastest). A rank-0 space has exactly one point,
/// the empty index; a space with a zero extent has none.
///
/// ```
/// # use gridslice::Points;
/// let points: Vec<_> = Points::new(vec![2, 2]).collect();
/// assert_eq!(points, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
/// ```
#[derive(Debug, Clone)]
pub struct Points {
    extents: Vec<usize>,
    next: Option<Vec<usize>>,
    remaining: usize,
}

impl Points {
    pub fn new(extents: Vec<usize>) -> Self {
        let remaining = extents.iter().product();
        let next = (remaining > 0).then(|| vec![0; extents.len()]);
        Self {
            extents,
            next,
            remaining,
        }
    }
}

impl Iterator for Points {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.remaining -= 1;
        if self.remaining > 0 {
            let mut successor = current.clone();
            for dim in (0..successor.len()).rev() {
                successor[dim] += 1;
                if successor[dim] < self.extents[dim] {
                    break;
                }
                successor[dim] = 0;
            }
            self.next = Some(successor);
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Points {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points() {
        let points: Vec<Vec<usize>> = Points::new(vec![2, 1, 2]).collect();
        assert_eq!(
            points,
            vec![vec![0, 0, 0], vec![0, 0, 1], vec![1, 0, 0], vec![1, 0, 1],]
        );
    }

    #[test]
    fn test_degenerate() {
        assert_eq!(Points::new(vec![]).collect::<Vec<_>>(), vec![vec![]]);
        assert_eq!(Points::new(vec![3, 0]).count(), 0);
        assert_eq!(Points::new(vec![3, 4]).len(), 12);
    }
}
