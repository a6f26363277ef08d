/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Focal (neighbourhood) operations on rank 2 arrays.
//!
//! The value of an output cell is a function of the input cells under
//! a [`Kernel`] centred on it. Each partition task first gathers a
//! window holding the partition plus a halo as wide as the kernel
//! radius, then evaluates every cell. Tasks depend on the input
//! partitions only, never on each other's output.
//!
//! No-data cells, and cells outside the array unless the input's
//! [`HaloPolicy`](crate::policy::HaloPolicy) fills them, do not take
//! part in a neighbourhood. A cell whose own input value is no-data is
//! no-data in the output.

use std::sync::Arc;

use algebra::Distinct;
use algebra::Histogram;
use algebra::Max;
use algebra::Min;
use gridslice::Shape;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::element::FloatElement;
use crate::element::Ordered;
use crate::error::Error;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::partition::Partition;
use crate::policy::UnaryPolicies;
use crate::routing::FlowDirection;
use crate::window::Window;

/// The cells under one placement of a kernel.
pub(crate) struct Neighbourhood<'a, T> {
    window: &'a Window<T>,
    kernel: &'a Kernel,
    row: isize,
    col: isize,
}

impl<T: Copy> Neighbourhood<'_, T> {
    /// The cell at offset `(dy, dx)` from the centre.
    pub(crate) fn get(&self, dy: isize, dx: isize) -> Option<T> {
        self.window.get(self.row + dy, self.col + dx)
    }

    /// The valid cells with a non-zero weight, and their weights.
    pub(crate) fn cells(&self) -> impl Iterator<Item = (T, f64)> + '_ {
        self.kernel
            .offsets()
            .filter(|&(_, _, w)| w != 0.0)
            .filter_map(|(dy, dx, w)| self.get(dy, dx).map(|v| (v, w)))
    }

    /// Like [`Self::cells`], without the centre cell.
    pub(crate) fn neighbours(&self) -> impl Iterator<Item = (T, f64)> + '_ {
        self.kernel
            .offsets()
            .filter(|&(dy, dx, w)| w != 0.0 && (dy, dx) != (0, 0))
            .filter_map(|(dy, dx, w)| self.get(dy, dx).map(|v| (v, w)))
    }
}

fn check_ranks(op: &'static str, array_rank: usize, kernel: &Kernel) -> Result<()> {
    if array_rank != 2 {
        return Err(Error::UnsupportedRank {
            op,
            expected: 2,
            got: array_rank,
        });
    }
    if kernel.rank() != 2 {
        return Err(Error::Kernel {
            reason: format!("{} needs a rank 2 kernel, got {}", op, kernel.shape()),
        });
    }
    Ok(())
}

/// Evaluate `f` at every cell of `array`, given the cell's value and
/// its neighbourhood.
pub(crate) fn focal<T, R, F>(
    op: &'static str,
    policies: &UnaryPolicies<T, R>,
    array: &PartitionedArray<T>,
    kernel: &Kernel,
    f: F,
) -> Result<PartitionedArray<R>>
where
    T: Element,
    R: Element,
    F: Fn(T, &Neighbourhood<'_, T>) -> Option<R> + Send + Sync + 'static,
{
    check_ranks(op, array.rank(), kernel)?;
    let radius = kernel.radius();
    let radius = [radius[0], radius[1]];
    let kernel = Arc::new(kernel.clone());
    let f = Arc::new(f);
    let tiling = Arc::clone(array.tiling());
    Ok(array.spawn_partitions(op, |i| {
        let array = array.clone();
        let kernel = Arc::clone(&kernel);
        let f = Arc::clone(&f);
        let policies = policies.clone();
        let locality = tiling.locality(i);
        async move {
            let window = Window::gather(&array, i, radius, policies.inputs).await?;
            let (rows, cols) = (window.rows(), window.cols());
            let mut data = Vec::with_capacity(rows * cols);
            for row in 0..rows as isize {
                for col in 0..cols as isize {
                    let value = match window.get(row, col) {
                        Some(centre) if policies.domain.within_domain(&centre) => {
                            let neighbourhood = Neighbourhood {
                                window: &window,
                                kernel: &kernel,
                                row,
                                col,
                            };
                            policies.outputs.output(f(centre, &neighbourhood))
                        }
                        _ => policies.outputs.no_data(),
                    };
                    data.push(value);
                }
            }
            Partition::new(
                window.origin().to_vec(),
                Shape::from([rows, cols]),
                locality,
                data,
            )
        }
    }))
}

macro_rules! focal_op {
    ($(#[$doc:meta])* $name:ident, $name_with:ident, $bound:ident, $output:ty, $f:expr) => {
        $(#[$doc])*
        pub fn $name<T: $bound>(
            array: &PartitionedArray<T>,
            kernel: &Kernel,
        ) -> Result<PartitionedArray<$output>> {
            $name_with(&UnaryPolicies::defensive(), array, kernel)
        }

        pub fn $name_with<T: $bound>(
            policies: &UnaryPolicies<T, $output>,
            array: &PartitionedArray<T>,
            kernel: &Kernel,
        ) -> Result<PartitionedArray<$output>> {
            focal(stringify!($name), policies, array, kernel, $f)
        }
    };
}

focal_op!(
    /// The sum of the cells in the neighbourhood. Kernel weights act as
    /// a mask.
    focal_sum,
    focal_sum_with,
    Element,
    T,
    |_, n: &Neighbourhood<'_, T>| {
        let mut cells = n.cells().peekable();
        cells.peek()?;
        cells.try_fold(T::zero(), |sum, (v, _)| sum.add_checked(v))
    }
);

focal_op!(
    /// The weighted mean of the cells in the neighbourhood.
    focal_mean,
    focal_mean_with,
    FloatElement,
    T,
    |_, n: &Neighbourhood<'_, T>| {
        let (sum, weights) = n
            .cells()
            .fold((0.0, 0.0), |(sum, weights), (v, w)| (sum + v.into_f64() * w, weights + w));
        (weights != 0.0).then(|| T::try_from_f64(sum / weights)).flatten()
    }
);

focal_op!(
    focal_minimum,
    focal_minimum_with,
    Element,
    T,
    |_, n: &Neighbourhood<'_, T>| {
        let mut min = Min(None);
        n.cells().for_each(|(v, _)| min.observe(v));
        min.0
    }
);

focal_op!(
    focal_maximum,
    focal_maximum_with,
    Element,
    T,
    |_, n: &Neighbourhood<'_, T>| {
        let mut max = Max(None);
        n.cells().for_each(|(v, _)| max.observe(v));
        max.0
    }
);

focal_op!(
    /// The most frequent value in the neighbourhood. Ties resolve to
    /// the smallest value.
    focal_majority,
    focal_majority_with,
    Element,
    T,
    |_, n: &Neighbourhood<'_, T>| {
        let mut histogram = Histogram::default();
        n.cells().for_each(|(v, _)| histogram.observe(Ordered(v)));
        histogram.majority().map(|v| v.0)
    }
);

focal_op!(
    /// The number of distinct values in the neighbourhood.
    focal_diversity,
    focal_diversity_with,
    Element,
    u64,
    |_, n: &Neighbourhood<'_, T>| {
        let mut distinct = Distinct::default();
        n.cells().for_each(|(v, _)| distinct.observe(Ordered(v)));
        Some(distinct.len() as u64)
    }
);

focal_op!(
    /// Emphasise the centre cell: `2 * centre * n - sum(neighbours)`,
    /// over the `n` valid neighbours. No-data if there are none.
    focal_high_pass,
    focal_high_pass_with,
    FloatElement,
    T,
    |centre: T, n: &Neighbourhood<'_, T>| {
        let (count, sum) = n
            .neighbours()
            .fold((0usize, 0.0), |(count, sum), (v, _)| (count + 1, sum + v.into_f64()));
        if count == 0 {
            return None;
        }
        T::try_from_f64(2.0 * centre.into_f64() * count as f64 - sum)
    }
);

focal_op!(
    /// The sum of the cells in the neighbourhood, each multiplied by
    /// its weight.
    convolve,
    convolve_with,
    FloatElement,
    T,
    |_, n: &Neighbourhood<'_, T>| {
        T::try_from_f64(n.cells().map(|(v, w)| v.into_f64() * w).sum())
    }
);

/// The slope of an elevation surface, as rise over run, using Horn's
/// 3 by 3 method. Missing neighbours count as the centre elevation.
pub fn slope<T: FloatElement>(elevation: &PartitionedArray<T>, cell_size: f64) -> Result<PartitionedArray<T>> {
    slope_with(&UnaryPolicies::defensive(), elevation, cell_size)
}

pub fn slope_with<T: FloatElement>(
    policies: &UnaryPolicies<T, T>,
    elevation: &PartitionedArray<T>,
    cell_size: f64,
) -> Result<PartitionedArray<T>> {
    if !(cell_size > 0.0) {
        return Err(Error::invalid_argument(format!(
            "slope: cell size {} is not positive",
            cell_size
        )));
    }
    let kernel = Kernel::box_kernel(1, 1.0);
    focal("slope", policies, elevation, &kernel, move |centre, n| {
        let z = |dy, dx| n.get(dy, dx).unwrap_or(centre).into_f64();
        let dz_dx = ((z(-1, 1) + 2.0 * z(0, 1) + z(1, 1)) - (z(-1, -1) + 2.0 * z(0, -1) + z(1, -1)))
            / (8.0 * cell_size);
        let dz_dy = ((z(1, -1) + 2.0 * z(1, 0) + z(1, 1)) - (z(-1, -1) + 2.0 * z(-1, 0) + z(-1, 1)))
            / (8.0 * cell_size);
        T::try_from_f64((dz_dx * dz_dx + dz_dy * dz_dy).sqrt())
    })
}

/// The direction of steepest descent from every cell, as a
/// [`FlowDirection`] code. Cells without a lower neighbour are sinks.
/// No-data neighbours are ignored.
pub fn d8_flow_direction<T: Element>(elevation: &PartitionedArray<T>) -> Result<PartitionedArray<u8>> {
    d8_flow_direction_with(&UnaryPolicies::defensive(), elevation)
}

pub fn d8_flow_direction_with<T: Element>(
    policies: &UnaryPolicies<T, u8>,
    elevation: &PartitionedArray<T>,
) -> Result<PartitionedArray<u8>> {
    let kernel = Kernel::box_kernel(1, 1.0);
    focal("d8_flow_direction", policies, elevation, &kernel, |centre, n| {
        let centre = centre.into_f64();
        let mut steepest = (FlowDirection::Sink, 0.0);
        for direction in FlowDirection::STEEPEST_DESCENT_ORDER {
            let (dy, dx) = direction.offset();
            if let Some(neighbour) = n.get(dy, dx) {
                let drop = centre - neighbour.into_f64();
                if drop > steepest.1 {
                    steepest = (direction, drop);
                }
            }
        }
        Some(steepest.0.code())
    })
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::policy::HaloPolicy;
    use crate::test_utils;

    fn array<T: Element>(partition_shape: Shape, values: Vec<T>) -> PartitionedArray<T> {
        let runtime = test_utils::runtime(2);
        PartitionedArray::from_buffer(&runtime, shape![3, 3], partition_shape, values).unwrap()
    }

    #[tokio::test]
    async fn test_focal_sum() {
        let values: Vec<i32> = (1..=9).collect();
        for partition_shape in [shape![3, 3], shape![1, 1], shape![2, 1]] {
            let input = array(partition_shape, values.clone());
            let result = focal_sum(&input, &Kernel::box_kernel(1, 1.0)).unwrap();
            assert!(result.tiling().same_partitioning(input.tiling()));
            assert_eq!(
                result.to_buffer().await.unwrap(),
                vec![12, 21, 16, 27, 45, 33, 24, 39, 28]
            );
        }
    }

    #[tokio::test]
    async fn test_no_data_and_halo_policy() {
        let mut values: Vec<f64> = vec![1.0; 9];
        values[4] = f64::NAN;
        let input = array(shape![1, 3], values);
        let kernel = Kernel::box_kernel(1, 1.0);

        let sums = focal_sum(&input, &kernel).unwrap().to_buffer().await.unwrap();
        assert_eq!(sums[0], 3.0);
        assert_eq!(sums[1], 5.0);
        assert!(sums[4].is_nan());

        let policies = UnaryPolicies::defensive().with_halo(HaloPolicy::Constant(0.5));
        let sums = focal_sum_with(&policies, &input, &kernel).unwrap().to_buffer().await.unwrap();
        assert_eq!(sums[0], 3.0 + 5.0 * 0.5);

        let means = focal_mean(&input, &kernel).unwrap().to_buffer().await.unwrap();
        assert_eq!(means[0], 1.0);
    }

    #[tokio::test]
    async fn test_statistics() {
        let input = array(shape![2, 2], vec![1, 2, 2, 3, 3, 3, 4, 4, 9]);
        let kernel = Kernel::box_kernel(1, 1.0);
        let min = focal_minimum(&input, &kernel).unwrap().to_buffer().await.unwrap();
        let max = focal_maximum(&input, &kernel).unwrap().to_buffer().await.unwrap();
        let majority = focal_majority(&input, &kernel).unwrap().to_buffer().await.unwrap();
        let diversity = focal_diversity(&input, &kernel).unwrap().to_buffer().await.unwrap();
        assert_eq!(min[4], 1);
        assert_eq!(max[4], 9);
        assert_eq!(majority[4], 3);
        assert_eq!(majority[2], 2);
        assert_eq!(diversity[4], 5);
        assert_eq!(diversity[8], 3);
    }

    #[tokio::test]
    async fn test_high_pass_and_convolve() {
        let input = array(shape![1, 1], vec![1.0f32, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0]);
        let kernel = Kernel::box_kernel(1, 1.0);
        let high_pass = focal_high_pass(&input, &kernel).unwrap().to_buffer().await.unwrap();
        assert_eq!(high_pass[4], 2.0 * 5.0 * 8.0 - 8.0);
        assert_eq!(high_pass[0], 2.0 * 1.0 * 3.0 - 7.0);

        let kernel = Kernel::new([1, 3], vec![1.0, 0.0, -1.0]).unwrap();
        let edges = convolve(&input, &kernel).unwrap().to_buffer().await.unwrap();
        assert_eq!(edges[3], -5.0);
        assert_eq!(edges[5], 5.0);
        assert_eq!(edges[4], 0.0);
    }

    #[tokio::test]
    async fn test_slope() {
        // A plane rising one unit per column.
        let values = vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let input = array(shape![1, 2], values);
        let slopes = slope(&input, 1.0).unwrap().to_buffer().await.unwrap();
        assert_eq!(slopes[4], 1.0);
        assert_eq!(slopes[3], 0.5);
        assert!(slope(&input, 0.0).is_err());
    }

    #[tokio::test]
    async fn test_d8() {
        let values = vec![9.0, 8.0, 7.0, 8.0, 5.0, 6.0, 7.0, 6.0, 1.0];
        let input = array(shape![2, 2], values);
        let directions = d8_flow_direction(&input).unwrap().to_buffer().await.unwrap();
        assert_eq!(directions[0], FlowDirection::SouthEast.code());
        assert_eq!(directions[4], FlowDirection::SouthEast.code());
        assert_eq!(directions[8], FlowDirection::Sink.code());
        assert_eq!(directions[2], FlowDirection::SouthWest.code());
    }

    #[tokio::test]
    async fn test_rank_checks() {
        let runtime = test_utils::runtime(1);
        let input = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![0i32; 4]).unwrap();
        assert!(matches!(
            focal_sum(&input, &Kernel::box_kernel(1, 1.0)),
            Err(Error::UnsupportedRank { .. })
        ));
        let input = array(shape![3, 3], vec![0i32; 9]);
        let kernel = Kernel::new([3], vec![1.0; 3]).unwrap();
        assert!(matches!(focal_sum(&input, &kernel), Err(Error::Kernel { .. })));
    }
}
