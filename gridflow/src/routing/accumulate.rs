/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Accumulation of material along the flow graph.
//!
//! Every cell adds its external inflow to the outflow of its upstream
//! cells. Plain accumulation passes the total on; the other operations
//! split the total into an outflow, passed downstream, and a remainder
//! staying in the cell.

use std::sync::Arc;

use futures::try_join;

use crate::array::PartitionedArray;
use crate::array::spawn_partition_pairs;
use crate::array::spawn_partitions;
use crate::element::Element;
use crate::element::FloatElement;
use crate::error::Result;
use crate::policy::RoutingPolicies;
use crate::routing::router::Routers;
use crate::scalar::Operand;
use crate::scalar::template;

/// The total material flowing out of every cell: its own inflow plus
/// the outflow of all upstream cells.
pub fn accu<M: Element>(
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
) -> Result<PartitionedArray<M>> {
    accu_with(&RoutingPolicies::defensive(), flow_direction, inflow)
}

pub fn accu_with<M: Element>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
) -> Result<PartitionedArray<M>> {
    let inflow = inflow.into();
    let (runtime, tiling) = template(
        "accu",
        [Some((flow_direction.runtime(), flow_direction.tiling())), inflow.layout()],
    )?;
    let mut routers = Routers::<M>::new("accu", flow_direction, policies.flow_direction)?;
    Ok(spawn_partitions(&runtime, &tiling, "accu", |i| {
        let router = routers.router(i);
        let inflow = inflow.values(i);
        let policies = policies.clone();
        async move {
            let (mut router, inflow) = try_join!(router, inflow)?;
            let mut outflow = vec![policies.output.no_data(); router.len()];
            router
                .propagate(|cell, upstream| {
                    let inflow = policies.material.valid(inflow.get(cell))?;
                    if !policies.domain.within_domain(&[inflow]) {
                        return None;
                    }
                    let total = policies.output.checked(upstream?.add_checked(inflow))?;
                    outflow[cell] = total;
                    Some(total)
                })
                .await?;
            router.partition(outflow)
        }
    }))
}

/// Accumulate with a per-cell parameter: `split` divides the total of
/// a cell into its outflow and remainder.
fn accumulate_split<M, F>(
    op: &'static str,
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    inflow: Operand<M>,
    parameter: Operand<M>,
    split: F,
) -> Result<(PartitionedArray<M>, PartitionedArray<M>)>
where
    M: Element,
    F: Fn(M, M) -> Option<(M, M)> + Send + Sync + 'static,
{
    let (runtime, tiling) = template(
        op,
        [
            Some((flow_direction.runtime(), flow_direction.tiling())),
            inflow.layout(),
            parameter.layout(),
        ],
    )?;
    let mut routers = Routers::<M>::new(op, flow_direction, policies.flow_direction)?;
    let split = Arc::new(split);
    Ok(spawn_partition_pairs(&runtime, &tiling, op, |i| {
        let router = routers.router(i);
        let (inflow, parameter) = (inflow.values(i), parameter.values(i));
        let (policies, split) = (policies.clone(), Arc::clone(&split));
        async move {
            let (mut router, inflow, parameter) = try_join!(router, inflow, parameter)?;
            let mut outflow = vec![policies.output.no_data(); router.len()];
            let mut remainder = outflow.clone();
            router
                .propagate(|cell, upstream| {
                    let inflow = policies.material.valid(inflow.get(cell))?;
                    let parameter = policies.material.valid(parameter.get(cell))?;
                    if !policies.domain.within_domain(&[inflow, parameter]) {
                        return None;
                    }
                    let (out, rest) = split(upstream?.add_checked(inflow)?, parameter)?;
                    let out = policies.output.checked(Some(out))?;
                    let rest = policies.output.checked(Some(rest))?;
                    outflow[cell] = out;
                    remainder[cell] = rest;
                    Some(out)
                })
                .await?;
            Ok((router.partition(outflow)?, router.partition(remainder)?))
        }
    }))
}

fn non_negative<M: Element>(arguments: &[M]) -> bool {
    arguments.iter().all(|&value| value >= M::zero())
}

/// Accumulate material; in every cell the part of the total above
/// `threshold` flows on, the rest remains. Returns the outflow and the
/// remainder. Inflow and threshold must not be negative.
pub fn accu_threshold<M: Element>(
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
    threshold: impl Into<Operand<M>>,
) -> Result<(PartitionedArray<M>, PartitionedArray<M>)> {
    let policies = RoutingPolicies::defensive().with_domain(non_negative);
    accu_threshold_with(&policies, flow_direction, inflow, threshold)
}

pub fn accu_threshold_with<M: Element>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
    threshold: impl Into<Operand<M>>,
) -> Result<(PartitionedArray<M>, PartitionedArray<M>)> {
    accumulate_split(
        "accu_threshold",
        policies,
        flow_direction,
        inflow.into(),
        threshold.into(),
        |total, threshold| {
            if total > threshold {
                Some((total.sub_checked(threshold)?, threshold))
            } else {
                Some((M::zero(), total))
            }
        },
    )
}

/// Accumulate material; in every cell `fraction` of the total flows
/// on, the rest remains. Returns the outflow and the remainder. Inflow
/// must not be negative, fractions must lie in [0, 1].
pub fn accu_fraction<M: FloatElement>(
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
    fraction: impl Into<Operand<M>>,
) -> Result<(PartitionedArray<M>, PartitionedArray<M>)> {
    let policies = RoutingPolicies::defensive().with_domain(|arguments: &[M]| {
        arguments[0] >= M::zero() && arguments[1] >= M::zero() && arguments[1] <= M::one()
    });
    accu_fraction_with(&policies, flow_direction, inflow, fraction)
}

pub fn accu_fraction_with<M: FloatElement>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
    fraction: impl Into<Operand<M>>,
) -> Result<(PartitionedArray<M>, PartitionedArray<M>)> {
    accumulate_split(
        "accu_fraction",
        policies,
        flow_direction,
        inflow.into(),
        fraction.into(),
        |total, fraction| {
            let outflow = fraction * total;
            Some((outflow, total - outflow))
        },
    )
}

/// Accumulate material; from every cell at most `capacity` flows on,
/// the rest remains. Returns the outflow and the remainder. Inflow and
/// capacity must not be negative.
pub fn accu_capacity<M: Element>(
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
    capacity: impl Into<Operand<M>>,
) -> Result<(PartitionedArray<M>, PartitionedArray<M>)> {
    let policies = RoutingPolicies::defensive().with_domain(non_negative);
    accu_capacity_with(&policies, flow_direction, inflow, capacity)
}

pub fn accu_capacity_with<M: Element>(
    policies: &RoutingPolicies<M>,
    flow_direction: &PartitionedArray<u8>,
    inflow: impl Into<Operand<M>>,
    capacity: impl Into<Operand<M>>,
) -> Result<(PartitionedArray<M>, PartitionedArray<M>)> {
    accumulate_split(
        "accu_capacity",
        policies,
        flow_direction,
        inflow.into(),
        capacity.into(),
        |total, capacity| {
            let outflow = if total > capacity { capacity } else { total };
            Some((outflow, total.sub_checked(outflow)?))
        },
    )
}

#[cfg(test)]
mod tests {
    use gridslice::Shape;
    use gridslice::shape;

    use super::*;
    use crate::error::Error;
    use crate::scalar::Scalar;
    use crate::test_utils;

    // Two rows draining east into a last column that drains south into
    // a sink at (1, 3).
    #[rustfmt::skip]
    const CODES: [u8; 8] = [
        6, 6, 6, 2,
        6, 6, 6, 5,
    ];

    fn flow_direction(partition_shape: Shape) -> PartitionedArray<u8> {
        let runtime = test_utils::runtime(2);
        PartitionedArray::from_buffer(&runtime, shape![2, 4], partition_shape, CODES.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_accu() {
        for partition_shape in [shape![2, 4], shape![1, 2], shape![2, 1], shape![1, 1]] {
            let flow_direction = flow_direction(partition_shape);
            let outflow = accu(&flow_direction, Scalar::new(1.0f64)).unwrap();
            assert_eq!(
                outflow.to_buffer().await.unwrap(),
                vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 8.0]
            );
        }
    }

    #[tokio::test]
    async fn test_no_data_propagates_downstream() {
        let flow_direction = flow_direction(shape![1, 2]);
        let runtime = flow_direction.runtime().clone();
        let inflow = PartitionedArray::from_buffer(
            &runtime,
            shape![2, 4],
            shape![1, 2],
            vec![1, 2, 3, 4, 5, i32::MIN, 7, 8],
        )
        .unwrap();
        assert_eq!(
            accu(&flow_direction, &inflow).unwrap().to_buffer().await.unwrap(),
            vec![1, 3, 6, 10, 5, i32::MIN, i32::MIN, i32::MIN]
        );
    }

    #[tokio::test]
    async fn test_accu_threshold() {
        let flow_direction = flow_direction(shape![1, 2]);
        let (outflow, remainder) =
            accu_threshold(&flow_direction, Scalar::new(2.0f64), Scalar::new(1.5)).unwrap();
        assert_eq!(
            outflow.to_buffer().await.unwrap(),
            vec![0.5, 1.0, 1.5, 2.0, 0.5, 1.0, 1.5, 4.0]
        );
        assert_eq!(remainder.to_buffer().await.unwrap(), vec![1.5; 8]);

        let (outflow, remainder) =
            accu_threshold(&flow_direction, Scalar::new(-1.0f64), Scalar::new(1.0)).unwrap();
        assert!(outflow.to_buffer().await.unwrap().iter().all(|v| v.is_nan()));
        assert!(remainder.to_buffer().await.unwrap().iter().all(|v| v.is_nan()));
    }

    #[tokio::test]
    async fn test_accu_fraction() {
        let flow_direction = flow_direction(shape![2, 2]);
        let (outflow, remainder) =
            accu_fraction(&flow_direction, Scalar::new(4.0f64), Scalar::new(0.5)).unwrap();
        assert_eq!(
            outflow.to_buffer().await.unwrap(),
            vec![2.0, 3.0, 3.5, 3.75, 2.0, 3.0, 3.5, 5.625]
        );
        assert_eq!(
            remainder.to_buffer().await.unwrap(),
            vec![2.0, 3.0, 3.5, 3.75, 2.0, 3.0, 3.5, 5.625]
        );

        let (outflow, _) = accu_fraction(&flow_direction, Scalar::new(4.0f32), Scalar::new(1.5)).unwrap();
        assert!(outflow.to_buffer().await.unwrap().iter().all(|v| v.is_nan()));
    }

    #[tokio::test]
    async fn test_accu_capacity() {
        let flow_direction = flow_direction(shape![2, 1]);
        let (outflow, remainder) = accu_capacity(&flow_direction, Scalar::new(2u32), Scalar::new(3)).unwrap();
        assert_eq!(outflow.to_buffer().await.unwrap(), vec![2, 3, 3, 3, 2, 3, 3, 3]);
        assert_eq!(remainder.to_buffer().await.unwrap(), vec![0, 1, 2, 2, 0, 1, 2, 5]);
    }

    #[tokio::test]
    async fn test_arguments() {
        let flow_direction = flow_direction(shape![1, 2]);
        let inflow =
            PartitionedArray::from_buffer(flow_direction.runtime(), shape![2, 4], shape![2, 2], vec![0.0f64; 8])
                .unwrap();
        assert!(matches!(
            accu(&flow_direction, &inflow),
            Err(Error::PartitioningMismatch { .. })
        ));

        let runtime = test_utils::runtime(1);
        let flat = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![5u8; 4]).unwrap();
        assert!(matches!(
            accu(&flat, Scalar::new(1.0f64)),
            Err(Error::UnsupportedRank { .. })
        ));
    }
}
