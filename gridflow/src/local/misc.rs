/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Selection, conversion and validity.

use std::collections::BTreeMap;

use num_traits::NumCast;

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::element::Ordered;
use crate::error::Result;
use crate::local::binary;
use crate::local::ternary;
use crate::local::unary;
use crate::policy::BinaryPolicies;
use crate::policy::InputPolicy;
use crate::policy::TernaryPolicies;
use crate::policy::UnaryPolicies;
use crate::scalar::Operand;

/// The cell-wise minimum.
pub fn minimum<T: Element>(
    a: impl Into<Operand<T>>,
    b: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    minimum_with(&BinaryPolicies::defensive(), a, b)
}

pub fn minimum_with<T: Element>(
    policies: &BinaryPolicies<T, T, T>,
    a: impl Into<Operand<T>>,
    b: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    let policies = policies.clone();
    binary("minimum", &a.into(), &b.into(), move |a, b| {
        policies.apply(a, b, |a, b| Some(if b < a { b } else { a }))
    })
}

/// The cell-wise maximum.
pub fn maximum<T: Element>(
    a: impl Into<Operand<T>>,
    b: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    maximum_with(&BinaryPolicies::defensive(), a, b)
}

pub fn maximum_with<T: Element>(
    policies: &BinaryPolicies<T, T, T>,
    a: impl Into<Operand<T>>,
    b: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    let policies = policies.clone();
    binary("maximum", &a.into(), &b.into(), move |a, b| {
        policies.apply(a, b, |a, b| Some(if b > a { b } else { a }))
    })
}

/// Select `true_value` where `condition` is non-zero and `false_value`
/// elsewhere. A no-data condition, or a no-data selected value,
/// results in no-data; the value not selected is not inspected.
pub fn where_<T: Element>(
    condition: impl Into<Operand<u8>>,
    true_value: impl Into<Operand<T>>,
    false_value: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    where_with(&TernaryPolicies::defensive(), condition, true_value, false_value)
}

pub fn where_with<T: Element>(
    policies: &TernaryPolicies<u8, T, T, T>,
    condition: impl Into<Operand<u8>>,
    true_value: impl Into<Operand<T>>,
    false_value: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    let policies = policies.clone();
    ternary(
        "where",
        &condition.into(),
        &true_value.into(),
        &false_value.into(),
        move |condition, true_value, false_value| {
            let (condition_policy, true_policy, false_policy) = &policies.inputs;
            let selected = if condition_policy.is_no_data(condition) {
                None
            } else if condition != 0 {
                true_policy.valid(true_value)
            } else {
                false_policy.valid(false_value)
            };
            match selected {
                Some(value) if policies.domain.within_domain(&(condition, true_value, false_value)) => {
                    policies.outputs.output(Some(value))
                }
                _ => policies.outputs.no_data(),
            }
        },
    )
}

/// Convert every element to `R`. Values `R` cannot represent become
/// no-data.
pub fn cast<T: Element, R: Element>(array: &PartitionedArray<T>) -> PartitionedArray<R> {
    cast_with(&UnaryPolicies::defensive(), array)
}

pub fn cast_with<T: Element, R: Element>(
    policies: &UnaryPolicies<T, R>,
    array: &PartitionedArray<T>,
) -> PartitionedArray<R> {
    let policies = policies.clone();
    unary("cast", array, move |value| {
        policies.apply(value, <R as NumCast>::from)
    })
}

/// 1 where an element is valid, 0 where it is no-data.
pub fn valid<T: Element>(array: &PartitionedArray<T>) -> PartitionedArray<u8> {
    valid_with(&InputPolicy::defensive(), array)
}

pub fn valid_with<T: Element>(policy: &InputPolicy<T>, array: &PartitionedArray<T>) -> PartitionedArray<u8> {
    let policy = *policy;
    unary("valid", array, move |value| <u8 as From<bool>>::from(!policy.is_no_data(value)))
}

/// 1 where an element is no-data, 0 where it is valid.
pub fn is_no_data<T: Element>(array: &PartitionedArray<T>) -> PartitionedArray<u8> {
    is_no_data_with(&InputPolicy::defensive(), array)
}

pub fn is_no_data_with<T: Element>(
    policy: &InputPolicy<T>,
    array: &PartitionedArray<T>,
) -> PartitionedArray<u8> {
    let policy = *policy;
    unary("is_no_data", array, move |value| <u8 as From<bool>>::from(policy.is_no_data(value)))
}

/// Map every element through a lookup table. Elements missing from the
/// table become no-data.
pub fn reclassify<T: Element, R: Element>(
    table: impl IntoIterator<Item = (T, R)>,
    array: &PartitionedArray<T>,
) -> PartitionedArray<R> {
    reclassify_with(&UnaryPolicies::defensive(), table, array)
}

pub fn reclassify_with<T: Element, R: Element>(
    policies: &UnaryPolicies<T, R>,
    table: impl IntoIterator<Item = (T, R)>,
    array: &PartitionedArray<T>,
) -> PartitionedArray<R> {
    let policies = policies.clone();
    let table: BTreeMap<Ordered<T>, R> = table
        .into_iter()
        .map(|(from, to)| (Ordered(from), to))
        .collect();
    unary("reclassify", array, move |value| {
        policies.apply(value, |value| table.get(&Ordered(value)).copied())
    })
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::test_utils;

    #[tokio::test]
    async fn test_minimum_maximum() {
        let runtime = test_utils::runtime(2);
        let a = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![1, 5, i32::MIN, 3]).unwrap();
        assert_eq!(
            minimum(&a, 3).unwrap().to_buffer().await.unwrap(),
            vec![1, 3, i32::MIN, 3]
        );
        assert_eq!(
            maximum(2, &a).unwrap().to_buffer().await.unwrap(),
            vec![2, 5, i32::MIN, 3]
        );
    }

    #[tokio::test]
    async fn test_where() {
        let runtime = test_utils::runtime(1);
        let condition = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![1u8, 0, 255, 1]).unwrap();
        let values = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![1.0, 2.0, 3.0, f64::NAN])
            .unwrap();
        let result = where_(&condition, &values, -1.0).unwrap().to_buffer().await.unwrap();
        assert_eq!(&result[..2], &[1.0, -1.0]);
        assert!(result[2].is_nan() && result[3].is_nan());

        let result = where_(&condition, 7.0, f64::NAN).unwrap().to_buffer().await.unwrap();
        assert_eq!(result[0], 7.0);
        assert!(result[1].is_nan());
    }

    #[tokio::test]
    async fn test_cast() {
        let runtime = test_utils::runtime(1);
        let a = PartitionedArray::from_buffer(&runtime, shape![4], shape![4], vec![1.7f64, -3.0, 300.0, f64::NAN])
            .unwrap();
        let cast: PartitionedArray<u8> = cast(&a);
        assert_eq!(cast.to_buffer().await.unwrap(), vec![1, 255, 255, 255]);
        let widened: PartitionedArray<i64> = super::cast(&a);
        assert_eq!(widened.to_buffer().await.unwrap(), vec![1, -3, 300, i64::MIN]);
    }

    #[tokio::test]
    async fn test_validity() {
        let runtime = test_utils::runtime(1);
        let a = PartitionedArray::from_buffer(&runtime, shape![3], shape![3], vec![0u32, u32::MAX, 9]).unwrap();
        assert_eq!(valid(&a).to_buffer().await.unwrap(), vec![1, 0, 1]);
        assert_eq!(is_no_data(&a).to_buffer().await.unwrap(), vec![0, 1, 0]);
        assert_eq!(
            valid_with(&InputPolicy::trusting(), &a).to_buffer().await.unwrap(),
            vec![1, 1, 1]
        );
    }

    #[tokio::test]
    async fn test_reclassify() {
        let runtime = test_utils::runtime(1);
        let classes = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![1i32, 2, 3, i32::MIN])
            .unwrap();
        let result = reclassify([(1, 0.5f32), (2, 1.5)], &classes).to_buffer().await.unwrap();
        assert_eq!(&result[..2], &[0.5, 1.5]);
        assert!(result[2].is_nan() && result[3].is_nan());
    }
}
