/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Comparison and logical operations. Results are `u8` booleans:
//! 1 for true, 0 for false, and the `u8` no-data value otherwise.
//! Logical operations treat any non-zero input as true.

use crate::array::PartitionedArray;
use crate::element::Element;
use crate::error::Result;
use crate::local::binary;
use crate::local::unary;
use crate::policy::BinaryPolicies;
use crate::policy::UnaryPolicies;
use crate::scalar::Operand;

macro_rules! comparison {
    ($name:ident, $name_with:ident, $op:tt) => {
        pub fn $name<T: Element>(
            a: impl Into<Operand<T>>,
            b: impl Into<Operand<T>>,
        ) -> Result<PartitionedArray<u8>> {
            $name_with(&BinaryPolicies::defensive(), a, b)
        }

        pub fn $name_with<T: Element>(
            policies: &BinaryPolicies<T, T, u8>,
            a: impl Into<Operand<T>>,
            b: impl Into<Operand<T>>,
        ) -> Result<PartitionedArray<u8>> {
            let policies = policies.clone();
            binary(stringify!($name), &a.into(), &b.into(), move |a, b| {
                policies.apply(a, b, |a, b| Some(u8::from(a $op b)))
            })
        }
    };
}

comparison!(equal_to, equal_to_with, ==);
comparison!(not_equal_to, not_equal_to_with, !=);
comparison!(less_than, less_than_with, <);
comparison!(less_than_equal_to, less_than_equal_to_with, <=);
comparison!(greater_than, greater_than_with, >);
comparison!(greater_than_equal_to, greater_than_equal_to_with, >=);

macro_rules! logical {
    ($name:ident, $name_with:ident, $op:tt) => {
        pub fn $name(
            a: impl Into<Operand<u8>>,
            b: impl Into<Operand<u8>>,
        ) -> Result<PartitionedArray<u8>> {
            $name_with(&BinaryPolicies::defensive(), a, b)
        }

        pub fn $name_with(
            policies: &BinaryPolicies<u8, u8, u8>,
            a: impl Into<Operand<u8>>,
            b: impl Into<Operand<u8>>,
        ) -> Result<PartitionedArray<u8>> {
            let policies = policies.clone();
            binary(stringify!($name), &a.into(), &b.into(), move |a, b| {
                policies.apply(a, b, |a, b| Some(u8::from((a != 0) $op (b != 0))))
            })
        }
    };
}

logical!(logical_and, logical_and_with, &&);
logical!(logical_or, logical_or_with, ||);
logical!(logical_xor, logical_xor_with, ^);

pub fn logical_not(array: &PartitionedArray<u8>) -> PartitionedArray<u8> {
    logical_not_with(&UnaryPolicies::defensive(), array)
}

pub fn logical_not_with(
    policies: &UnaryPolicies<u8, u8>,
    array: &PartitionedArray<u8>,
) -> PartitionedArray<u8> {
    let policies = policies.clone();
    unary("logical_not", array, move |value| {
        policies.apply(value, |value| Some(u8::from(value == 0)))
    })
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::test_utils;

    #[tokio::test]
    async fn test_comparisons() {
        let runtime = test_utils::runtime(2);
        let a = PartitionedArray::from_buffer(&runtime, shape![4], shape![2], vec![1.0, 2.0, f64::NAN, 4.0])
            .unwrap();
        assert_eq!(
            less_than(&a, 2.0).unwrap().to_buffer().await.unwrap(),
            vec![1, 0, 255, 0]
        );
        assert_eq!(
            greater_than_equal_to(&a, 2.0).unwrap().to_buffer().await.unwrap(),
            vec![0, 1, 255, 1]
        );
        assert_eq!(
            equal_to(4.0, &a).unwrap().to_buffer().await.unwrap(),
            vec![0, 0, 255, 1]
        );
        assert_eq!(
            not_equal_to(&a, &a).unwrap().to_buffer().await.unwrap(),
            vec![0, 0, 255, 0]
        );
    }

    #[tokio::test]
    async fn test_logical() {
        let runtime = test_utils::runtime(1);
        let a = PartitionedArray::from_buffer(&runtime, shape![4], shape![4], vec![0u8, 1, 7, 255]).unwrap();
        let b = PartitionedArray::from_buffer(&runtime, shape![4], shape![4], vec![1u8, 1, 0, 1]).unwrap();
        assert_eq!(
            logical_and(&a, &b).unwrap().to_buffer().await.unwrap(),
            vec![0, 1, 0, 255]
        );
        assert_eq!(
            logical_or(&a, &b).unwrap().to_buffer().await.unwrap(),
            vec![1, 1, 1, 255]
        );
        assert_eq!(
            logical_xor(&a, &b).unwrap().to_buffer().await.unwrap(),
            vec![1, 0, 1, 255]
        );
        assert_eq!(logical_not(&a).to_buffer().await.unwrap(), vec![1, 0, 0, 255]);
    }
}
