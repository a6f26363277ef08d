/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Arithmetic. Integer results come from checked arithmetic, so that
//! overflow is a range violation.


use crate::array::PartitionedArray;
use crate::element::Element;
use crate::error::Result;
use crate::local::binary;
use crate::local::unary;
use crate::policy::BinaryPolicies;
use crate::policy::UnaryPolicies;
use crate::scalar::Operand;

macro_rules! binary_arithmetic {
    ($(#[$doc:meta])* $name:ident, $name_with:ident, $checked:ident, $default:expr) => {
        $(#[$doc])*
        pub fn $name<T: Element>(
            a: impl Into<Operand<T>>,
            b: impl Into<Operand<T>>,
        ) -> Result<PartitionedArray<T>> {
            let policies: BinaryPolicies<T, T, T> = $default;
            $name_with(&policies, a, b)
        }

        pub fn $name_with<T: Element>(
            policies: &BinaryPolicies<T, T, T>,
            a: impl Into<Operand<T>>,
            b: impl Into<Operand<T>>,
        ) -> Result<PartitionedArray<T>> {
            let policies = policies.clone();
            binary(stringify!($name), &a.into(), &b.into(), move |a, b| {
                policies.apply(a, b, T::$checked)
            })
        }
    };
}

fn nonzero_divisor<T: Element>() -> BinaryPolicies<T, T, T> {
    BinaryPolicies::defensive().with_domain(|(_, divisor): &(T, T)| !divisor.is_zero())
}

binary_arithmetic!(add, add_with, add_checked, BinaryPolicies::defensive());
binary_arithmetic!(
    subtract,
    subtract_with,
    sub_checked,
    BinaryPolicies::defensive()
);
binary_arithmetic!(
    multiply,
    multiply_with,
    mul_checked,
    BinaryPolicies::defensive()
);
binary_arithmetic!(
    /// Division; integer division truncates. Division by zero is
    /// outside the default domain.
    divide,
    divide_with,
    div_checked,
    nonzero_divisor()
);
binary_arithmetic!(
    /// The remainder of a division, with the sign of the dividend.
    modulus,
    modulus_with,
    rem_checked,
    nonzero_divisor()
);
binary_arithmetic!(
    /// `base` raised to `exponent`. The default domain requires a
    /// non-negative base or an integral exponent.
    pow,
    pow_with,
    pow_checked,
    BinaryPolicies::defensive().with_domain(|(base, exponent): &(T, T)| {
        *base >= T::zero() || exponent.is_integral()
    })
);

pub fn negate<T: Element>(array: &PartitionedArray<T>) -> PartitionedArray<T> {
    negate_with(&UnaryPolicies::defensive(), array)
}

pub fn negate_with<T: Element>(
    policies: &UnaryPolicies<T, T>,
    array: &PartitionedArray<T>,
) -> PartitionedArray<T> {
    let policies = policies.clone();
    unary("negate", array, move |value| {
        policies.apply(value, T::neg_checked)
    })
}

/// The absolute value. `abs(MIN)` of a signed integer type is a range
/// violation.
pub fn abs<T: Element>(array: &PartitionedArray<T>) -> PartitionedArray<T> {
    abs_with(&UnaryPolicies::defensive(), array)
}

pub fn abs_with<T: Element>(
    policies: &UnaryPolicies<T, T>,
    array: &PartitionedArray<T>,
) -> PartitionedArray<T> {
    let policies = policies.clone();
    unary("abs", array, move |value| {
        policies.apply(value, T::abs_checked)
    })
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;
    use crate::policy::InputPolicy;
    use crate::policy::NoDataPolicy;
    use crate::test_utils;

    #[tokio::test]
    async fn test_arithmetic() {
        let runtime = test_utils::runtime(2);
        let a = PartitionedArray::from_buffer(&runtime, shape![2, 2], shape![1, 2], vec![1, 2, 3, 4])
            .unwrap();
        let b = PartitionedArray::from_buffer(&runtime, shape![2, 2], shape![1, 2], vec![4, 3, 2, 0])
            .unwrap();
        assert_eq!(add(&a, &b).unwrap().to_buffer().await.unwrap(), vec![5, 5, 5, 4]);
        assert_eq!(subtract(&a, 1).unwrap().to_buffer().await.unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(multiply(2, &a).unwrap().to_buffer().await.unwrap(), vec![2, 4, 6, 8]);
        assert_eq!(
            divide(&a, &b).unwrap().to_buffer().await.unwrap(),
            vec![0, 0, 1, i32::MIN]
        );
        assert_eq!(
            modulus(&a, &b).unwrap().to_buffer().await.unwrap(),
            vec![1, 2, 1, i32::MIN]
        );
        assert_eq!(pow(&a, 2).unwrap().to_buffer().await.unwrap(), vec![1, 4, 9, 16]);
        assert_eq!(negate(&a).to_buffer().await.unwrap(), vec![-1, -2, -3, -4]);
    }

    #[tokio::test]
    async fn test_range_violations() {
        let runtime = test_utils::runtime(1);
        let a = PartitionedArray::from_buffer(&runtime, shape![3], shape![3], vec![i32::MIN + 1, -5, i32::MAX])
            .unwrap();
        assert_eq!(abs(&a).to_buffer().await.unwrap(), vec![i32::MAX, 5, i32::MAX]);
        assert_eq!(
            add(&a, 1).unwrap().to_buffer().await.unwrap(),
            vec![i32::MIN + 2, -4, i32::MIN]
        );
        // MIN + 1 - 1 == MIN is the no-data sentinel, so the result
        // reads as no-data without a range violation.
        assert_eq!(subtract(&a, 1).unwrap().to_buffer().await.unwrap()[0], i32::MIN);

        let floats = PartitionedArray::from_buffer(&runtime, shape![2], shape![2], vec![f64::MAX, 1.0])
            .unwrap();
        let doubled = multiply(&floats, 2.0).unwrap().to_buffer().await.unwrap();
        assert!(doubled[0].is_nan());
        assert_eq!(doubled[1], 2.0);
        assert!(divide(&floats, 0.0).unwrap().to_buffer().await.unwrap()[1].is_nan());
    }

    #[tokio::test]
    async fn test_pow_domain() {
        let runtime = test_utils::runtime(1);
        let base = PartitionedArray::from_buffer(&runtime, shape![3], shape![3], vec![-8.0f64, 4.0, -2.0])
            .unwrap();
        let exponent =
            PartitionedArray::from_buffer(&runtime, shape![3], shape![3], vec![1.0 / 3.0, 0.5, 3.0]).unwrap();
        let result = pow(&base, &exponent).unwrap().to_buffer().await.unwrap();
        assert!(result[0].is_nan());
        assert_eq!(&result[1..], &[2.0, -8.0]);
    }

    #[tokio::test]
    async fn test_custom_no_data() {
        let runtime = test_utils::runtime(1);
        let a = PartitionedArray::from_buffer(&runtime, shape![3], shape![3], vec![-9999i64, 1, 2]).unwrap();
        let mut policies = BinaryPolicies::<i64, i64, i64>::defensive();
        policies.inputs.0 = InputPolicy {
            no_data: NoDataPolicy::DetectNoDataByValue(-9999),
            ..InputPolicy::defensive()
        };
        policies.outputs.no_data = NoDataPolicy::DetectNoDataByValue(-1);
        assert_eq!(
            add_with(&policies, &a, 10).unwrap().to_buffer().await.unwrap(),
            vec![-1, 11, 12]
        );
    }
}
