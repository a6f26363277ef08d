/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Mathematical functions of floating point arrays.

use num_traits::Float;

use crate::array::PartitionedArray;
use crate::element::FloatElement;
use crate::error::Result;
use crate::local::binary;
use crate::local::unary;
use crate::policy::BinaryPolicies;
use crate::policy::UnaryPolicies;
use crate::scalar::Operand;

macro_rules! unary_math {
    ($(#[$doc:meta])* $name:ident, $name_with:ident, $f:expr, $default:expr) => {
        $(#[$doc])*
        pub fn $name<T: FloatElement>(array: &PartitionedArray<T>) -> PartitionedArray<T> {
            let policies: UnaryPolicies<T, T> = $default;
            $name_with(&policies, array)
        }

        pub fn $name_with<T: FloatElement>(
            policies: &UnaryPolicies<T, T>,
            array: &PartitionedArray<T>,
        ) -> PartitionedArray<T> {
            let policies = policies.clone();
            let f: fn(T) -> T = $f;
            unary(stringify!($name), array, move |value| {
                policies.apply(value, |value| Some(f(value)))
            })
        }
    };
}

fn unit_interval<T: FloatElement>() -> UnaryPolicies<T, T> {
    UnaryPolicies::defensive().with_domain(|value: &T| (-T::one()..=T::one()).contains(value))
}

unary_math!(
    /// The square root. Negative arguments are outside the default
    /// domain.
    sqrt,
    sqrt_with,
    |v| Float::sqrt(v),
    UnaryPolicies::defensive().with_domain(|value: &T| *value >= T::zero())
);
unary_math!(exp, exp_with, |v| Float::exp(v), UnaryPolicies::defensive());
unary_math!(
    /// The natural logarithm, defined for positive arguments.
    log,
    log_with,
    |v| Float::ln(v),
    UnaryPolicies::defensive().with_domain(|value: &T| *value > T::zero())
);
unary_math!(
    log10,
    log10_with,
    |v| Float::log10(v),
    UnaryPolicies::defensive().with_domain(|value: &T| *value > T::zero())
);
unary_math!(sin, sin_with, |v| Float::sin(v), UnaryPolicies::defensive());
unary_math!(cos, cos_with, |v| Float::cos(v), UnaryPolicies::defensive());
unary_math!(tan, tan_with, |v| Float::tan(v), UnaryPolicies::defensive());
unary_math!(
    /// The arc sine, defined on [-1, 1].
    asin,
    asin_with,
    |v| Float::asin(v),
    unit_interval()
);
unary_math!(
    /// The arc cosine, defined on [-1, 1].
    acos,
    acos_with,
    |v| Float::acos(v),
    unit_interval()
);
unary_math!(atan, atan_with, |v| Float::atan(v), UnaryPolicies::defensive());
unary_math!(ceil, ceil_with, |v| Float::ceil(v), UnaryPolicies::defensive());
unary_math!(floor, floor_with, |v| Float::floor(v), UnaryPolicies::defensive());
unary_math!(
    /// Round half away from zero.
    round,
    round_with,
    |v| Float::round(v),
    UnaryPolicies::defensive()
);

/// The four quadrant arc tangent of `y / x`.
pub fn atan2<T: FloatElement>(
    y: impl Into<Operand<T>>,
    x: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    atan2_with(&BinaryPolicies::defensive(), y, x)
}

pub fn atan2_with<T: FloatElement>(
    policies: &BinaryPolicies<T, T, T>,
    y: impl Into<Operand<T>>,
    x: impl Into<Operand<T>>,
) -> Result<PartitionedArray<T>> {
    let policies = policies.clone();
    binary("atan2", &y.into(), &x.into(), move |y, x| {
        policies.apply(y, x, |y, x| Some(Float::atan2(y, x)))
    })
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;
    use std::f64::consts::FRAC_PI_4;

    use gridslice::shape;

    use super::*;
    use crate::local::add;
    use crate::test_utils;

    fn array(values: Vec<f64>) -> PartitionedArray<f64> {
        let n = values.len();
        PartitionedArray::from_buffer(&test_utils::runtime(1), shape![n], shape![n], values).unwrap()
    }

    #[tokio::test]
    async fn test_domains() {
        let values = array(vec![-1.0, 0.0, 4.0]);
        let roots = sqrt(&values).to_buffer().await.unwrap();
        assert!(roots[0].is_nan());
        assert_eq!(&roots[1..], &[0.0, 2.0]);

        let logs = log(&values).to_buffer().await.unwrap();
        assert!(logs[0].is_nan() && logs[1].is_nan());
        assert_eq!(logs[2], 4.0f64.ln());

        let asins = asin(&array(vec![1.0, 2.0, -1.5])).to_buffer().await.unwrap();
        assert_eq!(asins[0], FRAC_PI_2);
        assert!(asins[1].is_nan() && asins[2].is_nan());
    }

    #[tokio::test]
    async fn test_trusting_skips_domain() {
        let values = array(vec![-1.0]);
        let roots = sqrt_with(&UnaryPolicies::trusting(), &values).to_buffer().await.unwrap();
        assert!(roots[0].is_nan());
        let exps = exp_with(&UnaryPolicies::trusting(), &array(vec![1000.0])).to_buffer().await.unwrap();
        assert_eq!(exps[0], f64::INFINITY);
        let exps = exp(&array(vec![1000.0])).to_buffer().await.unwrap();
        assert!(exps[0].is_nan());
    }

    #[tokio::test]
    async fn test_rounding_and_atan2() {
        let values = array(vec![-1.5, 0.5, 2.4]);
        assert_eq!(round(&values).to_buffer().await.unwrap(), vec![-2.0, 1.0, 2.0]);
        assert_eq!(floor(&values).to_buffer().await.unwrap(), vec![-2.0, 0.0, 2.0]);
        assert_eq!(ceil(&values).to_buffer().await.unwrap(), vec![-1.0, 1.0, 3.0]);
        let angles = atan2(&array(vec![1.0, 0.0]), 1.0).unwrap().to_buffer().await.unwrap();
        assert_eq!(angles, vec![FRAC_PI_4, 0.0]);
    }

    #[tokio::test]
    async fn test_no_data_absorbs() {
        let values = PartitionedArray::from_buffer(
            &test_utils::runtime(2),
            shape![2, 2],
            shape![1, 2],
            vec![2.0f32, 0.5, -0.5, 3.0],
        )
        .unwrap();
        let angles = asin(&values);
        let sums = add(&angles, 1.0f32).unwrap().to_buffer().await.unwrap();
        assert!(sums[0].is_nan() && sums[3].is_nan());
        assert_eq!(sums[1], 0.5f32.asin() + 1.0);
    }
}
