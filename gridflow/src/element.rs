/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Array element types.
//!
//! Every supported element type carries a default no-data sentinel:
//! `MAX` for unsigned integers, `MIN` for signed integers and NaN for
//! floating point types. Integer arithmetic is checked; a `None` from
//! one of the `*_checked` operations is a range violation and becomes
//! no-data.

use std::cmp::Ordering;
use std::fmt;

use num_traits::Bounded;
use num_traits::Num;
use num_traits::NumCast;
use num_traits::ToPrimitive;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// The element types an array may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    U32,
    U64,
    I32,
    I64,
    F32,
    F64,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::U8 => "u8",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numeric array element.
pub trait Element:
    Copy
    + Default
    + fmt::Debug
    + fmt::Display
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Num
    + NumCast
    + Bounded
    + 'static
{
    const TYPE: ElementType;

    /// The default no-data sentinel.
    fn no_data() -> Self;

    /// Equality under which NaN equals NaN.
    fn same(self, other: Self) -> bool;

    /// A total order (NaN sorts last for floats).
    fn total_cmp(&self, other: &Self) -> Ordering;

    fn is_finite_value(self) -> bool;

    fn add_checked(self, other: Self) -> Option<Self>;
    fn sub_checked(self, other: Self) -> Option<Self>;
    fn mul_checked(self, other: Self) -> Option<Self>;
    fn div_checked(self, other: Self) -> Option<Self>;
    fn rem_checked(self, other: Self) -> Option<Self>;
    fn neg_checked(self) -> Option<Self>;
    fn abs_checked(self) -> Option<Self>;
    fn pow_checked(self, exponent: Self) -> Option<Self>;

    /// Whether the value has no fractional part.
    fn is_integral(self) -> bool;

    /// Lossy conversion to `f64`.
    fn into_f64(self) -> f64 {
        ToPrimitive::to_f64(&self).unwrap_or(f64::NAN)
    }

    /// Conversion from `f64`, `None` if the value is not representable.
    fn try_from_f64(value: f64) -> Option<Self> {
        <Self as NumCast>::from(value)
    }
}

/// A floating point array element.
pub trait FloatElement: Element + num_traits::Float {}

impl FloatElement for f32 {}
impl FloatElement for f64 {}

macro_rules! unsigned_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$variant;

            fn no_data() -> Self {
                <$ty>::MAX
            }

            fn same(self, other: Self) -> bool {
                self == other
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                Ord::cmp(self, other)
            }

            fn is_finite_value(self) -> bool {
                true
            }

            fn add_checked(self, other: Self) -> Option<Self> {
                self.checked_add(other)
            }

            fn sub_checked(self, other: Self) -> Option<Self> {
                self.checked_sub(other)
            }

            fn mul_checked(self, other: Self) -> Option<Self> {
                self.checked_mul(other)
            }

            fn div_checked(self, other: Self) -> Option<Self> {
                self.checked_div(other)
            }

            fn rem_checked(self, other: Self) -> Option<Self> {
                self.checked_rem(other)
            }

            fn neg_checked(self) -> Option<Self> {
                (0 as $ty).checked_sub(self)
            }

            fn abs_checked(self) -> Option<Self> {
                Some(self)
            }

            fn pow_checked(self, exponent: Self) -> Option<Self> {
                u32::try_from(exponent).ok().and_then(|e| self.checked_pow(e))
            }

            fn is_integral(self) -> bool {
                true
            }
        }
    )*};
}

macro_rules! signed_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$variant;

            fn no_data() -> Self {
                <$ty>::MIN
            }

            fn same(self, other: Self) -> bool {
                self == other
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                Ord::cmp(self, other)
            }

            fn is_finite_value(self) -> bool {
                true
            }

            fn add_checked(self, other: Self) -> Option<Self> {
                self.checked_add(other)
            }

            fn sub_checked(self, other: Self) -> Option<Self> {
                self.checked_sub(other)
            }

            fn mul_checked(self, other: Self) -> Option<Self> {
                self.checked_mul(other)
            }

            fn div_checked(self, other: Self) -> Option<Self> {
                self.checked_div(other)
            }

            fn rem_checked(self, other: Self) -> Option<Self> {
                self.checked_rem(other)
            }

            fn neg_checked(self) -> Option<Self> {
                self.checked_neg()
            }

            fn abs_checked(self) -> Option<Self> {
                self.checked_abs()
            }

            fn pow_checked(self, exponent: Self) -> Option<Self> {
                u32::try_from(exponent).ok().and_then(|e| self.checked_pow(e))
            }

            fn is_integral(self) -> bool {
                true
            }
        }
    )*};
}

macro_rules! float_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$variant;

            fn no_data() -> Self {
                <$ty>::NAN
            }

            fn same(self, other: Self) -> bool {
                self == other || (self.is_nan() && other.is_nan())
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                <$ty>::total_cmp(self, other)
            }

            fn is_finite_value(self) -> bool {
                self.is_finite()
            }

            fn add_checked(self, other: Self) -> Option<Self> {
                Some(self + other)
            }

            fn sub_checked(self, other: Self) -> Option<Self> {
                Some(self - other)
            }

            fn mul_checked(self, other: Self) -> Option<Self> {
                Some(self * other)
            }

            fn div_checked(self, other: Self) -> Option<Self> {
                Some(self / other)
            }

            fn rem_checked(self, other: Self) -> Option<Self> {
                Some(self % other)
            }

            fn neg_checked(self) -> Option<Self> {
                Some(-self)
            }

            fn abs_checked(self) -> Option<Self> {
                Some(self.abs())
            }

            fn pow_checked(self, exponent: Self) -> Option<Self> {
                Some(self.powf(exponent))
            }

            fn is_integral(self) -> bool {
                self.fract() == 0.0
            }
        }
    )*};
}

unsigned_element!(u8 => U8, u32 => U32, u64 => U64);
signed_element!(i32 => I32, i64 => I64);
float_element!(f32 => F32, f64 => F64);

/// An element ordered by [`Element::total_cmp`], usable as a map key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ordered<T>(pub T);

impl<T: Element> PartialEq for Ordered<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Element> Eq for Ordered<T> {}

impl<T: Element> PartialOrd for Ordered<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Element> Ord for Ordered<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_sentinels() {
        assert_eq!(u8::no_data(), 255);
        assert_eq!(i32::no_data(), i32::MIN);
        assert!(f64::no_data().is_nan());
        assert!(f32::no_data().same(f32::NAN));
        assert!(!1.0f64.same(f64::NAN));
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(i32::MIN.abs_checked(), None);
        assert_eq!(i32::MAX.add_checked(1), None);
        assert_eq!(3u8.neg_checked(), None);
        assert_eq!(0u8.neg_checked(), Some(0));
        assert_eq!(7i64.div_checked(0), None);
        assert_eq!(2i32.pow_checked(-1), None);
        assert_eq!(2i32.pow_checked(10), Some(1024));
        assert_eq!(1.0f64.div_checked(0.0), Some(f64::INFINITY));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(u8::try_from_f64(300.0), None);
        assert_eq!(u8::try_from_f64(12.0), Some(12));
        assert_eq!(i32::try_from_f64(f64::NAN), None);
        assert_eq!(7u32.into_f64(), 7.0);
    }

    #[test]
    fn test_ordered() {
        let mut keys = vec![Ordered(2.0), Ordered(f64::NAN), Ordered(-1.0)];
        keys.sort();
        assert_eq!(keys[0].0, -1.0);
        assert!(keys[2].0.is_nan());
    }
}
