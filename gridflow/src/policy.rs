/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Policies decide, per operation invocation, how edge cases in the
//! data are treated:
//!
//! - an [`InputPolicy`] per input detects elements already marked
//!   no-data, and for focal operations fills cells outside the array;
//! - a [`DomainPolicy`] decides whether the operation is defined for
//!   the input values;
//! - an [`OutputPolicy`] per output marks no-data results and checks
//!   that computed results are within range.
//!
//! Violations never fail an operation: the affected output element
//! becomes no-data. Policies are plain values and are shared read-only
//! between all partition tasks of an operation.

use std::fmt;
use std::sync::Arc;

use crate::element::Element;

/// How no-data elements are detected and marked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoDataPolicy<T> {
    /// Every element is valid. Outputs that must be marked nonetheless
    /// receive the element type's default sentinel.
    DontMarkNoData,
    /// Elements equal to the value are no-data.
    DetectNoDataByValue(T),
}

impl<T: Element> NoDataPolicy<T> {
    /// Detect no-data using the element type's default sentinel.
    pub fn default_value() -> Self {
        NoDataPolicy::DetectNoDataByValue(T::no_data())
    }

    pub fn is_no_data(&self, value: T) -> bool {
        match self {
            NoDataPolicy::DontMarkNoData => false,
            NoDataPolicy::DetectNoDataByValue(no_data) => value.same(*no_data),
        }
    }

    pub fn no_data(&self) -> T {
        match self {
            NoDataPolicy::DontMarkNoData => T::no_data(),
            NoDataPolicy::DetectNoDataByValue(no_data) => *no_data,
        }
    }
}

/// What focal operations see outside the array.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum HaloPolicy<T> {
    /// Cells outside the array are no-data and do not take part.
    #[default]
    NoData,
    /// Cells outside the array have this value.
    Constant(T),
}

impl<T: Copy> HaloPolicy<T> {
    pub fn fill(&self) -> Option<T> {
        match self {
            HaloPolicy::NoData => None,
            HaloPolicy::Constant(value) => Some(*value),
        }
    }
}

/// Whether a computed result is acceptable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangePolicy {
    /// Accept every representable result.
    AllValuesWithinRange,
    /// Reject infinite and NaN results.
    #[default]
    Finite,
}

impl RangePolicy {
    pub fn within_range<T: Element>(&self, value: T) -> bool {
        match self {
            RangePolicy::AllValuesWithinRange => true,
            RangePolicy::Finite => value.is_finite_value(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputPolicy<T> {
    pub no_data: NoDataPolicy<T>,
    pub halo: HaloPolicy<T>,
}

impl<T: Element> InputPolicy<T> {
    /// Detect no-data by the default sentinel.
    pub fn defensive() -> Self {
        Self {
            no_data: NoDataPolicy::default_value(),
            halo: HaloPolicy::NoData,
        }
    }

    /// Treat every element as valid.
    pub fn trusting() -> Self {
        Self {
            no_data: NoDataPolicy::DontMarkNoData,
            halo: HaloPolicy::NoData,
        }
    }

    pub fn with_halo(mut self, halo: HaloPolicy<T>) -> Self {
        self.halo = halo;
        self
    }

    pub fn is_no_data(&self, value: T) -> bool {
        self.no_data.is_no_data(value)
    }

    /// The value, unless it is no-data.
    pub fn valid(&self, value: T) -> Option<T> {
        (!self.is_no_data(value)).then_some(value)
    }
}

impl<T: Element> Default for InputPolicy<T> {
    fn default() -> Self {
        Self::defensive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPolicy<T> {
    pub no_data: NoDataPolicy<T>,
    pub range: RangePolicy,
}

impl<T: Element> OutputPolicy<T> {
    pub fn defensive() -> Self {
        Self {
            no_data: NoDataPolicy::default_value(),
            range: RangePolicy::Finite,
        }
    }

    pub fn trusting() -> Self {
        Self {
            no_data: NoDataPolicy::DetectNoDataByValue(T::no_data()),
            range: RangePolicy::AllValuesWithinRange,
        }
    }

    /// The value to store for a result: the result itself if there is
    /// one and it is within range, no-data otherwise.
    pub fn output(&self, result: Option<T>) -> T {
        match result {
            Some(value) if self.range.within_range(value) => value,
            _ => self.no_data.no_data(),
        }
    }

    pub fn no_data(&self) -> T {
        self.no_data.no_data()
    }

    /// The result if there is one and it is within range.
    pub fn checked(&self, result: Option<T>) -> Option<T> {
        result.filter(|&value| self.range.within_range(value))
    }
}

impl<T: Element> Default for OutputPolicy<T> {
    fn default() -> Self {
        Self::defensive()
    }
}

/// A predicate deciding whether an operation is defined for its
/// arguments. The empty policy accepts everything.
pub struct DomainPolicy<A: ?Sized>(Option<Arc<dyn Fn(&A) -> bool + Send + Sync>>);

impl<A: ?Sized> DomainPolicy<A> {
    pub fn all_values() -> Self {
        DomainPolicy(None)
    }

    pub fn new(predicate: impl Fn(&A) -> bool + Send + Sync + 'static) -> Self {
        DomainPolicy(Some(Arc::new(predicate)))
    }

    pub fn within_domain(&self, arguments: &A) -> bool {
        match &self.0 {
            None => true,
            Some(predicate) => predicate(arguments),
        }
    }
}

impl<A: ?Sized> Clone for DomainPolicy<A> {
    fn clone(&self) -> Self {
        DomainPolicy(self.0.clone())
    }
}

impl<A: ?Sized> Default for DomainPolicy<A> {
    fn default() -> Self {
        Self::all_values()
    }
}

impl<A: ?Sized> fmt::Debug for DomainPolicy<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("DomainPolicy::AllValues"),
            Some(_) => f.write_str("DomainPolicy::Predicate"),
        }
    }
}

/// The policies of one operation invocation: a domain policy over the
/// operation's arguments `D`, the input policies `I` and the output
/// policies `O`.
#[derive(Debug)]
pub struct Policies<D, I, O> {
    pub domain: DomainPolicy<D>,
    pub inputs: I,
    pub outputs: O,
}

impl<D, I: Clone, O: Clone> Clone for Policies<D, I, O> {
    fn clone(&self) -> Self {
        Self {
            domain: self.domain.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

pub type UnaryPolicies<T, R> = Policies<T, InputPolicy<T>, OutputPolicy<R>>;
pub type BinaryPolicies<T, U, R> =
    Policies<(T, U), (InputPolicy<T>, InputPolicy<U>), OutputPolicy<R>>;
pub type TernaryPolicies<A, B, C, R> =
    Policies<(A, B, C), (InputPolicy<A>, InputPolicy<B>, InputPolicy<C>), OutputPolicy<R>>;

impl<T: Element, R: Element> Policies<T, InputPolicy<T>, OutputPolicy<R>> {
    /// Detect no-data in the input, reject out of range results.
    pub fn defensive() -> Self {
        Self {
            domain: DomainPolicy::all_values(),
            inputs: InputPolicy::defensive(),
            outputs: OutputPolicy::defensive(),
        }
    }

    /// Perform no checks.
    pub fn trusting() -> Self {
        Self {
            domain: DomainPolicy::all_values(),
            inputs: InputPolicy::trusting(),
            outputs: OutputPolicy::trusting(),
        }
    }

    pub fn with_domain(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.domain = DomainPolicy::new(predicate);
        self
    }

    pub fn with_halo(mut self, halo: HaloPolicy<T>) -> Self {
        self.inputs.halo = halo;
        self
    }

    /// Apply `f` to one element.
    #[inline]
    pub fn apply(&self, value: T, f: impl Fn(T) -> Option<R>) -> R {
        if self.inputs.is_no_data(value) || !self.domain.within_domain(&value) {
            return self.outputs.no_data();
        }
        self.outputs.output(f(value))
    }
}

impl<T: Element, U: Element, R: Element>
    Policies<(T, U), (InputPolicy<T>, InputPolicy<U>), OutputPolicy<R>>
{
    pub fn defensive() -> Self {
        Self {
            domain: DomainPolicy::all_values(),
            inputs: (InputPolicy::defensive(), InputPolicy::defensive()),
            outputs: OutputPolicy::defensive(),
        }
    }

    pub fn trusting() -> Self {
        Self {
            domain: DomainPolicy::all_values(),
            inputs: (InputPolicy::trusting(), InputPolicy::trusting()),
            outputs: OutputPolicy::trusting(),
        }
    }

    pub fn with_domain(
        mut self,
        predicate: impl Fn(&(T, U)) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.domain = DomainPolicy::new(predicate);
        self
    }

    #[inline]
    pub fn apply(&self, a: T, b: U, f: impl Fn(T, U) -> Option<R>) -> R {
        if self.inputs.0.is_no_data(a)
            || self.inputs.1.is_no_data(b)
            || !self.domain.within_domain(&(a, b))
        {
            return self.outputs.no_data();
        }
        self.outputs.output(f(a, b))
    }
}

impl<A: Element, B: Element, C: Element, R: Element>
    Policies<(A, B, C), (InputPolicy<A>, InputPolicy<B>, InputPolicy<C>), OutputPolicy<R>>
{
    pub fn defensive() -> Self {
        Self {
            domain: DomainPolicy::all_values(),
            inputs: (
                InputPolicy::defensive(),
                InputPolicy::defensive(),
                InputPolicy::defensive(),
            ),
            outputs: OutputPolicy::defensive(),
        }
    }

    pub fn trusting() -> Self {
        Self {
            domain: DomainPolicy::all_values(),
            inputs: (
                InputPolicy::trusting(),
                InputPolicy::trusting(),
                InputPolicy::trusting(),
            ),
            outputs: OutputPolicy::trusting(),
        }
    }
}

/// The policies of a routing operation: the flow direction input,
/// the material inputs (all of one type), and the outputs. The domain
/// predicate sees the material arguments of one cell.
#[derive(Debug, Clone)]
pub struct RoutingPolicies<M> {
    pub flow_direction: InputPolicy<u8>,
    pub domain: DomainPolicy<[M]>,
    pub material: InputPolicy<M>,
    pub output: OutputPolicy<M>,
}

impl<M: Element> RoutingPolicies<M> {
    pub fn defensive() -> Self {
        Self {
            flow_direction: InputPolicy::defensive(),
            domain: DomainPolicy::all_values(),
            material: InputPolicy::defensive(),
            output: OutputPolicy::defensive(),
        }
    }

    pub fn trusting() -> Self {
        Self {
            flow_direction: InputPolicy::defensive(),
            domain: DomainPolicy::all_values(),
            material: InputPolicy::trusting(),
            output: OutputPolicy::trusting(),
        }
    }

    pub fn with_domain(mut self, predicate: impl Fn(&[M]) -> bool + Send + Sync + 'static) -> Self {
        self.domain = DomainPolicy::new(predicate);
        self
    }
}

impl<M: Element> Default for RoutingPolicies<M> {
    fn default() -> Self {
        Self::defensive()
    }
}
