/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Partitions: dense blocks of elements owned by one locality.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::future::Shared;
use gridslice::Hyperslab;
use gridslice::Index;
use gridslice::Shape;
use gridslice::Slice;
use gridslice::SliceError;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::error::Result;

/// A shared, cloneable future resolving to a partition. Every task
/// reading a partition awaits its own clone.
pub type PartitionFuture<T> = Shared<BoxFuture<'static, Result<Arc<Partition<T>>>>>;

/// A contiguous rectangular block of an array.
///
/// `origin` is the global index of the first element; `data` holds
/// `shape.volume()` elements in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition<T> {
    origin: Index,
    shape: Shape,
    locality: usize,
    data: Vec<T>,
}

impl<T> Partition<T> {
    pub fn new(origin: Index, shape: Shape, locality: usize, data: Vec<T>) -> Result<Self> {
        shape.check_rank(&origin)?;
        if data.len() != shape.volume() {
            return Err(SliceError::LengthMismatch {
                expected: shape.volume(),
                got: data.len(),
            }
            .into());
        }
        Ok(Self {
            origin,
            shape,
            locality,
            data,
        })
    }

    /// A partition with every element set to `value`.
    pub fn filled(origin: Index, shape: Shape, locality: usize, value: T) -> Self
    where
        T: Clone,
    {
        let data = vec![value; shape.volume()];
        Self {
            origin,
            shape,
            locality,
            data,
        }
    }

    pub fn origin(&self) -> &[usize] {
        &self.origin
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn locality(&self) -> usize {
        self.locality
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The region of the global array covered by this partition.
    pub fn slab(&self) -> Hyperslab {
        Hyperslab::contiguous(self.origin.clone(), self.shape.extents().to_vec())
    }

    /// The element at a global index.
    pub fn get(&self, index: &[usize]) -> Result<&T> {
        let local: Vec<usize> = index
            .iter()
            .zip(&self.origin)
            .map(|(i, o)| i.checked_sub(*o).unwrap_or(usize::MAX))
            .collect();
        Ok(&self.data[self.shape.linear_index(&local)?])
    }

    /// Copy out the elements of `slab`, given in global coordinates.
    pub fn gather(&self, slab: &Hyperslab) -> Result<Vec<T>>
    where
        T: Clone,
    {
        let local = slab.relative_to(&self.origin)?;
        Ok(Slice::new_row_major(self.shape.extents().to_vec())
            .hyperslab(&local)?
            .gather(&self.data)?)
    }

    /// A larger partition containing this one, the new cells set to
    /// `fill`. The buffer is replaced.
    pub fn expand(&self, origin: Index, shape: Shape, fill: T) -> Result<Self>
    where
        T: Clone,
    {
        let expanded = Hyperslab::contiguous(origin.clone(), shape.extents().to_vec());
        if !self.slab().relative_to(&origin)?.is_within(&shape) {
            return Err(Error::invalid_argument(format!(
                "expanded partition {:?} does not contain {:?}",
                expanded,
                self.slab()
            )));
        }
        let mut data = vec![fill; shape.volume()];
        Slice::new_row_major(shape.extents().to_vec())
            .hyperslab(&self.slab().relative_to(&origin)?)?
            .scatter(&mut data, &self.data)?;
        Partition::new(origin, shape, self.locality, data)
    }

    /// A copy of this partition owned by `locality`.
    pub fn relocated(&self, locality: usize) -> Self
    where
        T: Clone,
    {
        Self {
            locality,
            ..self.clone()
        }
    }
}

impl<T: Serialize + DeserializeOwned> Partition<T> {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let partition: Self = bincode::deserialize(bytes)?;
        if partition.data.len() != partition.shape.volume() {
            return Err(Error::Serialization(format!(
                "partition at {:?} holds {} elements, expected {}",
                partition.origin,
                partition.data.len(),
                partition.shape.volume()
            )));
        }
        Ok(partition)
    }

    /// Transfer this partition by value to `locality`.
    pub fn transfer(&self, locality: usize) -> Result<Self> {
        let mut partition = Self::from_bytes(&self.to_bytes()?)?;
        partition.locality = locality;
        Ok(partition)
    }
}

/// A block of elements copied out of a partition, sent to the
/// partition that needs it as halo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaloFragment<T> {
    pub slab: Hyperslab,
    pub values: Vec<T>,
}

impl<T: Serialize + DeserializeOwned> HaloFragment<T> {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let fragment: Self = bincode::deserialize(bytes)?;
        if fragment.values.len() != fragment.slab.volume() {
            return Err(Error::Serialization(format!(
                "halo fragment holds {} elements, expected {}",
                fragment.values.len(),
                fragment.slab.volume()
            )));
        }
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use gridslice::shape;

    use super::*;

    fn partition() -> Partition<i32> {
        Partition::new(vec![2, 3], shape![3, 4], 1, (0..12).collect()).unwrap()
    }

    #[test]
    fn test_new_checks_length() {
        assert!(Partition::new(vec![0, 0], shape![2, 2], 0, vec![1, 2, 3]).is_err());
        assert!(Partition::<u8>::new(vec![0], shape![2, 2], 0, vec![0; 4]).is_err());
        let p = Partition::filled(vec![0, 0], shape![2, 3], 0, 7u8);
        assert_eq!(p.data(), &[7; 6]);
    }

    #[test]
    fn test_get_global() {
        let p = partition();
        assert_eq!(*p.get(&[2, 3]).unwrap(), 0);
        assert_eq!(*p.get(&[4, 6]).unwrap(), 11);
        assert!(p.get(&[1, 3]).is_err());
        assert!(p.get(&[5, 3]).is_err());
    }

    #[test]
    fn test_gather() {
        let p = partition();
        let slab = Hyperslab::contiguous(vec![3, 4], vec![2, 2]);
        assert_eq!(p.gather(&slab).unwrap(), vec![5, 6, 9, 10]);
        let outside = Hyperslab::contiguous(vec![3, 5], vec![2, 3]);
        assert!(p.gather(&outside).is_err());
        let before = Hyperslab::contiguous(vec![0, 0], vec![1, 1]);
        assert!(p.gather(&before).is_err());
    }

    #[test]
    fn test_expand() {
        let p = Partition::new(vec![1, 1], shape![1, 2], 0, vec![1, 2]).unwrap();
        let e = p.expand(vec![0, 0], shape![3, 3], 0).unwrap();
        assert_eq!(e.data(), &[0, 0, 0, 0, 1, 2, 0, 0, 0]);
        assert!(p.expand(vec![1, 2], shape![3, 3], 0).is_err());
    }

    #[test]
    fn test_transfer() {
        let p = partition();
        let moved = p.transfer(3).unwrap();
        assert_eq!(moved.locality(), 3);
        assert_eq!(moved.data(), p.data());
        assert_eq!(moved.relocated(1), p);

        let fragment = HaloFragment {
            slab: Hyperslab::contiguous(vec![0, 0], vec![1, 2]),
            values: vec![1.5f32, f32::NAN],
        };
        let decoded = HaloFragment::<f32>::from_bytes(&fragment.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.values[0], 1.5);
        assert!(decoded.values[1].is_nan());
    }
}
