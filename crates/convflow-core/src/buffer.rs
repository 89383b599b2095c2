//! Call-scoped scratch buffers.
//!
//! Column buffers, tile replication buffers and per-image bias buffers live for exactly one
//! forward/backward call. Allocation is fallible and reported as
//! [`TensorError::AllocationError`]; release happens on drop, on every exit path.

use crate::{Result, TensorError};
use num_traits::Zero;
use std::ops::{Deref, DerefMut};

/// Zero-initialised CPU buffer owned by a single engine call
#[derive(Debug)]
pub struct ScratchBuffer<T> {
    data: Vec<T>,
}

impl<T: Clone + Zero> ScratchBuffer<T> {
    /// Allocate `len` zeroed elements, naming `operation` in the error on failure
    pub fn zeroed(operation: &str, len: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| {
            TensorError::allocation_error(
                operation,
                &format!("cannot allocate scratch buffer of {len} elements"),
                len.checked_mul(std::mem::size_of::<T>()),
            )
        })?;
        data.resize(len, T::zero());
        Ok(Self { data })
    }

    /// Reset every element to zero
    pub fn clear(&mut self) {
        self.data.fill(T::zero());
    }
}

impl<T> ScratchBuffer<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Deref for ScratchBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for ScratchBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}
