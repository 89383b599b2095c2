use crate::{Result, TensorError};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Row-major tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Total number of elements
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Product of the dimensions in `[start_axis, end_axis)`.
    ///
    /// An empty range counts as 1, so `count(axis, axis)` is always 1.
    pub fn count(&self, start_axis: usize, end_axis: usize) -> usize {
        debug_assert!(start_axis <= end_axis && end_axis <= self.rank());
        self.dims[start_axis..end_axis].iter().product()
    }

    /// Product of the dimensions from `start_axis` to the last axis.
    pub fn count_from(&self, start_axis: usize) -> usize {
        self.count(start_axis, self.rank())
    }

    /// Resolve a possibly negative axis index into `0..rank`.
    ///
    /// Negative values count from the last axis (`-1` is the last axis).
    pub fn canonical_axis_index(&self, axis: isize) -> Result<usize> {
        let rank = self.rank() as isize;
        if axis < -rank || axis >= rank {
            return Err(TensorError::invalid_axis(
                "canonical_axis_index",
                axis,
                self.rank(),
            ));
        }
        Ok(if axis < 0 { axis + rank } else { axis } as usize)
    }

    /// Get an iterator over the dimensions
    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.dims.iter()
    }

    /// Convert dimensions to a vector
    pub fn to_vec(&self) -> Vec<usize> {
        self.dims.clone()
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::from_slice(dims)
    }
}

impl Index<usize> for Shape {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.dims[index]
    }
}

impl IndexMut<usize> for Shape {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.dims[index]
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}
