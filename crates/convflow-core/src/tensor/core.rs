//! Core Tensor Structure and Properties
//!
//! The tensor is a contiguous, row-major buffer plus its shape. Layers read and write it
//! through flat slices; axis bookkeeping goes through [`Shape`].

use crate::dtype::ConvElement;
use crate::{Result, Shape};

/// Core tensor structure that holds data and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub(in crate::tensor) data: Vec<T>,
    pub(in crate::tensor) shape: Shape,
    pub(in crate::tensor) requires_grad: bool,
}

impl<T> Tensor<T> {
    /// Get the shape of the tensor
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Get the data type of the tensor
    pub fn dtype(&self) -> crate::DType
    where
        T: ConvElement,
    {
        T::DTYPE
    }

    /// Check if tensor receives gradient updates
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// Read-only flat view in row-major order
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable flat view in row-major order
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Get the total number of elements
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Get the number of dimensions (rank)
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Size of a single axis
    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    /// Number of elements spanned by the axes `[start_axis, end_axis)`
    pub fn count(&self, start_axis: usize, end_axis: usize) -> usize {
        self.shape.count(start_axis, end_axis)
    }

    pub fn count_from(&self, start_axis: usize) -> usize {
        self.shape.count_from(start_axis)
    }

    pub fn canonical_axis_index(&self, axis: isize) -> Result<usize> {
        self.shape.canonical_axis_index(axis)
    }

    /// Check if tensor is empty (has no elements)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
