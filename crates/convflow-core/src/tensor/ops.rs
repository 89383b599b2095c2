//! Shape manipulation and in-place value operations.

use super::core::Tensor;
use crate::dtype::ConvElement;
use crate::ops::scale::scale_in_place;
use crate::{Result, Shape, TensorError};
use ndarray::{ArrayViewD, IxDyn};
use num_traits::Zero;

impl<T: Clone + Zero> Tensor<T> {
    /// Reshape in place.
    ///
    /// Keeps the data when the element count is unchanged; otherwise the buffer is
    /// reallocated and zero-filled, as a layer's output tensors are on every shape change.
    pub fn reshape_(&mut self, shape: &[usize]) -> Result<()> {
        let new_shape = Shape::from_slice(shape);
        let new_size = new_shape.size();
        if new_size != self.data.len() {
            let mut data = Vec::new();
            data.try_reserve_exact(new_size).map_err(|_| {
                TensorError::allocation_error(
                    "reshape",
                    &format!("cannot allocate {new_size} elements for shape {new_shape}"),
                    Some(new_size * std::mem::size_of::<T>()),
                )
            })?;
            data.resize(new_size, T::zero());
            self.data = data;
        }
        self.shape = new_shape;
        Ok(())
    }

    /// Reshape to match another tensor
    pub fn reshape_like(&mut self, other: &Tensor<T>) -> Result<()> {
        self.reshape_(other.dims())
    }
}

impl<T: Clone> Tensor<T> {
    /// Fill tensor with specified value
    pub fn fill_(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy values from a tensor of identical element count
    pub fn copy_from(&mut self, other: &Tensor<T>) -> Result<()> {
        if other.numel() != self.numel() {
            return Err(TensorError::shape_mismatch(
                "copy_from",
                &self.shape.to_string(),
                &other.shape.to_string(),
            ));
        }
        self.data.clone_from_slice(&other.data);
        Ok(())
    }

    /// Convert tensor to vector
    pub fn to_vec(&self) -> Vec<T> {
        self.data.clone()
    }

    /// Borrow as an n-dimensional ndarray view
    pub fn view(&self) -> Result<ArrayViewD<'_, T>> {
        Ok(ArrayViewD::from_shape(IxDyn(self.dims()), &self.data)?)
    }
}

impl<T: ConvElement> Tensor<T> {
    /// Multiply every element by `alpha` through the partitioned scale kernel
    pub fn scale_(&mut self, alpha: T) {
        scale_in_place(&mut self.data, alpha);
    }

    /// Check if all elements are close to another tensor within tolerance
    pub fn allclose(&self, other: &Self, rtol: T, atol: T) -> bool {
        if self.shape != other.shape {
            return false;
        }
        self.data.iter().zip(&other.data).all(|(&a, &b)| {
            let diff = (a - b).abs();
            diff <= atol + rtol * b.abs().max(a.abs())
        })
    }

    /// Sum of all elements
    pub fn sum(&self) -> T {
        self.data.iter().copied().sum()
    }
}
