//! Tensor Creation and Construction

use super::core::Tensor;
use crate::{Result, Shape, TensorError};
use ndarray::ArrayD;
use num_traits::{One, Zero};

impl<T: Clone> Tensor<T> {
    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize]) -> Self
    where
        T: Zero,
    {
        Self::full(shape, T::zero())
    }

    /// Create a tensor filled with ones
    pub fn ones(shape: &[usize]) -> Self
    where
        T: One,
    {
        Self::full(shape, T::one())
    }

    /// Create a tensor filled with a constant value
    pub fn full(shape: &[usize], value: T) -> Self {
        let shape = Shape::from_slice(shape);
        Self {
            data: vec![value; shape.size()],
            shape,
            requires_grad: false,
        }
    }

    /// Create a tensor from a vector of data with specified shape
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let total_size: usize = shape.iter().product();
        if data.len() != total_size {
            return Err(TensorError::invalid_shape(
                "from_vec",
                &format!(
                    "data length {} doesn't match shape {:?} (size {})",
                    data.len(),
                    shape,
                    total_size
                ),
                Some(shape),
            ));
        }

        Ok(Self {
            data,
            shape: Shape::from_slice(shape),
            requires_grad: false,
        })
    }

    /// Create a tensor from an existing ndarray, copying it into row-major order
    pub fn from_array(array: ArrayD<T>) -> Self {
        let shape = Shape::from_slice(array.shape());
        let data = match array.as_slice() {
            Some(slice) => slice.to_vec(),
            None => array.iter().cloned().collect(),
        };
        Self {
            data,
            shape,
            requires_grad: false,
        }
    }
}
