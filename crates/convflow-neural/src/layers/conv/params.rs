//! Weight and bias ownership.

use crate::fillers::{create_filler, FillerConfig};
use convflow_core::{ConvElement, Result, Tensor, TensorError};

/// Borrowed parameter buffers for one engine call: values read-only, gradients writable
pub struct ParamSlices<'a, T> {
    pub weight: &'a [T],
    pub bias: Option<&'a [T]>,
    pub weight_diff: &'a mut [T],
    pub bias_diff: Option<&'a mut [T]>,
}

/// Owns the weight, the optional bias and their gradients
#[derive(Debug, Clone)]
pub struct ParameterStore<T> {
    weight: Tensor<T>,
    bias: Option<Tensor<T>>,
    weight_diff: Tensor<T>,
    bias_diff: Option<Tensor<T>>,
    initialized: bool,
}

impl<T: ConvElement> Default for ParameterStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ConvElement> ParameterStore<T> {
    pub fn new() -> Self {
        Self {
            weight: Tensor::zeros(&[0]),
            bias: None,
            weight_diff: Tensor::zeros(&[0]),
            bias_diff: None,
            initialized: false,
        }
    }

    /// Create the parameters on first use, or validate persisted ones.
    ///
    /// On first use the weight (and the bias when `bias_shape` is given) are allocated and
    /// filled. Afterwards the existing tensors must match the expected shapes exactly.
    pub fn setup(
        &mut self,
        weight_shape: &[usize],
        bias_shape: Option<&[usize]>,
        weight_filler: &FillerConfig,
        bias_filler: &FillerConfig,
        seed: Option<u64>,
    ) -> Result<()> {
        if self.initialized {
            log::debug!("skipping parameter initialization, validating persisted shapes");
            self.validate(weight_shape, bias_shape)?;
        } else {
            let mut weight = Tensor::zeros(weight_shape);
            create_filler::<T>(weight_filler, seed).fill(&mut weight)?;
            let bias = match bias_shape {
                Some(shape) => {
                    let mut bias = Tensor::zeros(shape);
                    create_filler::<T>(bias_filler, seed.map(|s| s.wrapping_add(1)))
                        .fill(&mut bias)?;
                    Some(bias)
                }
                None => None,
            };
            self.weight = weight;
            self.bias = bias;
            self.initialized = true;
        }

        self.weight_diff = Tensor::zeros(self.weight.dims());
        self.bias_diff = self.bias.as_ref().map(|b| Tensor::zeros(b.dims()));
        self.weight.set_requires_grad(true);
        if let Some(bias) = self.bias.as_mut() {
            bias.set_requires_grad(true);
        }
        Ok(())
    }

    fn validate(&self, weight_shape: &[usize], bias_shape: Option<&[usize]>) -> Result<()> {
        if self.weight.dims() != weight_shape {
            return Err(TensorError::shape_mismatch(
                "parameter_setup",
                &format!("weight shape {weight_shape:?}"),
                &format!("{:?}", self.weight.dims()),
            ));
        }
        match (bias_shape, self.bias.as_ref()) {
            (Some(expected), Some(bias)) if bias.dims() != expected => {
                Err(TensorError::shape_mismatch(
                    "parameter_setup",
                    &format!("bias shape {expected:?}"),
                    &format!("{:?}", bias.dims()),
                ))
            }
            (Some(_), None) => Err(TensorError::shape_mismatch(
                "parameter_setup",
                "a bias term",
                "no bias",
            )),
            (None, Some(_)) => Err(TensorError::shape_mismatch(
                "parameter_setup",
                "no bias",
                "a bias term",
            )),
            _ => Ok(()),
        }
    }

    /// Take over persisted parameters; the next `setup` validates them instead of filling
    pub fn adopt(&mut self, weight: Tensor<T>, bias: Option<Tensor<T>>) {
        self.weight_diff = Tensor::zeros(weight.dims());
        self.bias_diff = bias.as_ref().map(|b| Tensor::zeros(b.dims()));
        self.weight = weight;
        self.bias = bias;
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    pub fn weight(&self) -> &Tensor<T> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor<T>> {
        self.bias.as_ref()
    }

    pub fn weight_diff(&self) -> &Tensor<T> {
        &self.weight_diff
    }

    pub fn bias_diff(&self) -> Option<&Tensor<T>> {
        self.bias_diff.as_ref()
    }

    pub fn slices(&mut self) -> ParamSlices<'_, T> {
        ParamSlices {
            weight: self.weight.data(),
            bias: self.bias.as_ref().map(|b| b.data()),
            weight_diff: self.weight_diff.data_mut(),
            bias_diff: self.bias_diff.as_mut().map(|b| b.data_mut()),
        }
    }

    /// Zero every gradient
    pub fn clear_gradients(&mut self) {
        self.weight_diff.fill_(T::zero());
        if let Some(diff) = self.bias_diff.as_mut() {
            diff.fill_(T::zero());
        }
    }

    /// Multiply every gradient by `alpha`, e.g. to average over iterations
    pub fn scale_gradients(&mut self, alpha: T) {
        self.weight_diff.scale_(alpha);
        if let Some(diff) = self.bias_diff.as_mut() {
            diff.scale_(alpha);
        }
    }

    pub fn parameters(&self) -> Vec<&Tensor<T>> {
        let mut params = vec![&self.weight];
        params.extend(self.bias.as_ref());
        params
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor<T>> {
        let mut params = vec![&mut self.weight];
        params.extend(self.bias.as_mut());
        params
    }

    pub fn gradients(&self) -> Vec<&Tensor<T>> {
        let mut grads = vec![&self.weight_diff];
        grads.extend(self.bias_diff.as_ref());
        grads
    }
}
