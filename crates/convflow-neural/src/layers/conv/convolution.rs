use super::base::BaseConvolution;
use super::config::ConvolutionConfig;
use super::geometry::ConvDirection;
use crate::layers::{Layer, LayerType};
use convflow_core::monitoring::PhaseRecorder;
use convflow_core::{ConvElement, Result, Tensor, TensorError};
use std::sync::Arc;

/// N-dimensional convolution: `top = weight * bottom + bias`
///
/// # Example
///
/// ```
/// use convflow_neural::layers::{Convolution, ConvolutionConfig, Layer};
/// use convflow_core::Tensor;
///
/// let config = ConvolutionConfig::new(4).with_kernel_size(3).with_pad(&[1]);
/// let mut conv = Convolution::<f32>::new(config);
/// let input = Tensor::ones(&[2, 3, 8, 8]);
/// let output = conv.forward_single(&input).unwrap();
/// assert_eq!(output.dims(), &[2, 4, 8, 8]);
/// ```
pub struct Convolution<T> {
    base: BaseConvolution<T>,
}

impl<T: ConvElement> Convolution<T> {
    pub fn new(config: ConvolutionConfig) -> Self {
        Self {
            base: BaseConvolution::new(config, ConvDirection::Forward),
        }
    }

    /// Use existing parameters instead of filling new ones; shapes are checked at setup
    pub fn with_parameters(
        config: ConvolutionConfig,
        weight: Tensor<T>,
        bias: Option<Tensor<T>>,
    ) -> Self {
        let mut layer = Self::new(config);
        layer.base.params_mut().adopt(weight, bias);
        layer
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn PhaseRecorder>) -> Self {
        self.base.set_recorder(Some(recorder));
        self
    }

    pub fn base(&self) -> &BaseConvolution<T> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut BaseConvolution<T> {
        &mut self.base
    }

    pub fn weight(&self) -> &Tensor<T> {
        self.base.params().weight()
    }

    pub fn bias(&self) -> Option<&Tensor<T>> {
        self.base.params().bias()
    }
}

pub(super) fn check_backward_arity(
    top_diff: usize,
    propagate_down: usize,
    bottom: usize,
    bottom_diff: usize,
) -> Result<()> {
    if top_diff != bottom || propagate_down != bottom || bottom_diff != bottom {
        return Err(TensorError::invalid_argument_op(
            "conv_backward",
            &format!(
                "{bottom} bottoms need as many top gradients, flags and bottom gradients \
                 (got {top_diff}, {propagate_down}, {bottom_diff})"
            ),
        ));
    }
    Ok(())
}

impl<T: ConvElement> Layer<T> for Convolution<T> {
    fn layer_type(&self) -> LayerType {
        LayerType::Convolution
    }

    fn setup(&mut self, bottom: &[&Tensor<T>]) -> Result<()> {
        self.base.setup(bottom)
    }

    fn is_setup(&self) -> bool {
        self.base.is_setup()
    }

    fn reshape(&mut self, bottom: &[&Tensor<T>], top: &mut [Tensor<T>]) -> Result<()> {
        self.base.reshape(bottom, top)
    }

    fn forward(&mut self, bottom: &[&Tensor<T>], top: &mut [Tensor<T>]) -> Result<()> {
        self.base.reshape(bottom, top)?;
        for (b, t) in bottom.iter().zip(top.iter_mut()) {
            self.base.forward_frames(b.data(), t.data_mut())?;
            self.base.add_bias(t.data_mut())?;
        }
        Ok(())
    }

    fn backward(
        &mut self,
        top_diff: &[&Tensor<T>],
        propagate_down: &[bool],
        bottom: &[&Tensor<T>],
        bottom_diff: &mut [Tensor<T>],
    ) -> Result<()> {
        check_backward_arity(
            top_diff.len(),
            propagate_down.len(),
            bottom.len(),
            bottom_diff.len(),
        )?;
        let training = self.base.is_training();
        for i in 0..bottom.len() {
            self.base.check_backward_pair(top_diff[i], bottom[i])?;
            if training {
                self.base.bias_grad(top_diff[i].data())?;
                self.base.weight_grad_frames(bottom[i].data(), top_diff[i].data(), None)?;
            }
            if propagate_down[i] {
                bottom_diff[i].reshape_like(bottom[i])?;
                self.base.backward_frames(top_diff[i].data(), bottom_diff[i].data_mut())?;
            }
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<&Tensor<T>> {
        self.base.params().parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.base.params_mut().parameters_mut()
    }

    fn gradients(&self) -> Vec<&Tensor<T>> {
        self.base.params().gradients()
    }

    fn set_training(&mut self, training: bool) {
        self.base.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.base.is_training()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::FillerConfig;

    #[test]
    fn test_forward_known_values_with_bias() {
        // 1x1x3x3 input, 2x2 ones kernel, bias 0.5
        let config = ConvolutionConfig::new(1).with_kernel_size(2);
        let weight = Tensor::ones(&[1, 1, 2, 2]);
        let bias = Tensor::full(&[1], 0.5f32);
        let mut conv = Convolution::with_parameters(config, weight, Some(bias));
        let input = Tensor::from_vec((1..=9).map(|v| v as f32).collect(), &[1, 1, 3, 3]).unwrap();
        let out = conv.forward_single(&input).unwrap();
        assert_eq!(out.dims(), &[1, 1, 2, 2]);
        assert_eq!(out.data(), &[12.5, 16.5, 24.5, 28.5]);
    }

    #[test]
    fn test_persisted_parameters_are_validated() {
        let config = ConvolutionConfig::new(2).with_kernel_size(3);
        let mut conv =
            Convolution::<f32>::with_parameters(config, Tensor::zeros(&[2, 3, 2, 2]), None);
        let err = conv.setup(&[&Tensor::zeros(&[1, 3, 5, 5])]).unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_setup_fills_shapes() {
        let config = ConvolutionConfig::new(6)
            .with_kernel_hw(3, 2)
            .with_group(3)
            .with_bias_filler(FillerConfig::Constant { value: 0.25 })
            .with_seed(3);
        let mut conv = Convolution::<f64>::new(config);
        conv.setup(&[&Tensor::zeros(&[1, 9, 6, 6])]).unwrap();
        assert_eq!(conv.weight().dims(), &[6, 3, 3, 2]);
        let bias = conv.bias().unwrap();
        assert_eq!(bias.dims(), &[6]);
        assert!(bias.data().iter().all(|&b| b == 0.25));
        assert_eq!(conv.parameters().len(), 2);
        assert_eq!(conv.gradients().len(), 2);
    }

    #[test]
    fn test_invalid_filler_fails_setup() {
        let x = Tensor::<f32>::ones(&[1, 1, 3, 3]);
        let negative_std = ConvolutionConfig::new(2)
            .with_kernel_size(1)
            .with_weight_filler(FillerConfig::Gaussian {
                mean: 0.0,
                std: -1.0,
            });
        let err = Convolution::<f32>::new(negative_std).setup(&[&x]).unwrap_err();
        assert!(err.is_configuration_error());

        let unbounded = ConvolutionConfig::new(2)
            .with_kernel_size(1)
            .with_bias_filler(FillerConfig::Uniform {
                min: 0.0,
                max: f64::INFINITY,
            });
        let err = Convolution::<f32>::new(unbounded).setup(&[&x]).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_backward_arity_is_checked() {
        let mut conv = Convolution::<f32>::new(ConvolutionConfig::new(1).with_kernel_size(1));
        let x = Tensor::ones(&[1, 1, 2, 2]);
        let y = conv.forward_single(&x).unwrap();
        let mut diffs = vec![Tensor::zeros(&[0])];
        assert!(conv.backward(&[&y], &[true, true], &[&x], &mut diffs).is_err());
    }
}
