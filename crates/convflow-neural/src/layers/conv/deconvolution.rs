use super::base::BaseConvolution;
use super::config::ConvolutionConfig;
use super::convolution::check_backward_arity;
use super::geometry::ConvDirection;
use crate::layers::{Layer, LayerType};
use convflow_core::monitoring::PhaseRecorder;
use convflow_core::{ConvElement, Result, Tensor};
use std::sync::Arc;

/// Transposed convolution.
///
/// The forward pass is the data gradient of a convolution whose input is this layer's top, so the
/// weight is shaped `[channels, num_output / group, kernel...]` and every spatial axis grows to
/// `stride * (in - 1) + dilation * (kernel - 1) + 1 - 2 * pad`.
pub struct Deconvolution<T> {
    base: BaseConvolution<T>,
}

impl<T: ConvElement> Deconvolution<T> {
    pub fn new(config: ConvolutionConfig) -> Self {
        Self {
            base: BaseConvolution::new(config, ConvDirection::Reversed),
        }
    }

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

impl<T: ConvElement> Layer<T> for Deconvolution<T> {
    fn layer_type(&self) -> LayerType {
        LayerType::Deconvolution
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
            // bottom sits on the GEMM side of the frame, top on the im2col side
            self.base.backward_frames(b.data(), t.data_mut())?;
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
            }
            let bottom_out = if propagate_down[i] {
                bottom_diff[i].reshape_like(bottom[i])?;
                Some(bottom_diff[i].data_mut())
            } else {
                None
            };
            match (training, bottom_out) {
                (true, out) => {
                    self.base
                        .weight_grad_frames(top_diff[i].data(), bottom[i].data(), out)?;
                }
                (false, Some(out)) => {
                    self.base.forward_frames(top_diff[i].data(), out)?;
                }
                (false, None) => {}
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
