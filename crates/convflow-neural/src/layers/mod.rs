pub mod conv;

pub use conv::{
    BaseConvolution, BatchTileEngine, BiasEngine, ChannelLayout, ConvDirection, ConvEngine,
    ConvGeometry, ConvShapes, Convolution, ConvolutionConfig, ConvolutionGemmEngine,
    Deconvolution, ParamSlices, ParameterStore, TilePlan, DEFAULT_MAX_TILE_SIZE,
};

use convflow_core::{ConvElement, Result, Tensor, TensorError};

/// Layer kinds provided by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerType {
    Convolution,
    Deconvolution,
}

impl LayerType {
    pub fn name(&self) -> &'static str {
        match self {
            LayerType::Convolution => "Convolution",
            LayerType::Deconvolution => "Deconvolution",
        }
    }
}

/// A layer with an explicit setup / reshape / forward / backward life cycle.
///
/// `setup` runs once with the first bottoms and fixes everything that depends on the
/// configuration and the channel count. `reshape` runs whenever the bottom shape changes and
/// sizes the tops. Bottom `i` always produces top `i`; all pairs share the parameters and
/// parameter gradients accumulate across pairs.
pub trait Layer<T: ConvElement> {
    fn layer_type(&self) -> LayerType;

    fn setup(&mut self, bottom: &[&Tensor<T>]) -> Result<()>;

    fn is_setup(&self) -> bool;

    fn reshape(&mut self, bottom: &[&Tensor<T>], top: &mut [Tensor<T>]) -> Result<()>;

    /// Compute every top from its bottom, reshaping the tops first
    fn forward(&mut self, bottom: &[&Tensor<T>], top: &mut [Tensor<T>]) -> Result<()>;

    /// Back-propagate `top_diff` (one gradient per top).
    ///
    /// Parameter gradients are accumulated while training. `bottom_diff[i]` is reshaped to
    /// `bottom[i]` and overwritten when `propagate_down[i]` is set, left untouched otherwise.
    fn backward(
        &mut self,
        top_diff: &[&Tensor<T>],
        propagate_down: &[bool],
        bottom: &[&Tensor<T>],
        bottom_diff: &mut [Tensor<T>],
    ) -> Result<()>;

    fn parameters(&self) -> Vec<&Tensor<T>>;
    fn parameters_mut(&mut self) -> Vec<&mut Tensor<T>>;

    /// Parameter gradients, in the same order as [`Layer::parameters`]
    fn gradients(&self) -> Vec<&Tensor<T>>;

    fn set_training(&mut self, training: bool);
    fn is_training(&self) -> bool;

    /// Run a single bottom through the layer, setting it up on first use
    fn forward_single(&mut self, input: &Tensor<T>) -> Result<Tensor<T>> {
        if !self.is_setup() {
            self.setup(&[input])?;
        }
        let mut top = vec![Tensor::zeros(&[0])];
        self.forward(&[input], &mut top)?;
        top.pop().ok_or_else(|| {
            TensorError::invalid_argument_op("forward_single", "layer produced no output")
        })
    }
}
