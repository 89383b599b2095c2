//! Convolution layer configuration.

use crate::fillers::FillerConfig;
use serde::{Deserialize, Serialize};

/// Largest tile the batch-tiled engine uses unless configured otherwise
pub const DEFAULT_MAX_TILE_SIZE: usize = 16;

/// How a batch is driven through the GEMMs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConvEngine {
    /// One im2col + grouped GEMM per image
    #[default]
    PerImage,
    /// `min(max_tile_size, batch)` images per grouped GEMM against replicated parameters
    BatchTiled { max_tile_size: usize },
}

impl ConvEngine {
    pub fn batch_tiled() -> Self {
        ConvEngine::BatchTiled {
            max_tile_size: DEFAULT_MAX_TILE_SIZE,
        }
    }
}

/// Recognised options of a convolution or deconvolution layer.
///
/// Kernel, stride and pad come either from the generic per-axis lists (one entry broadcast to
/// every spatial axis, or one entry per axis) or, for two spatial axes only, from the legacy
/// `*_h` / `*_w` pairs. Supplying both forms for the same quantity is rejected at setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvolutionConfig {
    pub num_output: usize,
    pub bias_term: bool,
    pub group: usize,
    /// Channel axis; negative values count from the end
    pub axis: isize,
    pub force_nd_im2col: bool,

    pub kernel_size: Vec<usize>,
    pub stride: Vec<usize>,
    pub pad: Vec<usize>,
    pub dilation: Vec<usize>,

    pub kernel_h: Option<usize>,
    pub kernel_w: Option<usize>,
    pub stride_h: Option<usize>,
    pub stride_w: Option<usize>,
    pub pad_h: Option<usize>,
    pub pad_w: Option<usize>,

    pub weight_filler: FillerConfig,
    pub bias_filler: FillerConfig,
    /// Seed for the fillers; unseeded fillers draw from entropy
    pub filler_seed: Option<u64>,

    pub engine: ConvEngine,
}

impl Default for ConvolutionConfig {
    fn default() -> Self {
        Self {
            num_output: 0,
            bias_term: true,
            group: 1,
            axis: 1,
            force_nd_im2col: false,
            kernel_size: Vec::new(),
            stride: Vec::new(),
            pad: Vec::new(),
            dilation: Vec::new(),
            kernel_h: None,
            kernel_w: None,
            stride_h: None,
            stride_w: None,
            pad_h: None,
            pad_w: None,
            weight_filler: FillerConfig::Xavier,
            bias_filler: FillerConfig::default(),
            filler_seed: None,
            engine: ConvEngine::default(),
        }
    }
}

impl ConvolutionConfig {
    pub fn new(num_output: usize) -> Self {
        Self {
            num_output,
            ..Self::default()
        }
    }

    /// Same kernel size on every spatial axis
    pub fn with_kernel_size(mut self, kernel: usize) -> Self {
        self.kernel_size = vec![kernel];
        self
    }

    pub fn with_kernel_shape(mut self, kernel: &[usize]) -> Self {
        self.kernel_size = kernel.to_vec();
        self
    }

    pub fn with_stride(mut self, stride: &[usize]) -> Self {
        self.stride = stride.to_vec();
        self
    }

    pub fn with_pad(mut self, pad: &[usize]) -> Self {
        self.pad = pad.to_vec();
        self
    }

    pub fn with_dilation(mut self, dilation: &[usize]) -> Self {
        self.dilation = dilation.to_vec();
        self
    }

    pub fn with_kernel_hw(mut self, h: usize, w: usize) -> Self {
        self.kernel_h = Some(h);
        self.kernel_w = Some(w);
        self
    }

    pub fn with_stride_hw(mut self, h: usize, w: usize) -> Self {
        self.stride_h = Some(h);
        self.stride_w = Some(w);
        self
    }

    pub fn with_pad_hw(mut self, h: usize, w: usize) -> Self {
        self.pad_h = Some(h);
        self.pad_w = Some(w);
        self
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    pub fn with_bias_term(mut self, bias_term: bool) -> Self {
        self.bias_term = bias_term;
        self
    }

    pub fn with_axis(mut self, axis: isize) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_force_nd_im2col(mut self, force: bool) -> Self {
        self.force_nd_im2col = force;
        self
    }

    pub fn with_weight_filler(mut self, filler: FillerConfig) -> Self {
        self.weight_filler = filler;
        self
    }

    pub fn with_bias_filler(mut self, filler: FillerConfig) -> Self {
        self.bias_filler = filler;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.filler_seed = Some(seed);
        self
    }

    pub fn with_engine(mut self, engine: ConvEngine) -> Self {
        self.engine = engine;
        self
    }
}
