//! Convolution and deconvolution over any number of spatial axes.
//!
//! Both layers lower to im2col + grouped GEMM. Per-image and batch-tiled engines produce the same
//! results; the tiled one trades column-buffer memory for fewer, larger GEMM calls.

mod base;
mod batch_tile;
mod bias;
mod config;
mod convolution;
mod deconvolution;
mod gemm_engine;
mod geometry;
mod output_shape;
mod params;

pub use base::BaseConvolution;
pub use batch_tile::{BatchTileEngine, TilePlan};
pub use bias::BiasEngine;
pub use config::{ConvEngine, ConvolutionConfig, DEFAULT_MAX_TILE_SIZE};
pub use convolution::Convolution;
pub use deconvolution::Deconvolution;
pub use gemm_engine::ConvolutionGemmEngine;
pub use geometry::{ChannelLayout, ConvDirection, ConvGeometry};
pub use output_shape::ConvShapes;
pub use params::{ParamSlices, ParameterStore};
