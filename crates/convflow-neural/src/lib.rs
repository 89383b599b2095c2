#![allow(clippy::result_large_err)]

//! # convflow neural layers
//!
//! Convolution and deconvolution layers over any number of spatial axes, lowered to im2col and
//! grouped GEMM on top of `convflow-core`.
//!
//! ## Quick Start
//!
//! ```rust
//! use convflow_neural::layers::{ConvEngine, Convolution, ConvolutionConfig, Layer};
//! use convflow_core::Tensor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConvolutionConfig::new(8)
//!     .with_kernel_size(3)
//!     .with_pad(&[1])
//!     .with_engine(ConvEngine::batch_tiled())
//!     .with_seed(7);
//! let mut conv = Convolution::<f32>::new(config);
//!
//! let input = Tensor::ones(&[4, 3, 16, 16]);
//! conv.setup(&[&input])?;
//! let mut top = vec![Tensor::zeros(&[0])];
//! conv.forward(&[&input], &mut top)?;
//! assert_eq!(top[0].dims(), &[4, 8, 16, 16]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Engines
//!
//! [`layers::ConvEngine::PerImage`] runs one GEMM per image and group.
//! [`layers::ConvEngine::BatchTiled`] expands up to `max_tile_size` images into one column
//! buffer and issues a strided batched GEMM per group, with weights replicated once per tile.
//! Both engines give the same results up to floating-point summation order.

pub mod fillers;
pub mod layers;

pub use fillers::{create_filler, Filler, FillerConfig};
pub use layers::{
    BaseConvolution, ConvDirection, ConvEngine, ConvGeometry, ConvShapes, Convolution,
    ConvolutionConfig, Deconvolution, Layer, LayerType, TilePlan,
};
