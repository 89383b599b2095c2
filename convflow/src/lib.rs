//! # convflow
//!
//! Convolution and deconvolution over any number of spatial axes, lowered to im2col and grouped
//! GEMM, with an optional batch-tiled engine that stages the weights once per tile of images.
//!
//! - **convflow-core**: tensor container, GEMM/GEMV, im2col/col2im, replication and reduction
//!   primitives, the partitioned scale kernel and phase instrumentation
//! - **convflow-neural**: fillers, the [`Layer`](prelude::Layer) trait and the convolution layers
//!
//! ## Quick Start
//!
//! ```rust
//! use convflow::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let stats = Arc::new(PhaseStats::new());
//! let config = ConvolutionConfig::new(16)
//!     .with_kernel_size(3)
//!     .with_stride(&[2])
//!     .with_pad(&[1])
//!     .with_engine(ConvEngine::batch_tiled());
//! let mut conv = Convolution::<f32>::new(config).with_recorder(stats.clone());
//!
//! let input = Tensor::ones(&[8, 3, 32, 32]);
//! let output = conv.forward_single(&input)?;
//! assert_eq!(output.dims(), &[8, 16, 16, 16]);
//! assert_eq!(stats.calls(ConvPhase::Im2Col), 1);
//! # Ok(())
//! # }
//! ```

pub use convflow_core;
pub use convflow_neural;

pub mod prelude {
    pub use convflow_core::ops::{
        col2im, gemm, gemv, im2col, reduce_add, replicate, scale, scale_in_place, Im2ColGeometry,
        ScaleKernel, Transpose,
    };
    pub use convflow_core::{
        ConvElement, ConvPhase, DType, PhaseRecorder, PhaseStats, Result, Shape, Tensor,
        TensorError, WorkPartition,
    };
    pub use convflow_neural::fillers::{create_filler, Filler, FillerConfig};
    pub use convflow_neural::layers::{
        ConvDirection, ConvEngine, Convolution, ConvolutionConfig, Deconvolution, Layer,
        LayerType, TilePlan,
    };
}
