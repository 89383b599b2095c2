#![allow(clippy::result_large_err)]

//! Tensor container and numeric primitives for convflow.
//!
//! Everything here operates on contiguous row-major buffers: dense GEMM/GEMV, im2col/col2im
//! for single images and for tiles of images, the replication and weight-reduction primitives
//! of the batch-tiled engine, and the partitioned elementwise-scale kernel.

pub mod buffer;
pub mod dtype;
pub mod error;
pub mod monitoring;
pub mod ops;
pub mod parallel;
pub mod shape;
pub mod tensor;

pub use buffer::ScratchBuffer;
pub use dtype::{dtype_of, ConvElement, DType};
pub use error::{Result, TensorError};
pub use monitoring::{ConvPhase, PhaseRecorder, PhaseStats, PhaseTimer};
pub use parallel::WorkPartition;
pub use shape::Shape;
pub use tensor::Tensor;
