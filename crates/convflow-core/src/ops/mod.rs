//! Numeric primitives used by the convolution layers.

pub mod blas;
pub mod im2col;
pub mod replicate;
pub mod scale;

pub use blas::{gemm, gemm_strided_batched, gemv, Transpose};
pub use im2col::{col2im, col2im_tile, im2col, im2col_tile, Im2ColGeometry};
pub use replicate::{reduce_add, replicate};
pub use scale::{dscal, scale, scale_in_place, sscal, ScaleKernel};
