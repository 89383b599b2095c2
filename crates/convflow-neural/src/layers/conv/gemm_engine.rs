//! Per-image convolution through im2col and grouped GEMM.
//!
//! All buffers are in the convolution frame (see [`ConvShapes`]): `input` is one image on the
//! im2col side, `output` one image on the GEMM side. The 1x1 path uses the image itself as its
//! column matrix.

use super::output_shape::ConvShapes;
use convflow_core::monitoring::{ConvPhase, PhaseRecorder, PhaseTimer};
use convflow_core::ops::{col2im, gemm, im2col, Transpose};
use convflow_core::{ConvElement, Result, ScratchBuffer, TensorError};

/// Fail unless a buffer of `got` elements can hold `needed`
pub(super) fn require_len(operation: &str, what: &str, got: usize, needed: usize) -> Result<()> {
    if got < needed {
        return Err(TensorError::invalid_argument_op(
            operation,
            &format!("{what} holds {got} elements, needs {needed}"),
        ));
    }
    Ok(())
}

pub struct ConvolutionGemmEngine<'a> {
    pub(super) shapes: &'a ConvShapes,
    pub(super) is_1x1: bool,
    pub(super) recorder: Option<&'a dyn PhaseRecorder>,
}

impl<'a> ConvolutionGemmEngine<'a> {
    pub fn new(
        shapes: &'a ConvShapes,
        is_1x1: bool,
        recorder: Option<&'a dyn PhaseRecorder>,
    ) -> Self {
        Self {
            shapes,
            is_1x1,
            recorder,
        }
    }

    pub fn shapes(&self) -> &ConvShapes {
        self.shapes
    }

    pub fn is_1x1(&self) -> bool {
        self.is_1x1
    }

    pub(super) fn timer(&self, phase: ConvPhase) -> PhaseTimer<'a> {
        PhaseTimer::start(self.recorder, phase)
    }

    /// Group weight blocks span `group * weight_offset` elements
    pub(super) fn weight_len(&self) -> usize {
        self.shapes.group * self.shapes.weight_offset
    }

    fn check_image(
        &self,
        operation: &str,
        input: usize,
        weights: usize,
        output: usize,
        col: usize,
    ) -> Result<()> {
        require_len(operation, "input", input, self.shapes.conv_input_dim())?;
        require_len(operation, "weights", weights, self.weight_len())?;
        require_len(operation, "output", output, self.shapes.conv_output_dim())?;
        if !self.is_1x1 {
            require_len(operation, "column buffer", col, self.shapes.col_dim())?;
        }
        Ok(())
    }

    /// Column buffer for `images` images; empty on the 1x1 path
    pub fn col_buffer<T: ConvElement>(
        &self,
        operation: &str,
        images: usize,
    ) -> Result<ScratchBuffer<T>> {
        let len = if self.is_1x1 {
            0
        } else {
            self.shapes.col_dim() * images
        };
        ScratchBuffer::zeroed(operation, len)
    }

    /// `output = weight * im2col(input)` per group, overwriting `output`.
    ///
    /// With `skip_im2col` the caller guarantees `col` already holds the expansion of `input`.
    pub fn forward_gemm<T: ConvElement>(
        &self,
        input: &[T],
        weights: &[T],
        output: &mut [T],
        col: &mut [T],
        skip_im2col: bool,
    ) -> Result<()> {
        self.check_image("forward_gemm", input.len(), weights.len(), output.len(), col.len())?;
        let col_buff: &[T] = if self.is_1x1 {
            input
        } else {
            if !skip_im2col {
                let _t = self.timer(ConvPhase::Im2Col);
                im2col(&self.shapes.im2col, input, col)?;
            }
            col
        };

        let s = self.shapes;
        let _t = self.timer(ConvPhase::Gemm);
        for g in 0..s.group {
            gemm(
                Transpose::No,
                Transpose::No,
                s.group_out_channels(),
                s.conv_out_spatial_dim,
                s.kernel_dim,
                T::one(),
                &weights[g * s.weight_offset..],
                &col_buff[g * s.col_offset..],
                T::zero(),
                &mut output[g * s.output_offset..],
            )?;
        }
        Ok(())
    }

    /// `input = col2im(weight^T * output)`, overwriting `input`
    pub fn backward_gemm<T: ConvElement>(
        &self,
        output: &[T],
        weights: &[T],
        input: &mut [T],
        col: &mut [T],
    ) -> Result<()> {
        self.check_image("backward_gemm", input.len(), weights.len(), output.len(), col.len())?;
        if self.is_1x1 {
            return self.transpose_groups(output, weights, input);
        }
        self.transpose_groups(output, weights, col)?;

        let _t = self.timer(ConvPhase::Col2Im);
        let input = &mut input[..self.shapes.conv_input_dim()];
        input.fill(T::zero());
        col2im(&self.shapes.im2col, col, input)
    }

    fn transpose_groups<T: ConvElement>(
        &self,
        output: &[T],
        weights: &[T],
        col: &mut [T],
    ) -> Result<()> {
        let s = self.shapes;
        let _t = self.timer(ConvPhase::Gemm);
        for g in 0..s.group {
            gemm(
                Transpose::Yes,
                Transpose::No,
                s.kernel_dim,
                s.conv_out_spatial_dim,
                s.group_out_channels(),
                T::one(),
                &weights[g * s.weight_offset..],
                &output[g * s.output_offset..],
                T::zero(),
                &mut col[g * s.col_offset..],
            )?;
        }
        Ok(())
    }

    /// `weight_diff += output * im2col(input)^T` per group; leaves the expansion in `col`
    pub fn weight_gemm<T: ConvElement>(
        &self,
        input: &[T],
        output: &[T],
        weight_diff: &mut [T],
        col: &mut [T],
    ) -> Result<()> {
        self.check_image("weight_gemm", input.len(), weight_diff.len(), output.len(), col.len())?;
        let col_buff: &[T] = if self.is_1x1 {
            input
        } else {
            let _t = self.timer(ConvPhase::Im2Col);
            im2col(&self.shapes.im2col, input, col)?;
            col
        };

        let s = self.shapes;
        let _t = self.timer(ConvPhase::Gemm);
        for g in 0..s.group {
            gemm(
                Transpose::No,
                Transpose::Yes,
                s.group_out_channels(),
                s.kernel_dim,
                s.conv_out_spatial_dim,
                T::one(),
                &output[g * s.output_offset..],
                &col_buff[g * s.col_offset..],
                T::one(),
                &mut weight_diff[g * s.weight_offset..],
            )?;
        }
        Ok(())
    }
}
