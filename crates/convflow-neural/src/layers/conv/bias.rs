//! Bias broadcast and reduction as rank-1 GEMM / GEMV against an all-ones vector.

use convflow_core::monitoring::{ConvPhase, PhaseRecorder, PhaseTimer};
use convflow_core::ops::{gemm, gemv, reduce_add, Transpose};
use convflow_core::{ConvElement, Result, ScratchBuffer};

pub struct BiasEngine<'a, T> {
    num_output: usize,
    out_spatial_dim: usize,
    /// `out_spatial_dim` ones
    multiplier: &'a [T],
    recorder: Option<&'a dyn PhaseRecorder>,
}

impl<'a, T: ConvElement> BiasEngine<'a, T> {
    pub fn new(
        num_output: usize,
        out_spatial_dim: usize,
        multiplier: &'a [T],
        recorder: Option<&'a dyn PhaseRecorder>,
    ) -> Self {
        Self {
            num_output,
            out_spatial_dim,
            multiplier,
            recorder,
        }
    }

    /// `output += bias * ones^T` for one image
    pub fn forward_bias(&self, output: &mut [T], bias: &[T]) -> Result<()> {
        self.forward_bias_rows(output, bias, self.num_output)
    }

    /// Same broadcast over `tile` consecutive images, with `bias_rep` holding `tile` copies
    pub fn forward_bias_tile(&self, output: &mut [T], bias_rep: &[T], tile: usize) -> Result<()> {
        self.forward_bias_rows(output, bias_rep, tile * self.num_output)
    }

    fn forward_bias_rows(&self, output: &mut [T], bias: &[T], rows: usize) -> Result<()> {
        let _t = PhaseTimer::start(self.recorder, ConvPhase::Bias);
        gemm(
            Transpose::No,
            Transpose::No,
            rows,
            self.out_spatial_dim,
            1,
            T::one(),
            bias,
            self.multiplier,
            T::one(),
            output,
        )
    }

    /// `bias_diff += output_diff * ones` for one image
    pub fn backward_bias(&self, bias_diff: &mut [T], output_diff: &[T]) -> Result<()> {
        let _t = PhaseTimer::start(self.recorder, ConvPhase::Bias);
        gemv(
            Transpose::No,
            self.num_output,
            self.out_spatial_dim,
            T::one(),
            output_diff,
            self.multiplier,
            T::one(),
            bias_diff,
        )
    }

    /// Bias gradient of a whole batch: one GEMV into a per-image buffer, then a sum over images
    pub fn backward_bias_batch(
        &self,
        bias_diff: &mut [T],
        output_diff: &[T],
        batch: usize,
    ) -> Result<()> {
        let mut per_image =
            ScratchBuffer::<T>::zeroed("backward_bias_batch", batch * self.num_output)?;
        {
            let _t = PhaseTimer::start(self.recorder, ConvPhase::Bias);
            gemv(
                Transpose::No,
                batch * self.num_output,
                self.out_spatial_dim,
                T::one(),
                output_diff,
                self.multiplier,
                T::zero(),
                &mut per_image,
            )?;
        }
        let _t = PhaseTimer::start(self.recorder, ConvPhase::Reduce);
        reduce_add(bias_diff, &per_image, batch, self.num_output)
    }
}
