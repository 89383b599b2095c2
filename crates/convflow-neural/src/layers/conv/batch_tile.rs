//! Batch-tiled convolution.
//!
//! A batch is cut into tiles of `tile` images. Each tile is expanded into one column buffer and
//! multiplied against `tile` replicated copies of the group weights by a single strided batched
//! GEMM per group, so the weights are staged once per tile instead of once per image.
//!
//! Replicated weights are laid out group-major: group `g` occupies
//! `[g * tile * weight_offset, (g + 1) * tile * weight_offset)` and copy `i` of it starts at
//! `i * weight_offset` inside that block. Weight gradients go through the same layout: every
//! image of a tile writes its own partial into its copy, and the copies are summed into the real
//! gradient afterwards.

use super::bias::BiasEngine;
use super::gemm_engine::{require_len, ConvolutionGemmEngine};
use convflow_core::monitoring::ConvPhase;
use convflow_core::ops::{
    col2im_tile, gemm_strided_batched, im2col_tile, reduce_add, replicate, Transpose,
};
use convflow_core::{ConvElement, Result, ScratchBuffer, TensorError};

/// How a batch is cut into tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    batch: usize,
    tile: usize,
}

impl TilePlan {
    /// `tile = min(max_tile, batch)`; the batch must split evenly into such tiles
    pub fn new(batch: usize, max_tile: usize) -> Result<Self> {
        if max_tile == 0 {
            return Err(TensorError::invalid_argument_op(
                "tile_plan",
                "maximum tile size must be positive",
            ));
        }
        Self::with_tile_size(batch, max_tile.min(batch).max(1))
    }

    /// Use exactly `tile` images per tile
    pub fn with_tile_size(batch: usize, tile: usize) -> Result<Self> {
        if tile == 0 {
            return Err(TensorError::invalid_argument_op(
                "tile_plan",
                "tile size must be positive",
            ));
        }
        if batch % tile != 0 {
            return Err(TensorError::invalid_batch_partition("tile_plan", batch, tile));
        }
        Ok(Self { batch, tile })
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn tile_size(&self) -> usize {
        self.tile
    }

    pub fn num_tiles(&self) -> usize {
        self.batch / self.tile
    }
}

pub struct BatchTileEngine<'a> {
    engine: &'a ConvolutionGemmEngine<'a>,
    plan: TilePlan,
}

impl<'a> BatchTileEngine<'a> {
    pub fn new(engine: &'a ConvolutionGemmEngine<'a>, plan: TilePlan) -> Result<Self> {
        if plan.batch() != engine.shapes().num {
            return Err(TensorError::invalid_argument_op(
                "batch_tile",
                &format!(
                    "plan covers {} images, bottom holds {}",
                    plan.batch(),
                    engine.shapes().num
                ),
            ));
        }
        Ok(Self { engine, plan })
    }

    pub fn plan(&self) -> TilePlan {
        self.plan
    }

    /// Whole-batch buffers on both sides of the convolution frame
    fn check_batch(&self, operation: &str, input: usize, output: usize) -> Result<()> {
        let s = self.engine.shapes();
        let batch = self.plan.batch();
        require_len(operation, "input", input, batch * s.conv_input_dim())?;
        require_len(operation, "output", output, batch * s.conv_output_dim())
    }

    /// `tile` copies of every group's weight block, group-major
    pub fn replicate_weights<T: ConvElement>(&self, weights: &[T]) -> Result<ScratchBuffer<T>> {
        require_len("replicate_weights", "weights", weights.len(), self.engine.weight_len())?;
        let s = self.engine.shapes();
        let tile = self.plan.tile_size();
        let len = s.group * tile * s.weight_offset;
        let mut rep = ScratchBuffer::zeroed("replicate_weights", len)?;
        let _t = self.engine.timer(ConvPhase::Replicate);
        for g in 0..s.group {
            replicate(
                &weights[g * s.weight_offset..],
                &mut rep[g * tile * s.weight_offset..],
                s.weight_offset,
                tile,
            )?;
        }
        Ok(rep)
    }

    /// `tile` copies of the bias
    pub fn replicate_bias<T: ConvElement>(&self, bias: &[T]) -> Result<ScratchBuffer<T>> {
        let num_output = self.engine.shapes().num_output;
        let tile = self.plan.tile_size();
        let mut rep = ScratchBuffer::zeroed("replicate_bias", tile * num_output)?;
        let _t = self.engine.timer(ConvPhase::Replicate);
        replicate(bias, &mut rep, num_output, tile)?;
        Ok(rep)
    }

    fn expand_tile<'b, T: ConvElement>(
        &self,
        images: &'b [T],
        col: &'b mut [T],
    ) -> Result<&'b [T]> {
        if self.engine.is_1x1() {
            return Ok(images);
        }
        let _t = self.engine.timer(ConvPhase::Im2Col);
        im2col_tile(&self.engine.shapes().im2col, images, col, self.plan.tile_size())?;
        Ok(col)
    }

    /// `output = weight * im2col(input)` for the whole batch, overwriting `output`
    pub fn forward<T: ConvElement>(
        &self,
        input: &[T],
        weights: &[T],
        output: &mut [T],
    ) -> Result<()> {
        self.check_batch("batch_tile_forward", input.len(), output.len())?;
        let s = self.engine.shapes();
        let tile = self.plan.tile_size();
        let (in_dim, out_dim) = (s.conv_input_dim(), s.conv_output_dim());
        let weight_rep = self.replicate_weights(weights)?;
        let mut col = self.engine.col_buffer::<T>("batch_tile_forward", tile)?;

        for t in 0..self.plan.num_tiles() {
            log::trace!("forward tile {t} ({tile} images)");
            let images = &input[t * tile * in_dim..(t + 1) * tile * in_dim];
            let out_tile = &mut output[t * tile * out_dim..(t + 1) * tile * out_dim];
            let col_buff = self.expand_tile(images, &mut col)?;

            let _t = self.engine.timer(ConvPhase::Gemm);
            for g in 0..s.group {
                gemm_strided_batched(
                    Transpose::No,
                    Transpose::No,
                    s.group_out_channels(),
                    s.conv_out_spatial_dim,
                    s.kernel_dim,
                    T::one(),
                    &weight_rep[g * tile * s.weight_offset..],
                    s.weight_offset,
                    &col_buff[g * s.col_offset..],
                    s.col_dim(),
                    T::zero(),
                    &mut out_tile[g * s.output_offset..],
                    out_dim,
                    tile,
                )?;
            }
        }
        Ok(())
    }

    /// `input = col2im(weight^T * output)` for the whole batch, overwriting `input`
    pub fn backward_data<T: ConvElement>(
        &self,
        output: &[T],
        weights: &[T],
        input: &mut [T],
    ) -> Result<()> {
        self.check_batch("batch_tile_backward", input.len(), output.len())?;
        let s = self.engine.shapes();
        let tile = self.plan.tile_size();
        let (in_dim, out_dim) = (s.conv_input_dim(), s.conv_output_dim());
        let weight_rep = self.replicate_weights(weights)?;
        let mut col = self.engine.col_buffer::<T>("batch_tile_backward", tile)?;

        for t in 0..self.plan.num_tiles() {
            log::trace!("backward tile {t} ({tile} images)");
            let grads = &output[t * tile * out_dim..(t + 1) * tile * out_dim];
            let images = &mut input[t * tile * in_dim..(t + 1) * tile * in_dim];
            let target: &mut [T] = if self.engine.is_1x1() { images } else { &mut col[..] };

            {
                let _t = self.engine.timer(ConvPhase::Gemm);
                for g in 0..s.group {
                    gemm_strided_batched(
                        Transpose::Yes,
                        Transpose::No,
                        s.kernel_dim,
                        s.conv_out_spatial_dim,
                        s.group_out_channels(),
                        T::one(),
                        &weight_rep[g * tile * s.weight_offset..],
                        s.weight_offset,
                        &grads[g * s.output_offset..],
                        out_dim,
                        T::zero(),
                        &mut target[g * s.col_offset..],
                        s.col_dim(),
                        tile,
                    )?;
                }
            }

            if !self.engine.is_1x1() {
                let _t = self.engine.timer(ConvPhase::Col2Im);
                let images = &mut input[t * tile * in_dim..(t + 1) * tile * in_dim];
                images.fill(T::zero());
                col2im_tile(&s.im2col, &col, images, tile)?;
            }
        }
        Ok(())
    }

    /// `weight_diff += sum over images of output * im2col(input)^T`.
    ///
    /// Each image's partial lands in its own replicated copy (`beta = 0`), then the `tile`
    /// copies are reduced into `weight_diff`.
    pub fn weight_grad<T: ConvElement>(
        &self,
        input: &[T],
        output: &[T],
        weight_diff: &mut [T],
    ) -> Result<()> {
        let operation = "batch_tile_weight_grad";
        self.check_batch(operation, input.len(), output.len())?;
        require_len(operation, "weight gradient", weight_diff.len(), self.engine.weight_len())?;
        let s = self.engine.shapes();
        let tile = self.plan.tile_size();
        let (in_dim, out_dim) = (s.conv_input_dim(), s.conv_output_dim());
        let mut diff_rep = ScratchBuffer::<T>::zeroed(operation, s.group * tile * s.weight_offset)?;
        let mut col = self.engine.col_buffer::<T>(operation, tile)?;

        for t in 0..self.plan.num_tiles() {
            log::trace!("weight gradient tile {t} ({tile} images)");
            let images = &input[t * tile * in_dim..(t + 1) * tile * in_dim];
            let grads = &output[t * tile * out_dim..(t + 1) * tile * out_dim];
            let col_buff = self.expand_tile(images, &mut col)?;

            {
                let _t = self.engine.timer(ConvPhase::Gemm);
                for g in 0..s.group {
                    gemm_strided_batched(
                        Transpose::No,
                        Transpose::Yes,
                        s.group_out_channels(),
                        s.kernel_dim,
                        s.conv_out_spatial_dim,
                        T::one(),
                        &grads[g * s.output_offset..],
                        out_dim,
                        &col_buff[g * s.col_offset..],
                        s.col_dim(),
                        T::zero(),
                        &mut diff_rep[g * tile * s.weight_offset..],
                        s.weight_offset,
                        tile,
                    )?;
                }
            }

            let _t = self.engine.timer(ConvPhase::Reduce);
            for g in 0..s.group {
                reduce_add(
                    &mut weight_diff[g * s.weight_offset..],
                    &diff_rep[g * tile * s.weight_offset..],
                    tile,
                    s.weight_offset,
                )?;
            }
        }
        Ok(())
    }

    /// Add the bias to every image, one rank-1 GEMM per tile
    pub fn forward_bias<T: ConvElement>(
        &self,
        bias_engine: &BiasEngine<'_, T>,
        output: &mut [T],
        bias: &[T],
    ) -> Result<()> {
        let tile = self.plan.tile_size();
        let top_dim = self.engine.shapes().top_dim;
        let needed = self.plan.batch() * top_dim;
        require_len("batch_tile_forward_bias", "output", output.len(), needed)?;
        let bias_rep = self.replicate_bias(bias)?;
        for t in 0..self.plan.num_tiles() {
            bias_engine.forward_bias_tile(
                &mut output[t * tile * top_dim..(t + 1) * tile * top_dim],
                &bias_rep,
                tile,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::conv::config::ConvolutionConfig;
    use crate::layers::conv::geometry::{ChannelLayout, ConvDirection, ConvGeometry};
    use crate::layers::conv::output_shape::ConvShapes;
    use convflow_core::Shape;

    fn grouped_shapes(num: usize) -> ConvShapes {
        // 2 channels of 3x3, kernel 2, group 2: 8 weights, 8 outputs per image
        let config = ConvolutionConfig::new(2).with_kernel_size(2).with_group(2);
        let geometry = ConvGeometry::resolve(&config, 2).unwrap();
        let layout = ChannelLayout::new(1, 2, 2, 2, ConvDirection::Forward).unwrap();
        let bottom = Shape::from_slice(&[num, 2, 3, 3]);
        ConvShapes::compute(&geometry, &layout, &[&bottom], false).unwrap()
    }

    #[test]
    fn test_tile_size_is_clamped_to_batch() {
        let plan = TilePlan::new(10, 16).unwrap();
        assert_eq!(plan.tile_size(), 10);
        assert_eq!(plan.num_tiles(), 1);

        let plan = TilePlan::new(32, 16).unwrap();
        assert_eq!(plan.tile_size(), 16);
        assert_eq!(plan.num_tiles(), 2);
    }

    #[test]
    fn test_non_divisor_tile_is_rejected() {
        let err = TilePlan::with_tile_size(10, 4).unwrap_err();
        assert_eq!(err, TensorError::invalid_batch_partition("tile_plan", 10, 4));

        // 20 images clamp to a 16-wide tile, which leaves a remainder
        assert!(matches!(
            TilePlan::new(20, 16),
            Err(TensorError::InvalidBatchPartition { .. })
        ));
        assert!(TilePlan::with_tile_size(8, 0).is_err());
        assert!(TilePlan::new(8, 0).is_err());
    }

    #[test]
    fn test_short_buffers_are_rejected() {
        let shapes = grouped_shapes(4);
        let engine = ConvolutionGemmEngine::new(&shapes, false, None);
        let tiles = BatchTileEngine::new(&engine, TilePlan::new(4, 2).unwrap()).unwrap();
        let input = vec![1.0f32; 4 * 18];
        let weights = [1.0f32; 8];
        let mut output = vec![0.0f32; 4 * 8];

        let err = tiles
            .forward(&input[..18], &weights, &mut output)
            .unwrap_err();
        assert!(matches!(err, TensorError::InvalidArgument { .. }));
        assert!(tiles.forward(&input, &weights[..4], &mut output).is_err());
        assert!(tiles.forward(&input, &weights, &mut output[..8]).is_err());
        assert!(tiles.replicate_weights(&weights[..5]).is_err());

        let mut input_diff = vec![0.0f32; 4 * 18];
        assert!(tiles
            .backward_data(&output[..16], &weights, &mut input_diff)
            .is_err());
        assert!(tiles
            .backward_data(&output, &weights, &mut input_diff[..18])
            .is_err());

        let mut weight_diff = [0.0f32; 8];
        assert!(tiles
            .weight_grad(&input, &output, &mut weight_diff[..4])
            .is_err());
        assert!(tiles
            .weight_grad(&input[..36], &output, &mut weight_diff)
            .is_err());

        let ones = [1.0f32; 4];
        let bias_engine = BiasEngine::new(2, 4, &ones, None);
        assert!(tiles
            .forward_bias(&bias_engine, &mut output[..8], &[0.5, 0.5])
            .is_err());
        assert!(tiles
            .forward_bias(&bias_engine, &mut output, &[0.5])
            .is_err());

        tiles.forward(&input, &weights, &mut output).unwrap();
        assert!(output.iter().all(|&v| v == 4.0));
    }

    #[test]
    fn test_plan_must_cover_the_batch() {
        let shapes = grouped_shapes(4);
        let engine = ConvolutionGemmEngine::new(&shapes, false, None);
        let plan = TilePlan::new(6, 2).unwrap();
        assert!(BatchTileEngine::new(&engine, plan).is_err());
    }
}
