//! State shared by convolution and deconvolution, and the batch drivers.
//!
//! The drivers work on whole bottoms/tops in the convolution frame and pick the per-image engine
//! or the batch-tiled engine from the configuration. The layers only decide which tensor plays
//! which side of the frame.

use super::batch_tile::{BatchTileEngine, TilePlan};
use super::bias::BiasEngine;
use super::config::{ConvEngine, ConvolutionConfig};
use super::gemm_engine::ConvolutionGemmEngine;
use super::geometry::{ChannelLayout, ConvDirection, ConvGeometry};
use super::output_shape::ConvShapes;
use super::params::ParameterStore;
use convflow_core::monitoring::PhaseRecorder;
use convflow_core::{ConvElement, Result, Shape, Tensor, TensorError};
use std::sync::Arc;

fn not_reshaped(operation: &str) -> TensorError {
    TensorError::invalid_argument_op(operation, "layer must be set up and reshaped first")
}

fn check_len(operation: &str, what: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(TensorError::shape_mismatch(
            operation,
            &format!("{what} of {expected} elements"),
            &format!("{got} elements"),
        ));
    }
    Ok(())
}

/// Tiling for a batch of `num` images, `None` for the per-image engine
fn tile_plan(engine: ConvEngine, num: usize) -> Result<Option<TilePlan>> {
    match engine {
        ConvEngine::PerImage => Ok(None),
        ConvEngine::BatchTiled { .. } if num <= 1 => Ok(None),
        ConvEngine::BatchTiled { max_tile_size } => TilePlan::new(num, max_tile_size).map(Some),
    }
}

pub struct BaseConvolution<T> {
    config: ConvolutionConfig,
    direction: ConvDirection,
    geometry: Option<ConvGeometry>,
    layout: Option<ChannelLayout>,
    shapes: Option<ConvShapes>,
    params: ParameterStore<T>,
    bias_multiplier: Vec<T>,
    recorder: Option<Arc<dyn PhaseRecorder>>,
    training: bool,
}

impl<T: ConvElement> BaseConvolution<T> {
    pub fn new(config: ConvolutionConfig, direction: ConvDirection) -> Self {
        Self {
            config,
            direction,
            geometry: None,
            layout: None,
            shapes: None,
            params: ParameterStore::new(),
            bias_multiplier: Vec::new(),
            recorder: None,
            training: true,
        }
    }

    pub fn set_recorder(&mut self, recorder: Option<Arc<dyn PhaseRecorder>>) {
        self.recorder = recorder;
    }

    pub fn config(&self) -> &ConvolutionConfig {
        &self.config
    }

    pub fn direction(&self) -> ConvDirection {
        self.direction
    }

    pub fn geometry(&self) -> Option<&ConvGeometry> {
        self.geometry.as_ref()
    }

    pub fn layout(&self) -> Option<&ChannelLayout> {
        self.layout.as_ref()
    }

    pub fn shapes(&self) -> Option<&ConvShapes> {
        self.shapes.as_ref()
    }

    pub fn params(&self) -> &ParameterStore<T> {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterStore<T> {
        &mut self.params
    }

    pub fn bias_multiplier(&self) -> &[T] {
        &self.bias_multiplier
    }

    pub fn is_setup(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn is_1x1(&self) -> bool {
        self.geometry.as_ref().is_some_and(|g| g.is_1x1)
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Resolve geometry and channels from the first bottom and create or validate parameters
    pub fn setup(&mut self, bottom: &[&Tensor<T>]) -> Result<()> {
        let first = bottom.first().ok_or_else(|| {
            TensorError::invalid_argument_op("conv_setup", "at least one bottom is required")
        })?;
        let channel_axis = first.canonical_axis_index(self.config.axis)?;
        let num_spatial_axes = first.rank() - channel_axis - 1;
        let geometry = ConvGeometry::resolve(&self.config, num_spatial_axes)?;
        let layout = ChannelLayout::new(
            channel_axis,
            first.dim(channel_axis),
            self.config.num_output,
            self.config.group,
            self.direction,
        )?;

        let weight_shape = layout.weight_shape(&geometry);
        let bias_shape = self.config.bias_term.then(|| layout.bias_shape());
        self.params.setup(
            &weight_shape,
            bias_shape.as_deref(),
            &self.config.weight_filler,
            &self.config.bias_filler,
            self.config.filler_seed,
        )?;

        log::debug!(
            "{:?} setup: channels {} -> {}, group {}, kernel {:?}, \
             stride {:?}, pad {:?}, dilation {:?}, 1x1 {}",
            self.direction,
            layout.channels,
            layout.num_output,
            layout.group,
            geometry.kernel_shape,
            geometry.stride,
            geometry.pad,
            geometry.dilation,
            geometry.is_1x1
        );
        self.geometry = Some(geometry);
        self.layout = Some(layout);
        self.shapes = None;
        Ok(())
    }

    /// Derive output shape and offsets from the bottoms and size every top
    pub fn reshape(&mut self, bottom: &[&Tensor<T>], top: &mut [Tensor<T>]) -> Result<()> {
        let (geometry, layout) = match (&self.geometry, &self.layout) {
            (Some(geometry), Some(layout)) => (geometry, layout),
            _ => return Err(not_reshaped("conv_reshape")),
        };
        if top.len() != bottom.len() {
            return Err(TensorError::invalid_argument_op(
                "conv_reshape",
                &format!("{} bottoms but {} tops", bottom.len(), top.len()),
            ));
        }

        let bottom_shapes: Vec<&Shape> = bottom.iter().map(|b| b.shape()).collect();
        let shapes = ConvShapes::compute(
            geometry,
            layout,
            &bottom_shapes,
            self.config.force_nd_im2col,
        )?;
        for t in top.iter_mut() {
            t.reshape_(&shapes.top_shape)?;
        }

        if self.config.bias_term {
            self.bias_multiplier.clear();
            self.bias_multiplier.resize(shapes.out_spatial_dim, T::one());
        }

        if self.shapes.as_ref() != Some(&shapes) {
            log::debug!(
                "{:?} reshape: bottom {:?} -> top {:?}, kernel_dim {}, col {:?}, \
                 offsets w/c/o {}/{}/{}",
                self.direction,
                shapes.bottom_shape,
                shapes.top_shape,
                shapes.kernel_dim,
                shapes.col_buffer_shape,
                shapes.weight_offset,
                shapes.col_offset,
                shapes.output_offset
            );
            if matches!(self.config.engine, ConvEngine::BatchTiled { .. }) && shapes.num <= 1 {
                log::warn!("batch of {} cannot be tiled, using the per-image engine", shapes.num);
            }
        }
        self.shapes = Some(shapes);
        Ok(())
    }

    fn engine(&self, operation: &str) -> Result<ConvolutionGemmEngine<'_>> {
        let shapes = self.shapes.as_ref().ok_or_else(|| not_reshaped(operation))?;
        Ok(ConvolutionGemmEngine::new(
            shapes,
            self.is_1x1(),
            self.recorder.as_deref(),
        ))
    }

    /// Check that a top gradient and its bottom match the current reshape
    pub fn check_backward_pair(&self, top_diff: &Tensor<T>, bottom: &Tensor<T>) -> Result<()> {
        let shapes = self.shapes.as_ref().ok_or_else(|| not_reshaped("conv_backward"))?;
        if top_diff.dims() != shapes.top_shape.as_slice() {
            return Err(TensorError::shape_mismatch(
                "conv_backward",
                &format!("top gradient shaped {:?}", shapes.top_shape),
                &format!("{:?}", top_diff.dims()),
            ));
        }
        if bottom.dims() != shapes.bottom_shape.as_slice() {
            return Err(TensorError::shape_mismatch(
                "conv_backward",
                &format!("bottom shaped {:?}", shapes.bottom_shape),
                &format!("{:?}", bottom.dims()),
            ));
        }
        Ok(())
    }

    /// Conv-input side to conv-output side for every image, overwriting `output`
    pub fn forward_frames(&self, input: &[T], output: &mut [T]) -> Result<()> {
        const OP: &str = "conv_forward_frames";
        let engine = self.engine(OP)?;
        let s = engine.shapes();
        let (in_dim, out_dim) = (s.conv_input_dim(), s.conv_output_dim());
        check_len(OP, "input", input.len(), s.num * in_dim)?;
        check_len(OP, "output", output.len(), s.num * out_dim)?;
        let weights = self.params.weight().data();

        if let Some(plan) = tile_plan(self.config.engine, s.num)? {
            return BatchTileEngine::new(&engine, plan)?.forward(input, weights, output);
        }
        let mut col = engine.col_buffer::<T>(OP, 1)?;
        for n in 0..s.num {
            engine.forward_gemm(
                &input[n * in_dim..(n + 1) * in_dim],
                weights,
                &mut output[n * out_dim..(n + 1) * out_dim],
                &mut col,
                false,
            )?;
        }
        Ok(())
    }

    /// Conv-output side back to conv-input side for every image, overwriting `input`
    pub fn backward_frames(&self, output: &[T], input: &mut [T]) -> Result<()> {
        const OP: &str = "conv_backward_frames";
        let engine = self.engine(OP)?;
        let s = engine.shapes();
        let (in_dim, out_dim) = (s.conv_input_dim(), s.conv_output_dim());
        check_len(OP, "output", output.len(), s.num * out_dim)?;
        check_len(OP, "input", input.len(), s.num * in_dim)?;
        let weights = self.params.weight().data();

        if let Some(plan) = tile_plan(self.config.engine, s.num)? {
            return BatchTileEngine::new(&engine, plan)?.backward_data(output, weights, input);
        }
        let mut col = engine.col_buffer::<T>(OP, 1)?;
        for n in 0..s.num {
            engine.backward_gemm(
                &output[n * out_dim..(n + 1) * out_dim],
                weights,
                &mut input[n * in_dim..(n + 1) * in_dim],
                &mut col,
            )?;
        }
        Ok(())
    }

    /// Accumulate the weight gradient of every image.
    ///
    /// When `forward_out` is given, `input` is also pushed to the conv-output side into it,
    /// reusing each image's expansion from the weight gradient on the per-image path.
    pub fn weight_grad_frames(
        &mut self,
        input: &[T],
        output: &[T],
        mut forward_out: Option<&mut [T]>,
    ) -> Result<()> {
        const OP: &str = "conv_weight_grad_frames";
        let shapes = self.shapes.as_ref().ok_or_else(|| not_reshaped(OP))?;
        let is_1x1 = self.geometry.as_ref().is_some_and(|g| g.is_1x1);
        let engine = ConvolutionGemmEngine::new(shapes, is_1x1, self.recorder.as_deref());
        let (in_dim, out_dim) = (shapes.conv_input_dim(), shapes.conv_output_dim());
        check_len(OP, "input", input.len(), shapes.num * in_dim)?;
        check_len(OP, "output", output.len(), shapes.num * out_dim)?;
        if let Some(fwd) = forward_out.as_deref() {
            check_len(OP, "forward output", fwd.len(), shapes.num * out_dim)?;
        }
        let params = self.params.slices();

        if let Some(plan) = tile_plan(self.config.engine, shapes.num)? {
            let tiled = BatchTileEngine::new(&engine, plan)?;
            tiled.weight_grad(input, output, params.weight_diff)?;
            if let Some(fwd) = forward_out {
                tiled.forward(input, params.weight, fwd)?;
            }
            return Ok(());
        }

        let mut col = engine.col_buffer::<T>(OP, 1)?;
        for n in 0..shapes.num {
            let image = &input[n * in_dim..(n + 1) * in_dim];
            engine.weight_gemm(
                image,
                &output[n * out_dim..(n + 1) * out_dim],
                params.weight_diff,
                &mut col,
            )?;
            if let Some(fwd) = forward_out.as_deref_mut() {
                engine.forward_gemm(
                    image,
                    params.weight,
                    &mut fwd[n * out_dim..(n + 1) * out_dim],
                    &mut col,
                    true,
                )?;
            }
        }
        Ok(())
    }

    /// Broadcast-add the bias to every image of a top
    pub fn add_bias(&self, top: &mut [T]) -> Result<()> {
        const OP: &str = "conv_forward_bias";
        let Some(bias) = self.params.bias() else {
            return Ok(());
        };
        let engine = self.engine(OP)?;
        let s = engine.shapes();
        check_len(OP, "top", top.len(), s.num * s.top_dim)?;
        let bias_engine = BiasEngine::new(
            s.num_output,
            s.out_spatial_dim,
            &self.bias_multiplier,
            self.recorder.as_deref(),
        );

        if let Some(plan) = tile_plan(self.config.engine, s.num)? {
            return BatchTileEngine::new(&engine, plan)?
                .forward_bias(&bias_engine, top, bias.data());
        }
        for n in 0..s.num {
            bias_engine.forward_bias(&mut top[n * s.top_dim..(n + 1) * s.top_dim], bias.data())?;
        }
        Ok(())
    }

    /// Accumulate the bias gradient of every image of a top gradient
    pub fn bias_grad(&mut self, top_diff: &[T]) -> Result<()> {
        const OP: &str = "conv_backward_bias";
        let shapes = self.shapes.as_ref().ok_or_else(|| not_reshaped(OP))?;
        check_len(OP, "top gradient", top_diff.len(), shapes.num * shapes.top_dim)?;
        let Some(bias_diff) = self.params.slices().bias_diff else {
            return Ok(());
        };
        let bias_engine = BiasEngine::new(
            shapes.num_output,
            shapes.out_spatial_dim,
            &self.bias_multiplier,
            self.recorder.as_deref(),
        );

        if tile_plan(self.config.engine, shapes.num)?.is_some() {
            return bias_engine.backward_bias_batch(bias_diff, top_diff, shapes.num);
        }
        for n in 0..shapes.num {
            bias_engine.backward_bias(
                bias_diff,
                &top_diff[n * shapes.top_dim..(n + 1) * shapes.top_dim],
            )?;
        }
        Ok(())
    }
}
