//! Kernel geometry and channel bookkeeping resolved once at setup.

use super::config::ConvolutionConfig;
use convflow_core::{Result, TensorError};

const OP: &str = "conv_setup";

/// Whether the layer runs as a convolution or with its dimensions reversed (deconvolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvDirection {
    Forward,
    Reversed,
}

/// Per-axis kernel, stride, pad and dilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvGeometry {
    pub kernel_shape: Vec<usize>,
    pub stride: Vec<usize>,
    pub pad: Vec<usize>,
    pub dilation: Vec<usize>,
    /// Every axis has kernel 1, stride 1 and pad 0: im2col is the identity
    pub is_1x1: bool,
}

/// Resolve one quantity from its legacy `(h, w)` pair or its generic per-axis list
fn resolve_axis_values(
    name: &str,
    legacy: (Option<usize>, Option<usize>),
    generic: &[usize],
    num_spatial_axes: usize,
    default: Option<usize>,
) -> Result<Vec<usize>> {
    match legacy {
        (None, None) => {}
        (Some(h), Some(w)) => {
            if num_spatial_axes != 2 {
                return Err(TensorError::invalid_configuration(
                    OP,
                    &format!("{name}_h & {name}_w can only be used for 2D convolution"),
                ));
            }
            if !generic.is_empty() {
                return Err(TensorError::invalid_configuration(
                    OP,
                    &format!("either {name} or {name}_h/w should be specified, not both"),
                ));
            }
            return Ok(vec![h, w]);
        }
        _ => {
            return Err(TensorError::invalid_configuration(
                OP,
                &format!("{name}_h and {name}_w must be given together"),
            ))
        }
    }

    match (generic.len(), default) {
        (0, Some(default)) => Ok(vec![default; num_spatial_axes]),
        (0, None) => Err(TensorError::invalid_configuration(
            OP,
            &format!("{name} must be specified"),
        )),
        (1, _) => Ok(vec![generic[0]; num_spatial_axes]),
        (n, _) if n == num_spatial_axes => Ok(generic.to_vec()),
        (n, _) => Err(TensorError::invalid_configuration(
            OP,
            &format!(
                "{name} must be specified once, or once per spatial dimension \
                 ({name} specified {n} times; {num_spatial_axes} spatial dims)"
            ),
        )),
    }
}

fn ensure_positive(name: &str, values: &[usize]) -> Result<()> {
    if let Some(axis) = values.iter().position(|&v| v == 0) {
        return Err(TensorError::invalid_configuration(
            OP,
            &format!("{name} dimensions must be nonzero (axis {axis})"),
        ));
    }
    Ok(())
}

impl ConvGeometry {
    /// Resolve kernel, stride, pad and dilation for `num_spatial_axes` axes
    pub fn resolve(config: &ConvolutionConfig, num_spatial_axes: usize) -> Result<Self> {
        if num_spatial_axes == 0 {
            return Err(TensorError::invalid_configuration(
                OP,
                "convolution needs at least one spatial axis after the channel axis",
            ));
        }

        let kernel_shape = resolve_axis_values(
            "kernel",
            (config.kernel_h, config.kernel_w),
            &config.kernel_size,
            num_spatial_axes,
            None,
        )?;
        ensure_positive("filter", &kernel_shape)?;

        let stride = resolve_axis_values(
            "stride",
            (config.stride_h, config.stride_w),
            &config.stride,
            num_spatial_axes,
            Some(1),
        )?;
        ensure_positive("stride", &stride)?;

        let pad = resolve_axis_values(
            "pad",
            (config.pad_h, config.pad_w),
            &config.pad,
            num_spatial_axes,
            Some(0),
        )?;

        let dilation = resolve_axis_values(
            "dilation",
            (None, None),
            &config.dilation,
            num_spatial_axes,
            Some(1),
        )?;
        ensure_positive("dilation", &dilation)?;

        let is_1x1 = kernel_shape
            .iter()
            .zip(&stride)
            .zip(&pad)
            .all(|((&k, &s), &p)| k == 1 && s == 1 && p == 0);

        Ok(Self {
            kernel_shape,
            stride,
            pad,
            dilation,
            is_1x1,
        })
    }

    pub fn num_spatial_axes(&self) -> usize {
        self.kernel_shape.len()
    }

    /// Number of kernel taps per input channel
    pub fn kernel_size(&self) -> usize {
        self.kernel_shape.iter().product()
    }

    /// Output extent of one axis for a convolution
    pub fn conv_output_dim(&self, axis: usize, input: usize) -> Result<usize> {
        let extent = self.dilation[axis] * (self.kernel_shape[axis] - 1) + 1;
        let padded = input + 2 * self.pad[axis];
        if padded < extent {
            return Err(TensorError::invalid_shape(
                "conv_output_shape",
                &format!(
                    "kernel extent {extent} exceeds padded input {padded} on spatial axis {axis}"
                ),
                None,
            ));
        }
        Ok((padded - extent) / self.stride[axis] + 1)
    }

    /// Output extent of one axis for a deconvolution: `stride*(in-1) + extent - 2*pad`
    pub fn deconv_output_dim(&self, axis: usize, input: usize) -> Result<usize> {
        let extent = self.dilation[axis] * (self.kernel_shape[axis] - 1) + 1;
        let full = self.stride[axis] * input.saturating_sub(1) + extent;
        let cropped = 2 * self.pad[axis];
        if input == 0 || full <= cropped {
            return Err(TensorError::invalid_shape(
                "deconv_output_shape",
                &format!("padding {cropped} consumes the whole output on spatial axis {axis}"),
                None,
            ));
        }
        Ok(full - cropped)
    }
}

/// Channel and group bookkeeping fixed at setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    pub channel_axis: usize,
    pub channels: usize,
    pub num_output: usize,
    pub group: usize,
    pub conv_in_channels: usize,
    pub conv_out_channels: usize,
    pub direction: ConvDirection,
}

impl ChannelLayout {
    pub fn new(
        channel_axis: usize,
        channels: usize,
        num_output: usize,
        group: usize,
        direction: ConvDirection,
    ) -> Result<Self> {
        if num_output == 0 {
            return Err(TensorError::invalid_configuration(
                OP,
                "num_output must be positive",
            ));
        }
        if group == 0 {
            return Err(TensorError::invalid_configuration(OP, "group must be positive"));
        }
        if channels % group != 0 {
            return Err(TensorError::invalid_configuration(
                OP,
                &format!("{channels} input channels are not a multiple of group {group}"),
            ));
        }
        if num_output % group != 0 {
            return Err(TensorError::invalid_configuration(
                OP,
                &format!("number of outputs {num_output} should be a multiple of group {group}"),
            ));
        }

        let (conv_in_channels, conv_out_channels) = match direction {
            ConvDirection::Forward => (channels, num_output),
            ConvDirection::Reversed => (num_output, channels),
        };
        Ok(Self {
            channel_axis,
            channels,
            num_output,
            group,
            conv_in_channels,
            conv_out_channels,
            direction,
        })
    }

    pub fn is_reversed(&self) -> bool {
        self.direction == ConvDirection::Reversed
    }

    /// `[conv_out_channels, conv_in_channels / group, kernel...]`
    pub fn weight_shape(&self, geometry: &ConvGeometry) -> Vec<usize> {
        let mut shape = vec![self.conv_out_channels, self.conv_in_channels / self.group];
        shape.extend_from_slice(&geometry.kernel_shape);
        shape
    }

    pub fn bias_shape(&self) -> Vec<usize> {
        vec![self.num_output]
    }

    /// Weight elements per output channel within a group
    pub fn kernel_dim(&self, geometry: &ConvGeometry) -> usize {
        self.conv_in_channels / self.group * geometry.kernel_size()
    }

    /// Distance between consecutive groups' weight blocks
    pub fn weight_offset(&self, geometry: &ConvGeometry) -> usize {
        self.conv_out_channels * self.kernel_dim(geometry) / self.group
    }
}
