//! Output shapes and the derived strides the GEMM loops walk with.

use super::geometry::{ChannelLayout, ConvGeometry};
use convflow_core::ops::Im2ColGeometry;
use convflow_core::{Result, Shape, TensorError};

/// Everything that depends on the bottom shape; recomputed on every reshape.
///
/// The GEMM engines work in the "convolution frame": the im2col side is the conv input and the
/// GEMM product is the conv output. A convolution maps bottom to top in that frame; a
/// deconvolution runs it backwards, so its top is the conv input and its bottom the conv output.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvShapes {
    /// Images per bottom: product of the axes before the channel axis
    pub num: usize,
    pub bottom_shape: Vec<usize>,
    pub top_shape: Vec<usize>,
    /// Spatial extents of the top
    pub output_shape: Vec<usize>,
    /// `[conv_in_channels, spatial...]` of the im2col side
    pub conv_input_shape: Vec<usize>,
    /// `[kernel_dim * group, spatial...]`
    pub col_buffer_shape: Vec<usize>,
    pub kernel_dim: usize,
    pub weight_offset: usize,
    pub col_offset: usize,
    pub output_offset: usize,
    pub conv_out_spatial_dim: usize,
    pub out_spatial_dim: usize,
    pub bottom_dim: usize,
    pub top_dim: usize,
    pub group: usize,
    pub num_output: usize,
    pub conv_out_channels: usize,
    pub im2col: Im2ColGeometry,
}

impl ConvShapes {
    /// Validate the bottoms and derive output shape and offsets
    pub fn compute(
        geometry: &ConvGeometry,
        layout: &ChannelLayout,
        bottoms: &[&Shape],
        force_nd_im2col: bool,
    ) -> Result<Self> {
        let first = bottoms.first().ok_or_else(|| {
            TensorError::invalid_argument_op("conv_reshape", "at least one bottom is required")
        })?;
        let channel_axis = layout.channel_axis;
        let first_spatial_axis = channel_axis + 1;
        let expected_rank = first_spatial_axis + geometry.num_spatial_axes();
        if first.rank() != expected_rank {
            return Err(TensorError::shape_mismatch(
                "conv_reshape",
                &format!("bottom rank {expected_rank} (rank may not change)"),
                &format!("rank {}", first.rank()),
            ));
        }
        if first[channel_axis] != layout.channels {
            return Err(TensorError::shape_mismatch(
                "conv_reshape",
                &format!("{} input channels", layout.channels),
                &format!("{} channels in bottom {first}", first[channel_axis]),
            ));
        }
        for (i, other) in bottoms.iter().enumerate().skip(1) {
            if other != first {
                return Err(TensorError::shape_mismatch(
                    "conv_reshape",
                    &format!("all bottoms shaped {first}"),
                    &format!("bottom {i} shaped {other}"),
                ));
            }
        }

        let bottom_spatial = &first.dims()[first_spatial_axis..];
        let output_shape = bottom_spatial
            .iter()
            .enumerate()
            .map(|(axis, &input)| {
                if layout.is_reversed() {
                    geometry.deconv_output_dim(axis, input)
                } else {
                    geometry.conv_output_dim(axis, input)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut top_shape = first.dims()[..channel_axis].to_vec();
        top_shape.push(layout.num_output);
        top_shape.extend_from_slice(&output_shape);

        // In the reversed direction the GEMM output lives on the bottom side
        let (conv_input_spatial, conv_output_spatial) = if layout.is_reversed() {
            (output_shape.as_slice(), bottom_spatial)
        } else {
            (bottom_spatial, output_shape.as_slice())
        };

        let group = layout.group;
        let kernel_dim = layout.kernel_dim(geometry);
        let weight_offset = layout.weight_offset(geometry);
        let conv_out_spatial_dim: usize = conv_output_spatial.iter().product();
        let out_spatial_dim: usize = output_shape.iter().product();

        let mut conv_input_shape = vec![layout.conv_in_channels];
        conv_input_shape.extend_from_slice(conv_input_spatial);
        let mut col_buffer_shape = vec![kernel_dim * group];
        col_buffer_shape.extend_from_slice(conv_output_spatial);

        let im2col = Im2ColGeometry::new(
            layout.conv_in_channels,
            conv_input_spatial,
            &geometry.kernel_shape,
            &geometry.pad,
            &geometry.stride,
            &geometry.dilation,
        )?
        .with_force_nd(force_nd_im2col);
        if im2col.col_shape != conv_output_spatial {
            return Err(TensorError::invalid_shape(
                "conv_reshape",
                &format!(
                    "column grid {:?} does not match output spatial shape {conv_output_spatial:?}",
                    im2col.col_shape
                ),
                Some(first.dims()),
            ));
        }

        Ok(Self {
            num: first.count(0, channel_axis),
            bottom_shape: first.to_vec(),
            top_dim: layout.num_output * out_spatial_dim,
            bottom_dim: first.count_from(channel_axis),
            top_shape,
            output_shape,
            conv_input_shape,
            col_buffer_shape,
            kernel_dim,
            weight_offset,
            col_offset: kernel_dim * conv_out_spatial_dim,
            output_offset: layout.conv_out_channels * conv_out_spatial_dim / group,
            conv_out_spatial_dim,
            out_spatial_dim,
            group,
            num_output: layout.num_output,
            conv_out_channels: layout.conv_out_channels,
            im2col,
        })
    }

    /// Elements of one image on the im2col side
    pub fn conv_input_dim(&self) -> usize {
        self.im2col.image_len()
    }

    /// Elements of one image on the GEMM output side
    pub fn conv_output_dim(&self) -> usize {
        self.conv_out_channels * self.conv_out_spatial_dim
    }

    /// Elements of one image's column matrix (all groups)
    pub fn col_dim(&self) -> usize {
        self.col_offset * self.group
    }

    /// GEMM rows per group
    pub fn group_out_channels(&self) -> usize {
        self.conv_out_channels / self.group
    }
}
