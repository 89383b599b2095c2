//! im2col / col2im
//!
//! `im2col` lays out every sliding window of a `[channels, spatial...]` image as one column of a
//! `[channels * prod(kernel), prod(col_shape)]` matrix, so that a convolution becomes a single
//! GEMM against the `[out_channels, channels * prod(kernel)]` weight matrix. `col2im` is the
//! adjoint: it folds such a matrix back onto the image, summing every window that touches a pixel.
//!
//! Padded positions read as zero on expansion and are dropped on folding. Two spatial axes go
//! through a dedicated row-walking kernel unless the geometry forces the N-d path.

use crate::{Result, TensorError};
use num_traits::Num;

/// Everything im2col needs to know about one image and its windows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Im2ColGeometry {
    pub channels: usize,
    pub image_shape: Vec<usize>,
    pub kernel_shape: Vec<usize>,
    pub pad: Vec<usize>,
    pub stride: Vec<usize>,
    pub dilation: Vec<usize>,
    /// Number of window positions per spatial axis
    pub col_shape: Vec<usize>,
    /// Use the N-d kernel even when there are exactly two spatial axes
    pub force_nd: bool,
}

impl Im2ColGeometry {
    /// Build the geometry and derive the window grid with the usual convolution arithmetic.
    pub fn new(
        channels: usize,
        image_shape: &[usize],
        kernel_shape: &[usize],
        pad: &[usize],
        stride: &[usize],
        dilation: &[usize],
    ) -> Result<Self> {
        let axes = image_shape.len();
        for (name, values) in [
            ("kernel_shape", kernel_shape),
            ("pad", pad),
            ("stride", stride),
            ("dilation", dilation),
        ] {
            if values.len() != axes {
                return Err(TensorError::invalid_argument_op(
                    "im2col",
                    &format!("{name} has {} entries for {axes} spatial axes", values.len()),
                ));
            }
        }
        if kernel_shape.contains(&0) || stride.contains(&0) || dilation.contains(&0) {
            return Err(TensorError::invalid_argument_op(
                "im2col",
                "kernel, stride and dilation must be positive",
            ));
        }

        let mut col_shape = Vec::with_capacity(axes);
        for i in 0..axes {
            let padded = image_shape[i] + 2 * pad[i];
            let extent = dilation[i] * (kernel_shape[i] - 1) + 1;
            if extent > padded {
                return Err(TensorError::invalid_shape(
                    "im2col",
                    &format!(
                        "kernel extent {extent} exceeds padded input {padded} on spatial axis {i}"
                    ),
                    Some(image_shape),
                ));
            }
            col_shape.push((padded - extent) / stride[i] + 1);
        }

        Ok(Self {
            channels,
            image_shape: image_shape.to_vec(),
            kernel_shape: kernel_shape.to_vec(),
            pad: pad.to_vec(),
            stride: stride.to_vec(),
            dilation: dilation.to_vec(),
            col_shape,
            force_nd: false,
        })
    }

    pub fn with_force_nd(mut self, force_nd: bool) -> Self {
        self.force_nd = force_nd;
        self
    }

    pub fn num_spatial_axes(&self) -> usize {
        self.image_shape.len()
    }

    /// Rows of the column matrix
    pub fn kernel_dim(&self) -> usize {
        self.channels * self.kernel_shape.iter().product::<usize>()
    }

    /// Columns of the column matrix
    pub fn col_spatial(&self) -> usize {
        self.col_shape.iter().product()
    }

    pub fn image_len(&self) -> usize {
        self.channels * self.image_shape.iter().product::<usize>()
    }

    pub fn col_len(&self) -> usize {
        self.kernel_dim() * self.col_spatial()
    }

    fn use_2d(&self) -> bool {
        self.num_spatial_axes() == 2 && !self.force_nd
    }

    fn check(&self, operation: &str, image: usize, col: usize, tile: usize) -> Result<()> {
        let (image_needed, col_needed) = (self.image_len() * tile, self.col_len() * tile);
        if image < image_needed || col < col_needed {
            return Err(TensorError::invalid_argument_op(
                operation,
                &format!(
                    "buffers hold {image} image / {col} column elements, \
                     {image_needed} / {col_needed} required"
                ),
            ));
        }
        Ok(())
    }
}

/// Expand one image into its column matrix, overwriting `col`
pub fn im2col<T: Num + Copy>(geom: &Im2ColGeometry, image: &[T], col: &mut [T]) -> Result<()> {
    geom.check("im2col", image.len(), col.len(), 1)?;
    if geom.use_2d() {
        walk_2d(geom, |ci, ii| {
            col[ci] = match ii {
                Some(ii) => image[ii],
                None => T::zero(),
            }
        });
    } else {
        walk_nd(geom, |ci, ii| {
            col[ci] = match ii {
                Some(ii) => image[ii],
                None => T::zero(),
            }
        });
    }
    Ok(())
}

/// Fold a column matrix back onto one image, adding into `image`
pub fn col2im<T: Num + Copy>(geom: &Im2ColGeometry, col: &[T], image: &mut [T]) -> Result<()> {
    geom.check("col2im", image.len(), col.len(), 1)?;
    let mut fold = |ci: usize, ii: Option<usize>| {
        if let Some(ii) = ii {
            image[ii] = image[ii] + col[ci];
        }
    };
    if geom.use_2d() {
        walk_2d(geom, &mut fold);
    } else {
        walk_nd(geom, &mut fold);
    }
    Ok(())
}

/// Expand `tile` consecutive images into `tile` consecutive column matrices
pub fn im2col_tile<T: Num + Copy>(
    geom: &Im2ColGeometry,
    images: &[T],
    cols: &mut [T],
    tile: usize,
) -> Result<()> {
    geom.check("im2col_tile", images.len(), cols.len(), tile)?;
    let (image_len, col_len) = (geom.image_len(), geom.col_len());
    for i in 0..tile {
        im2col(
            geom,
            &images[i * image_len..(i + 1) * image_len],
            &mut cols[i * col_len..(i + 1) * col_len],
        )?;
    }
    Ok(())
}

/// Fold `tile` consecutive column matrices onto `tile` consecutive images, adding
pub fn col2im_tile<T: Num + Copy>(
    geom: &Im2ColGeometry,
    cols: &[T],
    images: &mut [T],
    tile: usize,
) -> Result<()> {
    geom.check("col2im_tile", images.len(), cols.len(), tile)?;
    let (image_len, col_len) = (geom.image_len(), geom.col_len());
    for i in 0..tile {
        col2im(
            geom,
            &cols[i * col_len..(i + 1) * col_len],
            &mut images[i * image_len..(i + 1) * image_len],
        )?;
    }
    Ok(())
}

/// Visit every column entry in order with the image index it mirrors (`None` inside padding).
fn walk_2d(geom: &Im2ColGeometry, mut visit: impl FnMut(usize, Option<usize>)) {
    let (height, width) = (geom.image_shape[0] as isize, geom.image_shape[1] as isize);
    let (kernel_h, kernel_w) = (geom.kernel_shape[0], geom.kernel_shape[1]);
    let (out_h, out_w) = (geom.col_shape[0], geom.col_shape[1]);
    let (stride_h, stride_w) = (geom.stride[0] as isize, geom.stride[1] as isize);
    let (dil_h, dil_w) = (geom.dilation[0] as isize, geom.dilation[1] as isize);
    let (pad_h, pad_w) = (geom.pad[0] as isize, geom.pad[1] as isize);
    let plane = (height * width) as usize;

    let mut ci = 0;
    for c in 0..geom.channels {
        let base = c * plane;
        for kr in 0..kernel_h as isize {
            for kc in 0..kernel_w as isize {
                let mut in_row = kr * dil_h - pad_h;
                for _ in 0..out_h {
                    if in_row < 0 || in_row >= height {
                        for _ in 0..out_w {
                            visit(ci, None);
                            ci += 1;
                        }
                    } else {
                        let row = base + (in_row * width) as usize;
                        let mut in_col = kc * dil_w - pad_w;
                        for _ in 0..out_w {
                            let ii = (in_col >= 0 && in_col < width).then(|| row + in_col as usize);
                            visit(ci, ii);
                            ci += 1;
                            in_col += stride_w;
                        }
                    }
                    in_row += stride_h;
                }
            }
        }
    }
}

fn walk_nd(geom: &Im2ColGeometry, mut visit: impl FnMut(usize, Option<usize>)) {
    let axes = geom.num_spatial_axes();
    let kernel_size: usize = geom.kernel_shape.iter().product();
    let col_spatial = geom.col_spatial();
    let mut kernel_pos = vec![0usize; axes];
    let mut out_pos = vec![0usize; axes];
    for row in 0..geom.kernel_dim() {
        let channel = row / kernel_size;
        let mut rem = row % kernel_size;
        for a in (0..axes).rev() {
            kernel_pos[a] = rem % geom.kernel_shape[a];
            rem /= geom.kernel_shape[a];
        }

        out_pos.fill(0);
        for d in 0..col_spatial {
            let mut ii = Some(channel);
            for a in 0..axes {
                let pos = (out_pos[a] * geom.stride[a] + kernel_pos[a] * geom.dilation[a]) as isize
                    - geom.pad[a] as isize;
                ii = match ii {
                    Some(acc) if pos >= 0 && (pos as usize) < geom.image_shape[a] => {
                        Some(acc * geom.image_shape[a] + pos as usize)
                    }
                    _ => None,
                };
            }
            visit(row * col_spatial + d, ii);

            for a in (0..axes).rev() {
                out_pos[a] += 1;
                if out_pos[a] < geom.col_shape[a] {
                    break;
                }
                out_pos[a] = 0;
            }
        }
    }
}
