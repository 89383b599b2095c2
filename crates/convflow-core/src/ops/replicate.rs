//! Tile replication and the matching weight reduction.
//!
//! The batch-tiled engine lays `copies` identical parameter blocks side by side so that every
//! member of a strided batched GEMM reads its own copy, then folds per-copy gradients back into a
//! single block.

use crate::{Result, TensorError};
use num_traits::Num;

/// Write `copies` repetitions of `src[..elem_stride]` into `dst`, back to back
pub fn replicate<T: Copy>(
    src: &[T],
    dst: &mut [T],
    elem_stride: usize,
    copies: usize,
) -> Result<()> {
    check("replicate", src.len(), dst.len(), elem_stride, copies)?;
    let src = &src[..elem_stride];
    for chunk in dst[..elem_stride * copies].chunks_exact_mut(elem_stride.max(1)) {
        chunk.copy_from_slice(src);
    }
    Ok(())
}

/// `dst[j] += sum over c of src[c * elem_stride + j]` for `j < elem_stride`
pub fn reduce_add<T: Num + Copy>(
    dst: &mut [T],
    src: &[T],
    copies: usize,
    elem_stride: usize,
) -> Result<()> {
    check("reduce_add", dst.len(), src.len(), elem_stride, copies)?;
    let dst = &mut dst[..elem_stride];
    for chunk in src[..elem_stride * copies].chunks_exact(elem_stride.max(1)) {
        for (d, &s) in dst.iter_mut().zip(chunk) {
            *d = *d + s;
        }
    }
    Ok(())
}

fn check(
    operation: &str,
    single: usize,
    replicated: usize,
    elem_stride: usize,
    copies: usize,
) -> Result<()> {
    if single < elem_stride || replicated < elem_stride * copies {
        return Err(TensorError::invalid_argument_op(
            operation,
            &format!(
                "{copies} copies of {elem_stride} elements do not fit buffers of \
                 {single} / {replicated}"
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicate_copies_block() {
        let mut dst = [0.0f32; 6];
        replicate(&[1.0, 2.0, 99.0], &mut dst, 2, 3).unwrap();
        assert_eq!(dst, [1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_reduce_add_accumulates_into_destination() {
        let mut dst = [10.0f64, 20.0];
        reduce_add(&mut dst, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        assert_eq!(dst, [19.0, 32.0]);
    }

    #[test]
    fn test_reduce_undoes_replicate_scaled() {
        let src = [0.5f32, -1.5, 2.0];
        let mut rep = [0.0f32; 12];
        replicate(&src, &mut rep, 3, 4).unwrap();
        let mut sum = [0.0f32; 3];
        reduce_add(&mut sum, &rep, 4, 3).unwrap();
        assert_eq!(sum, [2.0, -6.0, 8.0]);
    }

    #[test]
    fn test_short_buffers_rejected() {
        let mut dst = [0.0f32; 5];
        assert!(replicate(&[1.0, 2.0], &mut dst, 2, 3).is_err());
        assert!(reduce_add(&mut [0.0f32; 1], &[0.0; 6], 3, 2).is_err());
    }
}
