//! Elementwise scale-by-constant kernel.
//!
//! `dst[i] = src[i] * alpha`, split across a fixed number of workers with [`WorkPartition`].
//! Each worker streams its slice through one staging buffer of `T::STAGING_ELEMS` elements:
//! copy a chunk in, scale it, copy it out, and only then load the next chunk. Workers run on the
//! rayon pool; the call returns once every worker is done.

use crate::dtype::ConvElement;
use crate::parallel::{WorkPartition, DEFAULT_WORKERS};
use crate::{Result, TensorError};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleKernel {
    workers: usize,
}

impl Default for ScaleKernel {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl ScaleKernel {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// `dst[i] = src[i] * alpha` for every `i`
    pub fn scale<T: ConvElement>(&self, src: &[T], dst: &mut [T], alpha: T) -> Result<()> {
        if src.len() != dst.len() {
            return Err(TensorError::shape_mismatch(
                "scale",
                &format!("{} elements", src.len()),
                &format!("{} elements", dst.len()),
            ));
        }
        let partition = WorkPartition::new(src.len(), self.workers);
        log::trace!(
            "scale: {} {} elements over {} workers",
            src.len(),
            T::DTYPE,
            partition.workers()
        );

        let src_parts: Vec<&[T]> = partition.iter().map(|r| &src[r]).collect();
        let dst_parts = split_by_partition(dst, &partition);
        src_parts
            .into_par_iter()
            .zip(dst_parts)
            .for_each(|(src, dst)| stage_through(src, dst, alpha));
        Ok(())
    }

    /// In-place variant: every worker reads and writes back its own slice
    pub fn scale_in_place<T: ConvElement>(&self, buf: &mut [T], alpha: T) {
        let partition = WorkPartition::new(buf.len(), self.workers);
        split_by_partition(buf, &partition)
            .into_par_iter()
            .for_each(|part| {
                let mut staging = vec![T::zero(); T::STAGING_ELEMS.min(part.len())];
                for chunk in part.chunks_mut(T::STAGING_ELEMS) {
                    let staged = &mut staging[..chunk.len()];
                    staged.copy_from_slice(chunk);
                    scale_staged(staged, alpha);
                    chunk.copy_from_slice(staged);
                }
            });
    }
}

fn split_by_partition<'a, T>(mut buf: &'a mut [T], partition: &WorkPartition) -> Vec<&'a mut [T]> {
    let mut parts = Vec::with_capacity(partition.workers());
    for range in partition.iter() {
        let (head, tail) = std::mem::take(&mut buf).split_at_mut(range.len());
        parts.push(head);
        buf = tail;
    }
    parts
}

fn stage_through<T: ConvElement>(src: &[T], dst: &mut [T], alpha: T) {
    let mut staging = vec![T::zero(); T::STAGING_ELEMS.min(src.len())];
    for (src, dst) in src
        .chunks(T::STAGING_ELEMS)
        .zip(dst.chunks_mut(T::STAGING_ELEMS))
    {
        let staged = &mut staging[..src.len()];
        staged.copy_from_slice(src);
        scale_staged(staged, alpha);
        dst.copy_from_slice(staged);
    }
}

#[inline]
fn scale_staged<T: ConvElement>(staged: &mut [T], alpha: T) {
    for v in staged.iter_mut() {
        *v = *v * alpha;
    }
}

/// Scale with the default worker count
pub fn scale<T: ConvElement>(src: &[T], dst: &mut [T], alpha: T) -> Result<()> {
    ScaleKernel::default().scale(src, dst, alpha)
}

/// In-place scale with the default worker count
pub fn scale_in_place<T: ConvElement>(buf: &mut [T], alpha: T) {
    ScaleKernel::default().scale_in_place(buf, alpha)
}

/// 32-bit instantiation
pub fn sscal(src: &[f32], dst: &mut [f32], alpha: f32) -> Result<()> {
    scale(src, dst, alpha)
}

/// 64-bit instantiation
pub fn dscal(src: &[f64], dst: &mut [f64], alpha: f64) -> Result<()> {
    scale(src, dst, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sscal_small() {
        let src = [1.0f32, -2.0, 3.5];
        let mut dst = [0.0f32; 3];
        sscal(&src, &mut dst, 2.0).unwrap();
        assert_eq!(dst, [2.0, -4.0, 7.0]);
    }

    #[test]
    fn test_dscal_spans_several_staging_chunks() {
        // 64 workers * (2048 + a few) elements forces multiple chunks per worker
        let n = 64 * f64::STAGING_ELEMS + 1000;
        let src: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut dst = vec![0.0f64; n];
        dscal(&src, &mut dst, 0.5).unwrap();
        assert!(dst.iter().enumerate().all(|(i, &v)| v == i as f64 * 0.5));
    }

    #[test]
    fn test_uneven_partition_with_few_workers() {
        let kernel = ScaleKernel::new(3);
        let src: Vec<f32> = (0..10_001).map(|i| i as f32).collect();
        let mut dst = vec![0.0f32; src.len()];
        kernel.scale(&src, &mut dst, -1.0).unwrap();
        assert_eq!(dst[0], 0.0);
        assert_eq!(dst[10_000], -10_000.0);
        assert_eq!(dst[3334], -3334.0);
    }

    #[test]
    fn test_in_place_and_empty() {
        let mut buf = vec![4.0f32; 5000];
        scale_in_place(&mut buf, 0.25);
        assert!(buf.iter().all(|&v| v == 1.0));

        let mut empty: Vec<f32> = Vec::new();
        scale_in_place(&mut empty, 3.0);
        assert!(sscal(&[], &mut [], 1.0).is_ok());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut dst = [0.0f32; 2];
        assert!(sscal(&[1.0, 2.0, 3.0], &mut dst, 1.0).is_err());
    }
}
