//! Tensor container
//!
//! - **core**: tensor structure and property accessors
//! - **creation**: constructors
//! - **ops**: reshape, fill, scale and comparison helpers

pub mod core;
pub mod creation;
pub mod ops;

pub use core::Tensor;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_tensor_constructors() {
        let zeros = Tensor::<f32>::zeros(&[2, 3]);
        assert_eq!(zeros.dims(), &[2, 3]);
        assert_eq!(zeros.numel(), 6);

        let ones = Tensor::<f32>::ones(&[2, 2]);
        assert_eq!(ones.data(), &[1.0, 1.0, 1.0, 1.0]);

        let full = Tensor::<f64>::full(&[3], 5.0);
        assert_eq!(full.data(), &[5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_reshape_keeps_data_when_count_matches() {
        let mut t = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        t.reshape_(&[3, 2]).unwrap();
        assert_eq!(t.dims(), &[3, 2]);
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_reshape_reallocates_on_count_change() {
        let mut t = Tensor::<f32>::ones(&[2, 3]);
        t.reshape_(&[2, 4]).unwrap();
        assert_eq!(t.numel(), 8);
        assert!(t.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_count_and_axis_helpers() {
        let t = Tensor::<f32>::zeros(&[4, 3, 5, 5]);
        assert_eq!(t.count(1, 4), 75);
        assert_eq!(t.count_from(2), 25);
        assert_eq!(t.canonical_axis_index(-3).unwrap(), 1);
    }

    #[test]
    fn test_scale_and_allclose() {
        let mut t = Tensor::<f32>::from_vec(vec![1.0, -2.0, 4.0], &[3]).unwrap();
        t.scale_(0.5);
        let expected = Tensor::<f32>::from_vec(vec![0.5, -1.0, 2.0], &[3]).unwrap();
        assert!(t.allclose(&expected, 1e-6, 1e-6));
        assert_abs_diff_eq!(t.sum(), 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_copy_from_requires_same_count() {
        let mut dst = Tensor::<f32>::zeros(&[2, 2]);
        let src = Tensor::<f32>::ones(&[4]);
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.data(), &[1.0; 4]);
        assert!(dst.copy_from(&Tensor::ones(&[3])).is_err());
    }

    #[test]
    fn test_view_matches_layout() {
        let t = Tensor::<f32>::from_vec((0..6).map(|v| v as f32).collect(), &[2, 3]).unwrap();
        let view = t.view().unwrap();
        assert_eq!(view[[1, 2]], 5.0);
    }
}
