use ndarray::LinalgScalar;
use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float32,
    Float64,
}

impl DType {
    pub fn size(&self) -> usize {
        match self {
            DType::Float32 => 4,
            DType::Float64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Element types the convolution engine is instantiated for.
///
/// The width is resolved at compile time: every primitive (GEMM, im2col, replication, the
/// scale kernel) is generic over this trait and monomorphised once for `f32` and once for `f64`.
pub trait ConvElement:
    LinalgScalar
    + Float
    + FromPrimitive
    + Default
    + std::fmt::Debug
    + std::fmt::Display
    + std::iter::Sum
    + Send
    + Sync
    + 'static
{
    const DTYPE: DType;

    /// Number of elements the scale kernel stages per worker chunk.
    const STAGING_ELEMS: usize;
}

impl ConvElement for f32 {
    const DTYPE: DType = DType::Float32;
    const STAGING_ELEMS: usize = 4 * 1024;
}

impl ConvElement for f64 {
    const DTYPE: DType = DType::Float64;
    const STAGING_ELEMS: usize = 2 * 1024;
}

/// Get DType from an element type
pub fn dtype_of<T: ConvElement>() -> DType {
    T::DTYPE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_lookup() {
        assert_eq!(dtype_of::<f32>(), DType::Float32);
        assert_eq!(dtype_of::<f64>().size(), 8);
        assert_eq!(DType::Float32.to_string(), "float32");
    }

    #[test]
    fn test_staging_buffers_hold_same_byte_count() {
        assert_eq!(
            f32::STAGING_ELEMS * DType::Float32.size(),
            f64::STAGING_ELEMS * DType::Float64.size()
        );
    }
}
