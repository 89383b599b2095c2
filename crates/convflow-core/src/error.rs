use thiserror::Error;

/// Error taxonomy shared by the tensor container, the numeric primitives and the layers.
///
/// Every variant names the operation that failed. None of them is recoverable at the layer level:
/// a failing setup leaves the layer unusable and a failing forward/backward call produces no
/// output at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("Invalid configuration in '{operation}': {reason}")]
    InvalidConfiguration { operation: String, reason: String },

    #[error("Shape mismatch in operation '{operation}': expected {expected}, got {got}")]
    ShapeMismatch {
        operation: String,
        expected: String,
        got: String,
    },

    #[error("Invalid shape in operation '{operation}': {reason}")]
    InvalidShape {
        operation: String,
        reason: String,
        shape: Option<Vec<usize>>,
    },

    #[error("Invalid axis {axis} in operation '{operation}' for tensor with {ndim} dimensions")]
    InvalidAxis {
        operation: String,
        axis: isize,
        ndim: usize,
    },

    #[error("Invalid argument in operation '{operation}': {reason}")]
    InvalidArgument { operation: String, reason: String },

    #[error("Memory allocation failed in operation '{operation}': {details}")]
    AllocationError {
        operation: String,
        details: String,
        requested_bytes: Option<usize>,
    },

    #[error(
        "Invalid batch partition in operation '{operation}': batch size {batch_size} \
         is not divisible by tile size {tile_size}"
    )]
    InvalidBatchPartition {
        operation: String,
        batch_size: usize,
        tile_size: usize,
    },
}

impl TensorError {
    /// Create a configuration error
    pub fn invalid_configuration(operation: &str, reason: &str) -> Self {
        Self::InvalidConfiguration {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a shape mismatch error with context
    pub fn shape_mismatch(operation: &str, expected: &str, got: &str) -> Self {
        Self::ShapeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Create an invalid shape error with the offending shape attached
    pub fn invalid_shape(operation: &str, reason: &str, shape: Option<&[usize]>) -> Self {
        Self::InvalidShape {
            operation: operation.to_string(),
            reason: reason.to_string(),
            shape: shape.map(|s| s.to_vec()),
        }
    }

    pub fn invalid_axis(operation: &str, axis: isize, ndim: usize) -> Self {
        Self::InvalidAxis {
            operation: operation.to_string(),
            axis,
            ndim,
        }
    }

    /// Create an invalid argument error with operation context
    pub fn invalid_argument_op(operation: &str, reason: &str) -> Self {
        Self::InvalidArgument {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an allocation error with the requested size
    pub fn allocation_error(operation: &str, details: &str, requested: Option<usize>) -> Self {
        Self::AllocationError {
            operation: operation.to_string(),
            details: details.to_string(),
            requested_bytes: requested,
        }
    }

    pub fn invalid_batch_partition(operation: &str, batch_size: usize, tile_size: usize) -> Self {
        Self::InvalidBatchPartition {
            operation: operation.to_string(),
            batch_size,
            tile_size,
        }
    }

    /// Get the operation name for this error
    pub fn operation(&self) -> &str {
        match self {
            Self::InvalidConfiguration { operation, .. } => operation,
            Self::ShapeMismatch { operation, .. } => operation,
            Self::InvalidShape { operation, .. } => operation,
            Self::InvalidAxis { operation, .. } => operation,
            Self::InvalidArgument { operation, .. } => operation,
            Self::AllocationError { operation, .. } => operation,
            Self::InvalidBatchPartition { operation, .. } => operation,
        }
    }

    /// Whether the error was raised while validating layer configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Convert from ndarray::ShapeError to TensorError
impl From<ndarray::ShapeError> for TensorError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::InvalidShape {
            operation: "tensor_view".to_string(),
            reason: format!("Shape error: {err}"),
            shape: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_is_reported() {
        let err = TensorError::invalid_batch_partition("tile_plan", 10, 4);
        assert_eq!(err.operation(), "tile_plan");
        assert!(err.to_string().contains("batch size 10"));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_configuration_error_flag() {
        let err = TensorError::invalid_configuration("conv_setup", "group must divide channels");
        assert!(err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "Invalid configuration in 'conv_setup': group must divide channels"
        );
    }
}
