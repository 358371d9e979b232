//! Error types for microstructure generation.

use spline_types::SplineError;
use thiserror::Error;

/// Errors that can occur while building a microstructure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MicrostructureError {
    /// The tiling does not fit the outer patch.
    #[error("invalid tiling: {reason}")]
    InvalidTiling {
        /// Description of the problem.
        reason: String,
    },

    /// The microtile does not fit the outer patch.
    #[error("invalid microtile: {reason}")]
    InvalidMicrotile {
        /// Description of the problem.
        reason: String,
    },

    /// A closing face was requested from a microtile without closing support.
    #[error("microtile does not support closing face {face}")]
    ClosingUnsupported {
        /// Requested closing face.
        face: String,
    },

    /// The closing face axis does not exist in the outer patch.
    #[error("closing face axis {axis} is out of range for parametric dimension {para_dim}")]
    ClosingFaceOutOfRange {
        /// Parametric axis of the closing face.
        axis: usize,
        /// Parametric dimension of the outer patch.
        para_dim: usize,
    },

    /// A closing face string could not be parsed.
    #[error("invalid closing face {0:?}, expected one of \"x\", \"y\", \"z\"")]
    InvalidClosingFace(String),

    /// A parametrization function was given but the microtile cannot be parametrized.
    #[error("microtile does not declare evaluation points and a parameter dimension")]
    ParametrizationUnsupported,

    /// A sensitivity function was given without a parametrization function.
    #[error("parameter sensitivity function requires a parametrization function")]
    SensitivityWithoutParametrization,

    /// A function or tile generator returned an array of the wrong shape.
    #[error("{name} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        /// What produced the array.
        name: &'static str,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A per-patch value has the wrong number of entries.
    #[error("{name} has {actual} entries, expected one per patch ({expected})")]
    PatchCountMismatch {
        /// Name of the property.
        name: &'static str,
        /// Number of patches.
        expected: usize,
        /// Number of entries provided.
        actual: usize,
    },

    /// A tile generator failed.
    #[error("tile generation failed: {reason}")]
    TileGeneration {
        /// Description of the failure.
        reason: String,
    },

    /// A saved result was requested before any result was built.
    #[error("no saved result available, call create() first")]
    NoSavedResult,

    /// Spline kernel error.
    #[error(transparent)]
    Spline(#[from] SplineError),
}

impl MicrostructureError {
    /// Create an invalid tiling error.
    #[must_use]
    pub fn invalid_tiling(reason: impl Into<String>) -> Self {
        Self::InvalidTiling {
            reason: reason.into(),
        }
    }

    /// Create an invalid microtile error.
    #[must_use]
    pub fn invalid_microtile(reason: impl Into<String>) -> Self {
        Self::InvalidMicrotile {
            reason: reason.into(),
        }
    }

    /// Create a tile generation error.
    #[must_use]
    pub fn tile_generation(reason: impl Into<String>) -> Self {
        Self::TileGeneration {
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(name: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            name,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Check if this error stems from the caller's configuration.
    ///
    /// Configuration errors are raised before or during tiling when inputs
    /// are inconsistent. Kernel failures and missing saved results are not
    /// configuration errors.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Spline(_) | Self::NoSavedResult | Self::TileGeneration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MicrostructureError::invalid_tiling("counts must be positive");
        assert_eq!(err.to_string(), "invalid tiling: counts must be positive");

        let err = MicrostructureError::ClosingUnsupported {
            face: "x_min".into(),
        };
        assert!(err.to_string().contains("x_min"));

        let err = MicrostructureError::shape_mismatch("parametrization function", &[1, 2], &[1, 3]);
        assert!(err.to_string().contains("[1, 3]"));

        let err = MicrostructureError::PatchCountMismatch {
            name: "tiling",
            expected: 3,
            actual: 2,
        };
        assert!(err.to_string().contains("expected one per patch (3)"));
    }

    #[test]
    fn test_configuration_error_predicate() {
        assert!(MicrostructureError::ParametrizationUnsupported.is_configuration_error());
        assert!(MicrostructureError::InvalidClosingFace("w".into()).is_configuration_error());
        assert!(!MicrostructureError::NoSavedResult.is_configuration_error());

        let err: MicrostructureError = SplineError::degenerate("empty").into();
        assert!(!err.is_configuration_error());
    }
}
