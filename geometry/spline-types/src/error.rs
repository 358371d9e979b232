//! Error types for spline operations.

use thiserror::Error;

/// Errors that can occur during spline operations.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SplineError {
    /// The number of control points does not match the degrees or knot vectors.
    #[error("control point count mismatch: expected {expected}, got {actual}")]
    ControlPointCount {
        /// Number of control points implied by degrees and knots.
        expected: usize,
        /// Number of control points provided.
        actual: usize,
    },

    /// Two quantities that must share a dimension do not.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being compared.
        context: &'static str,
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Knot vector is invalid for the given spline parameters.
    #[error("invalid knot vector: {reason}")]
    InvalidKnotVector {
        /// Description of what's wrong with the knot vector.
        reason: String,
    },

    /// A parametric coordinate lies outside the spline's domain.
    #[error("parameter {value} on axis {axis} is outside [{lower}, {upper}]")]
    ParameterOutOfRange {
        /// Parametric axis.
        axis: usize,
        /// Offending value.
        value: f64,
        /// Lower domain bound.
        lower: f64,
        /// Upper domain bound.
        upper: f64,
    },

    /// Parametric axis index exceeds the parametric dimension.
    #[error("parametric axis {axis} does not exist for parametric dimension {para_dim}")]
    InvalidAxis {
        /// Requested axis.
        axis: usize,
        /// Parametric dimension of the spline.
        para_dim: usize,
    },

    /// A parametric box has an empty or inverted extent.
    #[error("invalid parametric box: {reason}")]
    InvalidBox {
        /// Description of the problem.
        reason: String,
    },

    /// A knot span index exceeds the number of spans along an axis.
    #[error("knot span {span} on axis {axis} does not exist, the axis has {spans} spans")]
    InvalidSpan {
        /// Parametric axis.
        axis: usize,
        /// Requested span index.
        span: usize,
        /// Number of knot spans along the axis.
        spans: usize,
    },

    /// An inner patch straddles a knot of the outer spline.
    #[error("inner patch covers [{lower}, {upper}] on axis {axis}, which crosses a knot")]
    CrossesKnot {
        /// Parametric axis.
        axis: usize,
        /// Smallest inner coordinate along the axis.
        lower: f64,
        /// Largest inner coordinate along the axis.
        upper: f64,
    },

    /// Degenerate input (e.g., no degrees or zero-dimensional control points).
    #[error("degenerate spline: {reason}")]
    Degenerate {
        /// Description of the degeneracy.
        reason: String,
    },
}

impl SplineError {
    /// Create an invalid knot vector error.
    #[must_use]
    pub fn invalid_knot_vector(reason: impl Into<String>) -> Self {
        Self::InvalidKnotVector {
            reason: reason.into(),
        }
    }

    /// Create a degenerate spline error.
    #[must_use]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::Degenerate {
            reason: reason.into(),
        }
    }

    /// Create an invalid box error.
    #[must_use]
    pub fn invalid_box(reason: impl Into<String>) -> Self {
        Self::InvalidBox {
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error.
    #[must_use]
    pub const fn dimension_mismatch(context: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            actual,
        }
    }

    /// Check if this is a parameter out of range error.
    #[must_use]
    pub fn is_parameter_out_of_range(&self) -> bool {
        matches!(self, Self::ParameterOutOfRange { .. })
    }

    /// Check if this is a dimension mismatch error.
    #[must_use]
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}
