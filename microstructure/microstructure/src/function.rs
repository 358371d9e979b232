//! Parametrization and parameter-sensitivity callbacks.

use std::fmt;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::{MicrostructureError, Result};

/// Derivatives of tile parameters with respect to design variables.
///
/// Axis 0 runs over evaluation points, axis 1 over tile parameters and axis 2
/// over design variables.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityTensor {
    data: Vec<f64>,
    shape: [usize; 3],
}

impl SensitivityTensor {
    /// Create a tensor from row-major data (last axis fastest).
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::ShapeMismatch`] if `data` does not hold
    /// exactly `shape[0] * shape[1] * shape[2]` values.
    pub fn new(shape: [usize; 3], data: Vec<f64>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(MicrostructureError::shape_mismatch(
                "sensitivity tensor data",
                &[expected],
                &[data.len()],
            ));
        }
        Ok(Self { data, shape })
    }

    /// Tensor of zeros.
    #[must_use]
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            data: vec![0.0; shape.iter().product()],
            shape,
        }
    }

    /// Build a tensor entry by entry.
    pub fn from_fn(shape: [usize; 3], mut f: impl FnMut(usize, usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(shape.iter().product());
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                for k in 0..shape[2] {
                    data.push(f(i, j, k));
                }
            }
        }
        Self { data, shape }
    }

    /// `[points, parameters, design variables]`.
    #[must_use]
    pub const fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of design variables.
    #[must_use]
    pub const fn design_variable_count(&self) -> usize {
        self.shape[2]
    }

    /// Entry at `(point, parameter, design variable)`.
    #[must_use]
    pub fn get(&self, point: usize, parameter: usize, variable: usize) -> Option<f64> {
        if point >= self.shape[0] || parameter >= self.shape[1] || variable >= self.shape[2] {
            return None;
        }
        self.data
            .get((point * self.shape[1] + parameter) * self.shape[2] + variable)
            .copied()
    }

    /// Parameter derivatives for one design variable as `points × parameters`.
    #[must_use]
    pub fn slice(&self, variable: usize) -> DMatrix<f64> {
        DMatrix::from_fn(self.shape[0], self.shape[1], |i, j| {
            self.get(i, j, variable).unwrap_or(0.0)
        })
    }
}

/// Maps evaluation points to tile parameters.
///
/// Input rows are points in the outer patch's parametric frame; output rows
/// hold the tile parameters at those points.
///
/// # Example
///
/// ```
/// use microstructure::ParametrizationFunction;
/// use nalgebra::DMatrix;
///
/// // Parameter grows linearly along the first axis
/// let f = ParametrizationFunction::new(|points: &DMatrix<f64>| {
///     DMatrix::from_fn(points.nrows(), 1, |i, _| 0.1 + 0.2 * points[(i, 0)])
/// });
/// let values = f.evaluate(&DMatrix::from_row_slice(1, 2, &[0.5, 0.0]));
/// assert!((values[(0, 0)] - 0.2).abs() < 1e-12);
/// ```
#[derive(Clone)]
pub struct ParametrizationFunction(Arc<dyn Fn(&DMatrix<f64>) -> DMatrix<f64> + Send + Sync>);

impl ParametrizationFunction {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&DMatrix<f64>) -> DMatrix<f64> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluate at `points` (one point per row).
    #[must_use]
    pub fn evaluate(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
        (self.0)(points)
    }
}

impl fmt::Debug for ParametrizationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParametrizationFunction")
            .field(&"<function>")
            .finish()
    }
}

/// Maps evaluation points to parameter derivatives per design variable.
#[derive(Clone)]
pub struct ParameterSensitivityFunction(
    Arc<dyn Fn(&DMatrix<f64>) -> SensitivityTensor + Send + Sync>,
);

impl ParameterSensitivityFunction {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&DMatrix<f64>) -> SensitivityTensor + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluate at `points` (one point per row).
    #[must_use]
    pub fn evaluate(&self, points: &DMatrix<f64>) -> SensitivityTensor {
        (self.0)(points)
    }
}

impl fmt::Debug for ParameterSensitivityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParameterSensitivityFunction")
            .field(&"<function>")
            .finish()
    }
}
