//! Axis-aligned boxes in parametric space.

use crate::{Result, SplineError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned box in an n-dimensional parametric space.
///
/// Used to describe a single tile cell inside an outer patch. The box maps
/// the unit cube onto itself through [`ParametricBox::map_from_unit`].
///
/// # Example
///
/// ```
/// use spline_types::ParametricBox;
///
/// let cell = ParametricBox::new(vec![0.5, 0.0], vec![1.0, 0.25]).unwrap();
/// assert_eq!(cell.extents(), vec![0.5, 0.25]);
/// assert_eq!(cell.map_from_unit(&[0.5, 1.0]).unwrap(), vec![0.75, 0.25]);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParametricBox {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl ParametricBox {
    /// Create a box from its lower and upper corners.
    ///
    /// # Errors
    ///
    /// Returns an error if the corners differ in dimension, are empty, or if
    /// `lower >= upper` on any axis.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.is_empty() {
            return Err(SplineError::invalid_box("box has no axes"));
        }
        if lower.len() != upper.len() {
            return Err(SplineError::dimension_mismatch(
                "box corners",
                lower.len(),
                upper.len(),
            ));
        }
        if let Some(axis) = (0..lower.len()).find(|&a| lower[a] >= upper[a] || lower[a].is_nan()) {
            return Err(SplineError::invalid_box(format!(
                "lower bound {} is not below upper bound {} on axis {}",
                lower[axis], upper[axis], axis
            )));
        }

        Ok(Self { lower, upper })
    }

    /// The unit cube `[0, 1]^dim`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dim` is zero.
    pub fn unit(dim: usize) -> Result<Self> {
        Self::new(vec![0.0; dim], vec![1.0; dim])
    }

    /// Lower corner.
    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Upper corner.
    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Number of axes.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// Edge length per axis.
    #[must_use]
    pub fn extents(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| hi - lo)
            .collect()
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| 0.5 * (lo + hi))
            .collect()
    }

    /// Check whether a point lies inside the box (boundary inclusive).
    #[must_use]
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(p, (lo, hi))| p >= lo && p <= hi)
    }

    /// Map a point of the unit cube affinely into this box.
    ///
    /// # Errors
    ///
    /// Returns an error if the point dimension differs from the box dimension.
    pub fn map_from_unit(&self, point: &[f64]) -> Result<Vec<f64>> {
        if point.len() != self.dim() {
            return Err(SplineError::dimension_mismatch(
                "unit-cube point",
                self.dim(),
                point.len(),
            ));
        }

        Ok(point
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(t, (lo, hi))| (hi - lo).mul_add(*t, *lo))
            .collect())
    }
}
