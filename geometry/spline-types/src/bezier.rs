//! Tensor-product Bézier patches.
//!
//! A Bézier patch of parametric dimension `n` is defined over the unit cube
//! `[0, 1]^n`. Tile geometry is always produced as Bézier patches in the unit
//! cube and then placed into a cell with [`BezierPatch::placed`].

use nalgebra::DVector;

use crate::basis::{
    bernstein, bernstein_derivatives, check_parameter, check_span, tensor_basis, tensor_gradients,
    AxisBasis,
};
use crate::{BSplinePatch, ParametricBox, Result, Spline, SplineError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A tensor-product Bézier patch.
///
/// Control points are stored with the first parametric axis running fastest:
/// for degrees `(p0, p1)` the point `(i0, i1)` lives at `i0 + (p0 + 1) * i1`.
///
/// # Example
///
/// ```
/// use spline_types::{BezierPatch, Spline};
///
/// let square = BezierPatch::unit_cube(2).unwrap();
/// assert_eq!(square.control_point_count(), 4);
///
/// let p = square.evaluate(&[0.25, 0.75]).unwrap();
/// assert!((p[0] - 0.25).abs() < 1e-12);
/// assert!((p[1] - 0.75).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BezierPatch {
    degrees: Vec<usize>,
    control_points: Vec<DVector<f64>>,
}

impl BezierPatch {
    /// Create a Bézier patch from per-axis degrees and control points.
    ///
    /// # Errors
    ///
    /// Returns an error if no degrees are given, if the number of control
    /// points is not `prod(degree + 1)`, or if the control points do not share
    /// one non-zero dimension.
    pub fn new(degrees: Vec<usize>, control_points: Vec<DVector<f64>>) -> Result<Self> {
        if degrees.is_empty() {
            return Err(SplineError::degenerate("patch has no parametric axes"));
        }

        let expected: usize = degrees.iter().map(|p| p + 1).product();
        if control_points.len() != expected {
            return Err(SplineError::ControlPointCount {
                expected,
                actual: control_points.len(),
            });
        }

        let dim = control_points[0].len();
        if dim == 0 {
            return Err(SplineError::degenerate("control points have dimension zero"));
        }
        if let Some(point) = control_points.iter().find(|p| p.len() != dim) {
            return Err(SplineError::dimension_mismatch(
                "control points",
                dim,
                point.len(),
            ));
        }

        Ok(Self {
            degrees,
            control_points,
        })
    }

    /// Identity map of the unit cube as a multilinear patch.
    pub fn unit_cube(para_dim: usize) -> Result<Self> {
        Self::axis_aligned_box(&vec![0.0; para_dim], &vec![1.0; para_dim])
    }

    /// Multilinear patch spanning the box `[lower, upper]`.
    ///
    /// Parametric and physical dimension both equal `lower.len()`. Flat
    /// extents are allowed, so a collapsed box yields a degenerate but valid
    /// patch.
    pub fn axis_aligned_box(lower: &[f64], upper: &[f64]) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(SplineError::dimension_mismatch(
                "box corners",
                lower.len(),
                upper.len(),
            ));
        }

        let dim = lower.len();
        let control_points = (0..1_usize << dim)
            .map(|corner| {
                DVector::from_fn(dim, |axis, _| {
                    if (corner >> axis) & 1 == 1 {
                        upper[axis]
                    } else {
                        lower[axis]
                    }
                })
            })
            .collect();

        Self::new(vec![1; dim], control_points)
    }

    /// Per-axis polynomial degrees.
    #[must_use]
    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Control points, first parametric axis fastest.
    #[must_use]
    pub fn control_points(&self) -> &[DVector<f64>] {
        &self.control_points
    }

    /// Number of control points per parametric axis.
    #[must_use]
    pub fn counts(&self) -> Vec<usize> {
        self.degrees.iter().map(|p| p + 1).collect()
    }

    /// Map the patch from the unit cube into `cell`.
    ///
    /// Every control point `c` becomes `lower + extents ⊙ c`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell dimension differs from the physical
    /// dimension of the patch.
    pub fn placed(&self, cell: &ParametricBox) -> Result<Self> {
        if cell.dim() != self.dim() {
            return Err(SplineError::dimension_mismatch(
                "cell placement",
                self.dim(),
                cell.dim(),
            ));
        }

        let lower = DVector::from_column_slice(cell.lower());
        let extents = DVector::from_vec(cell.extents());
        let control_points = self
            .control_points
            .iter()
            .map(|c| &lower + extents.component_mul(c))
            .collect();

        Ok(Self {
            degrees: self.degrees.clone(),
            control_points,
        })
    }

    /// Map the patch from `cell` back into the unit cube.
    ///
    /// This is the inverse of [`Self::placed`]: every control point `c`
    /// becomes `(c - lower) ⊘ extents`.
    pub fn localized(&self, cell: &ParametricBox) -> Result<Self> {
        if cell.dim() != self.dim() {
            return Err(SplineError::dimension_mismatch(
                "cell localization",
                self.dim(),
                cell.dim(),
            ));
        }

        let lower = DVector::from_column_slice(cell.lower());
        let extents = DVector::from_vec(cell.extents());
        let control_points = self
            .control_points
            .iter()
            .map(|c| (c - &lower).component_div(&extents))
            .collect();

        Ok(Self {
            degrees: self.degrees.clone(),
            control_points,
        })
    }

    /// Scale control points coordinate-wise, without translation.
    ///
    /// This is the linear part of [`Self::placed`] and maps a derivative of
    /// tile geometry into a cell.
    pub fn scaled(&self, factors: &[f64]) -> Result<Self> {
        if factors.len() != self.dim() {
            return Err(SplineError::dimension_mismatch(
                "scale factors",
                self.dim(),
                factors.len(),
            ));
        }

        let factors = DVector::from_column_slice(factors);
        let control_points = self
            .control_points
            .iter()
            .map(|c| factors.component_mul(c))
            .collect();

        Ok(Self {
            degrees: self.degrees.clone(),
            control_points,
        })
    }

    /// Express the patch as a B-spline with open knot vectors on `[0, 1]`.
    #[must_use]
    pub fn to_bspline(&self) -> BSplinePatch {
        BSplinePatch::from_bezier(self)
    }

    fn axis_bases(&self, u: &[f64], with_derivatives: bool) -> Result<Vec<AxisBasis>> {
        let bounds = vec![[0.0, 1.0]; self.para_dim()];
        let u = check_parameter(u, &bounds)?;

        Ok(self
            .degrees
            .iter()
            .zip(u)
            .map(|(&p, t)| AxisBasis {
                first: 0,
                values: bernstein(p, t),
                derivatives: if with_derivatives {
                    bernstein_derivatives(p, t)
                } else {
                    Vec::new()
                },
            })
            .collect())
    }
}

impl Spline for BezierPatch {
    fn para_dim(&self) -> usize {
        self.degrees.len()
    }

    fn dim(&self) -> usize {
        self.control_points[0].len()
    }

    fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    fn control_points(&self) -> &[DVector<f64>] {
        &self.control_points
    }

    fn unique_knots(&self) -> Vec<Vec<f64>> {
        vec![vec![0.0, 1.0]; self.para_dim()]
    }

    fn basis_at(&self, u: &[f64]) -> Result<Vec<(usize, f64)>> {
        let axes = self.axis_bases(u, false)?;
        Ok(tensor_basis(&axes, &self.counts()))
    }

    fn basis_gradients_at(&self, u: &[f64]) -> Result<Vec<(usize, DVector<f64>)>> {
        let axes = self.axis_bases(u, true)?;
        Ok(tensor_gradients(&axes, &self.counts()))
    }

    fn insert_knots(&self, axis: usize, knots: &[f64]) -> Result<Box<dyn Spline>> {
        self.to_bspline().insert_knots(axis, knots)
    }

    fn span_patch(&self, span: &[usize]) -> Result<BezierPatch> {
        check_span(span, &self.unique_knots())?;
        Ok(self.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quadratic_curve() -> BezierPatch {
        BezierPatch::new(
            vec![2],
            vec![
                DVector::from_vec(vec![0.0, 0.0]),
                DVector::from_vec(vec![1.0, 2.0]),
                DVector::from_vec(vec![2.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_control_points() {
        let err = BezierPatch::new(vec![1, 1], vec![DVector::zeros(2); 3]).unwrap_err();
        assert!(matches!(
            err,
            SplineError::ControlPointCount {
                expected: 4,
                actual: 3
            }
        ));

        let err =
            BezierPatch::new(vec![1], vec![DVector::zeros(2), DVector::zeros(3)]).unwrap_err();
        assert!(err.is_dimension_mismatch());

        assert!(BezierPatch::new(vec![], vec![DVector::zeros(1)]).is_err());
    }

    #[test]
    fn test_axis_aligned_box_corner_order() {
        let patch = BezierPatch::axis_aligned_box(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(patch.control_point_count(), 8);
        assert_eq!(patch.control_points()[1].as_slice(), &[1.0, 0.0, 0.0]);
        assert_eq!(patch.control_points()[2].as_slice(), &[0.0, 2.0, 0.0]);
        assert_eq!(patch.control_points()[4].as_slice(), &[0.0, 0.0, 3.0]);
        assert_eq!(patch.control_points()[7].as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_evaluate_quadratic() {
        let curve = quadratic_curve();
        let mid = curve.evaluate(&[0.5]).unwrap();
        assert_relative_eq!(mid[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(mid[1], 1.0, epsilon = 1e-12);

        let end = curve.evaluate(&[1.0]).unwrap();
        assert_relative_eq!(end[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(end[1], 0.0, epsilon = 1e-12);

        assert!(curve.evaluate(&[1.5]).unwrap_err().is_parameter_out_of_range());
    }

    #[test]
    fn test_jacobian_of_box() {
        let patch = BezierPatch::axis_aligned_box(&[1.0, -1.0], &[3.0, 2.0]).unwrap();
        let jac = patch.jacobian(&[0.3, 0.6]).unwrap();
        assert_relative_eq!(jac[(0, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(jac[(1, 1)], 3.0, epsilon = 1e-12);
        assert_relative_eq!(jac[(0, 1)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(jac[(1, 0)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_placed_and_scaled() {
        let unit = BezierPatch::unit_cube(2).unwrap();
        let cell = ParametricBox::new(vec![0.5, 0.0], vec![1.0, 0.25]).unwrap();

        let placed = unit.placed(&cell).unwrap();
        assert_eq!(placed.control_points()[0].as_slice(), &[0.5, 0.0]);
        assert_eq!(placed.control_points()[3].as_slice(), &[1.0, 0.25]);

        let scaled = unit.scaled(&cell.extents()).unwrap();
        assert_eq!(scaled.control_points()[0].as_slice(), &[0.0, 0.0]);
        assert_eq!(scaled.control_points()[3].as_slice(), &[0.5, 0.25]);

        let wrong = ParametricBox::unit(3).unwrap();
        assert!(unit.placed(&wrong).is_err());
    }

    #[test]
    fn test_localized_undoes_placement() {
        let curve = quadratic_curve();
        let cell = ParametricBox::new(vec![-1.0, 2.0], vec![3.0, 2.5]).unwrap();
        let back = curve.placed(&cell).unwrap().localized(&cell).unwrap();
        for (a, b) in back.control_points().iter().zip(curve.control_points()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_span_patch_is_the_patch_itself() {
        let curve = quadratic_curve();
        assert_eq!(curve.span_patch(&[0]).unwrap(), curve);
        assert!(matches!(
            curve.span_patch(&[1]).unwrap_err(),
            SplineError::InvalidSpan { axis: 0, span: 1, spans: 1 }
        ));
    }

    #[test]
    fn test_insert_knots_returns_refined_spline() {
        let curve = quadratic_curve();
        let refined = curve.insert_knots(0, &[0.5]).unwrap();
        assert_eq!(refined.unique_knots(), vec![vec![0.0, 0.5, 1.0]]);
        assert_eq!(refined.control_point_count(), 4);

        let a = curve.evaluate(&[0.3]).unwrap();
        let b = refined.evaluate(&[0.3]).unwrap();
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }
}
