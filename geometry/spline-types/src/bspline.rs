//! Tensor-product B-spline patches.
//!
//! B-spline patches carry one open knot vector per parametric axis. They are
//! the refined form of an outer patch after tiling knots have been inserted:
//! the unique knots of every axis then delimit the tile cells.

use nalgebra::DVector;

use crate::basis::{
    bspline_basis, bspline_basis_derivatives, check_parameter, check_span, find_span, strides,
    tensor_basis, tensor_gradients, AxisBasis,
};
use crate::{BezierPatch, Result, Spline, SplineError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Knots closer than this are treated as one knot.
const KNOT_TOLERANCE: f64 = 1e-12;

/// A tensor-product B-spline patch with open (clamped) knot vectors.
///
/// Each axis with degree `p` and `n` control points has a knot vector of
/// length `n + p + 1` whose first and last `p + 1` entries coincide. Interior
/// knots repeat at most `p` times, so the patch is at least continuous.
/// Control points are ordered with the first parametric axis fastest.
///
/// # Example
///
/// ```
/// use spline_types::{BSplinePatch, Spline};
/// use nalgebra::DVector;
///
/// // Piecewise linear curve with a kink at u = 0.5
/// let curve = BSplinePatch::new(
///     vec![1],
///     vec![vec![0.0, 0.0, 0.5, 1.0, 1.0]],
///     vec![
///         DVector::from_vec(vec![0.0, 0.0]),
///         DVector::from_vec(vec![1.0, 1.0]),
///         DVector::from_vec(vec![2.0, 0.0]),
///     ],
/// )
/// .unwrap();
///
/// assert_eq!(curve.unique_knots(), vec![vec![0.0, 0.5, 1.0]]);
/// let p = curve.evaluate(&[0.75]).unwrap();
/// assert!((p[1] - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BSplinePatch {
    degrees: Vec<usize>,
    knot_vectors: Vec<Vec<f64>>,
    control_points: Vec<DVector<f64>>,
}

impl BSplinePatch {
    /// Create a B-spline patch.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No degrees are given or the knot vector count differs from the degree count
    /// - A knot vector is too short, decreasing, not open, or has an empty domain
    /// - An interior knot repeats more often than the degree
    /// - The control point count is not the product of per-axis counts
    /// - Control points do not share one non-zero dimension
    pub fn new(
        degrees: Vec<usize>,
        knot_vectors: Vec<Vec<f64>>,
        control_points: Vec<DVector<f64>>,
    ) -> Result<Self> {
        if degrees.is_empty() {
            return Err(SplineError::degenerate("patch has no parametric axes"));
        }
        if knot_vectors.len() != degrees.len() {
            return Err(SplineError::dimension_mismatch(
                "knot vectors",
                degrees.len(),
                knot_vectors.len(),
            ));
        }

        for (axis, (knots, &p)) in knot_vectors.iter().zip(&degrees).enumerate() {
            validate_knot_vector(axis, knots, p)?;
        }

        let expected: usize = knot_vectors
            .iter()
            .zip(&degrees)
            .map(|(knots, p)| knots.len() - p - 1)
            .product();
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
            knot_vectors,
            control_points,
        })
    }

    /// Convert a Bézier patch into a single-span B-spline on `[0, 1]^n`.
    #[must_use]
    pub fn from_bezier(patch: &BezierPatch) -> Self {
        let knot_vectors = patch
            .degrees()
            .iter()
            .map(|&p| {
                let mut knots = vec![0.0; p + 1];
                knots.extend(std::iter::repeat(1.0).take(p + 1));
                knots
            })
            .collect();

        Self {
            degrees: patch.degrees().to_vec(),
            knot_vectors,
            control_points: patch.control_points().to_vec(),
        }
    }

    /// Knot vectors, one per parametric axis.
    #[must_use]
    pub fn knot_vectors(&self) -> &[Vec<f64>] {
        &self.knot_vectors
    }

    /// Number of control points per parametric axis.
    #[must_use]
    pub fn counts(&self) -> Vec<usize> {
        self.knot_vectors
            .iter()
            .zip(&self.degrees)
            .map(|(knots, p)| knots.len() - p - 1)
            .collect()
    }

    /// Insert several knots along one axis.
    ///
    /// The geometry is unchanged; only the representation is refined. Knots
    /// are inserted in ascending order and must lie strictly inside the
    /// domain of `axis`. A knot may be repeated up to the degree of the axis.
    ///
    /// # Errors
    ///
    /// Returns an error if `axis` does not exist, a knot lies on or outside
    /// the domain boundary, or a knot would exceed multiplicity `p`.
    pub fn with_knots_inserted(&self, axis: usize, knots: &[f64]) -> Result<Self> {
        if axis >= self.degrees.len() {
            return Err(SplineError::InvalidAxis {
                axis,
                para_dim: self.degrees.len(),
            });
        }

        let p = self.degrees[axis];
        let axis_knots = &self.knot_vectors[axis];
        let lower = axis_knots[p];
        let upper = axis_knots[axis_knots.len() - p - 1];

        let mut sorted = knots.to_vec();
        sorted.sort_by(f64::total_cmp);
        if let Some(&value) = sorted.iter().find(|&&u| !(u > lower && u < upper)) {
            return Err(SplineError::ParameterOutOfRange {
                axis,
                value,
                lower,
                upper,
            });
        }

        if let Some(&value) = sorted.iter().find(|&&u| {
            let inserted = sorted.iter().filter(|&&v| (v - u).abs() <= KNOT_TOLERANCE).count();
            self.multiplicity(axis, u) + inserted > p
        }) {
            return Err(SplineError::invalid_knot_vector(format!(
                "knot {value} on axis {axis} would exceed multiplicity {p}"
            )));
        }

        let mut refined = self.clone();
        for u in sorted {
            refined = refined.with_knot(axis, u);
        }
        Ok(refined)
    }

    /// Insert a single knot along `axis` (Boehm's algorithm, applied to every
    /// row of control points running along that axis).
    fn with_knot(&self, axis: usize, u: f64) -> Self {
        let p = self.degrees[axis];
        let knots = &self.knot_vectors[axis];
        let counts = self.counts();
        let n = counts[axis];
        let k = find_span(knots, n, p, u);

        let inner: usize = counts[..axis].iter().product();
        let outer: usize = counts[axis + 1..].iter().product();
        let old = |i: usize, inner_i: usize, outer_i: usize| inner_i + inner * (i + n * outer_i);
        let cps = &self.control_points;

        let mut control_points = Vec::with_capacity(inner * (n + 1) * outer);
        for outer_i in 0..outer {
            for i in 0..=n {
                for inner_i in 0..inner {
                    let point = if i + p <= k {
                        cps[old(i, inner_i, outer_i)].clone()
                    } else if i <= k {
                        let denom = knots[i + p] - knots[i];
                        let alpha = if denom.abs() > KNOT_TOLERANCE {
                            (u - knots[i]) / denom
                        } else {
                            0.0
                        };
                        &cps[old(i - 1, inner_i, outer_i)] * (1.0 - alpha)
                            + &cps[old(i, inner_i, outer_i)] * alpha
                    } else {
                        cps[old(i - 1, inner_i, outer_i)].clone()
                    };
                    control_points.push(point);
                }
            }
        }

        let mut new_knots = Vec::with_capacity(knots.len() + 1);
        new_knots.extend_from_slice(&knots[..=k]);
        new_knots.push(u);
        new_knots.extend_from_slice(&knots[k + 1..]);

        let mut knot_vectors = self.knot_vectors.clone();
        knot_vectors[axis] = new_knots;

        Self {
            degrees: self.degrees.clone(),
            knot_vectors,
            control_points,
        }
    }

    /// Number of times `u` occurs in the knot vector of `axis`.
    fn multiplicity(&self, axis: usize, u: f64) -> usize {
        self.knot_vectors[axis]
            .iter()
            .filter(|&&k| (k - u).abs() <= KNOT_TOLERANCE)
            .count()
    }

    fn domain(&self) -> Vec<[f64; 2]> {
        self.knot_vectors
            .iter()
            .zip(&self.degrees)
            .map(|(knots, &p)| [knots[p], knots[knots.len() - p - 1]])
            .collect()
    }

    fn axis_bases(&self, u: &[f64], with_derivatives: bool) -> Result<Vec<AxisBasis>> {
        let u = check_parameter(u, &self.domain())?;
        let counts = self.counts();

        Ok(self
            .degrees
            .iter()
            .zip(&self.knot_vectors)
            .zip(counts)
            .zip(u)
            .map(|(((&p, knots), n), t)| {
                let span = find_span(knots, n, p, t);
                AxisBasis {
                    first: span - p,
                    values: bspline_basis(knots, p, span, t),
                    derivatives: if with_derivatives {
                        bspline_basis_derivatives(knots, p, span, t)
                    } else {
                        Vec::new()
                    },
                }
            })
            .collect())
    }
}

fn validate_knot_vector(axis: usize, knots: &[f64], p: usize) -> Result<()> {
    if knots.len() < 2 * (p + 1) {
        return Err(SplineError::invalid_knot_vector(format!(
            "axis {} needs at least {} knots for degree {}, got {}",
            axis,
            2 * (p + 1),
            p,
            knots.len()
        )));
    }

    if let Some(i) = (1..knots.len()).find(|&i| knots[i] < knots[i - 1]) {
        return Err(SplineError::invalid_knot_vector(format!(
            "axis {} knot vector is not non-decreasing at index {} ({} < {})",
            axis,
            i,
            knots[i],
            knots[i - 1]
        )));
    }

    let last = knots.len() - 1;
    let clamped_start = knots[..=p].iter().all(|&k| (k - knots[0]).abs() <= KNOT_TOLERANCE);
    let clamped_end = knots[last - p..]
        .iter()
        .all(|&k| (k - knots[last]).abs() <= KNOT_TOLERANCE);
    if !clamped_start || !clamped_end {
        return Err(SplineError::invalid_knot_vector(format!(
            "axis {axis} knot vector is not open"
        )));
    }

    if knots[last] - knots[0] <= KNOT_TOLERANCE {
        return Err(SplineError::invalid_knot_vector(format!(
            "axis {axis} has an empty parametric domain"
        )));
    }

    let interior = knots[p + 1..=last - p - 1]
        .iter()
        .filter(|&&k| k - knots[0] > KNOT_TOLERANCE && knots[last] - k > KNOT_TOLERANCE);
    for &k in interior {
        let multiplicity = knots
            .iter()
            .filter(|&&other| (other - k).abs() <= KNOT_TOLERANCE)
            .count();
        if multiplicity > p {
            return Err(SplineError::invalid_knot_vector(format!(
                "axis {axis} repeats knot {k} {multiplicity} times, more than degree {p}"
            )));
        }
    }

    Ok(())
}

impl Spline for BSplinePatch {
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
        self.knot_vectors
            .iter()
            .zip(&self.degrees)
            .map(|(knots, &p)| {
                let mut unique: Vec<f64> = Vec::new();
                for &k in &knots[p..knots.len() - p] {
                    if unique.last().map_or(true, |&last| k - last > KNOT_TOLERANCE) {
                        unique.push(k);
                    }
                }
                unique
            })
            .collect()
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
        Ok(Box::new(self.with_knots_inserted(axis, knots)?))
    }

    fn span_patch(&self, span: &[usize]) -> Result<BezierPatch> {
        let unique_knots = self.unique_knots();
        check_span(span, &unique_knots)?;

        // Raise every interior knot to multiplicity p (Bézier extraction)
        let mut refined = self.clone();
        for (axis, knots) in unique_knots.iter().enumerate() {
            let p = self.degrees[axis];
            let missing: Vec<f64> = knots[1..knots.len() - 1]
                .iter()
                .flat_map(|&u| {
                    std::iter::repeat(u).take(p.saturating_sub(self.multiplicity(axis, u)))
                })
                .collect();
            if !missing.is_empty() {
                refined = refined.with_knots_inserted(axis, &missing)?;
            }
        }

        // Span s now owns control points s * p ..= s * p + p along each axis
        let strides = strides(&refined.counts());
        let local_counts: Vec<usize> = self.degrees.iter().map(|p| p + 1).collect();
        let first: Vec<usize> = span
            .iter()
            .zip(&self.degrees)
            .map(|(&s, &p)| s * p.max(1))
            .collect();

        let total: usize = local_counts.iter().product();
        let control_points = (0..total)
            .map(|flat| {
                let mut rest = flat;
                let index: usize = local_counts
                    .iter()
                    .zip(&first)
                    .zip(&strides)
                    .map(|((&count, &start), &stride)| {
                        let local = rest % count;
                        rest /= count;
                        (start + local) * stride
                    })
                    .sum();
                refined.control_points[index].clone()
            })
            .collect();

        BezierPatch::new(self.degrees.clone(), control_points)
    }

    fn parametric_bounds(&self) -> Vec<[f64; 2]> {
        self.domain()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(coords: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(coords)
    }

    /// Quadratic × linear surface on `[0, 2] × [0, 1]` with a knot at 1.
    fn surface() -> BSplinePatch {
        let mut control_points = Vec::new();
        for j in 0..2 {
            for i in 0..4 {
                let x = f64::from(i);
                let y = f64::from(j);
                control_points.push(point(&[x, y, (x * 0.7).sin() + y * 0.3]));
            }
        }

        BSplinePatch::new(
            vec![2, 1],
            vec![vec![0.0, 0.0, 0.0, 1.0, 2.0, 2.0, 2.0], vec![0.0, 0.0, 1.0, 1.0]],
            control_points,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_knots() {
        let cps = vec![point(&[0.0]), point(&[1.0])];

        let err = BSplinePatch::new(vec![1], vec![vec![0.0, 1.0, 1.0]], cps.clone()).unwrap_err();
        assert!(matches!(err, SplineError::InvalidKnotVector { .. }));

        let err =
            BSplinePatch::new(vec![1], vec![vec![0.0, 1.0, 0.5, 1.0]], cps.clone()).unwrap_err();
        assert!(matches!(err, SplineError::InvalidKnotVector { .. }));

        let err =
            BSplinePatch::new(vec![1], vec![vec![0.0, 0.5, 1.0, 1.0]], cps.clone()).unwrap_err();
        assert!(matches!(err, SplineError::InvalidKnotVector { .. }));

        let err = BSplinePatch::new(vec![1], vec![vec![0.0, 0.0, 0.5, 1.0, 1.0]], cps).unwrap_err();
        assert!(matches!(err, SplineError::ControlPointCount { .. }));
    }

    #[test]
    fn test_unique_knots_and_bounds() {
        let s = surface();
        assert_eq!(s.counts(), vec![4, 2]);
        assert_eq!(s.unique_knots(), vec![vec![0.0, 1.0, 2.0], vec![0.0, 1.0]]);
        assert_eq!(s.parametric_bounds(), vec![[0.0, 2.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_from_bezier_matches_evaluation() {
        let bezier = BezierPatch::new(
            vec![2],
            vec![point(&[0.0, 0.0]), point(&[1.0, 2.0]), point(&[2.0, 0.0])],
        )
        .unwrap();
        let bspline = BSplinePatch::from_bezier(&bezier);

        for i in 0..=10 {
            let t = f64::from(i) / 10.0;
            let a = bezier.evaluate(&[t]).unwrap();
            let b = bspline.evaluate(&[t]).unwrap();
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_knot_insertion_preserves_geometry() {
        let s = surface();
        let refined = s.with_knots_inserted(0, &[1.5, 0.5, 0.25]).unwrap();
        let refined = refined.with_knots_inserted(1, &[0.5]).unwrap();

        assert_eq!(refined.counts(), vec![7, 3]);
        assert_eq!(
            refined.unique_knots(),
            vec![vec![0.0, 0.25, 0.5, 1.0, 1.5, 2.0], vec![0.0, 0.5, 1.0]]
        );

        for &(u, v) in &[(0.0, 0.0), (0.3, 0.9), (1.0, 0.5), (1.7, 0.2), (2.0, 1.0)] {
            let a = s.evaluate(&[u, v]).unwrap();
            let b = refined.evaluate(&[u, v]).unwrap();
            assert_relative_eq!(a, b, epsilon = 1e-12);

            let ja = s.jacobian(&[u, v]).unwrap();
            let jb = refined.jacobian(&[u, v]).unwrap();
            assert_relative_eq!(ja, jb, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_knot_insertion_rejects_boundary_knots() {
        let s = surface();
        let err = s.with_knots_inserted(0, &[0.0]).unwrap_err();
        assert!(err.is_parameter_out_of_range());
        assert!(s.with_knots_inserted(0, &[2.5]).is_err());
        assert!(matches!(
            s.with_knots_inserted(2, &[0.5]).unwrap_err(),
            SplineError::InvalidAxis { axis: 2, para_dim: 2 }
        ));
    }

    #[test]
    fn test_interior_multiplicity_is_bounded_by_degree() {
        let cps = vec![point(&[0.0]), point(&[1.0]), point(&[2.0]), point(&[3.0])];
        let err = BSplinePatch::new(vec![1], vec![vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0]], cps)
            .unwrap_err();
        assert!(matches!(err, SplineError::InvalidKnotVector { .. }));

        let s = surface();
        assert!(s.with_knots_inserted(0, &[1.0]).is_ok());
        assert!(matches!(
            s.with_knots_inserted(0, &[1.0, 1.0]).unwrap_err(),
            SplineError::InvalidKnotVector { .. }
        ));
    }

    #[test]
    fn test_span_patch_matches_span_geometry() {
        let s = surface();
        let refined = s.with_knots_inserted(1, &[0.25]).unwrap();

        for (span, lower, upper) in [
            ([0, 0], [0.0, 0.0], [1.0, 0.25]),
            ([1, 0], [1.0, 0.0], [2.0, 0.25]),
            ([1, 1], [1.0, 0.25], [2.0, 1.0]),
        ] {
            let piece = refined.span_patch(&span).unwrap();
            assert_eq!(piece.degrees(), &[2, 1]);
            for &(a, b) in &[(0.0, 0.0), (0.3, 0.7), (1.0, 1.0), (0.5, 0.0)] {
                let u = lower[0] + a * (upper[0] - lower[0]);
                let v = lower[1] + b * (upper[1] - lower[1]);
                let expected = s.evaluate(&[u, v]).unwrap();
                let actual = piece.evaluate(&[a, b]).unwrap();
                assert_relative_eq!(expected, actual, epsilon = 1e-12);
            }
        }

        assert!(matches!(
            refined.span_patch(&[2, 0]).unwrap_err(),
            SplineError::InvalidSpan { axis: 0, span: 2, spans: 2 }
        ));
    }

    #[test]
    fn test_basis_partition_of_unity() {
        let s = surface();
        let basis = s.basis_at(&[1.3, 0.4]).unwrap();
        let sum: f64 = basis.iter().map(|(_, w)| w).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        assert!(basis.iter().all(|&(i, _)| i < s.control_point_count()));
    }
}
