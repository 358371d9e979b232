//! The spline capability consumed by the microstructure engine.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::basis::bernstein;
use crate::{BezierPatch, ParametricBox, Result, SplineError};

/// A tensor-product spline mapping a parametric box into physical space.
///
/// Implementors provide basis evaluation, knot insertion and Bézier extraction
/// of single knot spans; evaluation, Jacobians and functional composition are
/// derived from those.
///
/// # Implementors
///
/// - [`BezierPatch`] - Single-span Bézier patch on the unit cube
/// - [`BSplinePatch`](crate::BSplinePatch) - B-spline patch with open knot vectors
pub trait Spline: fmt::Debug + Send + Sync {
    /// Number of parametric axes.
    fn para_dim(&self) -> usize;

    /// Dimension of the physical space (length of each control point).
    fn dim(&self) -> usize;

    /// Polynomial degree per parametric axis.
    fn degrees(&self) -> &[usize];

    /// Control points, first parametric axis fastest.
    fn control_points(&self) -> &[DVector<f64>];

    /// Distinct knot values per axis, including the domain bounds.
    fn unique_knots(&self) -> Vec<Vec<f64>>;

    /// Non-zero basis functions at `u` as `(control point index, value)`.
    fn basis_at(&self, u: &[f64]) -> Result<Vec<(usize, f64)>>;

    /// Parametric gradients of the non-zero basis functions at `u`.
    fn basis_gradients_at(&self, u: &[f64]) -> Result<Vec<(usize, DVector<f64>)>>;

    /// Return a refined copy with `knots` inserted along `axis`.
    ///
    /// The refined spline describes the same geometry.
    fn insert_knots(&self, axis: usize, knots: &[f64]) -> Result<Box<dyn Spline>>;

    /// Total number of control points.
    fn control_point_count(&self) -> usize {
        self.control_points().len()
    }

    /// Lower and upper parametric bound per axis.
    fn parametric_bounds(&self) -> Vec<[f64; 2]> {
        self.unique_knots()
            .iter()
            .map(|knots| [knots[0], knots[knots.len() - 1]])
            .collect()
    }

    /// Evaluate the spline at parametric coordinate `u`.
    fn evaluate(&self, u: &[f64]) -> Result<DVector<f64>> {
        let control_points = self.control_points();
        let mut point = DVector::zeros(self.dim());
        for (index, weight) in self.basis_at(u)? {
            point += &control_points[index] * weight;
        }
        Ok(point)
    }

    /// Jacobian `dim × para_dim` at parametric coordinate `u`.
    fn jacobian(&self, u: &[f64]) -> Result<DMatrix<f64>> {
        let control_points = self.control_points();
        let mut jacobian = DMatrix::zeros(self.dim(), self.para_dim());
        for (index, gradient) in self.basis_gradients_at(u)? {
            jacobian += &control_points[index] * gradient.transpose();
        }
        Ok(jacobian)
    }

    /// Bézier form of the polynomial piece on one knot span, reparametrized
    /// to the unit cube.
    ///
    /// `span[a]` indexes the intervals between consecutive
    /// [`unique_knots`](Self::unique_knots) of axis `a`.
    fn span_patch(&self, span: &[usize]) -> Result<BezierPatch>;

    /// Compose `self` with an inner patch living in its parametric domain.
    ///
    /// The composition is exact. The inner patch must stay inside one knot
    /// span of `self`, where the outer map is a single polynomial; tile cells
    /// always do. Along inner axis `b` the result has degree
    /// `Σ_a q_a · p_ab`, with `q_a` the outer degree of axis `a` and `p_ab`
    /// the degree of inner coordinate `a` along `b` (zero where that
    /// coordinate is constant along `b`).
    ///
    /// # Errors
    ///
    /// Returns an error if the inner patch's physical dimension differs from
    /// the parametric dimension of `self`, if an inner control point lies
    /// outside the parametric domain, or if the inner patch crosses a knot.
    fn compose(&self, inner: &BezierPatch) -> Result<BezierPatch> {
        check_inner(self.para_dim(), inner)?;
        let (span, cell) = locate_span(&self.unique_knots(), inner)?;
        let piece = self.span_patch(&span)?;
        let local = inner.localized(&cell)?;

        let collocation =
            Collocation::new(composed_degrees(self.degrees(), &component_degrees(inner)))?;
        let values = collocation
            .samples()
            .iter()
            .map(|s| piece.evaluate(local.evaluate(s)?.as_slice()))
            .collect::<Result<Vec<_>>>()?;

        collocation.interpolate(values)
    }

    /// Derivatives of [`Self::compose`] with respect to every outer control
    /// point coordinate.
    ///
    /// Entry `i * dim + k` is the derivative with respect to coordinate `k`
    /// of control point `i`: the basis function of control point `i`
    /// composed with the inner patch, placed in coordinate `k`.
    fn composition_sensitivities(&self, inner: &BezierPatch) -> Result<Vec<BezierPatch>> {
        check_inner(self.para_dim(), inner)?;
        locate_span(&self.unique_knots(), inner)?;

        let n = self.control_point_count();
        let dim = self.dim();
        let collocation =
            Collocation::new(composed_degrees(self.degrees(), &component_degrees(inner)))?;

        // entry i of sample m: basis function i at the inner point of sample m
        let weights = collocation
            .samples()
            .iter()
            .map(|s| {
                let mut dense = DVector::zeros(n);
                for (index, value) in self.basis_at(inner.evaluate(s)?.as_slice())? {
                    dense[index] += value;
                }
                Ok(dense)
            })
            .collect::<Result<Vec<_>>>()?;
        let coefficients = collocation.solve(weights);

        let mut sensitivities = Vec::with_capacity(n * dim);
        for i in 0..n {
            for k in 0..dim {
                let control_points = coefficients
                    .iter()
                    .map(|c| {
                        let mut point = DVector::zeros(dim);
                        point[k] = c[i];
                        point
                    })
                    .collect();
                sensitivities.push(BezierPatch::new(
                    collocation.degrees().to_vec(),
                    control_points,
                )?);
            }
        }

        Ok(sensitivities)
    }

    /// Derivative of [`Self::compose`] when the inner patch moves with
    /// `inner_derivative`.
    ///
    /// The result is the exact polynomial `J(g(s)) · δ(s)`, with `J` the
    /// Jacobian of `self` on the knot span holding the inner patch `g` and
    /// `δ` the inner derivative.
    fn composition_derivative(
        &self,
        inner: &BezierPatch,
        inner_derivative: &BezierPatch,
    ) -> Result<BezierPatch> {
        check_inner(self.para_dim(), inner)?;
        check_inner(self.para_dim(), inner_derivative)?;
        if inner.para_dim() != inner_derivative.para_dim() {
            return Err(SplineError::dimension_mismatch(
                "inner derivative parametric axes",
                inner.para_dim(),
                inner_derivative.para_dim(),
            ));
        }

        let (span, cell) = locate_span(&self.unique_knots(), inner)?;
        let piece = self.span_patch(&span)?;
        let local = inner.localized(&cell)?;
        let inverse_extents: Vec<f64> = cell.extents().iter().map(|e| e.recip()).collect();
        let local_derivative = inner_derivative.scaled(&inverse_extents)?;

        let collocation = Collocation::new(derivative_degrees(
            self.degrees(),
            &component_degrees(inner),
            &component_degrees(inner_derivative),
        ))?;
        let values = collocation
            .samples()
            .iter()
            .map(|s| {
                let jacobian = piece.jacobian(local.evaluate(s)?.as_slice())?;
                Ok(jacobian * local_derivative.evaluate(s)?)
            })
            .collect::<Result<Vec<_>>>()?;

        collocation.interpolate(values)
    }
}

/// Slack when locating an inner patch inside a knot span.
const SPAN_TOLERANCE: f64 = 1e-9;

/// Relative tolerance below which a coordinate counts as constant.
const CONSTANT_TOLERANCE: f64 = 1e-12;

fn check_inner(para_dim: usize, inner: &BezierPatch) -> Result<()> {
    if inner.dim() == para_dim {
        Ok(())
    } else {
        Err(SplineError::dimension_mismatch(
            "composition",
            para_dim,
            inner.dim(),
        ))
    }
}

/// Knot span holding every control point of `inner`, with its parametric box.
///
/// The convex hull property keeps the whole inner patch inside that box.
fn locate_span(
    unique_knots: &[Vec<f64>],
    inner: &BezierPatch,
) -> Result<(Vec<usize>, ParametricBox)> {
    let mut span = Vec::with_capacity(unique_knots.len());
    let mut lower = Vec::with_capacity(unique_knots.len());
    let mut upper = Vec::with_capacity(unique_knots.len());

    for (axis, knots) in unique_knots.iter().enumerate() {
        let (lo, hi) = inner
            .control_points()
            .iter()
            .map(|c| c[axis])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(x), hi.max(x))
            });

        let first = knots[0];
        let last = knots[knots.len() - 1];
        if lo < first - SPAN_TOLERANCE || hi > last + SPAN_TOLERANCE {
            return Err(SplineError::ParameterOutOfRange {
                axis,
                value: if lo < first - SPAN_TOLERANCE { lo } else { hi },
                lower: first,
                upper: last,
            });
        }

        let index = knots
            .windows(2)
            .position(|w| lo >= w[0] - SPAN_TOLERANCE && hi <= w[1] + SPAN_TOLERANCE)
            .ok_or(SplineError::CrossesKnot {
                axis,
                lower: lo,
                upper: hi,
            })?;
        span.push(index);
        lower.push(knots[index]);
        upper.push(knots[index + 1]);
    }

    Ok((span, ParametricBox::new(lower, upper)?))
}

/// `degrees[c][b]`: degree of coordinate `c` of `patch` along parametric
/// axis `b`, zero where the coordinate is constant along that axis.
fn component_degrees(patch: &BezierPatch) -> Vec<Vec<usize>> {
    let counts = patch.counts();
    let control_points = patch.control_points();

    (0..patch.dim())
        .map(|c| {
            let mut stride = 1;
            counts
                .iter()
                .zip(patch.degrees())
                .map(|(&count, &p)| {
                    let axis_stride = stride;
                    stride *= count;
                    let varies = (0..control_points.len()).any(|flat| {
                        let along = (flat / axis_stride) % count;
                        along > 0 && {
                            let a = control_points[flat][c];
                            let b = control_points[flat - along * axis_stride][c];
                            (a - b).abs() > CONSTANT_TOLERANCE * (1.0 + a.abs().max(b.abs()))
                        }
                    });
                    if varies {
                        p
                    } else {
                        0
                    }
                })
                .collect()
        })
        .collect()
}

/// Per-axis degree of an outer polynomial of `outer` degrees composed with an
/// inner patch of `inner` component degrees.
fn composed_degrees(outer: &[usize], inner: &[Vec<usize>]) -> Vec<usize> {
    let para_dim = inner.first().map_or(0, Vec::len);
    (0..para_dim)
        .map(|b| outer.iter().zip(inner).map(|(q, c)| q * c[b]).sum())
        .collect()
}

/// Per-axis degree of `J(g) · δ`.
///
/// Column `a` of the Jacobian loses one degree in outer axis `a`, which
/// removes `p_ab` from the composed degree before `δ_a` adds its own.
fn derivative_degrees(
    outer: &[usize],
    inner: &[Vec<usize>],
    derivative: &[Vec<usize>],
) -> Vec<usize> {
    composed_degrees(outer, inner)
        .into_iter()
        .enumerate()
        .map(|(b, composed)| {
            outer
                .iter()
                .zip(inner)
                .zip(derivative)
                .filter(|((&q, _), _)| q > 0)
                .map(|((_, c), d)| composed - c[b] + d[b])
                .max()
                .unwrap_or(0)
        })
        .collect()
}

/// Tensor-product Bernstein interpolation on equidistant samples of the unit
/// cube.
///
/// A polynomial of at most the given per-axis degrees is recovered exactly
/// from its values at [`Self::samples`].
struct Collocation {
    degrees: Vec<usize>,
    samples: Vec<Vec<f64>>,
    inverses: Vec<DMatrix<f64>>,
}

impl Collocation {
    fn new(degrees: Vec<usize>) -> Result<Self> {
        let axis_samples: Vec<Vec<f64>> = degrees
            .iter()
            .map(|&p| {
                if p == 0 {
                    vec![0.5]
                } else {
                    (0..=p).map(|k| k as f64 / p as f64).collect()
                }
            })
            .collect();

        let inverses = degrees
            .iter()
            .zip(&axis_samples)
            .map(|(&p, samples)| {
                DMatrix::from_fn(p + 1, p + 1, |row, col| bernstein(p, samples[row])[col])
                    .try_inverse()
                    .ok_or_else(|| {
                        SplineError::degenerate(format!(
                            "singular collocation matrix for degree {p}"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let total: usize = degrees.iter().map(|p| p + 1).product();
        let samples = (0..total)
            .map(|flat| {
                let mut rest = flat;
                axis_samples
                    .iter()
                    .map(|axis| {
                        let t = axis[rest % axis.len()];
                        rest /= axis.len();
                        t
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            degrees,
            samples,
            inverses,
        })
    }

    fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Sample parameters, first axis fastest.
    fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    /// Bernstein coefficients of the polynomial taking `values` at the
    /// samples, solved one axis at a time.
    fn solve(&self, mut values: Vec<DVector<f64>>) -> Vec<DVector<f64>> {
        let mut stride = 1;
        for inverse in &self.inverses {
            let n = inverse.nrows();
            let mut next = values.clone();
            for start in (0..values.len()).filter(|&i| (i / stride) % n == 0) {
                for row in 0..n {
                    next[start + row * stride] = (0..n).fold(
                        DVector::zeros(values[start].len()),
                        |acc, col| acc + &values[start + col * stride] * inverse[(row, col)],
                    );
                }
            }
            values = next;
            stride *= n;
        }
        values
    }

    fn interpolate(&self, values: Vec<DVector<f64>>) -> Result<BezierPatch> {
        BezierPatch::new(self.degrees.clone(), self.solve(values))
    }
}
