//! Univariate basis functions and their tensor products.
//!
//! Flat control point indices always run with the first parametric axis
//! fastest: `index = i0 + n0 * (i1 + n1 * i2)`.

use nalgebra::DVector;

use crate::{Result, SplineError};

/// Tolerance for accepting parameters marginally outside a domain.
pub(crate) const DOMAIN_TOLERANCE: f64 = 1e-9;

/// Non-zero basis values of one parametric axis.
#[derive(Debug, Clone)]
pub(crate) struct AxisBasis {
    /// Index of the first control point the values belong to.
    pub first: usize,
    /// Basis function values.
    pub values: Vec<f64>,
    /// First derivatives of the basis functions.
    pub derivatives: Vec<f64>,
}

/// Bernstein polynomials of degree `p` at `t`.
pub(crate) fn bernstein(p: usize, t: f64) -> Vec<f64> {
    let s = 1.0 - t;
    let mut b = vec![0.0; p + 1];
    b[0] = 1.0;

    for j in 1..=p {
        let mut saved = 0.0;
        for r in 0..j {
            let temp = b[r];
            b[r] = s.mul_add(temp, saved);
            saved = t * temp;
        }
        b[j] = saved;
    }

    b
}

/// First derivatives of the Bernstein polynomials of degree `p` at `t`.
pub(crate) fn bernstein_derivatives(p: usize, t: f64) -> Vec<f64> {
    if p == 0 {
        return vec![0.0];
    }

    let lower = bernstein(p - 1, t);
    let pf = p as f64;
    (0..=p)
        .map(|i| {
            let left = if i > 0 { lower[i - 1] } else { 0.0 };
            let right = if i < p { lower[i] } else { 0.0 };
            pf * (left - right)
        })
        .collect()
}

/// Find the knot span index for parameter `u`.
///
/// Returns `i` such that `knots[i] <= u < knots[i+1]`, with the domain end
/// mapped into the last non-empty span.
pub(crate) fn find_span(knots: &[f64], n: usize, p: usize, u: f64) -> usize {
    if u >= knots[n] {
        return n - 1;
    }

    let mut low = p;
    let mut high = n;

    while low < high {
        let mid = (low + high) / 2;
        if knots[mid] > u {
            high = mid;
        } else {
            low = mid + 1;
        }
    }

    low - 1
}

/// Compute the `p + 1` non-zero B-spline basis functions at `u`.
pub(crate) fn bspline_basis(knots: &[f64], p: usize, span: usize, u: f64) -> Vec<f64> {
    let mut n_basis = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    n_basis[0] = 1.0;

    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;

        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            if denom.abs() > 1e-15 {
                let temp = n_basis[r] / denom;
                n_basis[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            } else {
                n_basis[r] = saved;
                saved = 0.0;
            }
        }
        n_basis[j] = saved;
    }

    n_basis
}

/// First derivatives of the non-zero B-spline basis functions at `u`.
///
/// Uses `N'_{i,p} = p / (u_{i+p} - u_i) N_{i,p-1} - p / (u_{i+p+1} - u_{i+1}) N_{i+1,p-1}`
/// with the degree `p - 1` functions of the same span.
pub(crate) fn bspline_basis_derivatives(knots: &[f64], p: usize, span: usize, u: f64) -> Vec<f64> {
    if p == 0 {
        return vec![0.0];
    }

    let lower = bspline_basis(knots, p - 1, span, u);
    let pf = p as f64;

    (0..=p)
        .map(|r| {
            let i = span - p + r;
            let mut derivative = 0.0;
            if r >= 1 {
                let denom = knots[i + p] - knots[i];
                if denom.abs() > 1e-15 {
                    derivative += pf * lower[r - 1] / denom;
                }
            }
            if r < p {
                let denom = knots[i + p + 1] - knots[i + 1];
                if denom.abs() > 1e-15 {
                    derivative -= pf * lower[r] / denom;
                }
            }
            derivative
        })
        .collect()
}

/// Validate a parametric coordinate against per-axis bounds, clamping values
/// within [`DOMAIN_TOLERANCE`] of the boundary.
pub(crate) fn check_parameter(u: &[f64], bounds: &[[f64; 2]]) -> Result<Vec<f64>> {
    if u.len() != bounds.len() {
        return Err(SplineError::dimension_mismatch(
            "parametric coordinate",
            bounds.len(),
            u.len(),
        ));
    }

    u.iter()
        .zip(bounds)
        .enumerate()
        .map(|(axis, (&value, &[lower, upper]))| {
            if value < lower - DOMAIN_TOLERANCE || value > upper + DOMAIN_TOLERANCE || value.is_nan()
            {
                Err(SplineError::ParameterOutOfRange {
                    axis,
                    value,
                    lower,
                    upper,
                })
            } else {
                Ok(value.clamp(lower, upper))
            }
        })
        .collect()
}

/// Check that `span` picks one interval between consecutive `unique_knots`
/// on every axis.
pub(crate) fn check_span(span: &[usize], unique_knots: &[Vec<f64>]) -> Result<()> {
    if span.len() != unique_knots.len() {
        return Err(SplineError::dimension_mismatch(
            "knot span",
            unique_knots.len(),
            span.len(),
        ));
    }

    for (axis, (&index, knots)) in span.iter().zip(unique_knots).enumerate() {
        let spans = knots.len().saturating_sub(1);
        if index >= spans {
            return Err(SplineError::InvalidSpan {
                axis,
                span: index,
                spans,
            });
        }
    }
    Ok(())
}

/// Flat-index strides for per-axis control point counts.
pub(crate) fn strides(counts: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(counts.len());
    let mut stride = 1;
    for &count in counts {
        strides.push(stride);
        stride *= count;
    }
    strides
}

/// Tensor-product basis values as `(flat index, value)` pairs.
pub(crate) fn tensor_basis(axes: &[AxisBasis], counts: &[usize]) -> Vec<(usize, f64)> {
    let strides = strides(counts);
    let mut out = vec![(0_usize, 1.0_f64)];

    for (axis, stride) in axes.iter().zip(strides) {
        let mut next = Vec::with_capacity(out.len() * axis.values.len());
        for (local, &value) in axis.values.iter().enumerate() {
            for &(index, weight) in &out {
                next.push((index + (axis.first + local) * stride, weight * value));
            }
        }
        out = next;
    }

    out
}

/// Tensor-product basis gradients as `(flat index, gradient)` pairs.
pub(crate) fn tensor_gradients(axes: &[AxisBasis], counts: &[usize]) -> Vec<(usize, DVector<f64>)> {
    let para_dim = axes.len();
    let strides = strides(counts);
    let mut out = vec![(0_usize, 1.0_f64, DVector::<f64>::zeros(para_dim))];

    for (k, (axis, stride)) in axes.iter().zip(strides).enumerate() {
        let mut next = Vec::with_capacity(out.len() * axis.values.len());
        for (local, (&value, &derivative)) in axis.values.iter().zip(&axis.derivatives).enumerate() {
            for (index, product, gradient) in &out {
                let mut scaled = gradient * value;
                scaled[k] = product * derivative;
                next.push((index + (axis.first + local) * stride, product * value, scaled));
            }
        }
        out = next;
    }

    out.into_iter()
        .map(|(index, _, gradient)| (index, gradient))
        .collect()
}
