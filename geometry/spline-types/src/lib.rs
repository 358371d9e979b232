//! Tensor-product spline patches for microstructure tiling.
//!
//! This crate provides the spline kernel consumed by the `microstructure`
//! engine:
//!
//! - [`BezierPatch`] - Tensor-product Bézier patch on the unit cube
//! - [`BSplinePatch`] - Tensor-product B-spline patch with open knot vectors
//! - [`ParametricBox`] - Axis-aligned box in parametric space (a tile cell)
//! - [`Multipatch`] - Ordered collection of shared patches
//!
//! Patches have arbitrary parametric and physical dimension. Control points are
//! [`DVector`]s stored with the first parametric axis running fastest.
//!
//! # Core Trait
//!
//! All patch types implement the [`Spline`] trait, which provides:
//!
//! - **Evaluation**: Position and Jacobian at a parametric coordinate
//! - **Refinement**: Knot insertion along one parametric axis
//! - **Composition**: Exact Bézier form of an inner Bézier patch mapped
//!   through one knot span of the outer patch, plus derivatives of that
//!   composition with respect to outer control points or a moving inner patch
//!
//! # Example
//!
//! ```
//! use spline_types::{BezierPatch, ParametricBox, Spline};
//!
//! // Outer map: the box [0, 4] × [0, 2]
//! let outer = BezierPatch::axis_aligned_box(&[0.0, 0.0], &[4.0, 2.0]).unwrap();
//!
//! // Tile: unit square placed in the upper right quarter of the domain
//! let cell = ParametricBox::new(vec![0.5, 0.5], vec![1.0, 1.0]).unwrap();
//! let tile = BezierPatch::unit_cube(2).unwrap().placed(&cell).unwrap();
//!
//! let composed = outer.compose(&tile).unwrap();
//! assert_eq!(composed.control_points()[0].as_slice(), &[2.0, 1.0]);
//! ```
//!
//! # Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for patch and box types

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::suboptimal_flops,
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::needless_range_loop,
    clippy::cast_precision_loss,
    clippy::return_self_not_must_use
)]

mod basis;
mod bezier;
mod bspline;
mod domain;
mod error;
mod multipatch;
mod traits;

pub use bezier::BezierPatch;
pub use bspline::BSplinePatch;
pub use domain::ParametricBox;
pub use error::SplineError;
pub use multipatch::Multipatch;
pub use traits::Spline;

// Re-export nalgebra types for convenience
pub use nalgebra::{DMatrix, DVector};

/// Result type for spline operations.
pub type Result<T> = std::result::Result<T, SplineError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod integration_tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Test that both patch types honour the `Spline` contract.
    #[test]
    fn test_spline_trait_consistency() {
        let bezier = BezierPatch::axis_aligned_box(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
        verify_spline_basics(&bezier);

        let bspline = bezier
            .to_bspline()
            .with_knots_inserted(2, &[0.25, 0.5])
            .unwrap();
        verify_spline_basics(&bspline);
    }

    fn verify_spline_basics<S: Spline>(spline: &S) {
        let bounds = spline.parametric_bounds();
        assert_eq!(bounds.len(), spline.para_dim());

        let center: Vec<f64> = bounds.iter().map(|[lo, hi]| 0.5 * (lo + hi)).collect();

        // Partition of unity
        let sum: f64 = spline.basis_at(&center).unwrap().iter().map(|(_, w)| w).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);

        // Gradients of a partition of unity sum to zero
        let total = spline
            .basis_gradients_at(&center)
            .unwrap()
            .into_iter()
            .fold(DVector::zeros(spline.para_dim()), |acc, (_, g)| acc + g);
        assert_relative_eq!(total.norm(), 0.0, epsilon = 1e-12);

        // Jacobian shape
        let jac = spline.jacobian(&center).unwrap();
        assert_eq!(jac.nrows(), spline.dim());
        assert_eq!(jac.ncols(), spline.para_dim());
    }
}
