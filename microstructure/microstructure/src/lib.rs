//! Parametric microstructure tiling and composition.
//!
//! A microstructure is built by tiling the parametric domain of an outer
//! spline patch (the deformation function) into cells, generating a small
//! unit-cube tile per cell and composing it with the outer map. The result is
//! an ordered collection of Bézier patches, optionally with derivative fields
//! for gradient-based design.
//!
//! - [`SinglePatchBuilder`] - Tiles one outer patch
//! - [`MultiPatchBuilder`] - Broadcasts configuration over a multipatch and
//!   concatenates the per-patch results
//! - [`Microstructure`] - One configuration surface picking the right builder
//! - [`broadcast()`] - Resolves shared vs per-patch configuration values
//!
//! # Tiles
//!
//! A [`Microtile`] is either a fixed collection of unit-cube patches or a
//! [`TileGenerator`]. Generators may declare evaluation points and a
//! parameter count; a [`ParametrizationFunction`] then supplies tile
//! parameters per cell, and a [`ParameterSensitivityFunction`] their
//! derivatives with respect to design variables. Reference generators live in
//! [`tiles`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use microstructure::tiles::CenterBox;
//! use microstructure::{
//!     CreateOptions, Microstructure, Microtile, ParametrizationFunction, PatchValue, Tiling,
//! };
//! use nalgebra::DMatrix;
//! use spline_types::{BezierPatch, Multipatch};
//!
//! let mut multipatch = Multipatch::new();
//! multipatch.push(BezierPatch::axis_aligned_box(&[0.0, 0.0], &[1.0, 1.0]).unwrap());
//! multipatch.push(BezierPatch::axis_aligned_box(&[1.0, 0.0], &[2.0, 1.0]).unwrap());
//!
//! // Thicker blocks towards the top of each patch
//! let thickness = ParametrizationFunction::new(|points: &DMatrix<f64>| {
//!     DMatrix::from_fn(points.nrows(), 1, |i, _| 0.1 + 0.2 * points[(i, 1)])
//! });
//!
//! let mut microstructure = Microstructure::new();
//! microstructure.set_deformation_function(multipatch).unwrap();
//! microstructure.set_tiling(Tiling::Count(2)).unwrap();
//! microstructure.set_microtile(Microtile::generator(CenterBox::new(2))).unwrap();
//! microstructure
//!     .set_parametrization_function(Some(PatchValue::Shared(thickness)))
//!     .unwrap();
//!
//! let result = microstructure.create(&CreateOptions::default()).unwrap().unwrap();
//! assert_eq!(result.len(), 8);
//! ```
//!
//! # Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration types

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::return_self_not_must_use,
    clippy::too_many_lines
)]

pub mod broadcast;
mod error;
mod function;
mod microstructure;
mod multi_patch;
mod options;
mod result;
mod single_patch;
mod tile;
mod tiling;
pub mod tiles;

pub use broadcast::{
    broadcast, try_broadcast, AmbiguityWarning, Broadcast, Broadcasted, PatchValue,
};
pub use error::MicrostructureError;
pub use function::{ParameterSensitivityFunction, ParametrizationFunction, SensitivityTensor};
pub use microstructure::{DeformationFunction, Microstructure};
pub use multi_patch::MultiPatchBuilder;
pub use options::{CreateOptions, PatchOptions};
pub use result::{MicrostructureResult, SensitivityField, SensitivitySource};
pub use single_patch::SinglePatchBuilder;
pub use tile::{Closure, ClosingFace, Microtile, Side, Tile, TileGenerator, TileOptions};
pub use tiling::Tiling;

/// Result type for microstructure operations.
pub type Result<T> = std::result::Result<T, MicrostructureError>;
