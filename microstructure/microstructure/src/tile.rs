//! Microtiles: the building blocks placed into every cell.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nalgebra::DMatrix;
use spline_types::{BezierPatch, Spline};

use crate::broadcast::Broadcast;
use crate::function::SensitivityTensor;
use crate::{MicrostructureError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Free-form options handed through to tile generators unchanged.
pub type TileOptions = hashbrown::HashMap<String, serde_json::Value>;

/// Parametric axis whose two boundary layers of cells are closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ClosingFace {
    /// First parametric axis.
    X,
    /// Second parametric axis.
    Y,
    /// Third parametric axis.
    Z,
}

impl ClosingFace {
    /// Index of the parametric axis.
    #[must_use]
    pub const fn axis(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

impl FromStr for ClosingFace {
    type Err = MicrostructureError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            other => Err(MicrostructureError::InvalidClosingFace(other.to_string())),
        }
    }
}

impl fmt::Display for ClosingFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        })
    }
}

/// Which end of an axis a closing tile seals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    /// Lower parametric bound.
    Min,
    /// Upper parametric bound.
    Max,
}

/// A closing request for one boundary cell, displayed as e.g. `x_min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Closure {
    /// Closed axis.
    pub face: ClosingFace,
    /// Closed end of the axis.
    pub side: Side,
}

impl Closure {
    /// Closure at the lower end of `face`.
    #[must_use]
    pub const fn min(face: ClosingFace) -> Self {
        Self {
            face,
            side: Side::Min,
        }
    }

    /// Closure at the upper end of `face`.
    #[must_use]
    pub const fn max(face: ClosingFace) -> Self {
        Self {
            face,
            side: Side::Max,
        }
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::Min => "min",
            Side::Max => "max",
        };
        write!(f, "{}_{}", self.face, side)
    }
}

/// Geometry produced for one cell, in the unit cube.
#[derive(Debug, Clone, Default)]
pub struct Tile {
    /// Tile patches.
    pub patches: Vec<BezierPatch>,
    /// Derivatives of the patches, `sensitivities[k][j]` being patch `j`
    /// differentiated by design variable `k`.
    pub sensitivities: Option<Vec<Vec<BezierPatch>>>,
}

impl Tile {
    /// Tile without sensitivities.
    #[must_use]
    pub fn new(patches: Vec<BezierPatch>) -> Self {
        Self {
            patches,
            sensitivities: None,
        }
    }

    /// Attach design variable derivatives.
    #[must_use]
    pub fn with_sensitivities(mut self, sensitivities: Vec<Vec<BezierPatch>>) -> Self {
        self.sensitivities = Some(sensitivities);
        self
    }
}

/// A parametrized source of tile geometry.
///
/// Generators build their patches in the unit cube; the engine places and
/// composes them. Parameters arrive as an `n_points × para_dim` array
/// evaluated at [`TileGenerator::evaluation_points`].
pub trait TileGenerator: fmt::Debug + Send + Sync {
    /// Physical dimension of the produced patches.
    fn dim(&self) -> usize;

    /// Number of tile parameters per evaluation point.
    fn para_dim(&self) -> Option<usize> {
        None
    }

    /// Points in the unit cube (rows) at which parameters are evaluated.
    fn evaluation_points(&self) -> Option<DMatrix<f64>> {
        None
    }

    /// Build the tile for one cell.
    fn create_tile(
        &self,
        parameters: Option<&DMatrix<f64>>,
        sensitivities: Option<&SensitivityTensor>,
        options: &TileOptions,
    ) -> Result<Tile>;

    /// Whether [`TileGenerator::closing_tile`] is implemented.
    fn supports_closing(&self) -> bool {
        false
    }

    /// Build a tile that seals the boundary named by `closure`.
    fn closing_tile(
        &self,
        parameters: Option<&DMatrix<f64>>,
        sensitivities: Option<&SensitivityTensor>,
        closure: Closure,
        options: &TileOptions,
    ) -> Result<Tile> {
        let _ = (parameters, sensitivities, options);
        Err(MicrostructureError::ClosingUnsupported {
            face: closure.to_string(),
        })
    }
}

/// The building block tiled into an outer patch.
#[derive(Debug, Clone)]
pub enum Microtile {
    /// A fixed collection of unit-cube patches, reused for every cell.
    Patches(Vec<BezierPatch>),
    /// Pre-expanded microtiles, one per outer patch.
    PerPatch(Vec<Microtile>),
    /// A tile generator.
    Generator(Arc<dyn TileGenerator>),
}

impl Microtile {
    /// Wrap a tile generator.
    pub fn generator(generator: impl TileGenerator + 'static) -> Self {
        Self::Generator(Arc::new(generator))
    }

    /// Physical dimension of the tile geometry.
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::InvalidMicrotile`] for empty or mixed
    /// dimension patch collections and for per-patch lists.
    pub fn dim(&self) -> Result<usize> {
        match self {
            Self::Patches(patches) => {
                let Some(first) = patches.first() else {
                    return Err(MicrostructureError::invalid_microtile(
                        "patch collection is empty",
                    ));
                };
                let dim = first.dim();
                if patches.iter().any(|p| p.dim() != dim) {
                    return Err(MicrostructureError::invalid_microtile(
                        "patches of the collection differ in dimension",
                    ));
                }
                Ok(dim)
            }
            Self::PerPatch(_) => Err(MicrostructureError::invalid_microtile(
                "per-patch microtile cannot be applied to a single patch",
            )),
            Self::Generator(generator) => Ok(generator.dim()),
        }
    }
}

impl Broadcast for Microtile {
    fn entries(&self) -> Option<Vec<Option<Self>>> {
        match self {
            Self::Patches(patches) => Some(
                patches
                    .iter()
                    .map(|p| Some(Self::Patches(vec![p.clone()])))
                    .collect(),
            ),
            Self::PerPatch(tiles) => Some(tiles.iter().cloned().map(Some).collect()),
            Self::Generator(_) => None,
        }
    }

    fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Patches(_))
    }

    fn is_explicit(&self) -> bool {
        matches!(self, Self::PerPatch(_))
    }
}

impl From<Vec<BezierPatch>> for Microtile {
    fn from(patches: Vec<BezierPatch>) -> Self {
        Self::Patches(patches)
    }
}

impl From<BezierPatch> for Microtile {
    fn from(patch: BezierPatch) -> Self {
        Self::Patches(vec![patch])
    }
}

impl From<Arc<dyn TileGenerator>> for Microtile {
    fn from(generator: Arc<dyn TileGenerator>) -> Self {
        Self::Generator(generator)
    }
}
