//! A tile filling its whole cell.

use nalgebra::{DMatrix, DVector};
use spline_types::BezierPatch;

use crate::function::SensitivityTensor;
use crate::tile::{Closure, Tile, TileGenerator, TileOptions};
use crate::{MicrostructureError, Result};

/// Solid unit cell of any parametric dimension.
///
/// The tile is the multilinear identity of the unit cube, so the composed
/// microstructure reproduces the outer patch cell by cell. It has no
/// parameters; closing tiles are the same solid block.
///
/// # Example
///
/// ```
/// use microstructure::tiles::Solid;
/// use microstructure::{TileGenerator, TileOptions};
///
/// let solid = Solid::new(3);
/// let tile = solid.create_tile(None, None, &TileOptions::new()).unwrap();
/// assert_eq!(tile.patches.len(), 1);
/// assert!(solid.supports_closing());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solid {
    dim: usize,
}

impl Solid {
    /// Solid tile of dimension `dim`.
    #[must_use]
    pub const fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn tile(&self, sensitivities: Option<&SensitivityTensor>) -> Result<Tile> {
        let patch = BezierPatch::unit_cube(self.dim)
            .map_err(|e| MicrostructureError::tile_generation(e.to_string()))?;

        let Some(sensitivities) = sensitivities else {
            return Ok(Tile::new(vec![patch]));
        };

        let zero = BezierPatch::new(
            patch.degrees().to_vec(),
            vec![DVector::zeros(self.dim); patch.control_points().len()],
        )?;
        let derivatives = vec![vec![zero]; sensitivities.design_variable_count()];
        Ok(Tile::new(vec![patch]).with_sensitivities(derivatives))
    }
}

impl TileGenerator for Solid {
    fn dim(&self) -> usize {
        self.dim
    }

    fn create_tile(
        &self,
        _parameters: Option<&DMatrix<f64>>,
        sensitivities: Option<&SensitivityTensor>,
        _options: &TileOptions,
    ) -> Result<Tile> {
        self.tile(sensitivities)
    }

    fn supports_closing(&self) -> bool {
        true
    }

    fn closing_tile(
        &self,
        _parameters: Option<&DMatrix<f64>>,
        sensitivities: Option<&SensitivityTensor>,
        _closure: Closure,
        _options: &TileOptions,
    ) -> Result<Tile> {
        self.tile(sensitivities)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ClosingFace;
    use spline_types::Spline;

    #[test]
    fn test_solid_tile() {
        let solid = Solid::new(2);
        assert_eq!(solid.dim(), 2);
        assert!(solid.evaluation_points().is_none());
        assert!(solid.para_dim().is_none());

        let tile = solid.create_tile(None, None, &TileOptions::new()).unwrap();
        assert_eq!(tile.patches, vec![BezierPatch::unit_cube(2).unwrap()]);
        assert!(tile.sensitivities.is_none());
    }

    #[test]
    fn test_solid_closing_and_zero_sensitivities() {
        let solid = Solid::new(3);
        let tensor = SensitivityTensor::zeros([1, 1, 2]);
        let tile = solid
            .closing_tile(
                None,
                Some(&tensor),
                Closure::max(ClosingFace::Z),
                &TileOptions::new(),
            )
            .unwrap();

        let sensitivities = tile.sensitivities.unwrap();
        assert_eq!(sensitivities.len(), 2);
        assert_eq!(sensitivities[0].len(), 1);
        assert!(sensitivities[1][0]
            .control_points()
            .iter()
            .all(|c| c.norm() == 0.0));
        assert_eq!(sensitivities[0][0].dim(), 3);
    }
}
