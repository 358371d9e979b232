//! A parametrized block centred in its cell.

use nalgebra::DMatrix;
use spline_types::BezierPatch;

use crate::function::SensitivityTensor;
use crate::tile::{Tile, TileGenerator, TileOptions};
use crate::{MicrostructureError, Result};

/// Half-width used when no parameters are given.
pub const DEFAULT_HALF_WIDTH: f64 = 0.25;

/// Tile option overriding [`DEFAULT_HALF_WIDTH`] for unparametrized builds.
pub const HALF_WIDTH_OPTION: &str = "half_width";

/// Axis-aligned block `[0.5 - w, 0.5 + w]^dim` in the unit cube.
///
/// The single parameter `w` (the half-width) is evaluated at the cell centre.
/// Sensitivities are exact: moving `w` moves every lower corner coordinate by
/// `-1` and every upper corner coordinate by `+1`.
///
/// # Example
///
/// ```
/// use microstructure::tiles::CenterBox;
/// use microstructure::{TileGenerator, TileOptions};
/// use nalgebra::DMatrix;
///
/// let tile = CenterBox::new(2)
///     .create_tile(Some(&DMatrix::from_element(1, 1, 0.1)), None, &TileOptions::new())
///     .unwrap();
/// let corner = &tile.patches[0].control_points()[0];
/// assert!((corner[0] - 0.4).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterBox {
    dim: usize,
}

impl CenterBox {
    /// Center box of dimension `dim`.
    #[must_use]
    pub const fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn half_width(parameters: Option<&DMatrix<f64>>, options: &TileOptions) -> Result<f64> {
        let width = match parameters {
            Some(parameters) if parameters.nrows() >= 1 && parameters.ncols() >= 1 => {
                parameters[(0, 0)]
            }
            Some(parameters) => {
                return Err(MicrostructureError::shape_mismatch(
                    "center box parameters",
                    &[1, 1],
                    &[parameters.nrows(), parameters.ncols()],
                ))
            }
            None => options
                .get(HALF_WIDTH_OPTION)
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(DEFAULT_HALF_WIDTH),
        };

        if width > 0.0 && width <= 0.5 {
            Ok(width)
        } else {
            Err(MicrostructureError::tile_generation(format!(
                "center box half-width must be in (0, 0.5], got {width}"
            )))
        }
    }
}

impl TileGenerator for CenterBox {
    fn dim(&self) -> usize {
        self.dim
    }

    fn para_dim(&self) -> Option<usize> {
        Some(1)
    }

    fn evaluation_points(&self) -> Option<DMatrix<f64>> {
        Some(DMatrix::from_element(1, self.dim, 0.5))
    }

    fn create_tile(
        &self,
        parameters: Option<&DMatrix<f64>>,
        sensitivities: Option<&SensitivityTensor>,
        options: &TileOptions,
    ) -> Result<Tile> {
        let w = Self::half_width(parameters, options)?;
        let patch =
            BezierPatch::axis_aligned_box(&vec![0.5 - w; self.dim], &vec![0.5 + w; self.dim])?;

        let Some(sensitivities) = sensitivities else {
            return Ok(Tile::new(vec![patch]));
        };

        let derivatives = (0..sensitivities.design_variable_count())
            .map(|k| {
                let dw = sensitivities.slice(k).get((0, 0)).copied().unwrap_or(0.0);
                BezierPatch::axis_aligned_box(&vec![-dw; self.dim], &vec![dw; self.dim])
                    .map(|d| vec![d])
            })
            .collect::<spline_types::Result<Vec<_>>>()?;

        Ok(Tile::new(vec![patch]).with_sensitivities(derivatives))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{Closure, ClosingFace};
    use approx::assert_relative_eq;

    #[test]
    fn test_center_box_geometry() {
        let generator = CenterBox::new(3);
        assert_eq!(generator.para_dim(), Some(1));
        assert_eq!(generator.evaluation_points().unwrap().shape(), (1, 3));

        let params = DMatrix::from_element(1, 1, 0.2);
        let tile = generator
            .create_tile(Some(&params), None, &TileOptions::new())
            .unwrap();
        let cps = tile.patches[0].control_points();
        assert_eq!(cps.len(), 8);
        assert_relative_eq!(cps[0][2], 0.3, epsilon = 1e-12);
        assert_relative_eq!(cps[7][1], 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_center_box_option_and_validation() {
        let generator = CenterBox::new(2);
        let mut options = TileOptions::new();
        options.insert(HALF_WIDTH_OPTION.to_string(), serde_json::json!(0.5));
        let tile = generator.create_tile(None, None, &options).unwrap();
        assert_relative_eq!(tile.patches[0].control_points()[0][0], 0.0);

        let too_wide = DMatrix::from_element(1, 1, 0.6);
        let err = generator
            .create_tile(Some(&too_wide), None, &TileOptions::new())
            .unwrap_err();
        assert!(matches!(err, MicrostructureError::TileGeneration { .. }));
    }

    #[test]
    fn test_center_box_sensitivities() {
        let generator = CenterBox::new(2);
        let params = DMatrix::from_element(1, 1, 0.1);
        let tensor = SensitivityTensor::new([1, 1, 2], vec![1.0, 0.5]).unwrap();
        let tile = generator
            .create_tile(Some(&params), Some(&tensor), &TileOptions::new())
            .unwrap();

        let sensitivities = tile.sensitivities.unwrap();
        assert_eq!(sensitivities.len(), 2);
        assert_relative_eq!(sensitivities[1][0].control_points()[0][0], -0.5);
        assert_relative_eq!(sensitivities[1][0].control_points()[3][1], 0.5);
    }

    #[test]
    fn test_center_box_does_not_close() {
        let generator = CenterBox::new(2);
        assert!(!generator.supports_closing());
        let err = generator
            .closing_tile(None, None, Closure::min(ClosingFace::X), &TileOptions::new())
            .unwrap_err();
        assert!(matches!(err, MicrostructureError::ClosingUnsupported { .. }));
    }
}
