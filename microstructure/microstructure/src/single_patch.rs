//! Microstructure generation inside one outer patch.

use std::sync::Arc;

use nalgebra::DMatrix;
use rayon::prelude::*;
use spline_types::{BezierPatch, ParametricBox, Spline};
use tracing::{debug, info};

use crate::function::{ParameterSensitivityFunction, ParametrizationFunction, SensitivityTensor};
use crate::options::PatchOptions;
use crate::result::{MicrostructureResult, SensitivityField, SensitivitySource};
use crate::tile::{Closure, Microtile, Tile, TileGenerator};
use crate::tiling::{insertion_knots, Tiling};
use crate::{MicrostructureError, Result};

/// Builds the microstructure of a single outer patch.
///
/// The outer patch's parametric domain is split into a grid of cells, one
/// microtile is generated per cell in the unit cube, placed into its cell and
/// composed with the outer patch.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use microstructure::{PatchOptions, SinglePatchBuilder, Tiling};
/// use spline_types::BezierPatch;
///
/// let outer = BezierPatch::axis_aligned_box(&[0.0, 0.0], &[4.0, 2.0]).unwrap();
/// let tile = BezierPatch::axis_aligned_box(&[0.25, 0.25], &[0.75, 0.75]).unwrap();
///
/// let mut builder = SinglePatchBuilder::new()
///     .with_deformation_function(Arc::new(outer))
///     .with_tiling(Tiling::from([2, 1]))
///     .with_microtile(tile);
///
/// let result = builder.create(&PatchOptions::default()).unwrap().unwrap();
/// assert_eq!(result.len(), 2);
/// assert!(result.fields.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SinglePatchBuilder {
    deformation_function: Option<Arc<dyn Spline>>,
    tiling: Option<Tiling>,
    microtile: Option<Microtile>,
    parametrization_function: Option<ParametrizationFunction>,
    parameter_sensitivity_function: Option<ParameterSensitivityFunction>,
    saved: Option<MicrostructureResult>,
}

impl SinglePatchBuilder {
    /// Creates an unconfigured builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outer patch.
    #[must_use]
    pub fn with_deformation_function(mut self, patch: Arc<dyn Spline>) -> Self {
        self.set_deformation_function(patch);
        self
    }

    /// Sets the tiling.
    #[must_use]
    pub fn with_tiling(mut self, tiling: impl Into<Tiling>) -> Self {
        self.set_tiling(tiling);
        self
    }

    /// Sets the microtile.
    #[must_use]
    pub fn with_microtile(mut self, microtile: impl Into<Microtile>) -> Self {
        self.set_microtile(microtile);
        self
    }

    /// Sets the parametrization function.
    #[must_use]
    pub fn with_parametrization_function(mut self, function: ParametrizationFunction) -> Self {
        self.set_parametrization_function(Some(function));
        self
    }

    /// Sets the parameter sensitivity function.
    #[must_use]
    pub fn with_parameter_sensitivity_function(
        mut self,
        function: ParameterSensitivityFunction,
    ) -> Self {
        self.set_parameter_sensitivity_function(Some(function));
        self
    }

    /// Builder for one patch of a multipatch, configured without logging.
    pub(crate) fn from_parts(
        patch: Arc<dyn Spline>,
        tiling: Option<Tiling>,
        microtile: Option<Microtile>,
        parametrization_function: Option<ParametrizationFunction>,
        parameter_sensitivity_function: Option<ParameterSensitivityFunction>,
    ) -> Self {
        Self {
            deformation_function: Some(patch),
            tiling,
            microtile,
            parametrization_function,
            parameter_sensitivity_function,
            saved: None,
        }
    }

    /// Sets the outer patch.
    pub fn set_deformation_function(&mut self, patch: Arc<dyn Spline>) {
        debug!(
            para_dim = patch.para_dim(),
            dim = patch.dim(),
            control_points = patch.control_point_count(),
            "Set deformation function"
        );
        self.deformation_function = Some(patch);
    }

    /// Sets the tiling.
    pub fn set_tiling(&mut self, tiling: impl Into<Tiling>) {
        let tiling = tiling.into();
        debug!(?tiling, "Set tiling");
        self.tiling = Some(tiling);
    }

    /// Sets the microtile.
    pub fn set_microtile(&mut self, microtile: impl Into<Microtile>) {
        self.microtile = Some(microtile.into());
        debug!("Set microtile");
    }

    /// Sets or clears the parametrization function.
    pub fn set_parametrization_function(&mut self, function: Option<ParametrizationFunction>) {
        debug!(present = function.is_some(), "Set parametrization function");
        self.parametrization_function = function;
    }

    /// Sets or clears the parameter sensitivity function.
    pub fn set_parameter_sensitivity_function(
        &mut self,
        function: Option<ParameterSensitivityFunction>,
    ) {
        debug!(
            present = function.is_some(),
            "Set parameter sensitivity function"
        );
        self.parameter_sensitivity_function = function;
    }

    /// The outer patch.
    #[must_use]
    pub fn deformation_function(&self) -> Option<&Arc<dyn Spline>> {
        self.deformation_function.as_ref()
    }

    /// The tiling.
    #[must_use]
    pub fn tiling(&self) -> Option<&Tiling> {
        self.tiling.as_ref()
    }

    /// The microtile.
    #[must_use]
    pub fn microtile(&self) -> Option<&Microtile> {
        self.microtile.as_ref()
    }

    /// The parametrization function.
    #[must_use]
    pub fn parametrization_function(&self) -> Option<&ParametrizationFunction> {
        self.parametrization_function.as_ref()
    }

    /// The parameter sensitivity function.
    #[must_use]
    pub fn parameter_sensitivity_function(&self) -> Option<&ParameterSensitivityFunction> {
        self.parameter_sensitivity_function.as_ref()
    }

    /// Result of the last successful [`Self::create`].
    #[must_use]
    pub fn saved(&self) -> Option<&MicrostructureResult> {
        self.saved.as_ref()
    }

    /// Build the microstructure.
    ///
    /// Returns `Ok(None)` if the outer patch, tiling or microtile is missing.
    /// The result is also kept as [`Self::saved`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for inconsistent inputs (tiling or
    /// microtile not matching the patch, unsupported closing, missing
    /// evaluation points, wrongly shaped function output) and propagates
    /// spline kernel errors.
    pub fn create(&mut self, options: &PatchOptions) -> Result<Option<MicrostructureResult>> {
        let (Some(patch), Some(tiling), Some(microtile)) = (
            self.deformation_function.as_ref(),
            self.tiling.as_ref(),
            self.microtile.as_ref(),
        ) else {
            info!(
                deformation_function = self.deformation_function.is_some(),
                tiling = self.tiling.is_some(),
                microtile = self.microtile.is_some(),
                "Insufficient configuration, no microstructure created"
            );
            return Ok(None);
        };

        let result = CellPlan::new(
            patch.as_ref(),
            tiling,
            microtile,
            self.parametrization_function.as_ref(),
            self.parameter_sensitivity_function.as_ref(),
            options,
        )?
        .run(options.parallel)?;

        self.saved = Some(result.clone());
        Ok(Some(result))
    }
}

/// Parameter evaluation setup shared by all cells.
struct Parametrization<'a> {
    function: &'a ParametrizationFunction,
    evaluation_points: DMatrix<f64>,
    tile_para_dim: usize,
    sensitivity: Option<(&'a ParameterSensitivityFunction, usize)>,
}

/// Everything needed to build each cell independently.
struct CellPlan<'a> {
    patch: &'a dyn Spline,
    microtile: &'a Microtile,
    options: &'a PatchOptions,
    parametrization: Option<Parametrization<'a>>,
    /// Cell boundaries per axis.
    grid: Vec<Vec<f64>>,
    macro_sensitivities: bool,
}

/// Output of a single cell.
struct CellOutput {
    patches: Vec<BezierPatch>,
    /// `[tile patch][outer control point coordinate]`
    macro_derivatives: Vec<Vec<BezierPatch>>,
    /// `[design variable][tile patch]`
    parameter_derivatives: Vec<Vec<BezierPatch>>,
}

impl<'a> CellPlan<'a> {
    fn new(
        patch: &'a dyn Spline,
        tiling: &Tiling,
        microtile: &'a Microtile,
        parametrization_function: Option<&'a ParametrizationFunction>,
        parameter_sensitivity_function: Option<&'a ParameterSensitivityFunction>,
        options: &'a PatchOptions,
    ) -> Result<Self> {
        let para_dim = patch.para_dim();
        options.validate(para_dim)?;

        let counts = tiling.resolve(para_dim)?;

        let tile_dim = microtile.dim()?;
        if tile_dim != para_dim {
            return Err(MicrostructureError::invalid_microtile(format!(
                "microtile dimension {tile_dim} does not match parametric dimension {para_dim}"
            )));
        }

        if let Some(face) = options.closing_face {
            let supported = matches!(microtile, Microtile::Generator(g) if g.supports_closing());
            if !supported {
                return Err(MicrostructureError::ClosingUnsupported {
                    face: face.to_string(),
                });
            }
        }

        let parametrization = match (parametrization_function, parameter_sensitivity_function) {
            (None, Some(_)) => return Err(MicrostructureError::SensitivityWithoutParametrization),
            (None, None) => None,
            (Some(function), sensitivity) => Some(Parametrization::new(
                patch,
                microtile,
                function,
                sensitivity,
            )?),
        };

        let grid = refined_grid(patch, &counts, options.knot_span_wise())?;
        let macro_sensitivities = options.macro_sensitivities();

        Ok(Self {
            patch,
            microtile,
            options,
            parametrization,
            grid,
            macro_sensitivities,
        })
    }

    fn cell_counts(&self) -> Vec<usize> {
        self.grid.iter().map(|knots| knots.len() - 1).collect()
    }

    fn run(&self, parallel: bool) -> Result<MicrostructureResult> {
        let cell_counts = self.cell_counts();
        let total: usize = cell_counts.iter().product();

        info!(
            cells = total,
            para_dim = self.patch.para_dim(),
            macro_sensitivities = self.macro_sensitivities,
            parametrized = self.parametrization.is_some(),
            "Building single-patch microstructure"
        );

        let cells: Vec<CellOutput> = if parallel {
            (0..total)
                .into_par_iter()
                .map(|index| self.build_cell(index, &cell_counts))
                .collect::<Result<_>>()?
        } else {
            (0..total)
                .map(|index| self.build_cell(index, &cell_counts))
                .collect::<Result<_>>()?
        };

        let result = self.assemble(cells);

        info!(
            patches = result.len(),
            fields = result.fields.len(),
            "Single-patch microstructure complete"
        );

        Ok(result)
    }

    fn build_cell(&self, index: usize, cell_counts: &[usize]) -> Result<CellOutput> {
        let position = cell_position(index, cell_counts);
        let (lower, upper) = position
            .iter()
            .zip(&self.grid)
            .map(|(&i, knots)| (knots[i], knots[i + 1]))
            .unzip();
        let cell = ParametricBox::new(lower, upper)?;

        let (parameters, sensitivities) = match &self.parametrization {
            Some(parametrization) => parametrization.evaluate(&cell)?,
            None => (None, None),
        };

        let closure = self.options.closing_face.and_then(|face| {
            let axis = face.axis();
            if position[axis] == 0 {
                Some(Closure::min(face))
            } else if position[axis] + 1 == cell_counts[axis] {
                Some(Closure::max(face))
            } else {
                None
            }
        });

        let tile = match self.microtile {
            Microtile::Patches(patches) => Tile::new(patches.clone()),
            Microtile::Generator(generator) => generate(
                generator.as_ref(),
                parameters.as_ref(),
                sensitivities.as_ref(),
                closure,
                self.options,
            )?,
            Microtile::PerPatch(_) => {
                return Err(MicrostructureError::invalid_microtile(
                    "per-patch microtile cannot be applied to a single patch",
                ))
            }
        };

        self.compose_tile(tile, &cell)
    }

    fn compose_tile(&self, tile: Tile, cell: &ParametricBox) -> Result<CellOutput> {
        let para_dim = self.patch.para_dim();
        if let Some(patch) = tile.patches.iter().find(|p| p.dim() != para_dim) {
            return Err(MicrostructureError::shape_mismatch(
                "tile patch dimension",
                &[para_dim],
                &[patch.dim()],
            ));
        }

        let placed = tile
            .patches
            .iter()
            .map(|p| p.placed(cell))
            .collect::<spline_types::Result<Vec<_>>>()?;

        let patches = placed
            .iter()
            .map(|p| self.patch.compose(p))
            .collect::<spline_types::Result<Vec<_>>>()?;

        let macro_derivatives = if self.macro_sensitivities {
            placed
                .iter()
                .map(|p| self.patch.composition_sensitivities(p))
                .collect::<spline_types::Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let design_variables = self
            .parametrization
            .as_ref()
            .and_then(|p| p.sensitivity)
            .map_or(0, |(_, n)| n);
        let parameter_derivatives = if design_variables > 0 {
            let derivatives = tile.sensitivities.unwrap_or_default();
            let actual = [
                derivatives.len(),
                derivatives.first().map_or(0, Vec::len),
            ];
            let consistent = derivatives.len() == design_variables
                && derivatives.iter().all(|d| d.len() == placed.len());
            if !consistent {
                return Err(MicrostructureError::shape_mismatch(
                    "tile sensitivities",
                    &[design_variables, placed.len()],
                    &actual,
                ));
            }

            let extents = cell.extents();
            derivatives
                .iter()
                .map(|per_patch| {
                    per_patch
                        .iter()
                        .zip(&placed)
                        .map(|(derivative, inner)| {
                            let derivative = derivative.scaled(&extents)?;
                            self.patch.composition_derivative(inner, &derivative)
                        })
                        .collect::<spline_types::Result<Vec<_>>>()
                })
                .collect::<spline_types::Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(CellOutput {
            patches,
            macro_derivatives,
            parameter_derivatives,
        })
    }

    fn assemble(&self, cells: Vec<CellOutput>) -> MicrostructureResult {
        let total: usize = cells.iter().map(|c| c.patches.len()).sum();
        let dim = self.patch.dim();

        let macro_count = if self.macro_sensitivities {
            self.patch.control_point_count() * dim
        } else {
            0
        };
        let parameter_count = self
            .parametrization
            .as_ref()
            .and_then(|p| p.sensitivity)
            .map_or(0, |(_, n)| n);

        let mut patches = Vec::with_capacity(total);
        let mut macro_entries = vec![Vec::with_capacity(total); macro_count];
        let mut parameter_entries = vec![Vec::with_capacity(total); parameter_count];

        for cell in cells {
            patches.extend(cell.patches);
            for per_patch in cell.macro_derivatives {
                for (entries, derivative) in macro_entries.iter_mut().zip(per_patch) {
                    entries.push(Some(derivative));
                }
            }
            for (entries, derivatives) in parameter_entries.iter_mut().zip(cell.parameter_derivatives) {
                entries.extend(derivatives.into_iter().map(Some));
            }
        }

        let macro_fields = macro_entries
            .into_iter()
            .enumerate()
            .map(|(m, entries)| SensitivityField {
                patch: 0,
                source: SensitivitySource::Macro {
                    control_point: m / dim,
                    coordinate: m % dim,
                },
                entries,
            });
        let parameter_fields =
            parameter_entries
                .into_iter()
                .enumerate()
                .map(|(index, entries)| SensitivityField {
                    patch: 0,
                    source: SensitivitySource::Parameter { index },
                    entries,
                });

        MicrostructureResult {
            patches,
            fields: macro_fields.chain(parameter_fields).collect(),
        }
    }
}

impl<'a> Parametrization<'a> {
    fn new(
        patch: &dyn Spline,
        microtile: &Microtile,
        function: &'a ParametrizationFunction,
        sensitivity: Option<&'a ParameterSensitivityFunction>,
    ) -> Result<Self> {
        let Microtile::Generator(generator) = microtile else {
            return Err(MicrostructureError::ParametrizationUnsupported);
        };
        let (Some(evaluation_points), Some(tile_para_dim)) =
            (generator.evaluation_points(), generator.para_dim())
        else {
            return Err(MicrostructureError::ParametrizationUnsupported);
        };

        let para_dim = patch.para_dim();
        if evaluation_points.ncols() != para_dim {
            return Err(MicrostructureError::shape_mismatch(
                "evaluation points",
                &[evaluation_points.nrows(), para_dim],
                &[evaluation_points.nrows(), evaluation_points.ncols()],
            ));
        }

        let sensitivity = sensitivity.map(|s| {
            let center: Vec<f64> = patch
                .parametric_bounds()
                .iter()
                .map(|[lo, hi]| 0.5 * (lo + hi))
                .collect();
            let center = DMatrix::from_row_slice(1, para_dim, &center);
            let design_variables = s.evaluate(&center).design_variable_count();
            debug!(design_variables, "Sampled parameter sensitivity function");
            (s, design_variables)
        });

        Ok(Self {
            function,
            evaluation_points,
            tile_para_dim,
            sensitivity,
        })
    }

    /// Evaluate parameters (and their sensitivities) at the evaluation points
    /// mapped into `cell`.
    fn evaluate(
        &self,
        cell: &ParametricBox,
    ) -> Result<(Option<DMatrix<f64>>, Option<SensitivityTensor>)> {
        let n_points = self.evaluation_points.nrows();
        let para_dim = self.evaluation_points.ncols();

        let mut points = DMatrix::zeros(n_points, para_dim);
        for i in 0..n_points {
            let unit: Vec<f64> = self.evaluation_points.row(i).iter().copied().collect();
            let mapped = cell.map_from_unit(&unit)?;
            for (a, value) in mapped.into_iter().enumerate() {
                points[(i, a)] = value;
            }
        }

        let parameters = self.function.evaluate(&points);
        if parameters.shape() != (n_points, self.tile_para_dim) {
            return Err(MicrostructureError::shape_mismatch(
                "parametrization function output",
                &[n_points, self.tile_para_dim],
                &[parameters.nrows(), parameters.ncols()],
            ));
        }

        let sensitivities = match self.sensitivity {
            Some((function, design_variables)) => {
                let tensor = function.evaluate(&points);
                let expected = [n_points, self.tile_para_dim, design_variables];
                if tensor.shape() != expected {
                    return Err(MicrostructureError::shape_mismatch(
                        "parameter sensitivity function output",
                        &expected,
                        &tensor.shape(),
                    ));
                }
                Some(tensor)
            }
            None => None,
        };

        Ok((Some(parameters), sensitivities))
    }
}

fn generate(
    generator: &dyn TileGenerator,
    parameters: Option<&DMatrix<f64>>,
    sensitivities: Option<&SensitivityTensor>,
    closure: Option<Closure>,
    options: &PatchOptions,
) -> Result<Tile> {
    match closure {
        Some(closure) => {
            generator.closing_tile(parameters, sensitivities, closure, &options.tile_options)
        }
        None => generator.create_tile(parameters, sensitivities, &options.tile_options),
    }
}

/// Insert tiling knots into `patch` and return the resulting cell boundaries
/// per axis.
fn refined_grid(patch: &dyn Spline, counts: &[usize], knot_span_wise: bool) -> Result<Vec<Vec<f64>>> {
    let unique_knots = patch.unique_knots();
    let mut refined: Option<Box<dyn Spline>> = None;

    for (axis, (&tiles, knots)) in counts.iter().zip(&unique_knots).enumerate() {
        let new_knots = insertion_knots(knots, tiles, knot_span_wise);
        if new_knots.is_empty() {
            continue;
        }
        debug!(axis, tiles, knots = new_knots.len(), "Inserting tiling knots");
        let current = refined.as_deref().unwrap_or(patch);
        refined = Some(current.insert_knots(axis, &new_knots)?);
    }

    Ok(refined.map_or(unique_knots, |spline| spline.unique_knots()))
}

/// Per-axis position of cell `index`, first axis fastest.
fn cell_position(mut index: usize, cell_counts: &[usize]) -> Vec<usize> {
    cell_counts
        .iter()
        .map(|&count| {
            let position = index % count;
            index /= count;
            position
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::tiles::{CenterBox, Solid};
    use crate::ClosingFace;
    use approx::assert_relative_eq;
    use nalgebra::DVector;
    use spline_types::BSplinePatch;

    fn square(size: f64) -> Arc<dyn Spline> {
        Arc::new(BezierPatch::axis_aligned_box(&[0.0, 0.0], &[size, size]).unwrap())
    }

    #[test]
    fn test_incomplete_configuration_returns_none() {
        let mut builder = SinglePatchBuilder::new().with_tiling(Tiling::Count(2));
        assert!(builder.create(&PatchOptions::default()).unwrap().is_none());
        assert!(builder.saved().is_none());
    }

    #[test]
    fn test_cell_order_first_axis_fastest() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(2.0))
            .with_tiling([2, 2])
            .with_microtile(Microtile::generator(Solid::new(2)));

        let result = builder.create(&PatchOptions::default()).unwrap().unwrap();
        assert_eq!(result.len(), 4);

        let origins: Vec<Vec<f64>> = result
            .patches
            .iter()
            .map(|p| p.control_points()[0].iter().copied().collect())
            .collect();
        assert_eq!(
            origins,
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]
        );
        assert_eq!(builder.saved(), Some(&result));
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(1.0))
            .with_tiling(Tiling::Count(3))
            .with_microtile(Microtile::generator(CenterBox::new(2)));

        let parallel = builder.create(&PatchOptions::default()).unwrap().unwrap();
        let sequential = builder
            .create(&PatchOptions::default().with_parallel(false))
            .unwrap()
            .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_knot_span_wise_and_absolute_tiling() {
        let outer: Arc<dyn Spline> = Arc::new(
            BSplinePatch::new(
                vec![1],
                vec![vec![0.0, 0.0, 0.5, 1.0, 1.0]],
                vec![
                    DVector::from_vec(vec![0.0]),
                    DVector::from_vec(vec![1.0]),
                    DVector::from_vec(vec![3.0]),
                ],
            )
            .unwrap(),
        );
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(outer)
            .with_tiling(Tiling::Count(2))
            .with_microtile(BezierPatch::unit_cube(1).unwrap());

        let span_wise = builder.create(&PatchOptions::default()).unwrap().unwrap();
        assert_eq!(span_wise.len(), 4);

        let absolute = builder
            .create(&PatchOptions::default().with_knot_span_wise(false))
            .unwrap()
            .unwrap();
        assert_eq!(absolute.len(), 2);
        assert_relative_eq!(absolute.patches[1].control_points()[0][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(absolute.patches[1].control_points()[1][0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tiles_follow_a_curved_outer_patch() {
        // x(u) = u²
        let outer: Arc<dyn Spline> = Arc::new(
            BezierPatch::new(
                vec![2],
                vec![
                    DVector::from_vec(vec![0.0]),
                    DVector::from_vec(vec![0.0]),
                    DVector::from_vec(vec![1.0]),
                ],
            )
            .unwrap(),
        );
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(outer)
            .with_tiling(Tiling::Count(2))
            .with_microtile(Microtile::generator(Solid::new(1)));

        let result = builder.create(&PatchOptions::default()).unwrap().unwrap();
        assert_eq!(result.len(), 2);
        let first = result.patches[0].evaluate(&[0.5]).unwrap();
        let second = result.patches[1].evaluate(&[0.5]).unwrap();
        assert_relative_eq!(first[0], 0.0625, epsilon = 1e-12);
        assert_relative_eq!(second[0], 0.5625, epsilon = 1e-12);
    }

    #[test]
    fn test_closing_layers() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(1.0))
            .with_tiling([1, 3])
            .with_microtile(Microtile::generator(Solid::new(2)));

        let result = builder
            .create(&PatchOptions::new().with_closing_face(ClosingFace::Y))
            .unwrap()
            .unwrap();
        assert_eq!(result.len(), 3);

        let err = builder
            .create(&PatchOptions::new().with_closing_face(ClosingFace::Z))
            .unwrap_err();
        assert!(matches!(err, MicrostructureError::ClosingFaceOutOfRange { .. }));
    }

    #[test]
    fn test_closing_requires_support() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(1.0))
            .with_tiling(Tiling::Count(2))
            .with_microtile(Microtile::generator(CenterBox::new(2)));

        let err = builder
            .create(&PatchOptions::new().with_closing_face(ClosingFace::X))
            .unwrap_err();
        assert!(matches!(err, MicrostructureError::ClosingUnsupported { ref face } if face == "x"));
    }

    #[test]
    fn test_macro_sensitivity_fields() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(1.0))
            .with_tiling(Tiling::Count(2))
            .with_microtile(Microtile::generator(Solid::new(2)));

        let result = builder
            .create(&PatchOptions::new().with_macro_sensitivities(true))
            .unwrap()
            .unwrap();

        // 4 control points with 2 coordinates each
        assert_eq!(result.fields.len(), 8);
        for field in &result.fields {
            assert_eq!(field.entries.len(), 4);
            assert!(field.entries.iter().all(Option::is_some));
        }
        assert_eq!(
            result.fields[3].source,
            SensitivitySource::Macro {
                control_point: 1,
                coordinate: 1
            }
        );
    }

    #[test]
    fn test_parametrization_requires_evaluation_points() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(1.0))
            .with_tiling(Tiling::Count(2))
            .with_microtile(Microtile::generator(Solid::new(2)))
            .with_parametrization_function(ParametrizationFunction::new(|x: &DMatrix<f64>| {
                x.clone()
            }));

        let err = builder.create(&PatchOptions::default()).unwrap_err();
        assert!(matches!(err, MicrostructureError::ParametrizationUnsupported));
    }

    #[test]
    fn test_sensitivity_requires_parametrization() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(1.0))
            .with_tiling(Tiling::Count(2))
            .with_microtile(Microtile::generator(CenterBox::new(2)))
            .with_parameter_sensitivity_function(ParameterSensitivityFunction::new(
                |x: &DMatrix<f64>| SensitivityTensor::zeros([x.nrows(), 1, 1]),
            ));

        let err = builder.create(&PatchOptions::default()).unwrap_err();
        assert!(matches!(err, MicrostructureError::SensitivityWithoutParametrization));
    }

    #[test]
    fn test_parametrization_output_shape_is_checked() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(1.0))
            .with_tiling(Tiling::Count(2))
            .with_microtile(Microtile::generator(CenterBox::new(2)))
            .with_parametrization_function(ParametrizationFunction::new(|x: &DMatrix<f64>| {
                DMatrix::zeros(x.nrows(), 2)
            }));

        let err = builder.create(&PatchOptions::default()).unwrap_err();
        assert!(matches!(err, MicrostructureError::ShapeMismatch { .. }));
    }

    /// Parametrization returning a fixed half-width while recording the
    /// points it is evaluated at.
    fn recording_width(seen: &Arc<Mutex<Vec<(f64, f64)>>>) -> ParametrizationFunction {
        let seen = Arc::clone(seen);
        ParametrizationFunction::new(move |x: &DMatrix<f64>| {
            seen.lock()
                .unwrap()
                .extend(x.row_iter().map(|row| (row[0], row[1])));
            DMatrix::from_element(x.nrows(), 1, 0.2)
        })
    }

    #[test]
    fn test_parametrization_sees_cell_centers_in_the_outer_frame() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(4.0))
            .with_tiling([2, 1])
            .with_microtile(Microtile::generator(CenterBox::new(2)))
            .with_parametrization_function(recording_width(&seen));

        builder
            .create(&PatchOptions::default().with_parallel(false))
            .unwrap()
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(0.25, 0.5), (0.75, 0.5)]);

        // parametric, not physical, coordinates of a B-spline on [0, 2] × [0, 1]
        let stretched: Arc<dyn Spline> = Arc::new(
            BSplinePatch::new(
                vec![1, 1],
                vec![vec![0.0, 0.0, 2.0, 2.0], vec![0.0, 0.0, 1.0, 1.0]],
                vec![
                    DVector::from_vec(vec![0.0, 0.0]),
                    DVector::from_vec(vec![8.0, 0.0]),
                    DVector::from_vec(vec![0.0, 3.0]),
                    DVector::from_vec(vec![8.0, 3.0]),
                ],
            )
            .unwrap(),
        );
        seen.lock().unwrap().clear();
        builder.set_deformation_function(stretched);
        builder
            .create(&PatchOptions::default().with_parallel(false))
            .unwrap()
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(0.5, 0.5), (1.5, 0.5)]);
    }

    #[test]
    fn test_parameter_sensitivities_scale_with_cell() {
        let mut builder = SinglePatchBuilder::new()
            .with_deformation_function(square(4.0))
            .with_tiling(Tiling::Count(2))
            .with_microtile(Microtile::generator(CenterBox::new(2)))
            .with_parametrization_function(ParametrizationFunction::new(|x: &DMatrix<f64>| {
                DMatrix::from_element(x.nrows(), 1, 0.25)
            }))
            .with_parameter_sensitivity_function(ParameterSensitivityFunction::new(
                |x: &DMatrix<f64>| SensitivityTensor::from_fn([x.nrows(), 1, 1], |_, _, _| 1.0),
            ));

        let result = builder.create(&PatchOptions::default()).unwrap().unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].source, SensitivitySource::Parameter { index: 0 });

        // Half-width 0.25 of a 0.5 cell in parameter space, physical scale 4
        let first = &result.patches[0];
        assert_relative_eq!(first.control_points()[0][0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(first.control_points()[3][0], 1.5, epsilon = 1e-12);

        // d(corner)/d(half-width) = ∓ cell extent × outer scale
        let derivative = result.fields[0].entries[0].as_ref().unwrap();
        assert_relative_eq!(derivative.control_points()[0][0], -2.0, epsilon = 1e-12);
        assert_relative_eq!(derivative.control_points()[3][1], 2.0, epsilon = 1e-12);
    }
}
