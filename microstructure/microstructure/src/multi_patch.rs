//! Microstructure generation over every patch of a multipatch.

use std::sync::Arc;

use rayon::prelude::*;
use spline_types::Multipatch;
use tracing::{debug, info, warn};

use crate::broadcast::{broadcast_patch_value, try_broadcast, AmbiguityWarning, PatchValue};
use crate::function::{ParameterSensitivityFunction, ParametrizationFunction};
use crate::options::{CreateOptions, PatchOptions};
use crate::result::{MicrostructureResult, SensitivityField};
use crate::single_patch::SinglePatchBuilder;
use crate::tile::Microtile;
use crate::tiling::Tiling;
use crate::Result;

/// Builds microstructures for all patches of a multipatch.
///
/// Every configuration value is broadcast over the patches, one
/// [`SinglePatchBuilder`] runs per patch, and the results are concatenated in
/// patch order. Sensitivity fields of one patch are padded with `None` over
/// the other patches' geometry.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use microstructure::tiles::Solid;
/// use microstructure::{CreateOptions, Microtile, MultiPatchBuilder, Tiling};
/// use spline_types::{BezierPatch, Multipatch};
///
/// let mut multipatch = Multipatch::new();
/// multipatch.push(BezierPatch::axis_aligned_box(&[0.0, 0.0], &[1.0, 1.0]).unwrap());
/// multipatch.push(BezierPatch::axis_aligned_box(&[1.0, 0.0], &[2.0, 1.0]).unwrap());
///
/// let mut builder = MultiPatchBuilder::new()
///     .with_deformation_function(Arc::new(multipatch))
///     .with_tiling(Tiling::Count(2))
///     .with_microtile(Microtile::generator(Solid::new(2)));
///
/// let result = builder.create(&CreateOptions::default()).unwrap().unwrap();
/// assert_eq!(result.len(), 8);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MultiPatchBuilder {
    deformation_function: Option<Arc<Multipatch>>,
    tiling: Option<Tiling>,
    microtile: Option<Microtile>,
    parametrization_function: Option<PatchValue<ParametrizationFunction>>,
    parameter_sensitivity_function: Option<PatchValue<ParameterSensitivityFunction>>,
    diagnostics: Vec<AmbiguityWarning>,
    saved: Option<MicrostructureResult>,
}

impl MultiPatchBuilder {
    /// Creates an unconfigured builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the multipatch.
    #[must_use]
    pub fn with_deformation_function(mut self, multipatch: Arc<Multipatch>) -> Self {
        self.set_deformation_function(multipatch);
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

    /// Sets the parametrization function(s).
    #[must_use]
    pub fn with_parametrization_function(
        mut self,
        function: PatchValue<ParametrizationFunction>,
    ) -> Self {
        self.set_parametrization_function(Some(function));
        self
    }

    /// Sets the parameter sensitivity function(s).
    #[must_use]
    pub fn with_parameter_sensitivity_function(
        mut self,
        function: PatchValue<ParameterSensitivityFunction>,
    ) -> Self {
        self.set_parameter_sensitivity_function(Some(function));
        self
    }

    /// Sets the multipatch.
    pub fn set_deformation_function(&mut self, multipatch: Arc<Multipatch>) {
        debug!(patches = multipatch.len(), "Set multipatch deformation function");
        self.deformation_function = Some(multipatch);
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

    /// Sets or clears the parametrization function(s).
    pub fn set_parametrization_function(
        &mut self,
        function: Option<PatchValue<ParametrizationFunction>>,
    ) {
        debug!(present = function.is_some(), "Set parametrization function");
        self.parametrization_function = function;
    }

    /// Sets or clears the parameter sensitivity function(s).
    pub fn set_parameter_sensitivity_function(
        &mut self,
        function: Option<PatchValue<ParameterSensitivityFunction>>,
    ) {
        debug!(
            present = function.is_some(),
            "Set parameter sensitivity function"
        );
        self.parameter_sensitivity_function = function;
    }

    /// The multipatch.
    #[must_use]
    pub fn deformation_function(&self) -> Option<&Arc<Multipatch>> {
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

    /// The parametrization function(s).
    #[must_use]
    pub fn parametrization_function(&self) -> Option<&PatchValue<ParametrizationFunction>> {
        self.parametrization_function.as_ref()
    }

    /// The parameter sensitivity function(s).
    #[must_use]
    pub fn parameter_sensitivity_function(
        &self,
    ) -> Option<&PatchValue<ParameterSensitivityFunction>> {
        self.parameter_sensitivity_function.as_ref()
    }

    /// Ambiguity warnings recorded by the last [`Self::create`].
    #[must_use]
    pub fn diagnostics(&self) -> &[AmbiguityWarning] {
        &self.diagnostics
    }

    /// Result of the last successful [`Self::create`].
    #[must_use]
    pub fn saved(&self) -> Option<&MicrostructureResult> {
        self.saved.as_ref()
    }

    /// Build the microstructure of every patch and combine the results.
    ///
    /// Returns `Ok(None)` if the multipatch, tiling or microtile is missing,
    /// or if any patch ends up without a complete configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error of any patch in patch order, and
    /// [`MicrostructureError::PatchCountMismatch`](crate::MicrostructureError::PatchCountMismatch)
    /// for explicit per-patch values of the wrong length.
    pub fn create(&mut self, options: &CreateOptions) -> Result<Option<MicrostructureResult>> {
        self.diagnostics.clear();
        let (Some(multipatch), Some(tiling), Some(microtile)) = (
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

        let n = multipatch.len();
        if n == 0 {
            info!("Multipatch has no patches, no microstructure created");
            return Ok(None);
        }
        options.validate(n)?;

        let mut diagnostics = Vec::new();
        let tilings = try_broadcast("tiling", Some(tiling), n)?;
        diagnostics.extend(tilings.ambiguity);
        let microtiles = try_broadcast("microtile", Some(microtile), n)?;
        diagnostics.extend(microtiles.ambiguity);
        for warning in &diagnostics {
            warn!(property = warning.property, "{}", warning);
        }
        self.diagnostics = diagnostics;

        let parametrizations = broadcast_patch_value(
            "parametrization_function",
            self.parametrization_function.as_ref(),
            n,
        )?;
        let sensitivities = broadcast_patch_value(
            "parameter_sensitivity_function",
            self.parameter_sensitivity_function.as_ref(),
            n,
        )?;
        let closing_faces =
            broadcast_patch_value("closing_faces", options.closing_faces.as_ref(), n)?;
        let knot_span_wise =
            broadcast_patch_value("knot_span_wise", options.knot_span_wise.as_ref(), n)?;
        let macro_sensitivities = broadcast_patch_value(
            "macro_sensitivities",
            options.macro_sensitivities.as_ref(),
            n,
        )?;

        let mut parametrizations = parametrizations.into_iter();
        let mut sensitivities = sensitivities.into_iter();
        let mut closing_faces = closing_faces.into_iter();
        let mut knot_span_wise = knot_span_wise.into_iter();
        let mut macro_sensitivities = macro_sensitivities.into_iter();

        let mut jobs: Vec<(SinglePatchBuilder, PatchOptions)> = Vec::with_capacity(n);
        for ((patch, tiling), microtile) in multipatch
            .patches()
            .iter()
            .zip(tilings.values)
            .zip(microtiles.values)
        {
            let builder = SinglePatchBuilder::from_parts(
                Arc::clone(patch),
                tiling,
                microtile,
                parametrizations.next().flatten(),
                sensitivities.next().flatten(),
            );
            let patch_options = PatchOptions {
                closing_face: closing_faces.next().flatten(),
                knot_span_wise: knot_span_wise.next().flatten(),
                macro_sensitivities: macro_sensitivities.next().flatten(),
                tile_options: options.tile_options.clone(),
                parallel: options.parallel,
            };
            jobs.push((builder, patch_options));
        }

        info!(
            patches = n,
            parallel = options.parallel,
            "Building multi-patch microstructure"
        );

        let results: Vec<Result<Option<MicrostructureResult>>> = if options.parallel {
            jobs.par_iter_mut()
                .map(|(builder, patch_options)| builder.create(patch_options))
                .collect()
        } else {
            jobs.iter_mut()
                .map(|(builder, patch_options)| builder.create(patch_options))
                .collect()
        };

        // Propagate errors in patch order
        let mut per_patch = Vec::with_capacity(n);
        for (index, result) in results.into_iter().enumerate() {
            match result? {
                Some(result) => per_patch.push(result),
                None => {
                    info!(patch = index, "Patch has insufficient configuration");
                    return Ok(None);
                }
            }
        }

        let result = merge(per_patch);
        info!(
            patches = result.len(),
            fields = result.fields.len(),
            warnings = self.diagnostics.len(),
            "Multi-patch microstructure complete"
        );

        self.saved = Some(result.clone());
        Ok(Some(result))
    }
}

/// Concatenate per-patch results and widen every field to the combined length.
fn merge(per_patch: Vec<MicrostructureResult>) -> MicrostructureResult {
    let total: usize = per_patch.iter().map(MicrostructureResult::len).sum();
    let mut patches = Vec::with_capacity(total);
    let mut fields = Vec::new();

    let mut offset = 0;
    for (index, result) in per_patch.into_iter().enumerate() {
        let len = result.len();
        for field in result.fields {
            let mut entries = vec![None; total];
            for (slot, entry) in entries[offset..offset + len].iter_mut().zip(field.entries) {
                *slot = entry;
            }
            fields.push(SensitivityField {
                patch: index,
                source: field.source,
                entries,
            });
        }
        debug!(patch = index, offset, tiles = len, "Merged patch result");
        patches.extend(result.patches);
        offset += len;
    }

    MicrostructureResult { patches, fields }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::result::SensitivitySource;
    use crate::tiles::Solid;
    use crate::MicrostructureError;
    use approx::assert_relative_eq;
    use spline_types::BezierPatch;

    fn strip(patches: usize) -> Arc<Multipatch> {
        let mut multipatch = Multipatch::new();
        for i in 0..patches {
            let x = i as f64;
            multipatch.push(BezierPatch::axis_aligned_box(&[x, 0.0], &[x + 1.0, 1.0]).unwrap());
        }
        Arc::new(multipatch)
    }

    fn solid_builder(patches: usize) -> MultiPatchBuilder {
        MultiPatchBuilder::new()
            .with_deformation_function(strip(patches))
            .with_microtile(Microtile::generator(Solid::new(2)))
    }

    #[test]
    fn test_incomplete_configuration() {
        let mut builder = MultiPatchBuilder::new().with_tiling(Tiling::Count(2));
        assert!(builder.create(&CreateOptions::default()).unwrap().is_none());
    }

    #[test]
    fn test_geometry_is_concatenated_in_patch_order() {
        let mut builder = solid_builder(3).with_tiling(Tiling::PerPatch(vec![
            Tiling::Count(1),
            Tiling::from([2, 1]),
            Tiling::Count(2),
        ]));
        let result = builder.create(&CreateOptions::default()).unwrap().unwrap();
        assert_eq!(result.len(), 1 + 2 + 4);
        assert!(builder.diagnostics().is_empty());

        assert_relative_eq!(result.patches[0].control_points()[0][0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.patches[1].control_points()[0][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.patches[2].control_points()[0][0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(result.patches[3].control_points()[0][0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_explicit_tiling_length_is_checked() {
        let mut builder = solid_builder(3).with_tiling(Tiling::PerPatch(vec![Tiling::Count(1)]));
        let err = builder.create(&CreateOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MicrostructureError::PatchCountMismatch {
                name: "tiling",
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_macro_fields_are_padded() {
        let mut builder = solid_builder(2).with_tiling(Tiling::Count(1));
        let options = CreateOptions::new()
            .with_macro_sensitivities(PatchValue::PerPatch(vec![None, Some(true)]));
        let result = builder.create(&options).unwrap().unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.fields.len(), 4 * 2);
        for field in &result.fields {
            assert_eq!(field.patch, 1);
            assert_eq!(field.entries.len(), 2);
            assert!(field.entries[0].is_none());
            assert!(field.entries[1].is_some());
        }
        assert_eq!(
            result.fields[0].source,
            SensitivitySource::Macro {
                control_point: 0,
                coordinate: 0
            }
        );
    }

    #[test]
    fn test_error_from_any_patch_is_returned() {
        let mut builder = solid_builder(2).with_tiling(Tiling::PerPatch(vec![
            Tiling::Count(1),
            Tiling::from([1, 1, 1]),
        ]));
        let err = builder.create(&CreateOptions::default()).unwrap_err();
        assert!(matches!(err, MicrostructureError::InvalidTiling { .. }));
        assert!(builder.saved().is_none());
    }

    #[test]
    fn test_failed_build_replaces_diagnostics() {
        let mut builder = solid_builder(2).with_tiling(Tiling::from([1, 2]));
        let result = builder.create(&CreateOptions::default()).unwrap().unwrap();
        assert_eq!(result.len(), 1 + 4);
        assert_eq!(builder.diagnostics().len(), 1);

        builder.set_tiling(Tiling::PerPatch(vec![
            Tiling::Count(1),
            Tiling::from([1, 1, 1]),
        ]));
        assert!(builder.create(&CreateOptions::default()).is_err());
        assert!(builder.diagnostics().is_empty());
    }
}
