//! One configuration surface over single- and multi-patch builds.

use std::sync::Arc;

use spline_types::{Multipatch, Spline};
use tracing::{debug, info};

use crate::broadcast::{AmbiguityWarning, PatchValue};
use crate::function::{ParameterSensitivityFunction, ParametrizationFunction};
use crate::multi_patch::MultiPatchBuilder;
use crate::options::CreateOptions;
use crate::result::MicrostructureResult;
use crate::single_patch::SinglePatchBuilder;
use crate::tile::Microtile;
use crate::tiling::Tiling;
use crate::{MicrostructureError, Result};

/// The outer geometry a microstructure is mapped into.
#[derive(Debug, Clone)]
pub enum DeformationFunction {
    /// A single spline patch.
    Single(Arc<dyn Spline>),
    /// An ordered collection of patches.
    Multi(Arc<Multipatch>),
}

impl DeformationFunction {
    /// Number of outer patches.
    #[must_use]
    pub fn patch_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(multipatch) => multipatch.len(),
        }
    }

    /// Whether this is a single patch rather than a collection.
    #[must_use]
    pub const fn is_single_patch(&self) -> bool {
        matches!(self, Self::Single(_))
    }
}

impl From<Arc<dyn Spline>> for DeformationFunction {
    fn from(patch: Arc<dyn Spline>) -> Self {
        Self::Single(patch)
    }
}

impl From<Arc<Multipatch>> for DeformationFunction {
    fn from(multipatch: Arc<Multipatch>) -> Self {
        Self::Multi(multipatch)
    }
}

impl From<Multipatch> for DeformationFunction {
    fn from(multipatch: Multipatch) -> Self {
        Self::Multi(Arc::new(multipatch))
    }
}

#[derive(Debug, Clone)]
enum Delegate {
    Single(SinglePatchBuilder),
    Multi(MultiPatchBuilder),
}

impl Default for Delegate {
    fn default() -> Self {
        Self::Multi(MultiPatchBuilder::new())
    }
}

/// Microstructure builder for single patches and multipatches alike.
///
/// Work is forwarded to a [`SinglePatchBuilder`] or a [`MultiPatchBuilder`]
/// depending on the deformation function. Switching between the two keeps
/// every property set so far. Without a deformation function the
/// multi-patch builder is used.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use microstructure::tiles::Solid;
/// use microstructure::{CreateOptions, Microstructure, Microtile, Tiling};
/// use spline_types::{BezierPatch, Spline};
///
/// let mut microstructure = Microstructure::new();
/// microstructure.set_tiling(Tiling::Count(3)).unwrap();
/// microstructure.set_microtile(Microtile::generator(Solid::new(2))).unwrap();
///
/// let outer: Arc<dyn Spline> =
///     Arc::new(BezierPatch::axis_aligned_box(&[0.0, 0.0], &[3.0, 3.0]).unwrap());
/// microstructure.set_deformation_function(outer).unwrap();
/// assert!(microstructure.is_single_patch());
///
/// let result = microstructure.create(&CreateOptions::default()).unwrap().unwrap();
/// assert_eq!(result.len(), 9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Microstructure {
    delegate: Delegate,
}

impl Microstructure {
    /// Creates an unconfigured microstructure.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether builds go through the single-patch builder.
    #[must_use]
    pub const fn is_single_patch(&self) -> bool {
        matches!(self.delegate, Delegate::Single(_))
    }

    /// Sets the deformation function, switching builders if needed.
    ///
    /// # Errors
    ///
    /// Switching to a single patch fails with
    /// [`MicrostructureError::PatchCountMismatch`] when a per-patch property
    /// already set has more than one entry.
    pub fn set_deformation_function(
        &mut self,
        function: impl Into<DeformationFunction>,
    ) -> Result<()> {
        let rebuilt = match (&mut self.delegate, function.into()) {
            (Delegate::Single(builder), DeformationFunction::Single(patch)) => {
                builder.set_deformation_function(patch);
                None
            }
            (Delegate::Multi(builder), DeformationFunction::Multi(multipatch)) => {
                builder.set_deformation_function(multipatch);
                None
            }
            (Delegate::Multi(builder), DeformationFunction::Single(patch)) => {
                debug!("Switching to single-patch builder");
                Some(Delegate::Single(single_from_multi(builder, patch)?))
            }
            (Delegate::Single(builder), DeformationFunction::Multi(multipatch)) => {
                debug!("Switching to multi-patch builder");
                Some(Delegate::Multi(multi_from_single(builder, multipatch)))
            }
        };

        if let Some(delegate) = rebuilt {
            self.delegate = delegate;
        }
        Ok(())
    }

    /// Sets the tiling.
    ///
    /// # Errors
    ///
    /// A [`Tiling::PerPatch`] list handed to a single patch must have exactly
    /// one entry.
    pub fn set_tiling(&mut self, tiling: impl Into<Tiling>) -> Result<()> {
        let tiling = tiling.into();
        match &mut self.delegate {
            Delegate::Single(builder) => builder.set_tiling(single_tiling(tiling)?),
            Delegate::Multi(builder) => builder.set_tiling(tiling),
        }
        Ok(())
    }

    /// Sets the microtile.
    ///
    /// # Errors
    ///
    /// A [`Microtile::PerPatch`] list handed to a single patch must have
    /// exactly one entry.
    pub fn set_microtile(&mut self, microtile: impl Into<Microtile>) -> Result<()> {
        let microtile = microtile.into();
        match &mut self.delegate {
            Delegate::Single(builder) => builder.set_microtile(single_microtile(microtile)?),
            Delegate::Multi(builder) => builder.set_microtile(microtile),
        }
        Ok(())
    }

    /// Sets or clears the parametrization function(s).
    ///
    /// # Errors
    ///
    /// A per-patch list handed to a single patch must have exactly one entry.
    pub fn set_parametrization_function(
        &mut self,
        function: Option<PatchValue<ParametrizationFunction>>,
    ) -> Result<()> {
        match &mut self.delegate {
            Delegate::Single(builder) => builder.set_parametrization_function(
                function
                    .map(|f| f.into_single("parametrization_function"))
                    .transpose()?
                    .flatten(),
            ),
            Delegate::Multi(builder) => builder.set_parametrization_function(function),
        }
        Ok(())
    }

    /// Sets or clears the parameter sensitivity function(s).
    ///
    /// # Errors
    ///
    /// A per-patch list handed to a single patch must have exactly one entry.
    pub fn set_parameter_sensitivity_function(
        &mut self,
        function: Option<PatchValue<ParameterSensitivityFunction>>,
    ) -> Result<()> {
        match &mut self.delegate {
            Delegate::Single(builder) => builder.set_parameter_sensitivity_function(
                function
                    .map(|f| f.into_single("parameter_sensitivity_function"))
                    .transpose()?
                    .flatten(),
            ),
            Delegate::Multi(builder) => builder.set_parameter_sensitivity_function(function),
        }
        Ok(())
    }

    /// The deformation function.
    #[must_use]
    pub fn deformation_function(&self) -> Option<DeformationFunction> {
        match &self.delegate {
            Delegate::Single(builder) => builder
                .deformation_function()
                .cloned()
                .map(DeformationFunction::Single),
            Delegate::Multi(builder) => builder
                .deformation_function()
                .cloned()
                .map(DeformationFunction::Multi),
        }
    }

    /// The tiling.
    #[must_use]
    pub fn tiling(&self) -> Option<&Tiling> {
        match &self.delegate {
            Delegate::Single(builder) => builder.tiling(),
            Delegate::Multi(builder) => builder.tiling(),
        }
    }

    /// The microtile.
    #[must_use]
    pub fn microtile(&self) -> Option<&Microtile> {
        match &self.delegate {
            Delegate::Single(builder) => builder.microtile(),
            Delegate::Multi(builder) => builder.microtile(),
        }
    }

    /// The parametrization function(s).
    #[must_use]
    pub fn parametrization_function(&self) -> Option<PatchValue<ParametrizationFunction>> {
        match &self.delegate {
            Delegate::Single(builder) => builder
                .parametrization_function()
                .cloned()
                .map(PatchValue::Shared),
            Delegate::Multi(builder) => builder.parametrization_function().cloned(),
        }
    }

    /// The parameter sensitivity function(s).
    #[must_use]
    pub fn parameter_sensitivity_function(
        &self,
    ) -> Option<PatchValue<ParameterSensitivityFunction>> {
        match &self.delegate {
            Delegate::Single(builder) => builder
                .parameter_sensitivity_function()
                .cloned()
                .map(PatchValue::Shared),
            Delegate::Multi(builder) => builder.parameter_sensitivity_function().cloned(),
        }
    }

    /// Ambiguity warnings of the last multi-patch build.
    #[must_use]
    pub fn diagnostics(&self) -> &[AmbiguityWarning] {
        match &self.delegate {
            Delegate::Single(_) => &[],
            Delegate::Multi(builder) => builder.diagnostics(),
        }
    }

    /// Result of the last successful build.
    #[must_use]
    pub fn saved(&self) -> Option<&MicrostructureResult> {
        match &self.delegate {
            Delegate::Single(builder) => builder.saved(),
            Delegate::Multi(builder) => builder.saved(),
        }
    }

    /// Build the microstructure.
    ///
    /// Returns `Ok(None)` while the configuration is incomplete.
    ///
    /// # Errors
    ///
    /// Propagates every configuration error of the active builder. For a
    /// single patch, per-patch options must have exactly one entry.
    pub fn create(&mut self, options: &CreateOptions) -> Result<Option<MicrostructureResult>> {
        match &mut self.delegate {
            Delegate::Single(builder) => {
                let options = options.clone().into_patch_options()?;
                builder.create(&options)
            }
            Delegate::Multi(builder) => builder.create(options),
        }
    }

    /// The cached result if `use_saved` is set, otherwise a fresh build.
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::NoSavedResult`] if `use_saved` is set
    /// but nothing has been built yet, and any error of [`Self::create`].
    pub fn result(
        &mut self,
        use_saved: bool,
        options: &CreateOptions,
    ) -> Result<Option<MicrostructureResult>> {
        if use_saved {
            info!("Returning saved microstructure");
            return self
                .saved()
                .cloned()
                .map(Some)
                .ok_or(MicrostructureError::NoSavedResult);
        }
        self.create(options)
    }
}

fn single_from_multi(
    builder: &MultiPatchBuilder,
    patch: Arc<dyn Spline>,
) -> Result<SinglePatchBuilder> {
    let mut single = SinglePatchBuilder::new().with_deformation_function(patch);
    if let Some(tiling) = builder.tiling().cloned() {
        single.set_tiling(single_tiling(tiling)?);
    }
    if let Some(microtile) = builder.microtile().cloned() {
        single.set_microtile(single_microtile(microtile)?);
    }
    if let Some(function) = builder.parametrization_function().cloned() {
        single.set_parametrization_function(function.into_single("parametrization_function")?);
    }
    if let Some(function) = builder.parameter_sensitivity_function().cloned() {
        single.set_parameter_sensitivity_function(
            function.into_single("parameter_sensitivity_function")?,
        );
    }
    Ok(single)
}

fn multi_from_single(
    builder: &SinglePatchBuilder,
    multipatch: Arc<Multipatch>,
) -> MultiPatchBuilder {
    let mut multi = MultiPatchBuilder::new().with_deformation_function(multipatch);
    if let Some(tiling) = builder.tiling().cloned() {
        multi.set_tiling(tiling);
    }
    if let Some(microtile) = builder.microtile().cloned() {
        multi.set_microtile(microtile);
    }
    multi.set_parametrization_function(
        builder
            .parametrization_function()
            .cloned()
            .map(PatchValue::Shared),
    );
    multi.set_parameter_sensitivity_function(
        builder
            .parameter_sensitivity_function()
            .cloned()
            .map(PatchValue::Shared),
    );
    multi
}

fn single_tiling(tiling: Tiling) -> Result<Tiling> {
    match tiling {
        Tiling::PerPatch(tilings) => {
            let actual = tilings.len();
            let mut tilings = tilings.into_iter();
            match (tilings.next(), tilings.next()) {
                (Some(tiling), None) => Ok(tiling),
                _ => Err(MicrostructureError::PatchCountMismatch {
                    name: "tiling",
                    expected: 1,
                    actual,
                }),
            }
        }
        tiling => Ok(tiling),
    }
}

fn single_microtile(microtile: Microtile) -> Result<Microtile> {
    match microtile {
        Microtile::PerPatch(microtiles) => {
            let actual = microtiles.len();
            let mut microtiles = microtiles.into_iter();
            match (microtiles.next(), microtiles.next()) {
                (Some(microtile), None) => Ok(microtile),
                _ => Err(MicrostructureError::PatchCountMismatch {
                    name: "microtile",
                    expected: 1,
                    actual,
                }),
            }
        }
        microtile => Ok(microtile),
    }
}
