//! Per-call build options.

use crate::broadcast::PatchValue;
use crate::tile::{ClosingFace, TileOptions};
use crate::{MicrostructureError, Result};

/// Options for building the microstructure of a single outer patch.
///
/// # Examples
///
/// ```
/// use microstructure::{ClosingFace, PatchOptions};
///
/// let options = PatchOptions::new()
///     .with_closing_face(ClosingFace::X)
///     .with_knot_span_wise(false);
/// assert!(!options.knot_span_wise());
/// assert!(!options.macro_sensitivities());
/// ```
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Axis whose boundary layers receive closing tiles.
    pub closing_face: Option<ClosingFace>,

    /// Whether tiling counts are per existing knot span (`None` means `true`).
    pub knot_span_wise: Option<bool>,

    /// Whether to compute sensitivities with respect to the outer patch's
    /// control points (`None` means `false`).
    pub macro_sensitivities: Option<bool>,

    /// Options handed to the tile generator unchanged.
    pub tile_options: TileOptions,

    /// Generate cells in parallel.
    pub parallel: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            closing_face: None,
            knot_span_wise: None,
            macro_sensitivities: None,
            tile_options: TileOptions::new(),
            parallel: true,
        }
    }
}

impl PatchOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the closing face.
    #[must_use]
    pub const fn with_closing_face(mut self, face: ClosingFace) -> Self {
        self.closing_face = Some(face);
        self
    }

    /// Sets whether tiling is applied per knot span.
    #[must_use]
    pub const fn with_knot_span_wise(mut self, knot_span_wise: bool) -> Self {
        self.knot_span_wise = Some(knot_span_wise);
        self
    }

    /// Sets whether outer control point sensitivities are computed.
    #[must_use]
    pub const fn with_macro_sensitivities(mut self, enable: bool) -> Self {
        self.macro_sensitivities = Some(enable);
        self
    }

    /// Adds a tile generator option.
    #[must_use]
    pub fn with_tile_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.tile_options.insert(key.into(), value);
        self
    }

    /// Sets whether cells are generated in parallel.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Effective knot-span-wise flag.
    #[must_use]
    pub fn knot_span_wise(&self) -> bool {
        self.knot_span_wise.unwrap_or(true)
    }

    /// Effective macro-sensitivity flag.
    #[must_use]
    pub fn macro_sensitivities(&self) -> bool {
        self.macro_sensitivities.unwrap_or(false)
    }

    /// Checks the options against the parametric dimension of the patch.
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::ClosingFaceOutOfRange`] if the closing
    /// face axis does not exist.
    pub fn validate(&self, para_dim: usize) -> Result<()> {
        match self.closing_face {
            Some(face) if face.axis() >= para_dim => {
                Err(MicrostructureError::ClosingFaceOutOfRange {
                    axis: face.axis(),
                    para_dim,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Options for [`Microstructure::create`](crate::Microstructure::create) and
/// [`MultiPatchBuilder::create`](crate::MultiPatchBuilder::create).
///
/// Every flag is either shared by all outer patches or given per patch.
///
/// # Examples
///
/// ```
/// use microstructure::{ClosingFace, CreateOptions, PatchValue};
///
/// let options = CreateOptions::new()
///     .with_closing_faces(PatchValue::per_patch([ClosingFace::X, ClosingFace::Y]))
///     .with_macro_sensitivities(PatchValue::shared(true))
///     .with_parallel(false);
/// assert!(!options.parallel);
/// ```
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Closing faces.
    pub closing_faces: Option<PatchValue<ClosingFace>>,

    /// Knot-span-wise tiling flags (default `true`).
    pub knot_span_wise: Option<PatchValue<bool>>,

    /// Outer control point sensitivity flags (default `false`).
    pub macro_sensitivities: Option<PatchValue<bool>>,

    /// Options handed to every tile generator unchanged.
    pub tile_options: TileOptions,

    /// Build patches and cells in parallel.
    pub parallel: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            closing_faces: None,
            knot_span_wise: None,
            macro_sensitivities: None,
            tile_options: TileOptions::new(),
            parallel: true,
        }
    }
}

impl CreateOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the closing faces.
    #[must_use]
    pub fn with_closing_faces(mut self, faces: PatchValue<ClosingFace>) -> Self {
        self.closing_faces = Some(faces);
        self
    }

    /// Sets the knot-span-wise flags.
    #[must_use]
    pub fn with_knot_span_wise(mut self, knot_span_wise: PatchValue<bool>) -> Self {
        self.knot_span_wise = Some(knot_span_wise);
        self
    }

    /// Sets the macro-sensitivity flags.
    #[must_use]
    pub fn with_macro_sensitivities(mut self, enable: PatchValue<bool>) -> Self {
        self.macro_sensitivities = Some(enable);
        self
    }

    /// Adds a tile generator option.
    #[must_use]
    pub fn with_tile_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.tile_options.insert(key.into(), value);
        self
    }

    /// Sets whether work is done in parallel.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Checks per-patch flag lists against the number of outer patches.
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::PatchCountMismatch`] for per-patch
    /// lists of the wrong length.
    pub fn validate(&self, patches: usize) -> Result<()> {
        check_count("closing_faces", self.closing_faces.as_ref(), patches)?;
        check_count("knot_span_wise", self.knot_span_wise.as_ref(), patches)?;
        check_count("macro_sensitivities", self.macro_sensitivities.as_ref(), patches)
    }

    /// Collapse to options for a single patch.
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::PatchCountMismatch`] if a per-patch list
    /// does not have exactly one entry.
    pub fn into_patch_options(self) -> Result<PatchOptions> {
        Ok(PatchOptions {
            closing_face: flatten_single("closing_faces", self.closing_faces)?,
            knot_span_wise: flatten_single("knot_span_wise", self.knot_span_wise)?,
            macro_sensitivities: flatten_single("macro_sensitivities", self.macro_sensitivities)?,
            tile_options: self.tile_options,
            parallel: self.parallel,
        })
    }
}

fn check_count<T>(name: &'static str, value: Option<&PatchValue<T>>, patches: usize) -> Result<()> {
    match value.and_then(PatchValue::entry_count) {
        Some(actual) if actual != patches => Err(MicrostructureError::PatchCountMismatch {
            name,
            expected: patches,
            actual,
        }),
        _ => Ok(()),
    }
}

fn flatten_single<T>(name: &'static str, value: Option<PatchValue<T>>) -> Result<Option<T>> {
    value.map_or(Ok(None), |v| v.into_single(name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_option_defaults() {
        let options = PatchOptions::default();
        assert!(options.knot_span_wise());
        assert!(!options.macro_sensitivities());
        assert!(options.parallel);
        assert!(options.closing_face.is_none());
        assert!(options.tile_options.is_empty());
    }

    #[test]
    fn test_patch_options_validate_closing_axis() {
        let options = PatchOptions::new().with_closing_face(ClosingFace::Z);
        assert!(options.validate(3).is_ok());
        assert!(matches!(
            options.validate(2),
            Err(MicrostructureError::ClosingFaceOutOfRange {
                axis: 2,
                para_dim: 2
            })
        ));
    }

    #[test]
    fn test_tile_option_passthrough() {
        let options = PatchOptions::new().with_tile_option("contact_length", serde_json::json!(0.3));
        assert_eq!(options.tile_options["contact_length"], serde_json::json!(0.3));
    }

    #[test]
    fn test_create_options_validate() {
        let options = CreateOptions::new()
            .with_knot_span_wise(PatchValue::per_patch([true, false, true]));
        assert!(options.validate(3).is_ok());
        assert!(options.validate(2).is_err());
    }

    #[test]
    fn test_into_patch_options() {
        let options = CreateOptions::new()
            .with_closing_faces(PatchValue::per_patch([ClosingFace::Y]))
            .with_macro_sensitivities(PatchValue::shared(true))
            .with_parallel(false);
        let single = options.into_patch_options().unwrap();
        assert_eq!(single.closing_face, Some(ClosingFace::Y));
        assert!(single.macro_sensitivities());
        assert!(single.knot_span_wise());
        assert!(!single.parallel);

        let options = CreateOptions::new()
            .with_closing_faces(PatchValue::per_patch([ClosingFace::X, ClosingFace::Y]));
        assert!(options.into_patch_options().is_err());
    }
}
