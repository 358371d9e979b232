//! Microstructure build results.

use spline_types::BezierPatch;

/// What a sensitivity field is the derivative with respect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensitivitySource {
    /// A coordinate of an outer patch control point.
    Macro {
        /// Control point index within the outer patch.
        control_point: usize,
        /// Physical coordinate.
        coordinate: usize,
    },
    /// A design variable of the parameter sensitivity function.
    Parameter {
        /// Design variable index.
        index: usize,
    },
}

/// Derivative of a microstructure with respect to one quantity.
///
/// `entries` is aligned index for index with
/// [`MicrostructureResult::patches`]; `None` marks patches the quantity does
/// not influence.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityField {
    /// Outer patch the field originates from.
    pub patch: usize,
    /// Quantity the field differentiates by.
    pub source: SensitivitySource,
    /// One derivative patch per geometry patch.
    pub entries: Vec<Option<BezierPatch>>,
}

impl SensitivityField {
    /// Number of non-empty entries.
    #[must_use]
    pub fn contribution_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

/// Geometry and sensitivity fields produced by one build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MicrostructureResult {
    /// Tile patches in build order.
    pub patches: Vec<BezierPatch>,
    /// Sensitivity fields, each as long as `patches`.
    pub fields: Vec<SensitivityField>,
}

impl MicrostructureResult {
    /// Number of patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Check if the result holds no patches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Check if any sensitivity fields were produced.
    #[must_use]
    pub fn has_sensitivities(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Fields that differentiate by outer control points.
    pub fn macro_fields(&self) -> impl Iterator<Item = &SensitivityField> {
        self.fields
            .iter()
            .filter(|f| matches!(f.source, SensitivitySource::Macro { .. }))
    }

    /// Fields that differentiate by design variables.
    pub fn parameter_fields(&self) -> impl Iterator<Item = &SensitivityField> {
        self.fields
            .iter()
            .filter(|f| matches!(f.source, SensitivitySource::Parameter { .. }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_result_accessors() {
        let patch = BezierPatch::unit_cube(1).unwrap();
        let result = MicrostructureResult {
            patches: vec![patch.clone(), patch.clone()],
            fields: vec![
                SensitivityField {
                    patch: 0,
                    source: SensitivitySource::Macro {
                        control_point: 0,
                        coordinate: 0,
                    },
                    entries: vec![Some(patch.clone()), None],
                },
                SensitivityField {
                    patch: 0,
                    source: SensitivitySource::Parameter { index: 0 },
                    entries: vec![Some(patch.clone()), Some(patch)],
                },
            ],
        };

        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
        assert!(result.has_sensitivities());
        assert_eq!(result.macro_fields().count(), 1);
        assert_eq!(result.parameter_fields().count(), 1);
        assert_eq!(result.fields[0].contribution_count(), 1);
        assert!(MicrostructureResult::default().is_empty());
    }
}
