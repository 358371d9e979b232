//! Tile counts per parametric axis.

use crate::broadcast::Broadcast;
use crate::{MicrostructureError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Knots closer than this to an existing knot are not inserted again.
const KNOT_MATCH_TOLERANCE: f64 = 1e-10;

/// Number of tiles along each parametric axis of an outer patch.
///
/// # Examples
///
/// ```
/// use microstructure::Tiling;
///
/// // Two tiles along every axis
/// let uniform = Tiling::from(2_usize);
/// assert_eq!(uniform.resolve(3).unwrap(), vec![2, 2, 2]);
///
/// // Per-axis counts
/// let counts = Tiling::from([1, 2, 3]);
/// assert_eq!(counts.resolve(3).unwrap(), vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Tiling {
    /// The same count along every parametric axis.
    Count(usize),
    /// One count per parametric axis.
    Counts(Vec<usize>),
    /// Pre-expanded tiling, one entry per outer patch.
    PerPatch(Vec<Tiling>),
}

impl Tiling {
    /// Resolve to one count per axis for a patch of dimension `para_dim`.
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::InvalidTiling`] if a count is zero, the
    /// number of counts differs from `para_dim`, or the tiling is a per-patch
    /// list.
    pub fn resolve(&self, para_dim: usize) -> Result<Vec<usize>> {
        let counts = match self {
            Self::Count(count) => vec![*count; para_dim],
            Self::Counts(counts) if counts.len() == para_dim => counts.clone(),
            Self::Counts(counts) => {
                return Err(MicrostructureError::invalid_tiling(format!(
                    "{} counts given for parametric dimension {}",
                    counts.len(),
                    para_dim
                )));
            }
            Self::PerPatch(_) => {
                return Err(MicrostructureError::invalid_tiling(
                    "per-patch tiling cannot be applied to a single patch",
                ));
            }
        };

        if let Some(axis) = counts.iter().position(|&c| c == 0) {
            return Err(MicrostructureError::invalid_tiling(format!(
                "tile count along axis {axis} must be positive"
            )));
        }

        Ok(counts)
    }
}

impl Broadcast for Tiling {
    fn entries(&self) -> Option<Vec<Option<Self>>> {
        match self {
            Self::Count(_) => None,
            Self::Counts(counts) => Some(counts.iter().map(|&c| Some(Self::Count(c))).collect()),
            Self::PerPatch(tilings) => Some(tilings.iter().cloned().map(Some).collect()),
        }
    }

    fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Counts(_))
    }

    fn is_explicit(&self) -> bool {
        matches!(self, Self::PerPatch(_))
    }
}

impl From<usize> for Tiling {
    fn from(count: usize) -> Self {
        Self::Count(count)
    }
}

impl From<Vec<usize>> for Tiling {
    fn from(counts: Vec<usize>) -> Self {
        Self::Counts(counts)
    }
}

impl<const N: usize> From<[usize; N]> for Tiling {
    fn from(counts: [usize; N]) -> Self {
        Self::Counts(counts.to_vec())
    }
}

/// Knots to insert along one axis so that it carries `tiles` cells.
///
/// With `knot_span_wise` every existing span `[a, b]` is split into `tiles`
/// equal parts. Otherwise the whole axis is split into `tiles` equal parts.
/// Knots that already exist are skipped.
pub(crate) fn insertion_knots(unique_knots: &[f64], tiles: usize, knot_span_wise: bool) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (unique_knots.first(), unique_knots.last()) else {
        return Vec::new();
    };

    let split = |a: f64, b: f64| (1..tiles).map(move |j| a + j as f64 * (b - a) / tiles as f64);

    let candidates: Vec<f64> = if knot_span_wise {
        unique_knots
            .windows(2)
            .flat_map(|span| split(span[0], span[1]))
            .collect()
    } else {
        split(first, last).collect()
    };

    candidates
        .into_iter()
        .filter(|k| {
            unique_knots
                .iter()
                .all(|existing| (k - existing).abs() > KNOT_MATCH_TOLERANCE)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resolve_counts() {
        assert_eq!(Tiling::Count(3).resolve(2).unwrap(), vec![3, 3]);
        assert_eq!(Tiling::from([1, 4]).resolve(2).unwrap(), vec![1, 4]);
    }

    #[test]
    fn test_resolve_rejects_invalid() {
        assert!(matches!(
            Tiling::from([1, 4]).resolve(3),
            Err(MicrostructureError::InvalidTiling { .. })
        ));
        assert!(Tiling::Count(0).resolve(2).is_err());
        assert!(Tiling::from([2, 0, 1]).resolve(3).is_err());
        assert!(Tiling::PerPatch(vec![Tiling::Count(1)]).resolve(1).is_err());
    }

    #[test]
    fn test_broadcast_entries() {
        let counts = Tiling::from([2, 3]);
        assert!(counts.is_ambiguous());
        assert_eq!(
            counts.entries().unwrap(),
            vec![Some(Tiling::Count(2)), Some(Tiling::Count(3))]
        );

        let explicit = Tiling::PerPatch(vec![Tiling::from([2, 3]), Tiling::from([2, 3])]);
        assert!(!explicit.is_ambiguous());
        assert!(explicit.is_explicit());
        assert_eq!(explicit.entries().unwrap()[0], Some(Tiling::from([2, 3])));

        assert!(Tiling::Count(2).entries().is_none());
    }

    #[test]
    fn test_knot_span_wise_insertion() {
        let knots = insertion_knots(&[0.0, 0.5, 1.0], 2, true);
        assert_eq!(knots.len(), 2);
        assert_relative_eq!(knots[0], 0.25);
        assert_relative_eq!(knots[1], 0.75);

        let knots = insertion_knots(&[1.0, 3.0], 4, true);
        assert_eq!(knots, vec![1.5, 2.0, 2.5]);
    }

    #[test]
    fn test_absolute_insertion_skips_existing_knots() {
        assert!(insertion_knots(&[0.0, 0.5, 1.0], 2, false).is_empty());

        let knots = insertion_knots(&[0.0, 0.5, 1.0], 4, false);
        assert_eq!(knots, vec![0.25, 0.75]);
    }

    #[test]
    fn test_single_tile_inserts_nothing() {
        assert!(insertion_knots(&[0.0, 1.0], 1, true).is_empty());
        assert!(insertion_knots(&[0.0, 1.0], 1, false).is_empty());
    }
}
