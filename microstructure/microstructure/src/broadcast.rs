//! Broadcasting configuration values over the patches of a multipatch.
//!
//! A configuration value either applies to every patch or carries one entry
//! per patch. [`broadcast`] turns either form into exactly one optional value
//! per patch. Sequences whose length happens to equal the patch count but
//! could also be read as a single value are flagged with an
//! [`AmbiguityWarning`]; the per-patch reading always wins.

use std::fmt;

use crate::{MicrostructureError, Result};

/// A configuration value that may be read as one entry per patch.
pub trait Broadcast: Clone {
    /// The per-patch entries, if the value reads as an ordered sequence.
    fn entries(&self) -> Option<Vec<Option<Self>>>;

    /// Whether the sequence reading competes with a single-value reading.
    fn is_ambiguous(&self) -> bool {
        false
    }

    /// Whether the value is an explicitly pre-expanded per-patch list.
    ///
    /// Explicit lists must match the patch count exactly.
    fn is_explicit(&self) -> bool {
        false
    }
}

/// Diagnostic emitted when a sequence was read as one value per patch although
/// it could also describe a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguityWarning {
    /// Name of the broadcast property.
    pub property: &'static str,
    /// Number of patches the sequence was matched against.
    pub patches: usize,
}

impl fmt::Display for AmbiguityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has {} entries which matches the number of patches; \
             entries are used one per patch (pre-expand explicitly for the single-value reading)",
            self.property, self.patches
        )
    }
}

/// Result of broadcasting a value over `count` patches.
#[derive(Debug, Clone)]
pub struct Broadcasted<T> {
    /// One optional value per patch.
    pub values: Vec<Option<T>>,
    /// Set when the per-patch reading was chosen for an ambiguous value.
    pub ambiguity: Option<AmbiguityWarning>,
}

/// Broadcast `value` over `count` patches.
///
/// # Example
///
/// ```
/// use microstructure::{broadcast, Tiling};
///
/// let tiling = Tiling::Count(2);
/// let per_patch = broadcast::broadcast("tiling", Some(&tiling), 3);
/// assert_eq!(per_patch.values.len(), 3);
/// assert!(per_patch.ambiguity.is_none());
///
/// let tiling = Tiling::Counts(vec![2, 2, 2]);
/// let per_patch = broadcast::broadcast("tiling", Some(&tiling), 3);
/// assert_eq!(per_patch.values[0], Some(Tiling::Count(2)));
/// assert!(per_patch.ambiguity.is_some());
/// ```
pub fn broadcast<T: Broadcast>(
    name: &'static str,
    value: Option<&T>,
    count: usize,
) -> Broadcasted<T> {
    let Some(value) = value else {
        return Broadcasted {
            values: vec![None; count],
            ambiguity: None,
        };
    };

    if let Some(entries) = value.entries() {
        if entries.len() == count {
            let ambiguity = value.is_ambiguous().then_some(AmbiguityWarning {
                property: name,
                patches: count,
            });
            return Broadcasted {
                values: entries,
                ambiguity,
            };
        }
    }

    Broadcasted {
        values: vec![Some(value.clone()); count],
        ambiguity: None,
    }
}

/// Like [`broadcast`], but rejects explicit per-patch lists of the wrong length.
pub fn try_broadcast<T: Broadcast>(
    name: &'static str,
    value: Option<&T>,
    count: usize,
) -> Result<Broadcasted<T>> {
    if let Some(value) = value.filter(|v| v.is_explicit()) {
        let actual = value.entries().map_or(0, |entries| entries.len());
        if actual != count {
            return Err(MicrostructureError::PatchCountMismatch {
                name,
                expected: count,
                actual,
            });
        }
    }

    Ok(broadcast(name, value, count))
}

/// A value shared by all patches or given explicitly per patch.
///
/// `None` entries in a per-patch list leave that patch without a value.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue<T> {
    /// One value for every patch.
    Shared(T),
    /// One optional value per patch.
    PerPatch(Vec<Option<T>>),
}

impl<T> PatchValue<T> {
    /// Shorthand for [`PatchValue::Shared`].
    pub fn shared(value: T) -> Self {
        Self::Shared(value)
    }

    /// Per-patch list where every patch has a value.
    pub fn per_patch(values: impl IntoIterator<Item = T>) -> Self {
        Self::PerPatch(values.into_iter().map(Some).collect())
    }

    /// The shared value, or `None` for per-patch lists.
    pub fn into_shared(self) -> Option<T> {
        match self {
            Self::Shared(value) => Some(value),
            Self::PerPatch(_) => None,
        }
    }

    /// Number of per-patch entries, `None` for shared values.
    pub fn entry_count(&self) -> Option<usize> {
        match self {
            Self::Shared(_) => None,
            Self::PerPatch(values) => Some(values.len()),
        }
    }

    /// Collapse to the value of a single patch.
    ///
    /// # Errors
    ///
    /// Returns [`MicrostructureError::PatchCountMismatch`] if a per-patch list
    /// does not have exactly one entry.
    pub fn into_single(self, name: &'static str) -> Result<Option<T>> {
        match self {
            Self::Shared(value) => Ok(Some(value)),
            Self::PerPatch(mut values) if values.len() == 1 => Ok(values.pop().flatten()),
            Self::PerPatch(values) => Err(MicrostructureError::PatchCountMismatch {
                name,
                expected: 1,
                actual: values.len(),
            }),
        }
    }
}

impl<T: Clone> Broadcast for PatchValue<T> {
    fn entries(&self) -> Option<Vec<Option<Self>>> {
        match self {
            Self::Shared(_) => None,
            Self::PerPatch(values) => Some(
                values
                    .iter()
                    .map(|v| v.clone().map(Self::Shared))
                    .collect(),
            ),
        }
    }

    fn is_explicit(&self) -> bool {
        matches!(self, Self::PerPatch(_))
    }
}

/// Broadcast a [`PatchValue`] and unwrap the per-patch values.
pub(crate) fn broadcast_patch_value<T: Clone>(
    name: &'static str,
    value: Option<&PatchValue<T>>,
    count: usize,
) -> Result<Vec<Option<T>>> {
    Ok(try_broadcast(name, value, count)?
        .values
        .into_iter()
        .map(|v| v.and_then(PatchValue::into_shared))
        .collect())
}
