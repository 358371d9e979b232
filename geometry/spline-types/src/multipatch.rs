//! Ordered collections of spline patches.

use std::sync::Arc;

use crate::Spline;

/// An ordered set of patches describing one multi-patch geometry.
///
/// Patches are shared through [`Arc`], so a multipatch can hand out patches to
/// parallel consumers without copying them. Insertion order is patch order.
#[derive(Debug, Clone, Default)]
pub struct Multipatch {
    patches: Vec<Arc<dyn Spline>>,
}

impl Multipatch {
    /// Create an empty multipatch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a multipatch from shared patches.
    #[must_use]
    pub fn from_patches(patches: Vec<Arc<dyn Spline>>) -> Self {
        Self { patches }
    }

    /// Append a patch.
    pub fn push(&mut self, patch: impl Spline + 'static) {
        self.patches.push(Arc::new(patch));
    }

    /// Append an already shared patch.
    pub fn push_shared(&mut self, patch: Arc<dyn Spline>) {
        self.patches.push(patch);
    }

    /// All patches in order.
    #[must_use]
    pub fn patches(&self) -> &[Arc<dyn Spline>] {
        &self.patches
    }

    /// Number of patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Check if there are no patches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Patch at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn Spline>> {
        self.patches.get(index)
    }

    /// Common parametric dimension, if all patches agree.
    #[must_use]
    pub fn para_dim(&self) -> Option<usize> {
        let first = self.patches.first()?.para_dim();
        self.patches
            .iter()
            .all(|p| p.para_dim() == first)
            .then_some(first)
    }
}

impl FromIterator<Arc<dyn Spline>> for Multipatch {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Spline>>>(iter: I) -> Self {
        Self {
            patches: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::BezierPatch;

    #[test]
    fn test_multipatch_order_and_para_dim() {
        let mut multipatch = Multipatch::new();
        assert!(multipatch.is_empty());
        assert_eq!(multipatch.para_dim(), None);

        multipatch.push(BezierPatch::axis_aligned_box(&[0.0, 0.0], &[1.0, 1.0]).unwrap());
        multipatch.push(BezierPatch::axis_aligned_box(&[1.0, 0.0], &[2.0, 1.0]).unwrap());
        assert_eq!(multipatch.len(), 2);
        assert_eq!(multipatch.para_dim(), Some(2));
        assert_eq!(
            multipatch.get(1).unwrap().control_points()[0].as_slice(),
            &[1.0, 0.0]
        );

        multipatch.push(BezierPatch::unit_cube(3).unwrap());
        assert_eq!(multipatch.para_dim(), None);
    }
}
