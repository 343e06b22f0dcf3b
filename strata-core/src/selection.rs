//! Which layers are currently selected.

use serde::{Deserialize, Serialize};

use crate::canvas::Canvas;
use crate::layer::LayerId;

/// Ordered set of selected layers.
///
/// Order does not affect drawing; the last entry is the primary selection,
/// used as the reference layer for grid snapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    ids: Vec<LayerId>,
}

impl Selection {
    /// Create an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection with a single layer.
    pub fn select_only(&mut self, id: LayerId) {
        self.ids.clear();
        self.ids.push(id);
    }

    /// Replace the selection with the given layers, dropping duplicates.
    pub fn set(&mut self, ids: impl IntoIterator<Item = LayerId>) {
        self.ids.clear();
        for id in ids {
            self.add(id);
        }
    }

    /// Add a layer; re-adding moves it to the primary position.
    pub fn add(&mut self, id: LayerId) {
        self.ids.retain(|&existing| existing != id);
        self.ids.push(id);
    }

    /// Flip membership of a layer. Returns true if it is now selected.
    pub fn toggle(&mut self, id: LayerId) -> bool {
        if self.contains(id) {
            self.remove(id);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    /// Drop a layer from the selection.
    pub fn remove(&mut self, id: LayerId) {
        self.ids.retain(|&existing| existing != id);
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Whether a layer is selected.
    #[must_use]
    pub fn contains(&self, id: LayerId) -> bool {
        self.ids.contains(&id)
    }

    /// The most recently selected layer.
    #[must_use]
    pub fn primary(&self) -> Option<LayerId> {
        self.ids.last().copied()
    }

    /// Selected IDs in selection order.
    #[must_use]
    pub fn ids(&self) -> &[LayerId] {
        &self.ids
    }

    /// Number of selected layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop every ID that no longer names a layer on the canvas.
    ///
    /// Returns how many entries were removed.
    pub fn retain_existing(&mut self, canvas: &Canvas) -> usize {
        let before = self.ids.len();
        self.ids.retain(|&id| canvas.layer(id).is_some());
        before - self.ids.len()
    }
}
