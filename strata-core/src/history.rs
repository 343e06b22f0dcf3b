//! Undo/redo over snapshots of the layer list.
//!
//! A snapshot copies layer *values* only. Pixels stay in the image store and
//! are shared by [`ImageId`], so one entry costs O(layers), not O(pixels).
//! Reclaiming those shared images safely is the job of
//! [`ImageReferences`](crate::references::ImageReferences), which walks
//! [`History::image_ids`].

use std::collections::VecDeque;
use std::sync::Arc;

use crate::layer::{ImageId, Layer};

/// Default number of undo entries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Immutable copy of the layer list at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    layers: Arc<[Layer]>,
}

impl HistoryEntry {
    /// Capture the given layers.
    #[must_use]
    pub fn new(layers: &[Layer]) -> Self {
        Self {
            layers: Arc::from(layers),
        }
    }

    /// The captured layers.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// An owned copy of the captured layers, for restoring into a canvas.
    #[must_use]
    pub fn to_layers(&self) -> Vec<Layer> {
        self.layers.to_vec()
    }

    /// Images referenced by this entry.
    pub fn image_ids(&self) -> impl Iterator<Item = &ImageId> {
        self.layers.iter().flat_map(Layer::image_refs)
    }
}

/// Two-stack undo history.
///
/// The bottom of the undo stack is the oldest retained state and is never
/// popped by [`History::undo`].
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// Create an empty history with the default limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create an empty history keeping at most `limit` undo entries.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Forget everything and seed the undo stack with exactly one entry.
    pub fn reset(&mut self, layers: &[Layer]) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.undo_stack.push_back(HistoryEntry::new(layers));
    }

    /// Record the current layers.
    ///
    /// With `replace_last`, the top entry is dropped first so a gesture that
    /// already pushed an intermediate state collapses into one entry. A
    /// snapshot equal to the top entry is discarded. Returns true if an entry
    /// was pushed.
    pub fn snapshot(&mut self, layers: &[Layer], replace_last: bool) -> bool {
        if replace_last && self.undo_stack.len() > 1 {
            self.undo_stack.pop_back();
        }

        let entry = HistoryEntry::new(layers);
        if self.undo_stack.back() == Some(&entry) {
            tracing::trace!("Snapshot identical to top of history, skipped");
            return false;
        }

        self.undo_stack.push_back(entry);
        self.redo_stack.clear();
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
        tracing::debug!(depth = self.undo_stack.len(), "History snapshot pushed");
        true
    }

    /// Step back. Returns the state to restore, or `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<HistoryEntry> {
        if self.undo_stack.len() <= 1 {
            return None;
        }
        let top = self.undo_stack.pop_back()?;
        self.redo_stack.push(top);
        self.undo_stack.back().cloned()
    }

    /// Step forward. Returns the state to restore, or `None` if nothing was undone.
    pub fn redo(&mut self) -> Option<HistoryEntry> {
        let entry = self.redo_stack.pop()?;
        self.undo_stack.push_back(entry.clone());
        Some(entry)
    }

    /// Whether [`History::undo`] would do anything.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    /// Whether [`History::redo`] would do anything.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of entries on the undo stack, baseline included.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of entries on the redo stack.
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Entry matching the current canvas.
    #[must_use]
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.undo_stack.back()
    }

    /// Maximum undo depth.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Shift every recorded layer by `(dx, dy)`.
    ///
    /// Used when the canvas origin moves: positions change meaning but no
    /// edit happened, so undo must keep landing on the same picture.
    pub fn rebase(&mut self, dx: f64, dy: f64) {
        let shift = |entry: &mut HistoryEntry| {
            let mut layers = entry.to_layers();
            for layer in &mut layers {
                layer.translate(dx, dy);
            }
            *entry = HistoryEntry::new(&layers);
        };
        self.undo_stack.iter_mut().for_each(&shift);
        self.redo_stack.iter_mut().for_each(&shift);
    }

    /// Every entry on both stacks.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo_stack.iter().chain(self.redo_stack.iter())
    }

    /// Every image referenced from either stack (with repeats).
    pub fn image_ids(&self) -> impl Iterator<Item = &ImageId> {
        self.entries().flat_map(HistoryEntry::image_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Frame;

    fn layer_at(x: f64) -> Layer {
        Layer::new(ImageId::from("img"), 100.0, 100.0)
            .with_frame(Frame::new(x, 0.0, 100.0, 100.0, 0.0))
    }

    fn seeded() -> (History, Vec<Layer>) {
        let layers = vec![layer_at(0.0)];
        let mut history = History::new();
        history.reset(&layers);
        (history, layers)
    }

    #[test]
    fn test_reset_seeds_one_entry() {
        let (history, _) = seeded();
        assert_eq!(history.undo_len(), 1);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_identical_snapshots_coalesce() {
        let (mut history, mut layers) = seeded();
        layers[0].x = 50.0;
        for _ in 0..5 {
            history.snapshot(&layers, false);
        }
        assert_eq!(history.undo_len(), 2);
    }

    #[test]
    fn test_snapshot_equal_to_baseline_is_noop() {
        let (mut history, layers) = seeded();
        assert!(!history.snapshot(&layers, false));
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_undo_stops_at_baseline() {
        let (mut history, mut layers) = seeded();
        layers[0].x = 10.0;
        history.snapshot(&layers, false);

        let restored = history.undo().expect("one step back");
        assert!((restored.layers()[0].x - 0.0).abs() < f64::EPSILON);
        assert!(history.undo().is_none());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_undo_then_redo_restores_same_state() {
        let (mut history, mut layers) = seeded();
        layers[0].x = 10.0;
        history.snapshot(&layers, false);
        let before = history.current().cloned().expect("top");

        history.undo();
        let again = history.redo().expect("redo");
        assert_eq!(again, before);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_snapshot_clears_redo() {
        let (mut history, mut layers) = seeded();
        layers[0].x = 10.0;
        history.snapshot(&layers, false);
        history.undo();
        assert!(history.can_redo());

        layers[0].x = 20.0;
        history.snapshot(&layers, false);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_redo_empty_is_noop() {
        let (mut history, _) = seeded();
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut history = History::with_limit(3);
        history.reset(&[layer_at(0.0)]);
        for i in 1..=5 {
            history.snapshot(&[layer_at(f64::from(i))], false);
        }
        assert_eq!(history.undo_len(), 3);
        // Oldest retained is x = 3.
        history.undo();
        let bottom = history.undo().expect("second undo");
        assert!((bottom.layers()[0].x - 3.0).abs() < f64::EPSILON);
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_replace_last_collapses_gesture() {
        let (mut history, _) = seeded();
        history.snapshot(&[layer_at(5.0)], false);
        history.snapshot(&[layer_at(9.0)], true);
        assert_eq!(history.undo_len(), 2);
        let top = history.current().expect("top");
        assert!((top.layers()[0].x - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_replace_last_never_drops_baseline() {
        let (mut history, _) = seeded();
        history.snapshot(&[layer_at(5.0)], true);
        assert_eq!(history.undo_len(), 2);
    }

    #[test]
    fn test_rebase_shifts_both_stacks() {
        let (mut history, _) = seeded();
        history.snapshot(&[layer_at(10.0)], false);
        history.undo();
        history.rebase(-10.0, 5.0);

        let bottom = history.current().expect("bottom");
        assert!((bottom.layers()[0].x + 10.0).abs() < f64::EPSILON);
        assert!((bottom.layers()[0].y - 5.0).abs() < f64::EPSILON);
        let redone = history.redo().expect("redo");
        assert!(redone.layers()[0].x.abs() < f64::EPSILON);
    }

    #[test]
    fn test_image_ids_cover_both_stacks() {
        let mut history = History::new();
        history.reset(&[Layer::new(ImageId::from("a"), 10.0, 10.0)]);
        history.snapshot(&[Layer::new(ImageId::from("b"), 10.0, 10.0)], false);
        history.undo();
        let ids: Vec<_> = history.image_ids().map(ImageId::as_str).collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
    }
}
