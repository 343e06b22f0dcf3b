//! Reference counting of stored images across the canvas and history.
//!
//! The incremental [`ImageReferences::add_reference`] /
//! [`ImageReferences::remove_reference`] calls keep counts roughly current
//! between gestures. [`ImageReferences::rebuild`] recomputes them from scratch
//! and is what garbage collection trusts.

use std::collections::HashMap;
use std::time::Duration;

use crate::history::History;
use crate::layer::{ImageId, Layer};

/// Default time an image must stay unreferenced before it may be deleted.
pub const DEFAULT_GC_GRACE: Duration = Duration::from_secs(30 * 60);

/// Image reference table.
#[derive(Debug, Clone)]
pub struct ImageReferences {
    counts: HashMap<ImageId, usize>,
    /// First time (ms) each id was observed with no references.
    unused_since: HashMap<ImageId, u64>,
    grace: Duration,
}

impl Default for ImageReferences {
    fn default() -> Self {
        Self::new(DEFAULT_GC_GRACE)
    }
}

impl ImageReferences {
    /// Create an empty table with the given grace period.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            counts: HashMap::new(),
            unused_since: HashMap::new(),
            grace,
        }
    }

    /// Increment the count for an image.
    pub fn add_reference(&mut self, id: &ImageId) {
        *self.counts.entry(id.clone()).or_insert(0) += 1;
        self.unused_since.remove(id);
    }

    /// Decrement the count for an image. Over-decrements are logged and ignored.
    pub fn remove_reference(&mut self, id: &ImageId) {
        match self.counts.get_mut(id) {
            Some(count) if *count > 0 => *count -= 1,
            _ => {
                tracing::warn!(image_id = %id, "Reference count already zero, ignoring decrement");
            }
        }
    }

    /// Current count for an image (0 when unknown).
    #[must_use]
    pub fn count(&self, id: &ImageId) -> usize {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Recompute every count from the live layers and both history stacks.
    ///
    /// Ids that drop to zero start their grace period at `now_ms`; ids that
    /// are referenced again lose any pending grace period.
    pub fn rebuild(&mut self, live: &[Layer], history: &History, now_ms: u64) {
        let mut counts: HashMap<ImageId, usize> = HashMap::new();
        let referenced = live
            .iter()
            .flat_map(Layer::image_refs)
            .chain(history.image_ids());
        for id in referenced {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }

        for id in self.counts.keys() {
            if !counts.contains_key(id) {
                self.unused_since.entry(id.clone()).or_insert(now_ms);
            }
        }
        self.unused_since.retain(|id, _| !counts.contains_key(id));
        self.counts = counts;

        tracing::debug!(
            referenced = self.counts.len(),
            pending = self.unused_since.len(),
            "Image references rebuilt"
        );
    }

    /// Which of `stored` may be deleted at `now_ms`.
    ///
    /// Unreferenced ids seen for the first time are only recorded; they become
    /// collectable once the grace period has passed since that observation.
    pub fn collectable<'a>(
        &mut self,
        stored: impl IntoIterator<Item = &'a ImageId>,
        now_ms: u64,
    ) -> Vec<ImageId> {
        let grace_ms = u64::try_from(self.grace.as_millis()).unwrap_or(u64::MAX);
        let mut out = Vec::new();
        for id in stored {
            if self.count(id) > 0 {
                continue;
            }
            let since = *self.unused_since.entry(id.clone()).or_insert(now_ms);
            if now_ms.saturating_sub(since) >= grace_ms {
                out.push(id.clone());
            }
        }
        out
    }

    /// Record that `id` was already seen unreferenced at `since_ms`, e.g. by
    /// an earlier process. The earliest observation wins.
    pub fn observe_unused(&mut self, id: &ImageId, since_ms: u64) {
        if self.count(id) > 0 {
            return;
        }
        self.unused_since
            .entry(id.clone())
            .and_modify(|t| *t = (*t).min(since_ms))
            .or_insert(since_ms);
    }

    /// When `id` was first seen unreferenced, if it currently is.
    #[must_use]
    pub fn unused_since(&self, id: &ImageId) -> Option<u64> {
        self.unused_since.get(id).copied()
    }

    /// Drop all bookkeeping for an id after it has been deleted.
    pub fn forget(&mut self, id: &ImageId) {
        self.counts.remove(id);
        self.unused_since.remove(id);
    }

    /// Configured grace period.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }

    /// Number of ids with a non-zero count.
    #[must_use]
    pub fn referenced_len(&self) -> usize {
        self.counts.values().filter(|&&c| c > 0).count()
    }
}
