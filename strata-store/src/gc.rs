//! Garbage collection of stored images nothing references any more.

use std::sync::atomic::{AtomicBool, Ordering};

use strata_core::ImageId;

use crate::error::StoreResult;
use crate::images::ImageStore;

/// Outcome of one collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Another pass was already running; nothing was done.
    pub skipped: bool,
    /// Number of stored ids examined.
    pub scanned: usize,
    /// Ids deleted from the store and cache.
    pub removed: Vec<ImageId>,
    /// Ids whose deletion failed (retried on the next pass).
    pub failed: Vec<ImageId>,
}

impl GcReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Runs at most one collection at a time.
///
/// Overlapping calls return a skipped report immediately instead of queueing.
#[derive(Debug, Default)]
pub struct GarbageCollector {
    running: AtomicBool,
}

/// Clears the running flag when the pass ends, including on early return.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl GarbageCollector {
    /// Create an idle collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pass is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Enumerate stored images, ask `select` which may go, and delete those.
    ///
    /// `select` receives every stored id and must return only ids that are
    /// unreferenced and past their grace period; it is expected to rebuild the
    /// reference table first.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored ids cannot be listed. Individual delete
    /// failures are reported in [`GcReport::failed`] instead.
    pub async fn collect<F>(&self, images: &ImageStore, select: F) -> StoreResult<GcReport>
    where
        F: FnOnce(&[ImageId]) -> Vec<ImageId>,
    {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!("Garbage collection already running, skipping");
            return Ok(GcReport::skipped());
        }
        let _guard = RunningGuard(&self.running);

        let stored = images.all_image_ids().await?;
        let doomed = select(&stored);

        let mut report = GcReport {
            scanned: stored.len(),
            ..GcReport::default()
        };
        for id in doomed {
            match images.remove_image(&id).await {
                Ok(()) => report.removed.push(id),
                Err(e) => {
                    tracing::warn!(image = %id, error = %e, "Failed to delete unreferenced image");
                    report.failed.push(id);
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Garbage collection finished"
        );
        Ok(report)
    }
}
