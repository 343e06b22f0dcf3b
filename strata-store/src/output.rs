//! Hand-off of the composited canvas to whatever consumes it downstream.
//!
//! The page submits the flattened image (and optional mask) as encoded
//! bytes; a consumer asks for the output with [`OutputSlot::process`]. Only
//! one pass decodes at a time. A consumer arriving while a pass is running
//! gets the previous result instead of waiting.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use strata_core::{current_timestamp_ms, ImageId};

use crate::error::StoreResult;
use crate::images::DecodedImage;

/// Size of the placeholder emitted when nothing was submitted.
pub const BLANK_OUTPUT_SIZE: u32 = 512;

/// A published output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasOutput {
    /// Monotonic id of the pass that produced this output.
    pub execution_id: u64,
    /// Flattened canvas.
    pub image: DecodedImage,
    /// Painted mask; blank at the image's size when none was submitted.
    pub mask: DecodedImage,
}

#[derive(Debug)]
struct Submission {
    image: Vec<u8>,
    mask: Option<Vec<u8>>,
}

/// Latest composited output plus the bytes waiting to become the next one.
#[derive(Debug, Default)]
pub struct OutputSlot {
    submitted: Mutex<Option<Submission>>,
    latest: Mutex<Option<Arc<CanvasOutput>>>,
    busy: AtomicBool,
    last_execution: AtomicU64,
}

/// Exclusive right to produce the next output. Dropping it without
/// publishing releases the slot.
#[derive(Debug)]
pub struct OutputPass<'a> {
    slot: &'a OutputSlot,
    execution_id: u64,
}

impl OutputPass<'_> {
    /// Id this pass will publish under.
    #[must_use]
    pub const fn execution_id(&self) -> u64 {
        self.execution_id
    }

    /// Make `image`/`mask` the latest output.
    pub fn publish(self, image: DecodedImage, mask: DecodedImage) -> Arc<CanvasOutput> {
        let output = Arc::new(CanvasOutput {
            execution_id: self.execution_id,
            image,
            mask,
        });
        *self
            .slot
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&output));
        tracing::info!(execution_id = self.execution_id, "Published canvas output");
        output
    }
}

impl Drop for OutputPass<'_> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

impl OutputSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue encoded bytes for the next pass, replacing any earlier submission.
    pub fn submit(&self, image: Vec<u8>, mask: Option<Vec<u8>>) {
        *self
            .submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Submission { image, mask });
    }

    /// Whether a submission is waiting.
    #[must_use]
    pub fn has_submission(&self) -> bool {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The most recently published output.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<CanvasOutput>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Claim the slot, or `None` while another pass holds it.
    #[must_use]
    pub fn try_begin(&self) -> Option<OutputPass<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return None;
        }
        let now = current_timestamp_ms();
        let previous = self.last_execution.load(Ordering::Acquire);
        let execution_id = now.max(previous + 1);
        self.last_execution.store(execution_id, Ordering::Release);
        Some(OutputPass {
            slot: self,
            execution_id,
        })
    }

    /// Decode the pending submission and publish it.
    ///
    /// Without a submission a blank 512x512 image and mask are published. If
    /// another pass is running the previous output is returned unchanged (or
    /// `None` if there has never been one).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Decode`] if the submitted bytes are corrupt.
    /// The submission is consumed either way.
    pub async fn process(&self) -> StoreResult<Option<Arc<CanvasOutput>>> {
        let Some(pass) = self.try_begin() else {
            tracing::warn!("Output pass already in progress, returning cached output");
            return Ok(self.latest());
        };

        let submission = self
            .submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let (image, mask) = match submission {
            Some(Submission { image, mask }) => {
                let tag = ImageId::new(format!("output-{}", pass.execution_id()));
                tokio::task::spawn_blocking(move || {
                    let image = DecodedImage::decode(&tag, &image)?;
                    let mask = match mask {
                        Some(bytes) => DecodedImage::decode(&tag, &bytes)?,
                        None => DecodedImage::blank(image.width, image.height),
                    };
                    Ok::<_, crate::StoreError>((image, mask))
                })
                .await
                .map_err(|e| crate::StoreError::Session(format!("output decode task failed: {e}")))??
            }
            None => {
                tracing::warn!("No canvas output submitted, publishing blank image");
                (
                    DecodedImage::blank(BLANK_OUTPUT_SIZE, BLANK_OUTPUT_SIZE),
                    DecodedImage::blank(BLANK_OUTPUT_SIZE, BLANK_OUTPUT_SIZE),
                )
            }
        };
        Ok(Some(pass.publish(image, mask)))
    }
}
