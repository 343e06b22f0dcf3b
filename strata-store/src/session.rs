//! Per-instance editor context: load, debounced autosave, immediate save, GC.
//!
//! Each [`EditorSession`] owns its own in-flight state, so two editors on
//! one page never share a lock or a timer. Load and immediate save are
//! single-flight: a caller arriving while one runs awaits the same result.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use strata_core::{
    current_timestamp_ms, AddLayer, Canvas, CanvasDocument, Editor, EditorConfig, ImageId,
    InputEvent, LayerId, Response,
};

use crate::backend::{PersistentStore, UnusedLedger};
use crate::error::{StoreError, StoreResult};
use crate::gc::{GarbageCollector, GcReport};
use crate::images::{DecodedImage, ImageStore};
use crate::output::OutputSlot;

/// Default autosave debounce.
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 750;

/// Default output area for an instance with no persisted state.
pub const DEFAULT_CANVAS_SIZE: f64 = 512.0;

/// Settings for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period after the last change before autosave writes.
    pub autosave_debounce_ms: u64,
    /// Output width for a fresh instance.
    pub canvas_width: f64,
    /// Output height for a fresh instance.
    pub canvas_height: f64,
    /// Editor behaviour.
    pub editor: EditorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            canvas_width: DEFAULT_CANVAS_SIZE,
            canvas_height: DEFAULT_CANVAS_SIZE,
            editor: EditorConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `STRATA_AUTOSAVE_MS` (default: 750) plus everything
    /// [`EditorConfig::from_env`] reads.
    #[must_use]
    pub fn from_env() -> Self {
        let autosave_debounce_ms = std::env::var("STRATA_AUTOSAVE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_AUTOSAVE_DEBOUNCE_MS);
        Self {
            autosave_debounce_ms,
            editor: EditorConfig::from_env(),
            ..Self::default()
        }
    }

    /// Debounce as a [`Duration`].
    #[must_use]
    pub const fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}

/// Result of [`EditorSession::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// State restored; `dropped` layers referenced images that could not be resolved.
    Loaded {
        /// Layers now on the canvas.
        layers: usize,
        /// Layers discarded during resolution.
        dropped: usize,
    },
    /// Nothing usable was persisted; the editor is untouched.
    NoState,
}

/// Result of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    /// Layers written.
    pub layers: usize,
    /// Pending images uploaded first.
    pub uploaded: usize,
    /// Timestamp stored in the document.
    pub saved_at: u64,
}

type SharedTask<T> = Shared<BoxFuture<'static, Result<T, Arc<StoreError>>>>;

struct Inner {
    key: String,
    config: SessionConfig,
    editor: Mutex<Editor>,
    images: ImageStore,
    gc: GarbageCollector,
    output: OutputSlot,
    load_flight: Mutex<Option<SharedTask<LoadOutcome>>>,
    save_flight: Mutex<Option<SharedTask<SaveReport>>>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

/// One editor instance bound to a persistence key.
///
/// Cheap to clone; clones share the same editor and in-flight state.
#[derive(Clone)]
pub struct EditorSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("key", &self.inner.key)
            .field("config", &self.inner.config)
            .field("images", &self.inner.images)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Await the task in `slot`, starting one with `start` if none is running.
async fn single_flight<T>(
    slot: &Mutex<Option<SharedTask<T>>>,
    start: impl FnOnce() -> BoxFuture<'static, Result<T, Arc<StoreError>>>,
) -> StoreResult<T>
where
    T: Clone + Send + Sync + 'static,
{
    let task = {
        let mut guard = lock(slot);
        match guard.as_ref() {
            Some(running) if running.peek().is_none() => {
                tracing::debug!("Joining in-flight operation");
                running.clone()
            }
            _ => {
                let task = start().shared();
                *guard = Some(task.clone());
                task
            }
        }
    };

    let result = task.clone().await;
    {
        let mut guard = lock(slot);
        if guard.as_ref().is_some_and(|t| t.ptr_eq(&task)) {
            *guard = None;
        }
    }
    drop(task);
    result.map_err(|e| Arc::try_unwrap(e).unwrap_or_else(|e| StoreError::Session(e.to_string())))
}

impl EditorSession {
    /// Create a session with an empty editor. Call [`Self::load`] to restore
    /// persisted state.
    #[must_use]
    pub fn new(key: impl Into<String>, store: Arc<dyn PersistentStore>, config: SessionConfig) -> Self {
        let canvas = Canvas::new(config.canvas_width, config.canvas_height);
        let editor = Editor::with_config(canvas, config.editor.clone());
        Self {
            inner: Arc::new(Inner {
                key: key.into(),
                config,
                editor: Mutex::new(editor),
                images: ImageStore::new(store),
                gc: GarbageCollector::new(),
                output: OutputSlot::new(),
                load_flight: Mutex::new(None),
                save_flight: Mutex::new(None),
                autosave: Mutex::new(None),
            }),
        }
    }

    /// Persistence key of this instance.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Session settings.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Image bytes and decoded cache.
    #[must_use]
    pub fn images(&self) -> &ImageStore {
        &self.inner.images
    }

    /// Composited output hand-off.
    #[must_use]
    pub fn output(&self) -> &OutputSlot {
        &self.inner.output
    }

    /// Lock the editor for reading. Do not hold the guard across an `.await`.
    pub fn editor(&self) -> MutexGuard<'_, Editor> {
        lock(&self.inner.editor)
    }

    /// Mutate the editor, then schedule an autosave if anything changed.
    pub fn with_editor<R>(&self, f: impl FnOnce(&mut Editor) -> R) -> R {
        let (result, dirty) = {
            let mut editor = self.editor();
            let result = f(&mut editor);
            (result, editor.has_pending_save())
        };
        if dirty {
            self.schedule_save();
        }
        result
    }

    /// Feed one input event.
    pub fn handle(&self, event: &InputEvent) -> Response {
        self.with_editor(|editor| editor.handle(event))
    }

    /// Whether unsaved changes exist.
    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.editor().has_pending_save()
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// Decode and cache new image bytes; they upload with the next save.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the bytes are not an image.
    pub async fn import_image(&self, bytes: Vec<u8>) -> StoreResult<(ImageId, DecodedImage)> {
        self.inner.images.import(bytes).await
    }

    /// Import image bytes and place them as a new selected layer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the bytes are not an image.
    pub async fn add_image(&self, bytes: Vec<u8>, options: &AddLayer) -> StoreResult<LayerId> {
        let (id, image) = self.import_image(bytes).await?;
        Ok(self.with_editor(|editor| {
            editor.add_image(id, f64::from(image.width), f64::from(image.height), options)
        }))
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    /// Restore persisted state into the editor.
    ///
    /// Layers whose image cannot be resolved are dropped and logged. When no
    /// layer survives, [`LoadOutcome::NoState`] is returned and the editor is
    /// left as it was. Concurrent callers share one load.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be read or parsed.
    pub async fn load(&self) -> StoreResult<LoadOutcome> {
        let session = self.clone();
        single_flight(&self.inner.load_flight, move || {
            async move { session.load_inner().await.map_err(Arc::new) }.boxed()
        })
        .await
    }

    async fn load_inner(&self) -> StoreResult<LoadOutcome> {
        let store = self.inner.images.store();
        let Some(mut document) = store.get_state(&self.inner.key).await? else {
            tracing::info!(key = %self.inner.key, "No persisted state");
            return Ok(LoadOutcome::NoState);
        };

        let mut resolvable = HashSet::new();
        for id in document.image_ids() {
            match self.inner.images.decoded(&id).await {
                Ok(_) => {
                    resolvable.insert(id);
                }
                Err(e) => tracing::error!(image = %id, error = %e, "Cannot resolve image"),
            }
        }

        let dropped = document.retain_resolvable(|id| resolvable.contains(id));
        for layer in &dropped {
            tracing::error!(
                layer = %layer.id,
                image = %layer.image_id,
                "Dropping layer whose image cannot be resolved"
            );
        }

        if document.layers.is_empty() {
            tracing::warn!(key = %self.inner.key, dropped = dropped.len(), "Persisted state has no usable layers");
            return Ok(LoadOutcome::NoState);
        }

        let layers = document.layers.len();
        self.editor().restore_document(document);
        tracing::info!(key = %self.inner.key, layers, dropped = dropped.len(), "Session loaded");
        Ok(LoadOutcome::Loaded {
            layers,
            dropped: dropped.len(),
        })
    }

    // -----------------------------------------------------------------------
    // Save
    // -----------------------------------------------------------------------

    /// Persist the current state now, uploading pending images first.
    ///
    /// Cancels a pending autosave timer. Concurrent callers share one save.
    /// On failure the session stays dirty so the next trigger retries.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub async fn save_now(&self) -> StoreResult<SaveReport> {
        self.cancel_autosave();
        self.save_shared().await
    }

    async fn save_shared(&self) -> StoreResult<SaveReport> {
        let session = self.clone();
        single_flight(&self.inner.save_flight, move || {
            async move { session.save_inner().await.map_err(Arc::new) }.boxed()
        })
        .await
    }

    /// Save only if something changed since the last save.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub async fn flush(&self) -> StoreResult<Option<SaveReport>> {
        if self.has_pending_save() {
            self.save_now().await.map(Some)
        } else {
            self.cancel_autosave();
            Ok(None)
        }
    }

    async fn save_inner(&self) -> StoreResult<SaveReport> {
        let (document, ids) = {
            let mut editor = self.editor();
            editor.take_save_request();
            let document = editor.document(current_timestamp_ms());
            let ids = document.image_ids();
            (document, ids)
        };

        let written = async {
            let uploaded = self.inner.images.flush_pending(&ids).await?;
            self.inner
                .images
                .store()
                .set_state(&self.inner.key, &document)
                .await?;
            Ok::<_, StoreError>(uploaded)
        }
        .await;

        match written {
            Ok(uploaded) => {
                let report = SaveReport {
                    layers: document.layers.len(),
                    uploaded,
                    saved_at: document.saved_at,
                };
                tracing::info!(
                    key = %self.inner.key,
                    layers = report.layers,
                    uploaded,
                    "Session saved"
                );
                Ok(report)
            }
            Err(e) => {
                self.editor().request_save();
                tracing::warn!(key = %self.inner.key, error = %e, "Save failed, will retry");
                Err(e)
            }
        }
    }

    /// (Re)start the autosave timer.
    ///
    /// The previous timer is aborted, so a burst of changes saves once, one
    /// debounce after the last change. A failed write is retried every
    /// debounce until it succeeds or the timer is cancelled. Outside a Tokio runtime this is a
    /// no-op and the session stays dirty.
    pub fn schedule_save(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(key = %self.inner.key, "No runtime, autosave not scheduled");
            return;
        };
        let session = self.clone();
        let delay = self.inner.config.autosave_debounce();

        let mut slot = lock(&self.inner.autosave);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(runtime.spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                match session.save_shared().await {
                    Ok(_) if session.has_pending_save() => {}
                    Ok(_) => break,
                    Err(e) if session.has_pending_save() => {
                        tracing::warn!(key = %session.inner.key, error = %e, "Autosave failed, retrying");
                    }
                    Err(e) => {
                        tracing::warn!(key = %session.inner.key, error = %e, "Autosave failed");
                        break;
                    }
                }
            }
        }));
    }

    /// Stop a pending autosave; unsaved changes stay pending.
    pub fn cancel_autosave(&self) {
        if let Some(handle) = lock(&self.inner.autosave).take() {
            handle.abort();
        }
    }

    /// Forget the persisted state and start over with an empty editor.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub async fn discard(&self) -> StoreResult<()> {
        self.cancel_autosave();
        self.inner.images.store().remove_state(&self.inner.key).await?;
        let config = &self.inner.config;
        let empty = CanvasDocument::from_canvas(
            &Canvas::new(config.canvas_width, config.canvas_height),
            current_timestamp_ms(),
        );
        self.editor().restore_document(empty);
        tracing::info!(key = %self.inner.key, "Session discarded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Garbage collection
    // -----------------------------------------------------------------------

    /// Delete stored images that nothing live or in history references and
    /// that have stayed unreferenced for the grace period.
    ///
    /// Images referenced by any other instance's persisted state on the same
    /// store are never candidates. First-unused observations are kept in the
    /// store, so the grace period spans separate processes.
    ///
    /// # Errors
    ///
    /// Returns an error if stored ids or other instances' states cannot be read.
    pub async fn collect_garbage(&self) -> StoreResult<GcReport> {
        let store = self.inner.images.store();
        let protected = self.foreign_references().await?;
        let observed = store.get_unused_ledger().await?;
        let now = current_timestamp_ms();

        let mut ledger = UnusedLedger::new();
        let report = self
            .inner
            .gc
            .collect(&self.inner.images, |stored| {
                let candidates: Vec<ImageId> = stored
                    .iter()
                    .filter(|id| !protected.contains(*id))
                    .cloned()
                    .collect();
                let mut editor = self.editor();
                editor.seed_unused_since(&observed);
                let doomed = editor.collectable_images(&candidates, now);
                ledger = candidates
                    .iter()
                    .filter_map(|id| editor.image_unused_since(id).map(|t| (id.clone(), t)))
                    .collect();
                doomed
            })
            .await?;
        if report.skipped {
            return Ok(report);
        }

        if !report.removed.is_empty() {
            self.editor().forget_images(&report.removed);
        }
        for id in &report.removed {
            ledger.remove(id);
        }
        if let Err(e) = store.set_unused_ledger(&ledger).await {
            tracing::warn!(key = %self.inner.key, error = %e, "Failed to persist unused image ledger");
        }
        Ok(report)
    }

    /// Image ids reachable from every persisted state except this instance's.
    async fn foreign_references(&self) -> StoreResult<HashSet<ImageId>> {
        let store = self.inner.images.store();
        let mut referenced = HashSet::new();
        for key in store.list_state_keys().await? {
            // A backend that renames keys makes our own state look foreign,
            // which only protects more.
            if key == self.inner.key {
                continue;
            }
            if let Some(document) = store.get_state(&key).await? {
                referenced.extend(document.image_ids());
            }
        }
        tracing::debug!(key = %self.inner.key, referenced = referenced.len(), "Collected references of other instances");
        Ok(referenced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.autosave_debounce(), Duration::from_millis(750));
        assert!((config.canvas_width - 512.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_session_config_from_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"autosave_debounce_ms":20}"#).expect("parse");
        assert_eq!(config.autosave_debounce_ms, 20);
        assert_eq!(config.editor.history_limit, 100);
    }

    #[test]
    fn test_schedule_without_runtime_keeps_dirty() {
        let session = EditorSession::new("k", Arc::new(MemoryStore::new()), SessionConfig::default());
        session.with_editor(|e| e.request_save());
        assert!(session.has_pending_save());
    }

    #[tokio::test]
    async fn test_load_without_state() {
        let session = EditorSession::new("k", Arc::new(MemoryStore::new()), SessionConfig::default());
        assert_eq!(session.load().await.expect("load"), LoadOutcome::NoState);
    }

    #[tokio::test]
    async fn test_flush_skips_clean_session() {
        let store = Arc::new(MemoryStore::new());
        let session = EditorSession::new("k", store.clone(), SessionConfig::default());
        assert!(session.flush().await.expect("flush").is_none());
        assert!(store.get_state("k").await.expect("get").is_none());
    }
}
