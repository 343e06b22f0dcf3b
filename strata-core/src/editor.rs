//! The editor: one instance owns one canvas and everything that edits it.
//!
//! Input flows through [`Editor::handle`] (or the per-event methods) into the
//! [`Interaction`] state machine. The returned [`Response`] is applied here:
//! rebases are mirrored into history, commits become snapshots followed by a
//! reference rebuild, and render/save requests are latched until the host
//! calls [`Editor::flush_render`] / [`Editor::take_save_request`].

use crate::canvas::Canvas;
use crate::config::EditorConfig;
use crate::document::CanvasDocument;
use crate::event::{InputEvent, Key, KeyEvent, PointerEvent, WheelEvent};
use crate::geometry::{Frame, Point};
use crate::history::History;
use crate::host::{MaskTool, NoMaskTool, NullRenderer, RenderScene, Renderer};
use crate::interaction::{Interaction, InteractionContext, InteractionMode, Response};
use crate::layer::{BlendMode, ImageId, Layer, LayerId};
use crate::references::ImageReferences;
use crate::selection::Selection;
use crate::time::current_timestamp_ms;
use crate::{EditorError, EditorResult};

/// Options for [`Editor::add_image`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddLayer {
    /// Display name for the new layer.
    pub name: Option<String>,
    /// Scale the image to fit inside the output area.
    pub fit_to_canvas: bool,
}

/// A layer-compositing editor instance.
pub struct Editor {
    canvas: Canvas,
    selection: Selection,
    interaction: Interaction,
    history: History,
    references: ImageReferences,
    config: EditorConfig,
    renderer: Box<dyn Renderer>,
    mask: Box<dyn MaskTool>,
    render_pending: bool,
    save_pending: bool,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("canvas", &self.canvas)
            .field("selection", &self.selection)
            .field("mode", &self.interaction.mode().name())
            .field("undo_len", &self.history.undo_len())
            .field("redo_len", &self.history.redo_len())
            .field("render_pending", &self.render_pending)
            .field("save_pending", &self.save_pending)
            .finish_non_exhaustive()
    }
}

impl Editor {
    /// Create an empty editor with default settings.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self::with_config(Canvas::new(width, height), EditorConfig::default())
    }

    /// Create an editor around an existing canvas.
    #[must_use]
    pub fn with_config(canvas: Canvas, config: EditorConfig) -> Self {
        let mut history = History::with_limit(config.history_limit);
        history.reset(canvas.layers());
        let mut references = ImageReferences::new(config.gc_grace());
        references.rebuild(canvas.layers(), &history, current_timestamp_ms());
        Self {
            canvas,
            selection: Selection::new(),
            interaction: Interaction::new(),
            history,
            references,
            config,
            renderer: Box::new(NullRenderer),
            mask: Box::new(NoMaskTool),
            render_pending: true,
            save_pending: false,
        }
    }

    /// Use the given renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Swap the renderer on a live editor.
    pub fn set_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = renderer;
        self.render_pending = true;
    }

    /// Use the given mask brush.
    #[must_use]
    pub fn with_mask_tool(mut self, mask: Box<dyn MaskTool>) -> Self {
        self.mask = mask;
        self
    }

    /// The live document.
    #[must_use]
    pub const fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Current selection.
    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Undo/redo stacks.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// Image reference table.
    #[must_use]
    pub const fn references(&self) -> &ImageReferences {
        &self.references
    }

    /// Settings.
    #[must_use]
    pub const fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Active gesture.
    #[must_use]
    pub const fn mode(&self) -> &InteractionMode {
        self.interaction.mode()
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    fn dispatch(
        &mut self,
        handler: impl FnOnce(&mut Interaction, &mut InteractionContext<'_>) -> Response,
    ) -> Response {
        let mut ctx = InteractionContext {
            canvas: &mut self.canvas,
            selection: &mut self.selection,
            mask: self.mask.as_mut(),
            config: &self.config,
        };
        let response = handler(&mut self.interaction, &mut ctx);
        self.apply(response);
        response
    }

    fn apply(&mut self, response: Response) {
        if let Some((dx, dy)) = response.rebased {
            self.history.rebase(dx, dy);
            self.save_pending = true;
        }
        if let Some(commit) = response.commit {
            self.commit(commit.replace_last);
        }
        if response.dirty {
            self.save_pending = true;
        }
        if response.render {
            self.render_pending = true;
        }
    }

    fn commit(&mut self, replace_last: bool) {
        self.history.snapshot(self.canvas.layers(), replace_last);
        self.update_references();
        self.save_pending = true;
        self.render_pending = true;
    }

    /// Route a recorded input to its handler.
    pub fn handle(&mut self, event: &InputEvent) -> Response {
        match event {
            InputEvent::PointerDown(e) => self.pointer_down(e),
            InputEvent::PointerMove(e) => self.pointer_move(e),
            InputEvent::PointerUp(e) => self.pointer_up(e),
            InputEvent::Wheel(e) => self.wheel(e),
            InputEvent::KeyDown(e) => self.key_down(e),
            InputEvent::KeyUp(e) => self.key_up(e),
        }
    }

    /// Button pressed.
    pub fn pointer_down(&mut self, event: &PointerEvent) -> Response {
        self.dispatch(|i, c| i.pointer_down(c, event))
    }

    /// Pointer moved.
    pub fn pointer_move(&mut self, event: &PointerEvent) -> Response {
        self.dispatch(|i, c| i.pointer_move(c, event))
    }

    /// Button released.
    pub fn pointer_up(&mut self, event: &PointerEvent) -> Response {
        self.dispatch(|i, c| i.pointer_up(c, event))
    }

    /// Wheel scrolled.
    pub fn wheel(&mut self, event: &WheelEvent) -> Response {
        self.dispatch(|i, c| i.wheel(c, event))
    }

    /// Key pressed. Undo/redo shortcuts are handled here while idle.
    pub fn key_down(&mut self, event: &KeyEvent) -> Response {
        if event.modifiers.command() && self.interaction.mode().is_idle() {
            let changed = match event.key {
                Key::Char('z') if event.modifiers.shift => Some(self.redo()),
                Key::Char('z') => Some(self.undo()),
                Key::Char('y') => Some(self.redo()),
                _ => None,
            };
            if let Some(changed) = changed {
                return if changed {
                    Response::render()
                } else {
                    Response::NONE
                };
            }
        }
        self.dispatch(|i, c| i.key_down(c, event))
    }

    /// Key released.
    pub fn key_up(&mut self, event: &KeyEvent) -> Response {
        self.dispatch(|i, c| i.key_up(c, event))
    }

    /// Abandon the active gesture.
    pub fn cancel_interaction(&mut self) -> Response {
        self.dispatch(Interaction::cancel)
    }

    // -----------------------------------------------------------------------
    // Toolbar operations
    // -----------------------------------------------------------------------

    /// Place a stored image as a new top layer, centred in the output area,
    /// and select it.
    pub fn add_image(&mut self, image_id: ImageId, width: f64, height: f64, options: &AddLayer) -> LayerId {
        let mut layer = Layer::new(image_id, width, height);
        if let Some(name) = &options.name {
            layer.name.clone_from(name);
        }

        let (cw, ch) = (self.canvas.width, self.canvas.height);
        let (w, h) = if options.fit_to_canvas && cw > 0.0 && ch > 0.0 {
            let scale = (cw / layer.width).min(ch / layer.height);
            (layer.width * scale, layer.height * scale)
        } else {
            (layer.width, layer.height)
        };
        layer.set_frame(Frame::from_center(Point::new(cw / 2.0, ch / 2.0), w, h, 0.0));

        let id = self.canvas.add_layer(layer);
        self.selection.select_only(id);
        self.commit(false);
        tracing::info!(layer_id = %id, width = w, height = h, "Layer added");
        id
    }

    /// Remove every selected layer. Returns how many were removed.
    pub fn delete_selected(&mut self) -> usize {
        let ids = self.selection.ids().to_vec();
        let removed = self.canvas.remove_layers(&ids);
        self.selection.clear();
        if !removed.is_empty() {
            self.commit(false);
        }
        removed.len()
    }

    /// Copy every selected layer, offset slightly, and select the copies.
    pub fn duplicate_selected(&mut self) -> Vec<LayerId> {
        let offset = self.config.nudge.1;
        let copies: Vec<Layer> = self
            .selection
            .ids()
            .iter()
            .filter_map(|&id| self.canvas.layer(id))
            .map(|layer| {
                let mut copy = layer.duplicate();
                copy.translate(offset, offset);
                copy
            })
            .collect();
        let ids: Vec<LayerId> = copies
            .into_iter()
            .map(|copy| self.canvas.add_layer(copy))
            .collect();
        if !ids.is_empty() {
            self.selection.set(ids.iter().copied());
            self.commit(false);
        }
        ids
    }

    fn edit_selected(&mut self, mut edit: impl FnMut(&mut Layer)) -> bool {
        let mut touched = false;
        for id in self.selection.ids() {
            if let Some(layer) = self.canvas.layer_mut(*id) {
                edit(layer);
                touched = true;
            }
        }
        if touched {
            self.commit(false);
        }
        touched
    }

    /// Set the opacity of every selected layer.
    pub fn set_opacity(&mut self, opacity: f64) -> bool {
        self.edit_selected(|layer| layer.set_opacity(opacity))
    }

    /// Set the blend mode of every selected layer.
    pub fn set_blend_mode(&mut self, mode: BlendMode) -> bool {
        self.edit_selected(|layer| layer.blend_mode = mode)
    }

    /// Show or hide every selected layer.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        self.edit_selected(|layer| layer.visible = visible)
    }

    /// Attach or clear a layer's own alpha mask.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer does not exist.
    pub fn set_layer_mask(&mut self, id: LayerId, mask: Option<ImageId>) -> EditorResult<()> {
        let layer = self
            .canvas
            .layer_mut(id)
            .ok_or_else(|| EditorError::LayerNotFound(id.to_string()))?;
        layer.mask = mask;
        self.commit(false);
        Ok(())
    }

    /// Move every selected layer one step up the stack.
    pub fn raise_selected(&mut self) -> bool {
        self.restack_selected(true)
    }

    /// Move every selected layer one step down the stack.
    pub fn lower_selected(&mut self) -> bool {
        self.restack_selected(false)
    }

    fn restack_selected(&mut self, up: bool) -> bool {
        let mut ordered: Vec<LayerId> = self
            .canvas
            .layers_by_z()
            .iter()
            .map(|l| l.id)
            .filter(|id| self.selection.contains(*id))
            .collect();
        // Move the layer nearest the target end first so neighbours don't swap back.
        if up {
            ordered.reverse();
        }
        let mut changed = false;
        for id in ordered {
            changed |= if up {
                self.canvas.raise(id)
            } else {
                self.canvas.lower(id)
            };
        }
        if changed {
            self.commit(false);
        }
        changed
    }

    /// Select a layer, optionally adding to the current selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer does not exist.
    pub fn select_layer(&mut self, id: LayerId, additive: bool) -> EditorResult<()> {
        if self.canvas.layer(id).is_none() {
            return Err(EditorError::LayerNotFound(id.to_string()));
        }
        if additive {
            self.selection.add(id);
        } else {
            self.selection.select_only(id);
        }
        self.render_pending = true;
        Ok(())
    }

    /// Deselect everything.
    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.render_pending = true;
        }
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Step back one history entry. Returns false at the oldest entry.
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(entry) => {
                self.restore_layers(entry.to_layers());
                tracing::debug!(undo_len = self.history.undo_len(), "Undo");
                true
            }
            None => false,
        }
    }

    /// Step forward one history entry. Returns false if nothing was undone.
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(entry) => {
                self.restore_layers(entry.to_layers());
                tracing::debug!(redo_len = self.history.redo_len(), "Redo");
                true
            }
            None => false,
        }
    }

    fn restore_layers(&mut self, layers: Vec<Layer>) {
        self.canvas.set_layers(layers);
        let dropped = self.selection.retain_existing(&self.canvas);
        if dropped > 0 {
            tracing::debug!(dropped, "Selection reconciled after history change");
        }
        self.interaction.reset();
        self.update_references();
        self.save_pending = true;
        self.render_pending = true;
    }

    // -----------------------------------------------------------------------
    // Persistence hooks
    // -----------------------------------------------------------------------

    /// Capture the persisted state.
    #[must_use]
    pub fn document(&self, saved_at: u64) -> CanvasDocument {
        CanvasDocument::from_canvas(&self.canvas, saved_at)
    }

    /// Replace everything with a loaded document. History restarts with
    /// exactly one entry.
    pub fn restore_document(&mut self, document: CanvasDocument) {
        self.canvas = document.into_canvas();
        self.selection.clear();
        self.interaction.reset();
        self.history.reset(self.canvas.layers());
        self.update_references();
        self.save_pending = false;
        self.render_pending = true;
        tracing::info!(layers = self.canvas.layer_count(), "Document restored");
    }

    /// Recount image references from the live layers and both history stacks.
    pub fn update_references(&mut self) {
        self.references
            .rebuild(self.canvas.layers(), &self.history, current_timestamp_ms());
    }

    /// Rebuild references and report which of `stored` may be deleted at `now_ms`.
    pub fn collectable_images(&mut self, stored: &[ImageId], now_ms: u64) -> Vec<ImageId> {
        self.references
            .rebuild(self.canvas.layers(), &self.history, now_ms);
        self.references.collectable(stored, now_ms)
    }

    /// Merge first-unused observations persisted by an earlier collection.
    pub fn seed_unused_since<'a>(&mut self, observed: impl IntoIterator<Item = (&'a ImageId, &'a u64)>) {
        for (id, since) in observed {
            self.references.observe_unused(id, *since);
        }
    }

    /// When `id` was first seen unreferenced by this editor, if it currently is.
    #[must_use]
    pub fn image_unused_since(&self, id: &ImageId) -> Option<u64> {
        self.references.unused_since(id)
    }

    /// Drop bookkeeping for deleted images.
    pub fn forget_images(&mut self, ids: &[ImageId]) {
        for id in ids {
            self.references.forget(id);
        }
    }

    /// Ask for the state to be persisted again (e.g. after a failed save).
    pub fn request_save(&mut self) {
        self.save_pending = true;
    }

    /// Whether a save is pending, without clearing the flag.
    #[must_use]
    pub const fn has_pending_save(&self) -> bool {
        self.save_pending
    }

    /// Whether a save was requested since the last call, clearing the flag.
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.save_pending)
    }

    /// Whether a paint is pending.
    #[must_use]
    pub const fn needs_render(&self) -> bool {
        self.render_pending
    }

    /// Paint once if anything asked for it since the last flush.
    pub fn flush_render(&mut self) -> bool {
        if !self.render_pending {
            return false;
        }
        self.render_pending = false;
        let scene = RenderScene {
            canvas: &self.canvas,
            selection: &self.selection,
            canvas_preview: self.interaction.canvas_preview(),
        };
        self.renderer.render(&scene);
        true
    }
}
