//! Pointer and keyboard state machine.
//!
//! Exactly one [`InteractionMode`] is active at a time. Every handler runs
//! synchronously against an [`InteractionContext`] borrowed from the editor
//! and returns a [`Response`] saying what the editor should do next (paint,
//! snapshot history, persist, rebase history).
//!
//! ```text
//!                 ┌──────────────┐ move > threshold ┌──────────┐
//!   down on layer │ PotentialDrag│ ───────────────▶ │ Dragging │
//!        ┌──────▶ └──────────────┘                  └──────────┘
//!        │                 │ up (click)                  │ up: snapshot
//!   ┌────┴─┐ ◀─────────────┘                             │
//!   │ None │ ◀───────────────────────────────────────────┘
//!   └────┬─┘ ◀── up ── Panning │ Resizing │ Rotating │ ResizingCanvas
//!        │                     │ MovingCanvas │ DrawingMask
//!        └── down on handle / background / with mask tool armed ──▶
//! ```

use crate::canvas::Canvas;
use crate::config::EditorConfig;
use crate::event::{Key, KeyEvent, KeyModifiers, PointerButton, PointerEvent, WheelEvent};
use crate::geometry::{self, Frame, Point, Rect, ResizeHandle, SnapAdjustment, StepDirection};
use crate::host::MaskTool;
use crate::layer::{Layer, LayerHandle, LayerId};
use crate::selection::Selection;

/// Everything a handler may read or mutate, borrowed from the editor.
pub struct InteractionContext<'a> {
    /// The live document.
    pub canvas: &'a mut Canvas,
    /// Current selection.
    pub selection: &'a mut Selection,
    /// The mask brush.
    pub mask: &'a mut dyn MaskTool,
    /// Tuning knobs.
    pub config: &'a EditorConfig,
}

impl InteractionContext<'_> {
    fn to_world(&self, screen: Point) -> Point {
        self.canvas.viewport.screen_to_world(screen)
    }

    fn zoom(&self) -> f64 {
        self.canvas.viewport.zoom
    }
}

/// A request to record the current layers in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    /// Drop the top entry first so the gesture collapses into one entry.
    pub replace_last: bool,
}

/// What the editor must do after an input was handled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Response {
    /// The picture changed.
    pub render: bool,
    /// Take a history snapshot.
    pub commit: Option<Commit>,
    /// Persisted state changed outside the layer list (viewport, canvas size).
    pub dirty: bool,
    /// The world origin moved by this delta; recorded history must follow.
    pub rebased: Option<(f64, f64)>,
}

impl Response {
    /// Nothing to do.
    pub const NONE: Self = Self {
        render: false,
        commit: None,
        dirty: false,
        rebased: None,
    };

    /// Repaint only.
    #[must_use]
    pub const fn render() -> Self {
        Self {
            render: true,
            ..Self::NONE
        }
    }

    /// Repaint and snapshot.
    #[must_use]
    pub const fn commit(replace_last: bool) -> Self {
        Self {
            render: true,
            commit: Some(Commit { replace_last }),
            ..Self::NONE
        }
    }

    /// Repaint and persist.
    #[must_use]
    pub const fn dirty() -> Self {
        Self {
            render: true,
            dirty: true,
            ..Self::NONE
        }
    }
}

/// Scratch state of a layer drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    start_world: Point,
    /// Layers being moved and their top-left at gesture start.
    targets: Vec<(LayerId, Point)>,
    /// Layers that were selected before an Alt-clone retargeted the drag.
    originals: Vec<LayerId>,
    cloned: bool,
}

impl DragState {
    fn begin(canvas: &Canvas, selection: &Selection, start_world: Point) -> Self {
        let targets = selection
            .ids()
            .iter()
            .filter_map(|&id| canvas.layer(id).map(|l| (id, Point::new(l.x, l.y))))
            .collect();
        Self {
            start_world,
            targets,
            originals: Vec::new(),
            cloned: false,
        }
    }

    /// Whether this gesture already duplicated its layers.
    #[must_use]
    pub const fn has_cloned(&self) -> bool {
        self.cloned
    }

    /// Layers currently being dragged.
    pub fn targets(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.targets.iter().map(|(id, _)| *id)
    }
}

/// The active gesture.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InteractionMode {
    /// Idle.
    #[default]
    None,
    /// Dragging the view around.
    Panning {
        /// Last pointer position (screen).
        last: Point,
        /// Whether the view has moved since the press.
        moved: bool,
    },
    /// Pressed on a layer, not yet past the drag threshold.
    PotentialDrag {
        /// Layer under the press.
        layer: LayerId,
        /// Press position (screen).
        start_screen: Point,
        /// Press position (world).
        start_world: Point,
        /// A click without movement narrows the selection to `layer`.
        narrow: bool,
    },
    /// Moving the selected layers.
    Dragging(DragState),
    /// Dragging a resize grip.
    Resizing {
        /// Layer being resized.
        layer: LayerId,
        /// Grip being dragged.
        handle: ResizeHandle,
        /// Frame at gesture start.
        start: Frame,
    },
    /// Dragging the rotation grip.
    Rotating {
        /// Layer being rotated.
        layer: LayerId,
        /// Pivot (world).
        center: Point,
        /// Press position (world).
        start_pointer: Point,
        /// Rotation at gesture start.
        start_rotation: f64,
    },
    /// Shift-dragging a new output rectangle.
    ResizingCanvas {
        /// Press position (world).
        start: Point,
        /// Current pointer (world).
        current: Point,
    },
    /// Shift+Ctrl-dragging the output area over the content.
    MovingCanvas {
        /// Last pointer position (screen).
        last: Point,
        /// Accumulated world rebase so far.
        total: (f64, f64),
    },
    /// Input belongs to the mask brush.
    DrawingMask {
        /// Last pointer position (world).
        last: Point,
    },
}

impl InteractionMode {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Panning { .. } => "panning",
            Self::PotentialDrag { .. } => "potential_drag",
            Self::Dragging(_) => "dragging",
            Self::Resizing { .. } => "resizing",
            Self::Rotating { .. } => "rotating",
            Self::ResizingCanvas { .. } => "resizing_canvas",
            Self::MovingCanvas { .. } => "moving_canvas",
            Self::DrawingMask { .. } => "drawing_mask",
        }
    }

    /// Whether no gesture is in progress.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// The per-editor interaction state.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    mode: InteractionMode,
    /// Latched from the most recent input event.
    modifiers: KeyModifiers,
    last_background_click_ms: Option<u64>,
    /// Nudges or bracket rotations waiting for key-up to be snapshotted.
    pending_key_commit: bool,
}

impl Interaction {
    /// Create an idle state machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The active mode.
    #[must_use]
    pub const fn mode(&self) -> &InteractionMode {
        &self.mode
    }

    /// Modifiers as last observed.
    #[must_use]
    pub const fn modifiers(&self) -> KeyModifiers {
        self.modifiers
    }

    /// Whether keyboard edits are waiting for key-up.
    #[must_use]
    pub const fn has_pending_key_commit(&self) -> bool {
        self.pending_key_commit
    }

    /// Rectangle of an in-progress canvas resize.
    #[must_use]
    pub fn canvas_preview(&self) -> Option<Rect> {
        match self.mode {
            InteractionMode::ResizingCanvas { start, current } => {
                Some(Rect::from_corners(start, current))
            }
            _ => None,
        }
    }

    /// Drop any gesture without touching the canvas.
    ///
    /// Called after the layer list was replaced wholesale (undo, redo, load),
    /// when gesture scratch data no longer describes the canvas.
    pub fn reset(&mut self) {
        self.set_mode(InteractionMode::None);
        self.pending_key_commit = false;
        self.last_background_click_ms = None;
    }

    fn set_mode(&mut self, mode: InteractionMode) {
        let from = self.mode.name();
        self.replace_mode(from, mode);
    }

    /// Install `mode` after the previous one (named `from`) was taken out.
    fn replace_mode(&mut self, from: &'static str, mode: InteractionMode) {
        if from != mode.name() {
            tracing::debug!(from, to = mode.name(), "Interaction mode change");
        }
        self.mode = mode;
    }

    /// Handle a button press.
    pub fn pointer_down(&mut self, ctx: &mut InteractionContext<'_>, event: &PointerEvent) -> Response {
        self.modifiers = event.modifiers;
        if !self.mode.is_idle() {
            return Response::NONE;
        }
        let world = ctx.to_world(event.position);

        if ctx.mask.is_active() {
            ctx.mask.pointer_down(world);
            self.set_mode(InteractionMode::DrawingMask { last: world });
            return Response::render();
        }

        match event.button {
            PointerButton::Primary => {}
            PointerButton::Middle => {
                self.set_mode(InteractionMode::Panning {
                    last: event.position,
                    moved: true,
                });
                return Response::NONE;
            }
            PointerButton::Secondary => return Response::NONE,
        }

        if let Some((layer, handle)) = Self::grab_handle(ctx, world) {
            self.last_background_click_ms = None;
            self.set_mode(match handle {
                LayerHandle::Resize(handle) => InteractionMode::Resizing {
                    layer: layer.id,
                    handle,
                    start: layer.frame(),
                },
                LayerHandle::Rotate => InteractionMode::Rotating {
                    layer: layer.id,
                    center: layer.center(),
                    start_pointer: world,
                    start_rotation: layer.rotation,
                },
            });
            return Response::render();
        }

        if let Some(id) = ctx.canvas.layer_at(world) {
            self.last_background_click_ms = None;
            let narrow = if event.modifiers.command() {
                if !ctx.selection.toggle(id) {
                    return Response::render();
                }
                false
            } else if ctx.selection.contains(id) {
                true
            } else {
                ctx.selection.select_only(id);
                false
            };
            self.set_mode(InteractionMode::PotentialDrag {
                layer: id,
                start_screen: event.position,
                start_world: world,
                narrow,
            });
            return Response::render();
        }

        self.background_down(ctx, event, world)
    }

    fn background_down(
        &mut self,
        ctx: &mut InteractionContext<'_>,
        event: &PointerEvent,
        world: Point,
    ) -> Response {
        let m = event.modifiers;
        if m.shift && m.command() {
            self.set_mode(InteractionMode::MovingCanvas {
                last: event.position,
                total: (0.0, 0.0),
            });
            return Response::render();
        }
        if m.shift {
            self.set_mode(InteractionMode::ResizingCanvas {
                start: world,
                current: world,
            });
            return Response::render();
        }

        // Untimed events (timestamp 0) never count as a re-click.
        let timed = event.timestamp_ms > 0;
        if let Some(last) = self.last_background_click_ms.filter(|&t| timed && t > 0) {
            if event.timestamp_ms.saturating_sub(last) <= ctx.config.double_click_ms {
                tracing::debug!("Rapid background re-click, clearing selection");
                self.reset();
                ctx.selection.clear();
                return Response::render();
            }
        }
        self.last_background_click_ms = Some(event.timestamp_ms);
        self.set_mode(InteractionMode::Panning {
            last: event.position,
            moved: false,
        });
        Response::NONE
    }

    /// Topmost selected layer with a grip under `world`.
    fn grab_handle<'c>(ctx: &'c InteractionContext<'_>, world: Point) -> Option<(&'c Layer, LayerHandle)> {
        let radius = ctx.config.handle_radius_px / ctx.zoom();
        let offset = ctx.config.rotation_handle_offset_px / ctx.zoom();
        ctx.canvas
            .layers_by_z()
            .into_iter()
            .rev()
            .filter(|l| l.visible && ctx.selection.contains(l.id))
            .find_map(|l| l.handle_at(world, radius, offset).map(|h| (l, h)))
    }

    /// Handle pointer motion.
    pub fn pointer_move(&mut self, ctx: &mut InteractionContext<'_>, event: &PointerEvent) -> Response {
        self.modifiers = event.modifiers;
        let world = ctx.to_world(event.position);
        let from = self.mode.name();

        let (next, response) = match std::mem::take(&mut self.mode) {
            InteractionMode::None => (InteractionMode::None, Response::NONE),
            InteractionMode::DrawingMask { .. } => {
                ctx.mask.pointer_move(world);
                (InteractionMode::DrawingMask { last: world }, Response::render())
            }
            InteractionMode::Panning { last, moved } => {
                let (dx, dy) = event.position.delta_from(last);
                ctx.canvas.viewport.pan_by(dx, dy);
                let moved = moved || event.position != last;
                (
                    InteractionMode::Panning {
                        last: event.position,
                        moved,
                    },
                    Response::dirty(),
                )
            }
            InteractionMode::PotentialDrag {
                layer,
                start_screen,
                start_world,
                narrow,
            } => {
                if event.position.distance(start_screen) > ctx.config.drag_threshold_px {
                    let mut drag = DragState::begin(ctx.canvas, ctx.selection, start_world);
                    let response = self.drag_to(ctx, &mut drag, world);
                    (InteractionMode::Dragging(drag), response)
                } else {
                    (
                        InteractionMode::PotentialDrag {
                            layer,
                            start_screen,
                            start_world,
                            narrow,
                        },
                        Response::NONE,
                    )
                }
            }
            InteractionMode::Dragging(mut drag) => {
                let response = self.drag_to(ctx, &mut drag, world);
                (InteractionMode::Dragging(drag), response)
            }
            InteractionMode::Resizing {
                layer,
                handle,
                start,
            } => {
                let target = if self.modifiers.ctrl {
                    let threshold = ctx.config.resize_snap_threshold_px / ctx.zoom();
                    geometry::snap_point_within(world, ctx.config.grid_size, threshold)
                } else {
                    world
                };
                let frame = geometry::resize_frame(&start, handle, target, self.modifiers.shift);
                if let Some(l) = ctx.canvas.layer_mut(layer) {
                    l.set_frame(frame);
                }
                (
                    InteractionMode::Resizing {
                        layer,
                        handle,
                        start,
                    },
                    Response::render(),
                )
            }
            InteractionMode::Rotating {
                layer,
                center,
                start_pointer,
                start_rotation,
            } => {
                let mut rotation =
                    geometry::rotation_from_pointer(start_rotation, center, start_pointer, world);
                if self.modifiers.shift {
                    rotation = geometry::snap_angle(rotation, ctx.config.rotate_snap_degrees);
                }
                if let Some(l) = ctx.canvas.layer_mut(layer) {
                    l.rotation = rotation;
                }
                (
                    InteractionMode::Rotating {
                        layer,
                        center,
                        start_pointer,
                        start_rotation,
                    },
                    Response::render(),
                )
            }
            InteractionMode::ResizingCanvas { start, .. } => (
                InteractionMode::ResizingCanvas {
                    start,
                    current: world,
                },
                Response::render(),
            ),
            InteractionMode::MovingCanvas { last, total } => {
                let (sx, sy) = event.position.delta_from(last);
                let zoom = ctx.zoom();
                let (dx, dy) = (-sx / zoom, -sy / zoom);
                ctx.canvas.rebase(dx, dy);
                (
                    InteractionMode::MovingCanvas {
                        last: event.position,
                        total: (total.0 + dx, total.1 + dy),
                    },
                    Response::render(),
                )
            }
        };

        self.replace_mode(from, next);
        response
    }

    /// Move the drag targets so they sit at their start position plus the
    /// pointer's world travel, cloning first if Alt asks for it.
    fn drag_to(&self, ctx: &mut InteractionContext<'_>, drag: &mut DragState, world: Point) -> Response {
        let cloned_now = self.modifiers.alt && !drag.cloned;
        if cloned_now {
            Self::clone_targets(ctx, drag);
        }

        let (dx, dy) = world.delta_from(drag.start_world);
        let adjustment = if self.modifiers.ctrl {
            Self::primary_snap(ctx, drag, dx, dy)
        } else {
            SnapAdjustment::NONE
        };

        for (id, origin) in &drag.targets {
            if let Some(layer) = ctx.canvas.layer_mut(*id) {
                layer.x = origin.x + dx + adjustment.dx;
                layer.y = origin.y + dy + adjustment.dy;
            }
        }

        if cloned_now {
            Response::commit(false)
        } else {
            Response::render()
        }
    }

    /// Duplicate every target at its current position, put the originals
    /// back where the gesture started and retarget the drag to the copies.
    fn clone_targets(ctx: &mut InteractionContext<'_>, drag: &mut DragState) {
        let mut clones = Vec::with_capacity(drag.targets.len());
        for (id, origin) in &drag.targets {
            let Some(layer) = ctx.canvas.layer_mut(*id) else {
                continue;
            };
            let copy = layer.duplicate();
            layer.x = origin.x;
            layer.y = origin.y;
            clones.push((ctx.canvas.add_layer(copy), *origin));
        }
        tracing::debug!(count = clones.len(), "Alt-drag cloned layers");

        drag.originals = drag.targets.iter().map(|(id, _)| *id).collect();
        ctx.selection.set(clones.iter().map(|(id, _)| *id));
        drag.targets = clones;
        drag.cloned = true;
    }

    /// Snap correction computed from the primary layer and shared by all targets.
    fn primary_snap(ctx: &InteractionContext<'_>, drag: &DragState, dx: f64, dy: f64) -> SnapAdjustment {
        let Some(primary) = ctx.selection.primary() else {
            return SnapAdjustment::NONE;
        };
        let Some((_, origin)) = drag.targets.iter().find(|(id, _)| *id == primary) else {
            return SnapAdjustment::NONE;
        };
        let Some(layer) = ctx.canvas.layer(primary) else {
            return SnapAdjustment::NONE;
        };
        let frame = Frame {
            x: origin.x + dx,
            y: origin.y + dy,
            ..layer.frame()
        };
        geometry::snap_adjustment(&frame, ctx.config.grid_size, ctx.config.snap_threshold)
    }

    /// Handle a button release.
    pub fn pointer_up(&mut self, ctx: &mut InteractionContext<'_>, event: &PointerEvent) -> Response {
        self.modifiers = event.modifiers;
        let world = ctx.to_world(event.position);
        let from = self.mode.name();

        let response = match std::mem::take(&mut self.mode) {
            InteractionMode::None => Response::NONE,
            InteractionMode::DrawingMask { .. } => {
                ctx.mask.pointer_up(world);
                Response::dirty()
            }
            InteractionMode::Panning { moved, .. } => {
                if moved || ctx.selection.is_empty() {
                    Response::NONE
                } else {
                    ctx.selection.clear();
                    Response::render()
                }
            }
            InteractionMode::PotentialDrag { layer, narrow, .. } => {
                if narrow {
                    ctx.selection.select_only(layer);
                }
                Response::render()
            }
            InteractionMode::Dragging(drag) => Response::commit(drag.cloned),
            InteractionMode::Resizing { .. } | InteractionMode::Rotating { .. } => {
                Response::commit(false)
            }
            InteractionMode::ResizingCanvas { start, .. } => Self::finish_canvas_resize(ctx, start, world),
            InteractionMode::MovingCanvas { total, .. } => {
                tracing::info!(dx = total.0, dy = total.1, "Canvas moved");
                Response {
                    rebased: Some(total),
                    ..Response::dirty()
                }
            }
        };

        self.replace_mode(from, InteractionMode::None);
        response
    }

    /// Apply a canvas-resize rectangle. Corners snap down to the grid; a
    /// rectangle narrower or shorter than one grid step is discarded.
    fn finish_canvas_resize(ctx: &mut InteractionContext<'_>, start: Point, end: Point) -> Response {
        let grid = ctx.config.grid_size;
        let rect = Rect::from_corners(start, end);
        let x0 = geometry::snap_to_grid(rect.x, grid);
        let y0 = geometry::snap_to_grid(rect.y, grid);
        let width = geometry::snap_to_grid(rect.right(), grid) - x0;
        let height = geometry::snap_to_grid(rect.bottom(), grid) - y0;

        if width < grid || height < grid {
            tracing::debug!(width, height, "Canvas resize rectangle below one grid step, discarded");
            return Response::render();
        }

        ctx.canvas.width = width;
        ctx.canvas.height = height;
        ctx.canvas.rebase(-x0, -y0);
        tracing::info!(width, height, "Canvas resized");
        Response {
            rebased: Some((-x0, -y0)),
            ..Response::dirty()
        }
    }

    /// Handle a wheel event.
    ///
    /// With layers selected (and the mask brush idle) the wheel transforms
    /// them about their centres; otherwise it zooms the view at the pointer.
    pub fn wheel(&mut self, ctx: &mut InteractionContext<'_>, event: &WheelEvent) -> Response {
        self.modifiers = event.modifiers;
        if !self.mode.is_idle() || event.delta_y.abs() < f64::EPSILON {
            return Response::NONE;
        }
        let down = event.delta_y > 0.0;

        if !ctx.selection.is_empty() && !ctx.mask.is_active() {
            for id in ctx.selection.ids() {
                if let Some(layer) = ctx.canvas.layer_mut(*id) {
                    wheel_transform(layer, event.modifiers, down, ctx.config);
                }
            }
            return Response::commit(false);
        }

        let factor = if down {
            1.0 / ctx.config.zoom_step
        } else {
            ctx.config.zoom_step
        };
        ctx.canvas.viewport.zoom_at(event.position, factor);
        Response::dirty()
    }

    /// Handle a key press.
    pub fn key_down(&mut self, ctx: &mut InteractionContext<'_>, event: &KeyEvent) -> Response {
        self.modifiers = event.modifiers;
        match event.key {
            Key::Escape => return self.cancel(ctx),
            Key::Shift | Key::Control | Key::Alt | Key::Meta => return Response::NONE,
            _ => {}
        }
        if !self.mode.is_idle() || ctx.selection.is_empty() {
            return Response::NONE;
        }

        let config = ctx.config;
        let shift = event.modifiers.shift;
        let nudge = if shift { config.nudge.1 } else { config.nudge.0 };
        let turn = if shift {
            config.bracket_rotate.1
        } else {
            config.bracket_rotate.0
        };
        let (dx, dy, dr) = match event.key {
            Key::ArrowUp => (0.0, -nudge, 0.0),
            Key::ArrowDown => (0.0, nudge, 0.0),
            Key::ArrowLeft => (-nudge, 0.0, 0.0),
            Key::ArrowRight => (nudge, 0.0, 0.0),
            Key::BracketLeft => (0.0, 0.0, -turn),
            Key::BracketRight => (0.0, 0.0, turn),
            Key::Delete | Key::Backspace => {
                let ids = ctx.selection.ids().to_vec();
                let removed = ctx.canvas.remove_layers(&ids);
                ctx.selection.clear();
                tracing::debug!(count = removed.len(), "Deleted selected layers");
                return Response::commit(false);
            }
            _ => return Response::NONE,
        };

        for id in ctx.selection.ids() {
            if let Some(layer) = ctx.canvas.layer_mut(*id) {
                layer.translate(dx, dy);
                layer.rotation += dr;
            }
        }
        self.pending_key_commit = true;
        Response::render()
    }

    /// Handle a key release. The release of a movement key flushes pending
    /// keyboard edits into one history entry.
    pub fn key_up(&mut self, _ctx: &mut InteractionContext<'_>, event: &KeyEvent) -> Response {
        self.modifiers = event.modifiers;
        if event.key.is_movement() && self.pending_key_commit {
            self.pending_key_commit = false;
            return Response::commit(false);
        }
        Response::NONE
    }

    /// Abandon the active gesture, putting the canvas back as it was when it started.
    pub fn cancel(&mut self, ctx: &mut InteractionContext<'_>) -> Response {
        let from = self.mode.name();
        let response = match std::mem::take(&mut self.mode) {
            InteractionMode::None => Response::NONE,
            InteractionMode::Panning { .. }
            | InteractionMode::PotentialDrag { .. }
            | InteractionMode::ResizingCanvas { .. } => Response::render(),
            InteractionMode::DrawingMask { last } => {
                ctx.mask.pointer_up(last);
                Response::dirty()
            }
            InteractionMode::Dragging(drag) => {
                if drag.cloned {
                    let clones: Vec<LayerId> = drag.targets().collect();
                    ctx.canvas.remove_layers(&clones);
                    ctx.selection.set(drag.originals.iter().copied());
                    // Drops the intermediate snapshot taken when cloning.
                    Response::commit(true)
                } else {
                    for (id, origin) in &drag.targets {
                        if let Some(layer) = ctx.canvas.layer_mut(*id) {
                            layer.x = origin.x;
                            layer.y = origin.y;
                        }
                    }
                    Response::render()
                }
            }
            InteractionMode::Resizing { layer, start, .. } => {
                if let Some(l) = ctx.canvas.layer_mut(layer) {
                    l.set_frame(start);
                }
                Response::render()
            }
            InteractionMode::Rotating {
                layer,
                start_rotation,
                ..
            } => {
                if let Some(l) = ctx.canvas.layer_mut(layer) {
                    l.rotation = start_rotation;
                }
                Response::render()
            }
            InteractionMode::MovingCanvas { total, .. } => {
                ctx.canvas.rebase(-total.0, -total.1);
                Response::render()
            }
        };
        if from != InteractionMode::None.name() {
            tracing::debug!(mode = from, "Interaction cancelled");
        }
        self.replace_mode(from, InteractionMode::None);
        response
    }
}

/// One wheel notch applied to one layer.
///
/// Shift rotates (Ctrl+Shift steps to the next multiple), Ctrl scales by a
/// fixed amount, and no modifier steps the height to the next grid multiple.
/// Scaling always keeps the aspect ratio and the centre.
fn wheel_transform(layer: &mut Layer, modifiers: KeyModifiers, down: bool, config: &EditorConfig) {
    let frame = layer.frame();
    let step = config.wheel_rotate_degrees;
    if modifiers.shift {
        layer.rotation = if modifiers.command() {
            let direction = if down {
                StepDirection::Up
            } else {
                StepDirection::Down
            };
            geometry::angle_step(layer.rotation, step, direction)
        } else if down {
            layer.rotation + step
        } else {
            layer.rotation - step
        };
        return;
    }

    let target_height = if modifiers.command() {
        if down {
            frame.height - config.fine_scale_step
        } else {
            frame.height + config.fine_scale_step
        }
    } else {
        let direction = if down {
            StepDirection::Down
        } else {
            StepDirection::Up
        };
        geometry::grid_step(frame.height, config.grid_size, direction)
    };
    layer.set_frame(geometry::scale_uniform(&frame, target_height / frame.height));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoMaskTool;
    use crate::layer::ImageId;

    struct Harness {
        canvas: Canvas,
        selection: Selection,
        mask: NoMaskTool,
        config: EditorConfig,
        interaction: Interaction,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                canvas: Canvas::new(1024.0, 1024.0),
                selection: Selection::new(),
                mask: NoMaskTool,
                config: EditorConfig::default(),
                interaction: Interaction::new(),
            }
        }

        fn add(&mut self, frame: Frame) -> LayerId {
            let layer = Layer::new(ImageId::from("img"), frame.width, frame.height).with_frame(frame);
            self.canvas.add_layer(layer)
        }

        fn with_ctx<R>(&mut self, f: impl FnOnce(&mut Interaction, &mut InteractionContext<'_>) -> R) -> R {
            let mut ctx = InteractionContext {
                canvas: &mut self.canvas,
                selection: &mut self.selection,
                mask: &mut self.mask,
                config: &self.config,
            };
            f(&mut self.interaction, &mut ctx)
        }

        fn down(&mut self, e: PointerEvent) -> Response {
            self.with_ctx(|i, c| i.pointer_down(c, &e))
        }

        fn moved(&mut self, e: PointerEvent) -> Response {
            self.with_ctx(|i, c| i.pointer_move(c, &e))
        }

        fn up(&mut self, e: PointerEvent) -> Response {
            self.with_ctx(|i, c| i.pointer_up(c, &e))
        }

        fn layer(&self, id: LayerId) -> &Layer {
            self.canvas.layer(id).expect("layer exists")
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_click_selects_without_drag() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(100.0, 100.0, 200.0, 200.0, 0.0));

        h.down(PointerEvent::at(150.0, 150.0));
        assert!(matches!(h.interaction.mode(), InteractionMode::PotentialDrag { .. }));
        h.moved(PointerEvent::at(151.0, 151.0));
        assert!(matches!(h.interaction.mode(), InteractionMode::PotentialDrag { .. }));
        let response = h.up(PointerEvent::at(151.0, 151.0));

        assert!(response.commit.is_none());
        assert!(h.interaction.mode().is_idle());
        assert_eq!(h.selection.ids(), &[id]);
        assert!(approx(h.layer(id).x, 100.0));
    }

    #[test]
    fn test_drag_moves_by_world_delta() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(100.0, 100.0, 200.0, 200.0, 0.0));

        h.down(PointerEvent::at(150.0, 150.0));
        h.moved(PointerEvent::at(180.0, 140.0));
        assert!(matches!(h.interaction.mode(), InteractionMode::Dragging(_)));
        h.moved(PointerEvent::at(200.0, 130.0));
        let response = h.up(PointerEvent::at(200.0, 130.0));

        assert_eq!(response.commit, Some(Commit { replace_last: false }));
        let layer = h.layer(id);
        assert!(approx(layer.x, 150.0));
        assert!(approx(layer.y, 80.0));
    }

    #[test]
    fn test_drag_respects_zoom() {
        let mut h = Harness::new();
        h.canvas.viewport.zoom = 2.0;
        let id = h.add(Frame::new(100.0, 100.0, 200.0, 200.0, 0.0));

        h.down(PointerEvent::at(300.0, 300.0));
        h.moved(PointerEvent::at(340.0, 300.0));
        h.up(PointerEvent::at(340.0, 300.0));
        assert!(approx(h.layer(id).x, 120.0));
    }

    #[test]
    fn test_ctrl_drag_snaps_primary_and_keeps_offsets() {
        let mut h = Harness::new();
        let a = h.add(Frame::new(0.0, 0.0, 64.0, 64.0, 0.0));
        let b = h.add(Frame::new(200.0, 0.0, 64.0, 64.0, 0.0));
        h.selection.set([b, a]);

        let ctrl = KeyModifiers::CTRL;
        h.down(PointerEvent::at(10.0, 10.0));
        h.moved(PointerEvent::at(16.0, 10.0).with_modifiers(ctrl));
        h.moved(PointerEvent::at(77.0, 10.0).with_modifiers(ctrl));

        // Primary `a` moved by 67 lands 3 from 64: snapped back onto the grid.
        assert!(approx(h.layer(a).x, 64.0));
        assert!(approx(h.layer(b).x, 264.0));
    }

    #[test]
    fn test_alt_drag_clones_once() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));

        let alt = KeyModifiers::ALT;
        h.down(PointerEvent::at(50.0, 50.0).with_modifiers(alt));
        let first = h.moved(PointerEvent::at(70.0, 50.0).with_modifiers(alt));
        assert_eq!(first.commit, Some(Commit { replace_last: false }));
        let second = h.moved(PointerEvent::at(90.0, 50.0).with_modifiers(alt));
        assert!(second.commit.is_none());
        let up = h.up(PointerEvent::at(90.0, 50.0));

        assert_eq!(up.commit, Some(Commit { replace_last: true }));
        assert_eq!(h.canvas.layer_count(), 2);
        assert!(approx(h.layer(id).x, 0.0));
        let clone = h.selection.primary().expect("clone selected");
        assert_ne!(clone, id);
        assert!(approx(h.layer(clone).x, 40.0));
    }

    #[test]
    fn test_escape_after_alt_clone_removes_copies() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        let alt = KeyModifiers::ALT;
        h.down(PointerEvent::at(50.0, 50.0).with_modifiers(alt));
        h.moved(PointerEvent::at(80.0, 50.0).with_modifiers(alt));

        let response = h.with_ctx(|i, c| i.key_down(c, &KeyEvent::new(Key::Escape, KeyModifiers::NONE)));
        assert_eq!(response.commit, Some(Commit { replace_last: true }));
        assert_eq!(h.canvas.layer_count(), 1);
        assert_eq!(h.selection.ids(), &[id]);
        assert!(h.interaction.mode().is_idle());
    }

    #[test]
    fn test_resize_from_corner_handle() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(100.0, 100.0, 200.0, 100.0, 0.0));
        h.selection.select_only(id);

        h.down(PointerEvent::at(300.0, 200.0));
        assert!(matches!(
            h.interaction.mode(),
            InteractionMode::Resizing {
                handle: ResizeHandle::SE,
                ..
            }
        ));
        h.moved(PointerEvent::at(400.0, 260.0).with_modifiers(KeyModifiers::SHIFT));
        let response = h.up(PointerEvent::at(400.0, 260.0));

        assert!(response.commit.is_some());
        let layer = h.layer(id);
        assert!(approx(layer.width / layer.height, 2.0));
        assert!(approx(layer.x, 100.0));
        assert!(approx(layer.y, 100.0));
    }

    #[test]
    fn test_shift_rotate_snaps_to_fifteen() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);

        // Rotation grip sits 30 px above the top edge centre: (50, -30).
        h.down(PointerEvent::at(50.0, -30.0));
        assert!(matches!(h.interaction.mode(), InteractionMode::Rotating { .. }));
        // Grip vector from centre (50, 50) is (0, -80); rotate it by 92 degrees.
        let target = geometry::local_to_world(
            geometry::rotate(Point::new(0.0, -80.0), 92.0),
            &Frame::new(0.0, 0.0, 100.0, 100.0, 0.0),
        );
        h.moved(PointerEvent::at(target.x, target.y).with_modifiers(KeyModifiers::SHIFT));
        h.up(PointerEvent::at(target.x, target.y));

        assert!(approx(h.layer(id).rotation, 90.0));
    }

    #[test]
    fn test_background_click_deselects_and_double_click_resets() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);

        h.down(PointerEvent::at(500.0, 500.0).with_timestamp(1_000));
        assert!(matches!(h.interaction.mode(), InteractionMode::Panning { .. }));
        h.up(PointerEvent::at(500.0, 500.0).with_timestamp(1_050));
        assert!(h.selection.is_empty());

        h.selection.select_only(id);
        h.down(PointerEvent::at(500.0, 500.0).with_timestamp(1_200));
        assert!(h.interaction.mode().is_idle());
        assert!(h.selection.is_empty());
    }

    #[test]
    fn test_pan_moves_viewport() {
        let mut h = Harness::new();
        h.down(PointerEvent::at(500.0, 500.0));
        let response = h.moved(PointerEvent::at(520.0, 490.0));
        assert!(response.dirty);
        h.up(PointerEvent::at(520.0, 490.0));
        assert!(approx(h.canvas.viewport.x, -20.0));
        assert!(approx(h.canvas.viewport.y, 10.0));
    }

    #[test]
    fn test_canvas_resize_snaps_and_rebases() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(200.0, 200.0, 50.0, 50.0, 0.0));

        let shift = KeyModifiers::SHIFT;
        h.down(PointerEvent::at(130.0, 70.0).with_modifiers(shift));
        h.moved(PointerEvent::at(400.0, 330.0).with_modifiers(shift));
        assert!(h.interaction.canvas_preview().is_some());
        let response = h.up(PointerEvent::at(400.0, 330.0).with_modifiers(shift));

        // Corners snap down: (128, 64) to (384, 320).
        assert_eq!(response.rebased, Some((-128.0, -64.0)));
        assert!(approx(h.canvas.width, 256.0));
        assert!(approx(h.canvas.height, 256.0));
        assert!(approx(h.layer(id).x, 72.0));
        assert!(approx(h.layer(id).y, 136.0));
    }

    #[test]
    fn test_canvas_resize_too_small_is_discarded() {
        let mut h = Harness::new();
        let shift = KeyModifiers::SHIFT;
        h.down(PointerEvent::at(10.0, 10.0).with_modifiers(shift));
        let response = h.up(PointerEvent::at(60.0, 300.0).with_modifiers(shift));
        assert!(response.rebased.is_none());
        assert!(approx(h.canvas.width, 1024.0));
    }

    #[test]
    fn test_canvas_move_shifts_output_area() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(100.0, 100.0, 50.0, 50.0, 0.0));
        let m = KeyModifiers {
            shift: true,
            ctrl: true,
            ..KeyModifiers::NONE
        };
        h.down(PointerEvent::at(600.0, 600.0).with_modifiers(m));
        h.moved(PointerEvent::at(630.0, 620.0).with_modifiers(m));
        let response = h.up(PointerEvent::at(630.0, 620.0).with_modifiers(m));

        assert_eq!(response.rebased, Some((-30.0, -20.0)));
        assert!(approx(h.layer(id).x, 70.0));
        let origin = h.canvas.viewport.world_to_screen(Point::new(0.0, 0.0));
        assert!(approx(origin.x, 30.0));
        assert!(approx(origin.y, 20.0));
    }

    #[test]
    fn test_wheel_grid_scales_height() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 260.0, 130.0, 0.0));
        h.selection.select_only(id);

        let response = h.with_ctx(|i, c| i.wheel(c, &WheelEvent::at(0.0, 0.0, 1.0)));
        assert!(response.commit.is_some());
        let layer = h.layer(id);
        assert!(approx(layer.height, 128.0));
        assert!(approx(layer.width, 256.0));
    }

    #[test]
    fn test_wheel_without_selection_zooms() {
        let mut h = Harness::new();
        h.with_ctx(|i, c| i.wheel(c, &WheelEvent::at(100.0, 100.0, -1.0)));
        assert!(approx(h.canvas.viewport.zoom, 1.1));
        h.with_ctx(|i, c| i.wheel(c, &WheelEvent::at(100.0, 100.0, 1.0)));
        assert!(approx(h.canvas.viewport.zoom, 1.0));
    }

    #[test]
    fn test_shift_wheel_rotates() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 12.0));
        h.selection.select_only(id);

        let shift = WheelEvent::at(0.0, 0.0, 1.0).with_modifiers(KeyModifiers::SHIFT);
        h.with_ctx(|i, c| i.wheel(c, &shift));
        assert!(approx(h.layer(id).rotation, 17.0));

        let snap = WheelEvent::at(0.0, 0.0, 1.0).with_modifiers(KeyModifiers {
            shift: true,
            ctrl: true,
            ..KeyModifiers::NONE
        });
        h.with_ctx(|i, c| i.wheel(c, &snap));
        assert!(approx(h.layer(id).rotation, 20.0));
    }

    #[test]
    fn test_nudges_commit_once_on_key_up() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);

        let right = KeyEvent::new(Key::ArrowRight, KeyModifiers::NONE);
        for _ in 0..3 {
            let r = h.with_ctx(|i, c| i.key_down(c, &right));
            assert!(r.commit.is_none());
        }
        let shifted = KeyEvent::new(Key::ArrowDown, KeyModifiers::SHIFT);
        h.with_ctx(|i, c| i.key_down(c, &shifted));

        let up = h.with_ctx(|i, c| i.key_up(c, &right));
        assert!(up.commit.is_some());
        let again = h.with_ctx(|i, c| i.key_up(c, &shifted));
        assert!(again.commit.is_none());

        let layer = h.layer(id);
        assert!(approx(layer.x, 3.0));
        assert!(approx(layer.y, 10.0));
    }

    #[test]
    fn test_delete_removes_selection() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);
        let response = h.with_ctx(|i, c| i.key_down(c, &KeyEvent::new(Key::Delete, KeyModifiers::NONE)));
        assert!(response.commit.is_some());
        assert!(h.canvas.is_empty());
        assert!(h.selection.is_empty());
    }

    #[test]
    fn test_untimed_background_clicks_do_not_reset() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));

        h.down(PointerEvent::at(500.0, 500.0));
        h.up(PointerEvent::at(500.0, 500.0));
        h.selection.select_only(id);
        h.down(PointerEvent::at(500.0, 500.0));

        assert!(matches!(h.interaction.mode(), InteractionMode::Panning { .. }));
        assert_eq!(h.selection.ids(), &[id]);
    }

    #[test]
    fn test_ctrl_resize_snaps_to_grid() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);

        h.down(PointerEvent::at(100.0, 100.0));
        h.moved(PointerEvent::at(131.0, 125.0));
        assert!(approx(h.layer(id).width, 131.0));
        assert!(approx(h.layer(id).height, 125.0));

        h.moved(PointerEvent::at(131.0, 125.0).with_modifiers(KeyModifiers::CTRL));
        h.up(PointerEvent::at(131.0, 125.0));
        let layer = h.layer(id);
        assert!(approx(layer.width, 128.0));
        assert!(approx(layer.height, 128.0));
        assert!(approx(layer.x, 0.0));
    }

    #[test]
    fn test_ctrl_resize_threshold_shrinks_with_zoom() {
        let mut h = Harness::new();
        h.canvas.viewport.zoom = 2.0;
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);

        // Handle at world (100, 100) is screen (200, 200). The 10px threshold
        // is 5 world units: x=125 is 3 from 128, y=120 is 8 from 128.
        h.down(PointerEvent::at(200.0, 200.0));
        h.moved(PointerEvent::at(250.0, 240.0).with_modifiers(KeyModifiers::CTRL));
        h.up(PointerEvent::at(250.0, 240.0));

        let layer = h.layer(id);
        assert!(approx(layer.width, 128.0));
        assert!(approx(layer.height, 120.0));
    }

    #[test]
    fn test_wheel_up_steps_to_next_grid_multiple() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 260.0, 130.0, 0.0));
        h.selection.select_only(id);

        let response = h.with_ctx(|i, c| i.wheel(c, &WheelEvent::at(0.0, 0.0, -1.0)));
        assert!(response.commit.is_some());
        assert!(approx(h.layer(id).height, 192.0));
        assert!(approx(h.layer(id).width, 384.0));

        h.with_ctx(|i, c| i.wheel(c, &WheelEvent::at(0.0, 0.0, -1.0)));
        assert!(approx(h.layer(id).height, 256.0));
    }

    #[test]
    fn test_wheel_down_never_grows_short_layer() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 60.0, 30.0, 0.0));
        h.selection.select_only(id);

        h.with_ctx(|i, c| i.wheel(c, &WheelEvent::at(0.0, 0.0, 1.0)));
        let layer = h.layer(id);
        assert!(approx(layer.height, 30.0));
        assert!(approx(layer.width, 60.0));
    }

    #[test]
    fn test_ctrl_wheel_scales_by_one_unit() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 260.0, 130.0, 0.0));
        h.selection.select_only(id);

        let down = WheelEvent::at(0.0, 0.0, 1.0).with_modifiers(KeyModifiers::CTRL);
        h.with_ctx(|i, c| i.wheel(c, &down));
        assert!(approx(h.layer(id).height, 129.0));
        assert!(approx(h.layer(id).width, 258.0));

        let up = WheelEvent::at(0.0, 0.0, -1.0).with_modifiers(KeyModifiers::CTRL);
        h.with_ctx(|i, c| i.wheel(c, &up));
        h.with_ctx(|i, c| i.wheel(c, &up));
        assert!(approx(h.layer(id).height, 131.0));
        assert!(approx(h.layer(id).width, 262.0));
    }

    #[test]
    fn test_brackets_rotate_and_commit_on_key_up() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);

        let right = KeyEvent::new(Key::BracketRight, KeyModifiers::NONE);
        h.with_ctx(|i, c| i.key_down(c, &right));
        h.with_ctx(|i, c| i.key_down(c, &right));
        assert!(approx(h.layer(id).rotation, 2.0));

        let left_shift = KeyEvent::new(Key::BracketLeft, KeyModifiers::SHIFT);
        let r = h.with_ctx(|i, c| i.key_down(c, &left_shift));
        assert!(r.commit.is_none());
        assert!(approx(h.layer(id).rotation, -8.0));

        let up = h.with_ctx(|i, c| i.key_up(c, &left_shift));
        assert!(up.commit.is_some());
    }

    #[test]
    fn test_backspace_removes_selection() {
        let mut h = Harness::new();
        let keep = h.add(Frame::new(300.0, 300.0, 100.0, 100.0, 0.0));
        let id = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(id);

        let response =
            h.with_ctx(|i, c| i.key_down(c, &KeyEvent::new(Key::Backspace, KeyModifiers::NONE)));
        assert!(response.commit.is_some());
        assert_eq!(h.canvas.layer_count(), 1);
        assert!(h.canvas.layer(keep).is_some());
        assert!(h.selection.is_empty());
    }

    #[test]
    fn test_escape_reverts_resize() {
        let mut h = Harness::new();
        let id = h.add(Frame::new(100.0, 100.0, 200.0, 100.0, 0.0));
        h.selection.select_only(id);
        h.down(PointerEvent::at(300.0, 200.0));
        h.moved(PointerEvent::at(500.0, 400.0));
        h.with_ctx(|i, c| i.key_down(c, &KeyEvent::new(Key::Escape, KeyModifiers::NONE)));
        assert!(approx(h.layer(id).width, 200.0));
        assert!(h.interaction.mode().is_idle());
    }

    #[test]
    fn test_ctrl_click_toggles() {
        let mut h = Harness::new();
        let a = h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        let b = h.add(Frame::new(300.0, 0.0, 100.0, 100.0, 0.0));
        h.selection.select_only(a);

        let ctrl = KeyModifiers::CTRL;
        h.down(PointerEvent::at(350.0, 50.0).with_modifiers(ctrl));
        h.up(PointerEvent::at(350.0, 50.0).with_modifiers(ctrl));
        assert_eq!(h.selection.len(), 2);

        h.down(PointerEvent::at(350.0, 50.0).with_modifiers(ctrl));
        assert!(h.interaction.mode().is_idle());
        assert_eq!(h.selection.ids(), &[a]);
        assert!(!h.selection.contains(b));
    }

    #[test]
    fn test_press_ignored_while_gesture_active() {
        let mut h = Harness::new();
        h.add(Frame::new(0.0, 0.0, 100.0, 100.0, 0.0));
        h.down(PointerEvent::at(50.0, 50.0));
        let response = h.down(PointerEvent::at(500.0, 500.0));
        assert_eq!(response, Response::NONE);
        assert!(matches!(h.interaction.mode(), InteractionMode::PotentialDrag { .. }));
    }
}
