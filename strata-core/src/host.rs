//! Collaborators supplied by the host: painting and the mask brush.
//!
//! The editor never draws and never paints mask pixels itself. It tells a
//! [`Renderer`] when the picture changed and routes pointer input to a
//! [`MaskTool`] while that tool is armed.

use crate::canvas::Canvas;
use crate::geometry::{Point, Rect};
use crate::selection::Selection;

/// What a renderer needs for one paint.
#[derive(Debug, Clone, Copy)]
pub struct RenderScene<'a> {
    /// The live document.
    pub canvas: &'a Canvas,
    /// Layers to draw selection chrome around.
    pub selection: &'a Selection,
    /// Canvas-resize rectangle being dragged, in world units.
    pub canvas_preview: Option<Rect>,
}

/// Paints the canvas to some surface.
///
/// The editor coalesces requests so `render` runs at most once per flush.
pub trait Renderer: Send {
    /// Paint the scene.
    fn render(&mut self, scene: &RenderScene<'_>);
}

/// Renderer that draws nothing (headless use and tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _scene: &RenderScene<'_>) {}
}

/// The mask-painting brush.
///
/// While [`MaskTool::is_active`] is true the editor hands it every pointer
/// press, move and release in world coordinates and does nothing else.
pub trait MaskTool: Send {
    /// Whether the brush is armed.
    fn is_active(&self) -> bool;
    /// Stroke begins.
    fn pointer_down(&mut self, world: Point);
    /// Stroke continues.
    fn pointer_move(&mut self, world: Point);
    /// Stroke ends.
    fn pointer_up(&mut self, world: Point);
}

/// Mask tool that is never active.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMaskTool;

impl MaskTool for NoMaskTool {
    fn is_active(&self) -> bool {
        false
    }

    fn pointer_down(&mut self, _world: Point) {}

    fn pointer_move(&mut self, _world: Point) {}

    fn pointer_up(&mut self, _world: Point) {}
}
