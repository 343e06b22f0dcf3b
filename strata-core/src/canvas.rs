//! The live document: layers, output area, viewport.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Viewport};
use crate::layer::{ImageId, Layer, LayerId};
use crate::{EditorError, EditorResult};

/// Everything the editor draws and exports.
///
/// The output area spans `(0, 0)` to `(width, height)` in world space; layers
/// outside it are kept but not exported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    /// Layers in insertion order (the tie-breaker for equal z-index).
    layers: Vec<Layer>,
    /// Output area width.
    pub width: f64,
    /// Output area height.
    pub height: f64,
    /// Current pan/zoom.
    #[serde(default)]
    pub viewport: Viewport,
    /// World position of the global mask's top-left corner.
    #[serde(default)]
    pub mask_origin: Point,
    /// World rectangles waiting on asynchronous output from the host.
    #[serde(default)]
    pub pending_regions: Vec<Rect>,
}

impl Canvas {
    /// Create an empty canvas with the given output size.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            layers: Vec::new(),
            width,
            height,
            viewport: Viewport::default(),
            mask_origin: Point::default(),
            pending_regions: Vec::new(),
        }
    }

    /// Add a layer on top of the stack.
    pub fn add_layer(&mut self, mut layer: Layer) -> LayerId {
        layer.z_index = self.top_z().map_or(0, |z| z + 1);
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    /// Remove a layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is not found.
    pub fn remove_layer(&mut self, id: LayerId) -> EditorResult<Layer> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| EditorError::LayerNotFound(id.to_string()))?;
        Ok(self.layers.remove(index))
    }

    /// Remove every listed layer that exists, returning the removed layers.
    pub fn remove_layers(&mut self, ids: &[LayerId]) -> Vec<Layer> {
        let mut removed = Vec::new();
        self.layers.retain(|layer| {
            if ids.contains(&layer.id) {
                removed.push(layer.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Get a layer by ID.
    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Get a mutable reference to a layer by ID.
    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// All layers in insertion order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Replace the whole layer list (history restore, document load).
    pub fn set_layers(&mut self, layers: Vec<Layer>) {
        self.layers = layers;
    }

    /// Layers bottom-to-top; equal z-index keeps insertion order.
    #[must_use]
    pub fn layers_by_z(&self) -> Vec<&Layer> {
        let mut sorted: Vec<_> = self.layers.iter().collect();
        sorted.sort_by_key(|l| l.z_index);
        sorted
    }

    /// Topmost visible layer under a world point.
    #[must_use]
    pub fn layer_at(&self, world: Point) -> Option<LayerId> {
        self.layers_by_z()
            .into_iter()
            .rev()
            .find(|l| l.visible && l.contains_point(world))
            .map(|l| l.id)
    }

    /// Every image referenced by a live layer (duplicates included).
    pub fn image_ids(&self) -> impl Iterator<Item = &ImageId> {
        self.layers.iter().flat_map(Layer::image_refs)
    }

    /// The exported rectangle.
    #[must_use]
    pub fn output_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    /// Shift every world-anchored thing by `(dx, dy)`.
    ///
    /// Layers, viewport, mask origin and pending regions move together, so the
    /// picture on screen does not change while the output area's origin does.
    pub fn rebase(&mut self, dx: f64, dy: f64) {
        for layer in &mut self.layers {
            layer.translate(dx, dy);
        }
        self.viewport.translate(dx, dy);
        self.mask_origin = self.mask_origin.offset(dx, dy);
        for region in &mut self.pending_regions {
            *region = region.translated(dx, dy);
        }
    }

    /// Move a layer one step up the stack. Returns false if it is already on top.
    pub fn raise(&mut self, id: LayerId) -> bool {
        self.step_z(id, true)
    }

    /// Move a layer one step down the stack. Returns false if it is already at the bottom.
    pub fn lower(&mut self, id: LayerId) -> bool {
        self.step_z(id, false)
    }

    fn step_z(&mut self, id: LayerId, up: bool) -> bool {
        let order: Vec<LayerId> = self.layers_by_z().iter().map(|l| l.id).collect();
        let Some(pos) = order.iter().position(|&o| o == id) else {
            return false;
        };
        let target = if up {
            pos + 1
        } else if let Some(p) = pos.checked_sub(1) {
            p
        } else {
            return false;
        };
        if target >= order.len() {
            return false;
        }

        let mut order = order;
        order.swap(pos, target);
        for (z, lid) in order.iter().enumerate() {
            if let Some(layer) = self.layer_mut(*lid) {
                layer.z_index = i32::try_from(z).unwrap_or(i32::MAX);
            }
        }
        true
    }

    fn top_z(&self) -> Option<i32> {
        self.layers.iter().map(|l| l.z_index).max()
    }

    /// Get the number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Check if the canvas has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Serialize the canvas to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> EditorResult<String> {
        serde_json::to_string(self).map_err(EditorError::Serialization)
    }

    /// Deserialize a canvas from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> EditorResult<Self> {
        serde_json::from_str(json).map_err(EditorError::Serialization)
    }
}
