//! Persisted shape of an editor instance.

use serde::{Deserialize, Serialize};

use crate::canvas::Canvas;
use crate::geometry::{Point, Viewport};
use crate::layer::{ImageId, Layer};
use crate::{EditorError, EditorResult};

/// Serialized editor state.
///
/// Layers carry [`ImageId`] references only; the pixels live in the image
/// store under those ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasDocument {
    /// Layers in insertion order.
    pub layers: Vec<Layer>,
    /// Pan/zoom at save time.
    #[serde(default)]
    pub viewport: Viewport,
    /// Output area width.
    pub width: f64,
    /// Output area height.
    pub height: f64,
    /// Global mask position.
    #[serde(default)]
    pub mask_origin: Point,
    /// Save timestamp (ms since the Unix epoch).
    #[serde(default)]
    pub saved_at: u64,
}

impl CanvasDocument {
    /// Capture a canvas.
    #[must_use]
    pub fn from_canvas(canvas: &Canvas, saved_at: u64) -> Self {
        Self {
            layers: canvas.layers().to_vec(),
            viewport: canvas.viewport,
            width: canvas.width,
            height: canvas.height,
            mask_origin: canvas.mask_origin,
            saved_at,
        }
    }

    /// Rebuild a canvas from this document.
    #[must_use]
    pub fn into_canvas(self) -> Canvas {
        let mut canvas = Canvas::new(self.width, self.height);
        canvas.viewport = self.viewport;
        canvas.mask_origin = self.mask_origin;
        canvas.set_layers(self.layers);
        canvas
    }

    /// Every image the document needs (duplicates removed, sorted).
    #[must_use]
    pub fn image_ids(&self) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = self
            .layers
            .iter()
            .flat_map(Layer::image_refs)
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Keep only layers whose every image satisfies `available`.
    ///
    /// Returns the dropped layers.
    pub fn retain_resolvable(&mut self, mut available: impl FnMut(&ImageId) -> bool) -> Vec<Layer> {
        let mut dropped = Vec::new();
        self.layers.retain(|layer| {
            if layer.image_refs().all(&mut available) {
                true
            } else {
                dropped.push(layer.clone());
                false
            }
        });
        dropped
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> EditorResult<String> {
        serde_json::to_string_pretty(self).map_err(EditorError::Serialization)
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> EditorResult<Self> {
        serde_json::from_str(json).map_err(EditorError::Serialization)
    }
}
