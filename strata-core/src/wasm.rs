//! WebAssembly bindings for strata-core.
//!
//! The page forwards DOM events as [`InputEvent`] JSON and paints from the
//! canvas JSON returned by `flushRender` once per animation frame.

use wasm_bindgen::prelude::*;

use crate::{AddLayer, CanvasDocument, Editor, ImageId, InputEvent, LayerId};

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "wasm")]
    console_error_panic_hook::set_once();
}

/// Editor instance for WASM.
#[wasm_bindgen]
pub struct WasmEditor {
    editor: Editor,
}

#[wasm_bindgen]
impl WasmEditor {
    /// Create an editor with the given output size.
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            editor: Editor::new(width, height),
        }
    }

    /// Feed one input event serialized as JSON.
    ///
    /// Returns true when the page should schedule a paint.
    ///
    /// # Errors
    ///
    /// Returns an error string if the event JSON is malformed.
    #[wasm_bindgen(js_name = handleEventJson)]
    pub fn handle_event_json(&mut self, json: &str) -> Result<bool, String> {
        let event: InputEvent = serde_json::from_str(json).map_err(|e| e.to_string())?;
        let response = self.editor.handle(&event);
        Ok(response.render || self.editor.needs_render())
    }

    /// Add an uploaded image as a new layer, returning the layer id.
    #[wasm_bindgen(js_name = addImage)]
    pub fn add_image(&mut self, image_id: &str, width: f64, height: f64, fit: bool) -> String {
        let options = AddLayer {
            name: None,
            fit_to_canvas: fit,
        };
        self.editor
            .add_image(ImageId::new(image_id), width, height, &options)
            .to_string()
    }

    /// Select a layer by id.
    ///
    /// # Errors
    ///
    /// Returns an error string if the id is malformed or unknown.
    #[wasm_bindgen(js_name = selectLayer)]
    pub fn select_layer(&mut self, id: &str, additive: bool) -> Result<(), String> {
        let id = LayerId::parse(id).map_err(|e| e.to_string())?;
        self.editor
            .select_layer(id, additive)
            .map_err(|e| e.to_string())
    }

    /// Delete the selected layers.
    #[wasm_bindgen(js_name = deleteSelected)]
    pub fn delete_selected(&mut self) -> usize {
        self.editor.delete_selected()
    }

    /// Undo the last change.
    pub fn undo(&mut self) -> bool {
        self.editor.undo()
    }

    /// Redo the last undone change.
    pub fn redo(&mut self) -> bool {
        self.editor.redo()
    }

    /// Whether a paint is pending.
    #[wasm_bindgen(js_name = needsRender)]
    #[must_use]
    pub fn needs_render(&self) -> bool {
        self.editor.needs_render()
    }

    /// Canvas JSON to paint, or `undefined` when nothing changed.
    #[wasm_bindgen(js_name = flushRender)]
    pub fn flush_render(&mut self) -> Option<String> {
        if self.editor.flush_render() {
            self.editor.canvas().to_json().ok()
        } else {
            None
        }
    }

    /// Whether the state changed since the last call.
    #[wasm_bindgen(js_name = takeSaveRequest)]
    pub fn take_save_request(&mut self) -> bool {
        self.editor.take_save_request()
    }

    /// Current state as a document JSON.
    ///
    /// # Errors
    ///
    /// Returns an error string if serialization fails.
    #[wasm_bindgen(js_name = getDocumentJson)]
    pub fn get_document_json(&self) -> Result<String, String> {
        self.editor
            .document(crate::current_timestamp_ms())
            .to_json()
            .map_err(|e| e.to_string())
    }

    /// Replace the state with a document JSON.
    ///
    /// # Errors
    ///
    /// Returns an error string if parsing fails.
    #[wasm_bindgen(js_name = restoreDocumentJson)]
    pub fn restore_document_json(&mut self, json: &str) -> Result<(), String> {
        let document = CanvasDocument::from_json(json).map_err(|e| e.to_string())?;
        self.editor.restore_document(document);
        Ok(())
    }

    /// Name of the active gesture.
    #[wasm_bindgen(js_name = getMode)]
    #[must_use]
    pub fn get_mode(&self) -> String {
        self.editor.mode().name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasm_editor_starts_idle() {
        let editor = WasmEditor::new(512.0, 512.0);
        assert_eq!(editor.get_mode(), "none");
        assert!(editor.needs_render());
    }

    #[test]
    fn test_handle_event_json_rejects_garbage() {
        let mut editor = WasmEditor::new(512.0, 512.0);
        assert!(editor.handle_event_json("{ nope }").is_err());
    }

    #[test]
    fn test_click_on_layer_selects_it() {
        let mut editor = WasmEditor::new(512.0, 512.0);
        let id = editor.add_image("img", 100.0, 100.0, false);
        editor
            .handle_event_json(r#"{"type":"pointer_down","position":{"x":256.0,"y":256.0}}"#)
            .expect("down");
        editor
            .handle_event_json(r#"{"type":"pointer_up","position":{"x":256.0,"y":256.0}}"#)
            .expect("up");
        assert_eq!(editor.get_mode(), "none");
        let doc = editor.get_document_json().expect("document");
        assert!(doc.contains(&id));
    }

    #[test]
    fn test_document_roundtrip_and_undo() {
        let mut editor = WasmEditor::new(512.0, 512.0);
        editor.add_image("img", 100.0, 100.0, false);
        let json = editor.get_document_json().expect("document");

        let mut other = WasmEditor::new(1.0, 1.0);
        other.restore_document_json(&json).expect("restore");
        assert!(!other.undo());
        assert!(other.flush_render().is_some());
        assert!(other.flush_render().is_none());
    }
}
