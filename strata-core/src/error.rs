//! Error types for editor operations.

use thiserror::Error;

/// Result type for editor operations.
pub type EditorResult<T> = Result<T, EditorError>;

/// Errors that can occur in editor operations.
///
/// Geometry and history operations never fail; these cover lookups by ID and
/// document (de)serialization.
#[derive(Debug, Error)]
pub enum EditorError {
    /// Layer not found on the canvas.
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// Operation not valid in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Document serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
