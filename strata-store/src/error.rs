//! Error types for persistence operations.

use thiserror::Error;

use strata_core::ImageId;

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by stores, the image cache and sessions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred while reading or writing the backing store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored bytes are not a decodable image.
    #[error("Failed to decode image {id}: {reason}")]
    Decode {
        /// Image that failed.
        id: ImageId,
        /// Decoder message.
        reason: String,
    },

    /// No bytes are stored under this id.
    #[error("Image not found: {0}")]
    ImageNotFound(ImageId),

    /// A session-level operation failed (e.g. a shared in-flight task died).
    #[error("Session error: {0}")]
    Session(String),
}

impl From<strata_core::EditorError> for StoreError {
    fn from(err: strata_core::EditorError) -> Self {
        match err {
            strata_core::EditorError::Serialization(e) => Self::Serialization(e),
            other => Self::Session(other.to_string()),
        }
    }
}
