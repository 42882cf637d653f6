//! Error types for canvas operations.

use thiserror::Error;

use crate::image::ImageError;

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur in canvas operations.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Element not found in scene.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Page not found in the page sequence.
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// The last remaining page cannot be removed.
    #[error("Cannot delete the last page")]
    LastPage,

    /// Invalid element operation.
    #[error("Invalid operation on element: {0}")]
    InvalidOperation(String),

    /// A request arrived while an exclusive operation was still in flight.
    ///
    /// The newer request is dropped, never queued.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Scene or template serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An image could not be loaded or processed.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// Export of one or more page regions failed.
    #[error("Export failed: {0}")]
    Export(String),
}
