//! Renderer error types.

use folio_core::ImageError;
use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur during rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Resource loading failed.
    #[error("Failed to load resource: {0}")]
    Resource(String),

    /// Drawing a region failed.
    #[error("Rasterization failed: {0}")]
    Rasterize(String),

    /// Encoding pixels failed.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Building a document failed.
    #[error("Document composition failed: {0}")]
    Document(String),
}

impl From<RenderError> for ImageError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Resource(msg) => Self::Decode(msg),
            RenderError::Encode(msg) => Self::Encode(msg),
            other => Self::Decode(other.to_string()),
        }
    }
}
