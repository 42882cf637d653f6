//! Image processing contract.
//!
//! Image leaves are cover-cropped to their box and clipped to a shape before
//! they are placed. The pixel work lives behind [`ImageProcessor`] so the
//! layout engine stays free of decoding code; `folio-renderer` provides the
//! real implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::shape::ShapeKind;

/// Errors from loading or processing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The leaf has no `src`.
    #[error("Image source missing")]
    MissingSource,

    /// Fetching the source failed.
    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    /// The bytes could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The processed pixels could not be encoded.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// The requested box is empty or too large.
    #[error("Invalid image size: {width}x{height}")]
    InvalidSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// What to produce from a source image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    /// Source URL or data URI.
    pub src: String,
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// Clip shape.
    pub shape: ShapeKind,
    /// Corner radius for rectangular clips.
    pub corner_radius: f32,
}

/// A processed image ready to be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    /// PNG data URI (or the original source when no processing happened).
    pub data_uri: String,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
}

/// Loads, crops and clips images for image leaves.
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Produce an image exactly `request.width` x `request.height`, filled
    /// edge to edge (never letterboxed) and clipped to `request.shape`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be fetched, decoded or encoded.
    async fn process(&self, request: ImageRequest) -> Result<ProcessedImage, ImageError>;
}

/// Processor that leaves the source untouched.
///
/// Used when no pixel backend is configured; renderers then draw the
/// original source scaled into the box.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughImageProcessor;

#[async_trait]
impl ImageProcessor for PassthroughImageProcessor {
    async fn process(&self, request: ImageRequest) -> Result<ProcessedImage, ImageError> {
        if request.src.is_empty() {
            return Err(ImageError::MissingSource);
        }
        if request.width == 0 || request.height == 0 {
            return Err(ImageError::InvalidSize {
                width: request.width,
                height: request.height,
            });
        }
        Ok(ProcessedImage {
            data_uri: request.src,
            width: request.width,
            height: request.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(src: &str, width: u32, height: u32) -> ImageRequest {
        ImageRequest {
            src: src.to_string(),
            width,
            height,
            shape: ShapeKind::Circle,
            corner_radius: 0.0,
        }
    }

    #[tokio::test]
    async fn test_passthrough_keeps_source() {
        let processed = PassthroughImageProcessor
            .process(request("https://example.com/a.png", 120, 80))
            .await
            .expect("process");
        assert_eq!(processed.data_uri, "https://example.com/a.png");
        assert_eq!((processed.width, processed.height), (120, 80));
    }

    #[tokio::test]
    async fn test_passthrough_rejects_bad_requests() {
        let missing = PassthroughImageProcessor.process(request("", 10, 10)).await;
        assert!(matches!(missing, Err(ImageError::MissingSource)));

        let empty = PassthroughImageProcessor.process(request("a.png", 0, 10)).await;
        assert!(matches!(empty, Err(ImageError::InvalidSize { width: 0, .. })));
    }
}
