//! Export contract: which page regions to capture and how.
//!
//! The controller decides *what* to capture (page rectangles in scene
//! coordinates, with selection chrome and page frames hidden); a
//! [`RegionRasterizer`] decides *how* pixels and documents are produced.

use serde::{Deserialize, Serialize};

use crate::element::Rect;
use crate::scene::Scene;

/// Default pixel density multiplier (print quality).
pub const DEFAULT_EXPORT_MULTIPLIER: f32 = 4.0;

/// Output container of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    /// One image per page.
    #[default]
    Raster,
    /// A single multi-page document.
    Document,
}

/// Encoding of raster pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// JPEG.
    Jpeg,
}

impl RasterFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// What to export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    /// Page indices in output order. Out-of-range indices are skipped.
    pub page_indices: Vec<usize>,
    /// Output container.
    pub kind: ExportKind,
    /// Encoding of each page image.
    pub format: RasterFormat,
    /// Output pixels per scene unit.
    pub dpi_multiplier: f32,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            page_indices: Vec::new(),
            kind: ExportKind::Raster,
            format: RasterFormat::Png,
            dpi_multiplier: DEFAULT_EXPORT_MULTIPLIER,
        }
    }
}

impl ExportRequest {
    /// One image per listed page.
    #[must_use]
    pub fn raster(page_indices: Vec<usize>) -> Self {
        Self {
            page_indices,
            ..Self::default()
        }
    }

    /// One document containing the listed pages.
    #[must_use]
    pub fn document(page_indices: Vec<usize>) -> Self {
        Self {
            page_indices,
            kind: ExportKind::Document,
            ..Self::default()
        }
    }

    /// Set the page encoding.
    #[must_use]
    pub fn with_format(mut self, format: RasterFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the density multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.dpi_multiplier = multiplier;
        self
    }
}

/// One captured page.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    /// Index of the page this image shows.
    pub page_index: usize,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Encoding of `data`.
    pub format: RasterFormat,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutput {
    /// One image per exported page.
    Images(Vec<RasterImage>),
    /// A composed document.
    Document(Vec<u8>),
}

/// Produces pixels for scene regions and composes documents from them.
pub trait RegionRasterizer {
    /// Error reported for a failed capture or composition.
    type Error: std::fmt::Display;

    /// Capture `region` of `scene` at `multiplier` output pixels per
    /// scene unit. Invisible and export-excluded elements are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be drawn or encoded.
    fn rasterize_region(
        &self,
        scene: &Scene,
        region: Rect,
        multiplier: f32,
        format: RasterFormat,
    ) -> Result<RasterImage, Self::Error>;

    /// Combine captured pages into one document with pages of `page_size`
    /// (scene units).
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be built.
    fn compose_document(
        &self,
        pages: &[RasterImage],
        page_size: (f32, f32),
    ) -> Result<Vec<u8>, Self::Error>;
}
