//! # Folio Renderer
//!
//! Pixel backend for folio-core.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               folio-core traits             │
//! ├──────────────────────┬──────────────────────┤
//! │ ImageProcessor       │ RegionRasterizer     │
//! │ CoverCropProcessor   │ SceneExporter        │
//! │ decode → cover crop  │ scene → SVG → resvg  │
//! │ → shape clip → PNG   │ → PNG / JPEG / PDF   │
//! └──────────────────────┴──────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
#[cfg(feature = "export")]
pub mod export;
pub mod image;

pub use crate::error::{RenderError, RenderResult};
#[cfg(feature = "export")]
pub use crate::export::{ExportConfig, SceneExporter};
pub use crate::image::{
    clip_to_outline, cover_crop, load_image_from_bytes, load_image_from_data_uri, AssetSource,
    CoverCropProcessor, FileAssetSource, ImageFormat, MemoryAssetSource,
};

/// Folio renderer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
