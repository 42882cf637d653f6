//! Image pipeline: decode, cover crop, shape clip, PNG data URI.
//!
//! Sources are either data URIs or references resolved by an
//! [`AssetSource`]. The output of [`CoverCropProcessor`] always has exactly
//! the requested size: the source is cropped around its center to the box's
//! aspect ratio and scaled, never letterboxed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use folio_core::shape::Outline;
use folio_core::{ImageError, ImageProcessor, ImageRequest, ProcessedImage};
use image::imageops::FilterType;
use image::RgbaImage;
use tiny_skia::{FillRule, Mask, PathBuilder, Pixmap, Transform};

use crate::error::{RenderError, RenderResult};

/// Largest accepted output side in pixels.
pub const MAX_IMAGE_SIDE: u32 = 8192;

/// Cubic Bezier handle length for a quarter circle.
const KAPPA: f32 = 0.552_284_8;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// WebP (alpha support).
    WebP,
    /// Unknown/other format.
    Unknown,
}

impl ImageFormat {
    /// Detect format from MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_lowercase().as_str() {
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/webp" => Self::WebP,
            _ => Self::Unknown,
        }
    }

    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            Self::Png
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Self::WebP
        } else {
            Self::Unknown
        }
    }
}

/// Decode raw bytes into RGBA pixels.
///
/// # Errors
///
/// Returns an error if the bytes are not a supported image.
pub fn load_image_from_bytes(data: &[u8]) -> RenderResult<RgbaImage> {
    let format = ImageFormat::from_magic_bytes(data);
    let img = image::load_from_memory(data)
        .map_err(|e| RenderError::Resource(format!("Failed to decode {format:?} image: {e}")))?;
    Ok(img.to_rgba8())
}

/// Extract the payload bytes of a data URI.
///
/// Supports base64 (`data:image/png;base64,iVBOR...`) and percent-encoded
/// payloads.
///
/// # Errors
///
/// Returns an error if the URI is malformed.
pub fn decode_data_uri(uri: &str) -> RenderResult<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| RenderError::Resource("Not a data URI".to_string()))?;
    let (metadata, payload) = rest
        .split_once(',')
        .ok_or_else(|| RenderError::Resource("Invalid data URI: missing comma".to_string()))?;

    if metadata.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| RenderError::Resource(format!("Failed to decode base64: {e}")))
    } else {
        percent_decode(payload)
    }
}

/// Decode an image from a data URI.
///
/// # Errors
///
/// Returns an error if the URI is malformed or the image cannot be decoded.
pub fn load_image_from_data_uri(uri: &str) -> RenderResult<RgbaImage> {
    load_image_from_bytes(&decode_data_uri(uri)?)
}

fn percent_decode(input: &str) -> RenderResult<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| RenderError::Resource("Invalid URL encoding".to_string()))?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    Ok(result)
}

/// Crop the longer axis around the center to the target aspect ratio, then
/// scale to exactly `width` x `height`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn cover_crop(source: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return RgbaImage::new(width, height);
    }
    let target_ratio = width as f32 / height as f32;
    let source_ratio = src_w as f32 / src_h as f32;

    let (crop_w, crop_h) = if source_ratio > target_ratio {
        (((src_h as f32) * target_ratio).round() as u32, src_h)
    } else {
        (src_w, ((src_w as f32) / target_ratio).round() as u32)
    };
    let crop_w = crop_w.clamp(1, src_w);
    let crop_h = crop_h.clamp(1, src_h);
    let x = (src_w - crop_w) / 2;
    let y = (src_h - crop_h) / 2;

    let cropped = image::imageops::crop_imm(source, x, y, crop_w, crop_h).to_image();
    if cropped.dimensions() == (width, height) {
        return cropped;
    }
    image::imageops::resize(&cropped, width, height, FilterType::Lanczos3)
}

/// Convert straight-alpha RGBA pixels to a premultiplied pixmap.
///
/// # Errors
///
/// Returns an error for an empty image.
pub fn to_pixmap(source: &RgbaImage) -> RenderResult<Pixmap> {
    let (width, height) = source.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| RenderError::Rasterize(format!("Invalid pixmap size {width}x{height}")))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(source.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Path of an outline in pixmap coordinates.
#[must_use]
pub fn outline_path(outline: &Outline) -> Option<tiny_skia::Path> {
    match outline {
        Outline::Rect { width, height } => Some(PathBuilder::from_rect(
            tiny_skia::Rect::from_xywh(0.0, 0.0, *width, *height)?,
        )),
        Outline::RoundedRect {
            width,
            height,
            radius,
        } => rounded_rect_path(*width, *height, *radius),
        Outline::Ellipse { cx, cy, rx, ry } => PathBuilder::from_oval(
            tiny_skia::Rect::from_xywh(cx - rx, cy - ry, rx * 2.0, ry * 2.0)?,
        ),
        Outline::Polygon(points) => {
            let (first, rest) = points.split_first()?;
            let mut pb = PathBuilder::new();
            pb.move_to(first.x, first.y);
            for p in rest {
                pb.line_to(p.x, p.y);
            }
            pb.close();
            pb.finish()
        }
    }
}

fn rounded_rect_path(w: f32, h: f32, r: f32) -> Option<tiny_skia::Path> {
    let r = r.min(w / 2.0).min(h / 2.0).max(0.0);
    let k = r * KAPPA;
    let mut pb = PathBuilder::new();
    pb.move_to(r, 0.0);
    pb.line_to(w - r, 0.0);
    pb.cubic_to(w - r + k, 0.0, w, r - k, w, r);
    pb.line_to(w, h - r);
    pb.cubic_to(w, h - r + k, w - r + k, h, w - r, h);
    pb.line_to(r, h);
    pb.cubic_to(r - k, h, 0.0, h - r + k, 0.0, h - r);
    pb.line_to(0.0, r);
    pb.cubic_to(0.0, r - k, r - k, 0.0, r, 0.0);
    pb.close();
    pb.finish()
}

/// Make every pixel outside `outline` transparent.
///
/// # Errors
///
/// Returns an error if the outline is degenerate.
pub fn clip_to_outline(pixmap: &mut Pixmap, outline: &Outline) -> RenderResult<()> {
    let path = outline_path(outline)
        .ok_or_else(|| RenderError::Rasterize("Degenerate clip outline".to_string()))?;
    let mut mask = Mask::new(pixmap.width(), pixmap.height())
        .ok_or_else(|| RenderError::Rasterize("Invalid mask size".to_string()))?;
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    pixmap.apply_mask(&mask);
    Ok(())
}

/// Encode a pixmap as a `data:image/png;base64,` URI.
///
/// # Errors
///
/// Returns an error if PNG encoding fails.
pub fn to_png_data_uri(pixmap: &Pixmap) -> RenderResult<String> {
    let png = pixmap
        .encode_png()
        .map_err(|e| RenderError::Encode(format!("PNG encoding failed: {e}")))?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Resolves non-data-URI image sources to bytes.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch the bytes behind `src`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Fetch`] if the source is unknown or unreadable.
    async fn fetch(&self, src: &str) -> Result<Vec<u8>, ImageError>;
}

/// In-memory assets keyed by source string.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetSource {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryAssetSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes under `src`.
    pub fn insert(&mut self, src: impl Into<String>, bytes: Vec<u8>) {
        self.assets.insert(src.into(), bytes);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with_asset(mut self, src: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(src, bytes);
        self
    }
}

#[async_trait]
impl AssetSource for MemoryAssetSource {
    async fn fetch(&self, src: &str) -> Result<Vec<u8>, ImageError> {
        self.assets
            .get(src)
            .cloned()
            .ok_or_else(|| ImageError::Fetch(format!("unknown asset {src}")))
    }
}

/// Local files, resolved relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    /// Resolve relative sources against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory relative sources are resolved against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetSource for FileAssetSource {
    async fn fetch(&self, src: &str) -> Result<Vec<u8>, ImageError> {
        let path = self.root.join(src.strip_prefix("file://").unwrap_or(src));
        tokio::fs::read(&path)
            .await
            .map_err(|e| ImageError::Fetch(format!("{}: {e}", path.display())))
    }
}

/// [`ImageProcessor`] that cover-crops to the requested box, clips to the
/// requested shape and returns a PNG data URI.
#[derive(Debug, Clone)]
pub struct CoverCropProcessor<S> {
    source: S,
}

impl<S: AssetSource> CoverCropProcessor<S> {
    /// Create a processor fetching non-data-URI sources from `source`.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self { source }
    }

    async fn load(&self, src: &str) -> Result<RgbaImage, ImageError> {
        let bytes = if src.starts_with("data:") {
            decode_data_uri(src)?
        } else {
            self.source.fetch(src).await?
        };
        Ok(load_image_from_bytes(&bytes)?)
    }
}

#[async_trait]
impl<S: AssetSource> ImageProcessor for CoverCropProcessor<S> {
    #[allow(clippy::cast_precision_loss)]
    async fn process(&self, request: ImageRequest) -> Result<ProcessedImage, ImageError> {
        if request.src.is_empty() {
            return Err(ImageError::MissingSource);
        }
        let (width, height) = (request.width, request.height);
        if width == 0 || height == 0 || width > MAX_IMAGE_SIDE || height > MAX_IMAGE_SIDE {
            return Err(ImageError::InvalidSize { width, height });
        }

        let source = self.load(&request.src).await?;
        let cropped = cover_crop(&source, width, height);
        let mut pixmap = to_pixmap(&cropped)?;
        if request.shape != folio_core::ShapeKind::Rect || request.corner_radius > 0.0 {
            let outline = request
                .shape
                .outline(width as f32, height as f32, request.corner_radius);
            clip_to_outline(&mut pixmap, &outline)?;
        }
        let data_uri = to_png_data_uri(&pixmap)?;
        tracing::debug!(
            "Processed image {}x{} from {}x{} source",
            width,
            height,
            source.width(),
            source.height()
        );
        Ok(ProcessedImage {
            data_uri,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::ShapeKind;
    use image::Rgba;

    /// 1x1 red PNG.
    const RED_PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8DwHwAFBQIAX8jx0gAAAABJRU5ErkJggg==";

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode png");
        buf.into_inner()
    }

    /// Left half red, right half blue.
    fn split_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn test_format_detection_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            ImageFormat::Png
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]),
            ImageFormat::Jpeg
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(b"RIFF\x00\x00\x00\x00WEBP"),
            ImageFormat::WebP
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF"), ImageFormat::Unknown);
        assert_eq!(ImageFormat::from_mime("image/JPG"), ImageFormat::Jpeg);
    }

    #[test]
    fn test_data_uri_parsing() {
        let image = load_image_from_data_uri(&format!("data:image/png;base64,{RED_PIXEL}"))
            .expect("valid data uri");
        assert_eq!(image.dimensions(), (1, 1));
        assert_eq!(image.get_pixel(0, 0).0[0], 255);

        assert!(load_image_from_data_uri("not a data uri").is_err());
        assert!(load_image_from_data_uri("data:image/png").is_err());
        assert_eq!(
            decode_data_uri("data:text/plain,a%20b").expect("percent"),
            b"a b".to_vec()
        );
        assert!(decode_data_uri("data:text/plain,%zz").is_err());
    }

    #[test]
    fn test_cover_crop_fills_box() {
        // Wide source into a square box: the sides are cut, the center kept.
        let source = RgbaImage::from_fn(300, 100, |x, _| {
            if (100..200).contains(&x) {
                Rgba([0, 255, 0, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let cropped = cover_crop(&source, 50, 50);
        assert_eq!(cropped.dimensions(), (50, 50));
        for (x, y) in [(0, 0), (49, 49)] {
            let [r, g, b, _] = cropped.get_pixel(x, y).0;
            assert!(r < 5 && g > 250 && b < 5, "black border leaked at ({x}, {y})");
        }
    }

    #[test]
    fn test_cover_crop_tall_box_keeps_center_column() {
        let cropped = cover_crop(&split_image(200, 100), 20, 100);
        assert_eq!(cropped.dimensions(), (20, 100));
        // The crop straddles the red/blue boundary.
        assert_eq!(cropped.get_pixel(0, 50).0[0], 255);
        assert_eq!(cropped.get_pixel(19, 50).0[2], 255);
    }

    #[test]
    fn test_shape_clip_clears_corners() {
        let mut pixmap = to_pixmap(&split_image(40, 40)).expect("pixmap");
        let outline = ShapeKind::Circle.outline(40.0, 40.0, 0.0);
        clip_to_outline(&mut pixmap, &outline).expect("clip");
        assert_eq!(pixmap.pixel(0, 0).expect("corner").alpha(), 0);
        assert_eq!(pixmap.pixel(39, 39).expect("corner").alpha(), 0);
        assert_eq!(pixmap.pixel(20, 20).expect("center").alpha(), 255);
    }

    #[test]
    fn test_rounded_rect_clip() {
        let mut pixmap = to_pixmap(&split_image(40, 40)).expect("pixmap");
        let outline = ShapeKind::Rounded.outline(40.0, 40.0, 12.0);
        clip_to_outline(&mut pixmap, &outline).expect("clip");
        assert_eq!(pixmap.pixel(0, 0).expect("corner").alpha(), 0);
        assert_eq!(pixmap.pixel(20, 1).expect("edge").alpha(), 255);
    }

    #[tokio::test]
    async fn test_processor_output_matches_request() {
        let assets =
            MemoryAssetSource::new().with_asset("photo.png", png_bytes(&split_image(64, 32)));
        let processor = CoverCropProcessor::new(assets);
        let processed = processor
            .process(ImageRequest {
                src: "photo.png".to_string(),
                width: 30,
                height: 20,
                shape: ShapeKind::Hexagon,
                corner_radius: 0.0,
            })
            .await
            .expect("process");
        assert_eq!((processed.width, processed.height), (30, 20));
        let decoded = load_image_from_data_uri(&processed.data_uri).expect("decode output");
        assert_eq!(decoded.dimensions(), (30, 20));
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    }

    #[tokio::test]
    async fn test_file_asset_source_reads_relative_and_file_urls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bytes = png_bytes(&split_image(4, 4));
        std::fs::write(dir.path().join("hero.png"), &bytes).expect("write asset");

        let assets = FileAssetSource::new(dir.path());
        assert_eq!(assets.fetch("hero.png").await.expect("plain"), bytes);
        assert_eq!(assets.fetch("file://hero.png").await.expect("file url"), bytes);
        assert!(matches!(
            assets.fetch("missing.png").await,
            Err(ImageError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn test_processor_errors() {
        let processor = CoverCropProcessor::new(MemoryAssetSource::new());
        let request = |src: &str, width| ImageRequest {
            src: src.to_string(),
            width,
            height: 10,
            shape: ShapeKind::Rect,
            corner_radius: 0.0,
        };
        assert!(matches!(
            processor.process(request("", 10)).await,
            Err(ImageError::MissingSource)
        ));
        assert!(matches!(
            processor.process(request("a.png", 0)).await,
            Err(ImageError::InvalidSize { .. })
        ));
        assert!(matches!(
            processor.process(request("missing.png", 10)).await,
            Err(ImageError::Fetch(_))
        ));
        assert!(matches!(
            processor
                .process(request("data:image/png;base64,AAAA", 10))
                .await,
            Err(ImageError::Decode(_))
        ));
    }
}
