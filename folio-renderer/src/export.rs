//! Region rasterization and document composition.
//!
//! A scene region is written out as SVG (a `viewBox` over the region),
//! rasterized with resvg/tiny-skia at the requested multiplier and encoded
//! as PNG or JPEG. Documents are one raster page per PDF page.

use std::fmt::Write;

use folio_core::element::{ElementKind, ImageContent, PositionedElement, ShapeStyle, TextStyle};
use folio_core::{RasterFormat, RasterImage, Rect, RegionRasterizer, Scene, TextAlign};
use image::ImageEncoder;

use crate::error::{RenderError, RenderResult};

/// Millimetres per point (1/72 inch).
const MM_PER_PT: f32 = 25.4 / 72.0;

/// Configuration for region export.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Background drawn below the region, as RGBA bytes.
    pub background: [u8; 4],
    /// JPEG quality 1-100.
    pub jpeg_quality: u8,
    /// Document title written into PDF metadata.
    pub document_title: String,
    /// Largest accepted output side in pixels.
    pub max_side: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            background: [255, 255, 255, 255],
            jpeg_quality: 90,
            document_title: "Folio Export".to_string(),
            max_side: 16_384,
        }
    }
}

/// Renders scene regions to images and composes PDF documents.
#[derive(Debug, Clone, Default)]
pub struct SceneExporter {
    config: ExportConfig,
}

impl SceneExporter {
    /// Create a new exporter with the given configuration.
    #[must_use]
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Create an exporter with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Exporter configuration.
    #[must_use]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Output pixel size of `region` at `multiplier`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty region, a non-positive multiplier or an
    /// output larger than the configured maximum.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn output_size(&self, region: Rect, multiplier: f32) -> RenderResult<(u32, u32)> {
        if !(region.width > 0.0 && region.height > 0.0 && multiplier > 0.0) {
            return Err(RenderError::Rasterize(format!(
                "Empty region {}x{} at {multiplier}x",
                region.width, region.height
            )));
        }
        let width = (region.width * multiplier).round().max(1.0) as u32;
        let height = (region.height * multiplier).round().max(1.0) as u32;
        if width > self.config.max_side || height > self.config.max_side {
            return Err(RenderError::Rasterize(format!(
                "Output {width}x{height} exceeds {} pixels",
                self.config.max_side
            )));
        }
        Ok((width, height))
    }

    /// Write `region` of `scene` as an SVG document of `width` x `height`
    /// pixels.
    ///
    /// Invisible and export-excluded elements are skipped, as are elements
    /// entirely outside the region.
    #[must_use]
    pub fn render_region_svg(&self, scene: &Scene, region: Rect, width: u32, height: u32) -> String {
        let mut svg = String::with_capacity(4096);
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{width}\" height=\"{height}\" viewBox=\"{} {} {} {}\">",
            region.x, region.y, region.width, region.height,
        );

        let bg = &self.config.background;
        let _ = write!(
            svg,
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"rgb({},{},{})\" fill-opacity=\"{}\"/>",
            region.x,
            region.y,
            region.width,
            region.height,
            bg[0],
            bg[1],
            bg[2],
            f32::from(bg[3]) / 255.0,
        );

        let mut clip_ids = 0usize;
        for element in scene.elements() {
            if !element.visible || element.exclude_from_export {
                continue;
            }
            if !intersects(&element.bounds(), &region) {
                continue;
            }
            render_element_svg(&mut svg, element, &mut clip_ids);
        }

        svg.push_str("</svg>");
        svg
    }

    /// Rasterize an SVG document to a pixmap of its declared size.
    ///
    /// # Errors
    ///
    /// Returns an error if the SVG cannot be parsed or the size is invalid.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rasterize_svg(svg: &str) -> RenderResult<tiny_skia::Pixmap> {
        let opt = usvg::Options::default();
        let tree = usvg::Tree::from_str(svg, &opt)
            .map_err(|e| RenderError::Rasterize(format!("SVG parsing failed: {e}")))?;

        let px_w = tree.size().width().round() as u32;
        let px_h = tree.size().height().round() as u32;
        let mut pixmap = tiny_skia::Pixmap::new(px_w.max(1), px_h.max(1))
            .ok_or_else(|| RenderError::Rasterize("Failed to create pixmap".to_string()))?;

        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
        Ok(pixmap)
    }

    /// Encode a pixmap. JPEG output is flattened onto the background.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode(&self, pixmap: &tiny_skia::Pixmap, format: RasterFormat) -> RenderResult<Vec<u8>> {
        match format {
            RasterFormat::Png => pixmap
                .encode_png()
                .map_err(|e| RenderError::Encode(format!("PNG encoding failed: {e}"))),
            RasterFormat::Jpeg => {
                let (width, height) = (pixmap.width(), pixmap.height());
                let bg = &self.config.background;
                let mut rgb_data = Vec::with_capacity((width * height * 3) as usize);
                // Premultiplied: color + background * (1 - alpha).
                for pixel in pixmap.data().chunks_exact(4) {
                    let inv = 1.0 - f32::from(pixel[3]) / 255.0;
                    for channel in 0..3 {
                        let value = f32::from(bg[channel]).mul_add(inv, f32::from(pixel[channel]));
                        rgb_data.push(value.round().min(255.0) as u8);
                    }
                }

                let mut buf = std::io::Cursor::new(Vec::new());
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut buf,
                    self.config.jpeg_quality,
                );
                encoder
                    .write_image(&rgb_data, width, height, image::ColorType::Rgb8.into())
                    .map_err(|e| RenderError::Encode(format!("JPEG encoding failed: {e}")))?;
                Ok(buf.into_inner())
            }
        }
    }

    /// Render and encode one region.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is invalid or rendering fails.
    pub fn render_region(
        &self,
        scene: &Scene,
        region: Rect,
        multiplier: f32,
        format: RasterFormat,
    ) -> RenderResult<RasterImage> {
        let (width, height) = self.output_size(region, multiplier)?;
        let svg = self.render_region_svg(scene, region, width, height);
        let pixmap = Self::rasterize_svg(&svg)?;
        let data = self.encode(&pixmap, format)?;
        tracing::debug!(
            "Rasterized region {:?} to {}x{} {:?}",
            region,
            width,
            height,
            format
        );
        Ok(RasterImage {
            page_index: 0,
            width,
            height,
            format,
            data,
        })
    }

    /// Compose captured pages into a PDF, one image per page, each page
    /// `page_size` points large.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no pages, an image cannot be decoded or
    /// the document cannot be written.
    #[allow(clippy::cast_precision_loss)]
    pub fn compose_pdf(&self, pages: &[RasterImage], page_size: (f32, f32)) -> RenderResult<Vec<u8>> {
        let (first, rest) = pages
            .split_first()
            .ok_or_else(|| RenderError::Document("No pages to compose".to_string()))?;
        let page_w = printpdf::Mm(page_size.0 * MM_PER_PT);
        let page_h = printpdf::Mm(page_size.1 * MM_PER_PT);

        let (doc, page, layer) =
            printpdf::PdfDocument::new(&self.config.document_title, page_w, page_h, "Page 1");
        place_page_image(doc.get_page(page).get_layer(layer), first, page_size.0)?;

        for (i, image) in rest.iter().enumerate() {
            let (page, layer) = doc.add_page(page_w, page_h, format!("Page {}", i + 2));
            place_page_image(doc.get_page(page).get_layer(layer), image, page_size.0)?;
        }

        let bytes = doc
            .save_to_bytes()
            .map_err(|e| RenderError::Document(format!("PDF save failed: {e}")))?;
        tracing::info!("Composed PDF with {} pages", pages.len());
        Ok(bytes)
    }
}

impl RegionRasterizer for SceneExporter {
    type Error = RenderError;

    fn rasterize_region(
        &self,
        scene: &Scene,
        region: Rect,
        multiplier: f32,
        format: RasterFormat,
    ) -> RenderResult<RasterImage> {
        self.render_region(scene, region, multiplier, format)
    }

    fn compose_document(
        &self,
        pages: &[RasterImage],
        page_size: (f32, f32),
    ) -> RenderResult<Vec<u8>> {
        self.compose_pdf(pages, page_size)
    }
}

/// Place an image so that it spans the full page width.
#[allow(clippy::cast_precision_loss)]
fn place_page_image(
    layer: printpdf::PdfLayerReference,
    page: &RasterImage,
    page_width_pt: f32,
) -> RenderResult<()> {
    let dynamic_image = printpdf::image_crate::load_from_memory(&page.data).map_err(|e| {
        RenderError::Document(format!("Failed to decode page {}: {e}", page.page_index))
    })?;
    let pdf_image = printpdf::Image::from_dynamic_image(&dynamic_image);
    // Pixels per inch that make the image exactly one page wide.
    let dpi = page.width as f32 * 72.0 / page_width_pt;
    pdf_image.add_to_layer(
        layer,
        printpdf::ImageTransform {
            translate_x: Some(printpdf::Mm(0.0)),
            translate_y: Some(printpdf::Mm(0.0)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
    Ok(())
}

fn intersects(a: &Rect, b: &Rect) -> bool {
    a.x < b.right() && a.right() > b.x && a.y < b.bottom() && a.bottom() > b.y
}

/// Render a single element to SVG.
fn render_element_svg(svg: &mut String, element: &PositionedElement, clip_ids: &mut usize) {
    let bounds = element.bounds();
    let tf = &element.transform;

    let clipped = if let Some(clip) = element.clip {
        *clip_ids += 1;
        let id = *clip_ids;
        let r = clip.rect;
        let _ = write!(
            svg,
            "<clipPath id=\"clip{id}\"><rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"/></clipPath><g clip-path=\"url(#clip{id})\">",
            r.x, r.y, r.width, r.height,
        );
        true
    } else {
        false
    };

    svg.push_str("<g");
    if element.opacity < 1.0 {
        let _ = write!(svg, " opacity=\"{}\"", element.opacity.max(0.0));
    }
    if tf.rotation != 0.0 {
        let _ = write!(
            svg,
            " transform=\"rotate({} {} {})\"",
            tf.rotation,
            bounds.center_x(),
            bounds.center_y()
        );
    }
    svg.push('>');

    match &element.kind {
        ElementKind::Text(style) => render_text_svg(svg, style, bounds),
        ElementKind::Shape(style) => render_shape_svg(svg, style, bounds),
        ElementKind::Image(content) => render_image_svg(svg, content, bounds, clip_ids),
        ElementKind::Group { children } => {
            for child in children.iter().filter(|c| c.visible && !c.exclude_from_export) {
                render_element_svg(svg, child, clip_ids);
            }
        }
    }

    svg.push_str("</g>");
    if clipped {
        svg.push_str("</g>");
    }
}

fn render_text_svg(svg: &mut String, style: &TextStyle, bounds: Rect) {
    let (x, anchor) = match style.text_align {
        TextAlign::Left | TextAlign::Justify => (bounds.x, "start"),
        TextAlign::Center => (bounds.center_x(), "middle"),
        TextAlign::Right => (bounds.right(), "end"),
    };
    let line_height = style.font_size * style.line_height;
    let _ = write!(
        svg,
        "<text font-family=\"{}\" font-size=\"{}\" font-weight=\"{}\" font-style=\"{}\" fill=\"{}\" text-anchor=\"{anchor}\"",
        escape_xml(&style.font_family),
        style.font_size,
        escape_xml(&style.font_weight),
        escape_xml(&style.font_style),
        svg_paint(&style.color),
    );
    if style.char_spacing != 0.0 {
        let _ = write!(
            svg,
            " letter-spacing=\"{}\"",
            style.char_spacing / 1000.0 * style.font_size
        );
    }
    svg.push('>');

    let mut baseline = bounds.y + style.font_size;
    for line in style.content.split('\n') {
        let _ = write!(
            svg,
            "<tspan x=\"{x}\" y=\"{baseline}\">{}</tspan>",
            escape_xml(line)
        );
        baseline += line_height;
    }
    svg.push_str("</text>");
}

fn render_shape_svg(svg: &mut String, style: &ShapeStyle, bounds: Rect) {
    let outline = style
        .shape
        .outline(bounds.width, bounds.height, style.corner_radius);
    let _ = write!(
        svg,
        "<path d=\"{}\" fill=\"{}\"",
        outline.to_svg_path(bounds.x, bounds.y),
        svg_paint(&style.fill),
    );
    if let Some(stroke) = style.stroke.as_deref().filter(|_| style.stroke_width > 0.0) {
        let _ = write!(
            svg,
            " stroke=\"{}\" stroke-width=\"{}\"",
            svg_paint(stroke),
            style.stroke_width
        );
    }
    svg.push_str("/>");
}

fn render_image_svg(svg: &mut String, content: &ImageContent, bounds: Rect, clip_ids: &mut usize) {
    let outline = content
        .clip
        .outline(bounds.width, bounds.height, content.corner_radius);
    let processed = content.data_uri.is_some();
    if !processed {
        // Unprocessed sources are clipped here instead of in the pixels.
        *clip_ids += 1;
        let id = *clip_ids;
        let _ = write!(
            svg,
            "<clipPath id=\"clip{id}\"><path d=\"{}\"/></clipPath><g clip-path=\"url(#clip{id})\">",
            outline.to_svg_path(bounds.x, bounds.y),
        );
    }
    let _ = write!(
        svg,
        "<image x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" preserveAspectRatio=\"xMidYMid slice\" xlink:href=\"{}\"/>",
        bounds.x,
        bounds.y,
        bounds.width,
        bounds.height,
        escape_xml(content.display_src()),
    );
    if !processed {
        svg.push_str("</g>");
    }
    if let Some(stroke) = content
        .stroke
        .as_deref()
        .filter(|_| content.stroke_width > 0.0)
    {
        let _ = write!(
            svg,
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\"/>",
            outline.to_svg_path(bounds.x, bounds.y),
            svg_paint(stroke),
            content.stroke_width,
        );
    }
}

/// Color value usable as an SVG paint.
fn svg_paint(color: &str) -> String {
    if color.is_empty() || color.eq_ignore_ascii_case("transparent") {
        "none".to_string()
    } else {
        escape_xml(color)
    }
}

/// Escape special XML characters.
fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
