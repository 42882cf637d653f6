//! Layout resolution: turns a [`LayoutNode`] tree into positioned elements.
//!
//! Resolution is a recursive walk. Every container receives the position of
//! its top-left corner and the width it may use, places its children, and
//! reports the height it consumed:
//!
//! ```text
//! resolve_node(node, ctx, x, y, available_width)
//!     -> LayoutResult { width, height, elements }
//! ```
//!
//! Only image leaves are asynchronous (they await the [`ImageProcessor`]),
//! but since any subtree may contain one, the whole walk is async and the
//! recursion goes through boxed futures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use crate::element::{
    ElementFactory, ElementKind, ElementRole, ImageContent, Point, PositionedElement, Rect,
    ShapeStyle, TextAlign, TextStyle, Transform, DEFAULT_COLOR, DEFAULT_FONT_FAMILY,
    DEFAULT_FONT_SIZE, DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_STROKE, DEFAULT_IMAGE_STROKE_WIDTH,
    DEFAULT_LINE_HEIGHT, DEFAULT_SHAPE_HEIGHT, NORMAL,
};
use crate::error::{CanvasError, CanvasResult};
use crate::image::{
    ImageError, ImageProcessor, ImageRequest, PassthroughImageProcessor, ProcessedImage,
};
use crate::node::{
    ComponentDef, Dimension, HorizontalPosition, Justify, LayoutKind, LayoutNode,
    TemplateDocument,
};
use crate::page::{Page, PageGeometry, PagingMode};
use crate::shape::ShapeKind;
use crate::text::{HeuristicTextMeasurer, TextMeasurer, TextMetrics};
use crate::tokens::{resolve_prop_refs, TokenResolver};

/// Gap used by grids and centered blocks that do not set one.
pub const DEFAULT_GAP: f32 = 16.0;
/// Column count of a grid that does not set one.
pub const DEFAULT_GRID_COLS: usize = 2;
/// Widest a centered block may be.
pub const MAX_CENTERED_WIDTH: f32 = 400.0;
/// Height of a spacer that does not set one.
pub const DEFAULT_SPACER_HEIGHT: f32 = 20.0;
/// Width a row child is measured at when it has no fixed width.
pub const ROW_MEASURE_WIDTH: f32 = 100.0;

// ============================================================================
// Results and context
// ============================================================================

/// Output of resolving one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutResult {
    /// Width the node occupies.
    pub width: f32,
    /// Height the node occupies.
    pub height: f32,
    /// Produced elements in emission order.
    pub elements: Vec<PositionedElement>,
}

impl LayoutResult {
    /// A result with no elements.
    #[must_use]
    pub fn empty(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            elements: Vec::new(),
        }
    }

    /// Move every produced element.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        for element in &mut self.elements {
            element.translate(dx, dy);
        }
    }

    /// Union of the produced elements' bounds.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        self.elements
            .iter()
            .map(PositionedElement::bounds)
            .reduce(|a, b| a.union(&b))
    }
}

/// Everything a node needs to know about where it is being resolved.
#[derive(Debug, Clone, Copy)]
pub struct LayoutContext<'a> {
    /// Page size and spacing.
    pub geometry: PageGeometry,
    /// Scene position of the page's top-left corner.
    pub offset: Point,
    /// Id of the page being resolved.
    pub page_id: &'a str,
    /// Design tokens.
    pub tokens: &'a Value,
    /// Component library.
    pub components: &'a BTreeMap<String, ComponentDef>,
    z_index: Option<i32>,
    rotation: Option<f32>,
}

impl<'a> LayoutContext<'a> {
    /// Context for a page of `document` placed at `offset`.
    #[must_use]
    pub fn new(
        document: &'a TemplateDocument,
        geometry: PageGeometry,
        offset: Point,
        page_id: &'a str,
    ) -> Self {
        Self {
            geometry,
            offset,
            page_id,
            tokens: &document.tokens,
            components: &document.components,
            z_index: None,
            rotation: None,
        }
    }

    /// Context for the children of `node`: its z-index and rotation
    /// override the inherited ones.
    #[must_use]
    fn enter(self, node: &LayoutNode) -> Self {
        Self {
            z_index: node.z_index.or(self.z_index),
            rotation: node.rotation.or(self.rotation),
            ..self
        }
    }

    fn resolver(&self) -> TokenResolver<'a> {
        TokenResolver::new(self.tokens)
    }

    fn decorate(&self, element: &mut PositionedElement) {
        if let Some(z) = self.z_index {
            element.transform.z_index = z;
        }
        if let Some(rotation) = self.rotation {
            element.transform.rotation = rotation;
        }
    }
}

/// One resolved page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// The page entity.
    pub page: Page,
    /// Elements sorted by z-index, background first.
    pub elements: Vec<PositionedElement>,
    /// Content height reported by the root node.
    pub content_height: f32,
}

/// A fully resolved template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedTemplate {
    /// Pages in order.
    pub pages: Vec<Page>,
    /// Elements of all pages, page by page.
    pub elements: Vec<PositionedElement>,
}

// ============================================================================
// Engine
// ============================================================================

/// Resolves templates into positioned elements.
pub struct LayoutEngine {
    geometry: PageGeometry,
    factory: ElementFactory,
    processor: Arc<dyn ImageProcessor>,
    measurer: Arc<dyn TextMeasurer>,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("geometry", &self.geometry)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight flag when a template render ends, however it ends.
struct RenderGuard<'a>(&'a AtomicBool);

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LayoutEngine {
    /// Engine with pass-through images and heuristic text measurement.
    #[must_use]
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            factory: ElementFactory::default(),
            processor: Arc::new(PassthroughImageProcessor),
            measurer: Arc::new(HeuristicTextMeasurer),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Use a different image processor.
    #[must_use]
    pub fn with_image_processor(mut self, processor: Arc<dyn ImageProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Use a different text measurer.
    #[must_use]
    pub fn with_text_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        self.measurer = measurer;
        self
    }

    /// Use a different element factory.
    #[must_use]
    pub fn with_factory(mut self, factory: ElementFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Page geometry used for page offsets.
    #[must_use]
    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Run one image through the configured processor.
    ///
    /// # Errors
    ///
    /// Returns the processor's error unchanged.
    pub async fn process_image(&self, request: ImageRequest) -> Result<ProcessedImage, ImageError> {
        self.processor.process(request).await
    }

    /// Measure a text box with the configured measurer.
    #[must_use]
    pub fn measure_text(&self, style: &TextStyle, max_width: f32) -> TextMetrics {
        self.measurer.measure(style, max_width)
    }

    /// Resolve every page of a template.
    ///
    /// Only one template render may run at a time per engine.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::StateConflict`] if another render is still in
    /// flight; the request is dropped, not queued.
    pub async fn render_template(
        &self,
        document: &TemplateDocument,
        mode: PagingMode,
    ) -> CanvasResult<RenderedTemplate> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!("Template render already in flight, dropping request");
            return Err(CanvasError::StateConflict(
                "template render already in flight".to_string(),
            ));
        }
        let _guard = RenderGuard(&self.in_flight);

        let mut rendered = RenderedTemplate::default();
        for index in 0..document.pages.len() {
            let page = self.render_page(document, index, mode).await?;
            rendered.pages.push(page.page);
            rendered.elements.extend(page.elements);
        }
        tracing::info!(
            "Rendered template with {} pages and {} elements",
            rendered.pages.len(),
            rendered.elements.len()
        );
        Ok(rendered)
    }

    /// Resolve page `index` of a template at its slot for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PageNotFound`] if the index is out of range.
    pub async fn render_page(
        &self,
        document: &TemplateDocument,
        index: usize,
        mode: PagingMode,
    ) -> CanvasResult<RenderedPage> {
        let root = document
            .pages
            .get(index)
            .ok_or_else(|| CanvasError::PageNotFound(format!("index {index}")))?;
        let page_id = root.id.clone().unwrap_or_else(|| Page::default_id(index));
        let offset = self.geometry.offset(index, mode);
        let ctx = LayoutContext::new(document, self.geometry, offset, &page_id);

        let mut page = Page::new(page_id.clone());
        let mut elements = Vec::new();

        if let Some(background) = &root.background {
            let color = ctx.resolver().resolve(&Value::String(background.clone()));
            let color = value_to_string(&color).unwrap_or_else(|| background.clone());
            page = page.with_background(color.clone());
            elements.push(self.factory.page_background(
                &page_id,
                self.geometry.page_rect(index, mode),
                &color,
            ));
        }

        let result = self
            .resolve_node(root, ctx, offset.x, offset.y, self.geometry.width)
            .await;
        elements.extend(result.elements);

        // Stable: equal z-indices keep emission order.
        elements.sort_by_key(|e| e.transform.z_index);
        for element in &mut elements {
            tag_page(element, &page_id);
        }

        tracing::debug!(
            "Rendered page {} with {} elements, height {}",
            page_id,
            elements.len(),
            result.height
        );
        Ok(RenderedPage {
            page,
            elements,
            content_height: result.height,
        })
    }

    /// Resolve one node at `(x, y)` with `available_width` to use.
    pub fn resolve_node<'a>(
        &'a self,
        node: &'a LayoutNode,
        ctx: LayoutContext<'a>,
        x: f32,
        y: f32,
        available_width: f32,
    ) -> BoxFuture<'a, LayoutResult> {
        async move {
            let width = effective_width(node, available_width);

            if node.is_spacer() {
                return LayoutResult::empty(width, node.height.unwrap_or(DEFAULT_SPACER_HEIGHT));
            }

            let ctx = ctx.enter(node);
            let kind = match &node.layout {
                Some(LayoutKind::Unknown(name)) if !node.children.is_empty() => {
                    tracing::warn!("Unknown layout kind '{}', using stack", name);
                    Some(LayoutKind::Stack)
                }
                Some(LayoutKind::Unknown(_)) | None if !node.children.is_empty() => {
                    Some(LayoutKind::Stack)
                }
                Some(LayoutKind::Unknown(_)) | None => None,
                Some(kind) => Some(kind.clone()),
            };

            match kind {
                Some(LayoutKind::Stack) => self.stack(node, ctx, x, y, width).await,
                Some(LayoutKind::Row) => self.row(node, ctx, x, y, width).await,
                Some(LayoutKind::Columns) => self.columns(node, ctx, x, y, width).await,
                Some(LayoutKind::Grid) => self.grid(node, ctx, x, y, width).await,
                Some(LayoutKind::Centered) => self.centered(node, ctx, x, y, width).await,
                Some(LayoutKind::Absolute) => self.absolute(node, ctx, x, y, width).await,
                _ if node.is_leaf() => self.leaf(node, ctx, x, y, width).await,
                _ => LayoutResult::empty(0.0, 0.0),
            }
        }
        .boxed()
    }

    // ------------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------------

    async fn stack(
        &self,
        node: &LayoutNode,
        ctx: LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> LayoutResult {
        let padding = node.insets();
        let gap = node.gap.unwrap_or(0.0);
        let content_x = x + padding.left;
        let content_width = width - padding.horizontal();

        let mut cursor = y + padding.top;
        let mut elements = Vec::new();
        let mut bottom_anchored: Vec<(std::ops::Range<usize>, f32)> = Vec::new();

        for child in &node.children {
            let child_x = content_x + child.left.unwrap_or(0.0);
            let child_y = cursor + child.top.unwrap_or(0.0);
            let mut result = self
                .resolve_node(child, ctx, child_x, child_y, content_width)
                .await;

            if let (Some(right), Some(bounds)) = (child.right, result.bounds()) {
                result.translate(content_x + content_width - right - bounds.right(), 0.0);
            }

            let start = elements.len();
            elements.append(&mut result.elements);
            if let Some(bottom) = child.bottom {
                bottom_anchored.push((start..elements.len(), bottom));
            }

            let advance = match child.top {
                Some(top) if top < 0.0 => (result.height + top).max(0.0),
                _ => result.height,
            };
            cursor += advance + gap;
        }
        if !node.children.is_empty() {
            cursor -= gap;
        }

        let extent = cursor - y;
        let height = node.height.map_or(extent, |h| h.max(extent)) + padding.bottom;

        // Bottom offsets need the final container height.
        let content_bottom = y + height - padding.bottom;
        for (range, bottom) in bottom_anchored {
            let placed = &mut elements[range];
            let Some(bounds) = placed
                .iter()
                .map(PositionedElement::bounds)
                .reduce(|a, b| a.union(&b))
            else {
                continue;
            };
            let dy = content_bottom - bottom - bounds.bottom();
            for element in placed {
                element.translate(0.0, dy);
            }
        }

        LayoutResult {
            width,
            height,
            elements,
        }
    }

    async fn row(
        &self,
        node: &LayoutNode,
        ctx: LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> LayoutResult {
        struct Item {
            result: LayoutResult,
            width: f32,
        }

        if node.children.is_empty() {
            return LayoutResult::empty(width, 0.0);
        }

        let padding = node.insets();
        let gap = node.gap.unwrap_or(0.0);
        let justify = node.justify.unwrap_or_default();
        let content_x = x + padding.left;
        let content_y = y + padding.top;
        let content_width = width - padding.horizontal();

        // Measure pass; growable children are sized after the fixed ones.
        let mut items = Vec::with_capacity(node.children.len());
        let mut fixed_total = 0.0;
        let mut grow_total = 0.0;
        for child in &node.children {
            let fixed = child.fixed_width();
            let measure_width = fixed.unwrap_or(ROW_MEASURE_WIDTH);
            let result = self.resolve_node(child, ctx, 0.0, 0.0, measure_width).await;
            let item_width = match (fixed, child.grow_weight()) {
                (Some(w), _) => w,
                (None, Some(_)) => 0.0,
                (None, None) => result.width,
            };
            match child.grow_weight() {
                Some(weight) => grow_total += weight,
                None => fixed_total += item_width,
            }
            items.push(Item {
                result,
                width: item_width,
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let gap_total = (node.children.len() - 1) as f32 * gap;
        if grow_total > 0.0 {
            let remaining = (content_width - fixed_total - gap_total).max(0.0);
            for (child, item) in node.children.iter().zip(items.iter_mut()) {
                if let Some(weight) = child.grow_weight() {
                    item.width = weight / grow_total * remaining;
                    item.result = self.resolve_node(child, ctx, 0.0, 0.0, item.width).await;
                }
            }
        }

        let mut elements = Vec::new();

        if node.wrap {
            let mut lines: Vec<Vec<Item>> = Vec::new();
            let mut line: Vec<Item> = Vec::new();
            let mut line_width = 0.0;
            for item in items {
                let with_gap = item.width + if line.is_empty() { 0.0 } else { gap };
                if !line.is_empty() && line_width + with_gap > content_width {
                    lines.push(std::mem::take(&mut line));
                    line_width = item.width;
                } else {
                    line_width += with_gap;
                }
                line.push(item);
            }
            if !line.is_empty() {
                lines.push(line);
            }

            let mut line_y = content_y;
            for line in lines {
                let widths: f32 = line.iter().map(|item| item.width).sum();
                let (start, item_gap) =
                    justify_spacing(justify, content_width - widths, line.len(), gap);
                let line_height = line
                    .iter()
                    .map(|item| item.result.height)
                    .fold(0.0, f32::max);
                let mut line_x = content_x + start;
                for mut item in line {
                    item.result.translate(line_x, line_y);
                    elements.append(&mut item.result.elements);
                    line_x += item.width + item_gap;
                }
                line_y += line_height + gap;
            }

            let height = (line_y - content_y - gap + padding.vertical()).max(0.0);
            return LayoutResult {
                width,
                height,
                elements,
            };
        }

        let widths: f32 = items.iter().map(|item| item.width).sum();
        let (start, item_gap) = justify_spacing(justify, content_width - widths, items.len(), gap);
        let mut cursor = content_x + start;
        let mut tallest = 0.0f32;
        for mut item in items {
            item.result.translate(cursor, content_y);
            tallest = tallest.max(item.result.height);
            elements.append(&mut item.result.elements);
            cursor += item.width + item_gap;
        }

        LayoutResult {
            width,
            height: tallest + padding.vertical(),
            elements,
        }
    }

    async fn columns(
        &self,
        node: &LayoutNode,
        ctx: LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> LayoutResult {
        if node.children.is_empty() {
            return LayoutResult::empty(width, 0.0);
        }

        let padding = node.insets();
        let gap = node.gap.unwrap_or(0.0);
        let count = node.children.len();
        #[allow(clippy::cast_precision_loss)]
        let available = width - padding.horizontal() - (count - 1) as f32 * gap;

        let column_widths: Vec<f32> = match &node.column_widths {
            Some(fractions) if fractions.len() == count && fractions.iter().sum::<f32>() > 0.0 => {
                let total: f32 = fractions.iter().sum();
                fractions.iter().map(|fr| fr / total * available).collect()
            }
            _ => {
                #[allow(clippy::cast_precision_loss)]
                let equal = available / count as f32;
                vec![equal; count]
            }
        };

        let mut elements = Vec::new();
        let mut tallest = 0.0f32;
        let mut cursor = x + padding.left;
        for (child, column_width) in node.children.iter().zip(column_widths) {
            let mut result = self
                .resolve_node(child, ctx, cursor, y + padding.top, column_width)
                .await;
            tallest = tallest.max(result.height);
            elements.append(&mut result.elements);
            cursor += column_width + gap;
        }

        LayoutResult {
            width,
            height: tallest + padding.vertical(),
            elements,
        }
    }

    async fn grid(
        &self,
        node: &LayoutNode,
        ctx: LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> LayoutResult {
        if node.children.is_empty() {
            return LayoutResult::empty(width, 0.0);
        }

        let padding = node.insets();
        let gap = node.gap.unwrap_or(DEFAULT_GAP);
        let cols = node.grid_cols.unwrap_or(DEFAULT_GRID_COLS).max(1);
        let content_x = x + padding.left;
        let content_y = y + padding.top;
        #[allow(clippy::cast_precision_loss)]
        let col_width = (width - padding.horizontal() - (cols - 1) as f32 * gap) / cols as f32;

        let mut elements = Vec::new();
        let mut row_y = content_y;
        let mut row_height = 0.0f32;
        for (i, child) in node.children.iter().enumerate() {
            let col = i % cols;
            if col == 0 && i > 0 {
                row_y += row_height + gap;
                row_height = 0.0;
            }
            #[allow(clippy::cast_precision_loss)]
            let col_x = content_x + col as f32 * (col_width + gap);
            let mut result = self.resolve_node(child, ctx, col_x, row_y, col_width).await;
            row_height = row_height.max(result.height);
            elements.append(&mut result.elements);
        }

        LayoutResult {
            width,
            height: row_y - content_y + row_height + padding.vertical(),
            elements,
        }
    }

    async fn centered(
        &self,
        node: &LayoutNode,
        ctx: LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> LayoutResult {
        if node.children.is_empty() {
            return LayoutResult::empty(width, 0.0);
        }

        let padding = node.insets();
        let container_height = node.height.unwrap_or(ctx.geometry.height);
        let block_width = (width - padding.horizontal()).min(MAX_CENTERED_WIDTH);
        let block_x = x + (width - block_width) / 2.0;

        let block = LayoutNode {
            layout: Some(LayoutKind::Stack),
            gap: Some(node.gap.unwrap_or(DEFAULT_GAP)),
            children: node.children.clone(),
            ..LayoutNode::default()
        };
        let mut result = self.stack(&block, ctx, block_x, 0.0, block_width).await;

        let free = container_height - padding.vertical() - result.height;
        result.translate(0.0, y + padding.top + (free / 2.0).max(0.0));

        LayoutResult {
            width,
            height: container_height,
            elements: result.elements,
        }
    }

    async fn absolute(
        &self,
        node: &LayoutNode,
        ctx: LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> LayoutResult {
        let padding = node.insets();
        let height = node.height.unwrap_or(ctx.geometry.height);
        let content = Rect::new(
            x + padding.left,
            y + padding.top,
            width - padding.horizontal(),
            height - padding.vertical(),
        );

        let mut elements = Vec::new();
        for child in &node.children {
            let child_x = match (child.x, child.left) {
                (Some(HorizontalPosition::Px(px)), _) => content.x + px,
                (_, Some(left)) => content.x + left,
                _ => content.x,
            };
            let child_y = content.y + child.y.or(child.top).unwrap_or(0.0);

            let mut result = self
                .resolve_node(child, ctx, child_x, child_y, content.width)
                .await;

            if let Some(bounds) = result.bounds() {
                let dx = match (child.x, child.left, child.right) {
                    (Some(HorizontalPosition::Center), _, _) => {
                        content.center_x() - bounds.center_x()
                    }
                    (None, None, Some(right)) => content.right() - right - bounds.right(),
                    _ => 0.0,
                };
                let dy = match (child.y, child.top, child.bottom) {
                    (None, None, Some(bottom)) => content.bottom() - bottom - bounds.bottom(),
                    _ => 0.0,
                };
                result.translate(dx, dy);
            }
            elements.append(&mut result.elements);
        }

        LayoutResult {
            width,
            height,
            elements,
        }
    }

    // ------------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------------

    async fn leaf(
        &self,
        node: &LayoutNode,
        ctx: LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> LayoutResult {
        let Some((element_type, props)) = merge_component(node, &ctx) else {
            return LayoutResult::empty(0.0, 0.0);
        };
        let props = Props(&props);

        let element = match element_type.as_str() {
            "text" => Some(self.text_leaf(node, &props, x, y, width)),
            "shape" => Some(self.shape_leaf(node, &props, x, y, width)),
            "image" => self.image_leaf(node, &props, &ctx, x, y, width).await,
            other => {
                tracing::warn!("Unknown element type '{}'", other);
                None
            }
        };

        match element {
            Some(mut element) => {
                if let Some(opacity) = props.f32("opacity") {
                    element.opacity = opacity.clamp(0.0, 1.0);
                }
                ctx.decorate(&mut element);
                let height = element.bounds().height;
                LayoutResult {
                    width,
                    height,
                    elements: vec![element],
                }
            }
            None => LayoutResult::empty(0.0, 0.0),
        }
    }

    fn text_leaf(
        &self,
        node: &LayoutNode,
        props: &Props<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> PositionedElement {
        let style = TextStyle {
            content: props.string("content").unwrap_or_default(),
            font_size: props.positive("fontSize").unwrap_or(DEFAULT_FONT_SIZE),
            font_family: props
                .string("fontFamily")
                .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string()),
            color: props.string("color").unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            text_align: props
                .string("textAlign")
                .map_or(TextAlign::Left, |align| parse_text_align(&align)),
            line_height: props.positive("lineHeight").unwrap_or(DEFAULT_LINE_HEIGHT),
            font_weight: props.string("fontWeight").unwrap_or_else(|| NORMAL.to_string()),
            font_style: props.string("fontStyle").unwrap_or_else(|| NORMAL.to_string()),
            char_spacing: props.f32("charSpacing").unwrap_or(0.0),
        };
        let height = node
            .height
            .or_else(|| props.positive("height"))
            .unwrap_or_else(|| self.measurer.measure(&style, width).height);
        self.factory.text(style, Transform::at(x, y, width, height))
    }

    fn shape_leaf(
        &self,
        node: &LayoutNode,
        props: &Props<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> PositionedElement {
        let shape = props.shape("shape");
        let mut box_width = props.positive("width").unwrap_or(width);
        let mut box_height = node
            .height
            .or_else(|| props.positive("height"))
            .unwrap_or(DEFAULT_SHAPE_HEIGHT);
        if shape == ShapeKind::Circle {
            let side = box_width.min(box_height);
            box_width = side;
            box_height = side;
        }
        let style = ShapeStyle {
            shape,
            fill: props.string("fill").unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            stroke: props.string("stroke"),
            stroke_width: props.f32("strokeWidth").unwrap_or(0.0),
            corner_radius: props
                .positive("cornerRadius")
                .or_else(|| props.positive("rx"))
                .unwrap_or(0.0),
        };
        self.factory
            .shape(style, Transform::at(x, y, box_width, box_height))
    }

    async fn image_leaf(
        &self,
        node: &LayoutNode,
        props: &Props<'_>,
        ctx: &LayoutContext<'_>,
        x: f32,
        y: f32,
        width: f32,
    ) -> Option<PositionedElement> {
        let Some(src) = props.string("src").filter(|s| !s.is_empty()) else {
            tracing::warn!("Image leaf on page {} has no src", ctx.page_id);
            return None;
        };
        let box_width = props.positive("width").unwrap_or(width);
        let box_height = node
            .height
            .or_else(|| props.positive("height"))
            .unwrap_or(DEFAULT_IMAGE_HEIGHT);
        let clip = props.shape("shape");
        let corner_radius = props
            .positive("cornerRadius")
            .or_else(|| props.positive("rx"))
            .unwrap_or(0.0);

        let request = ImageRequest {
            src: src.clone(),
            width: pixels(box_width),
            height: pixels(box_height),
            shape: clip,
            corner_radius,
        };
        let processed = match self.processor.process(request).await {
            Ok(processed) => processed,
            Err(e) => {
                tracing::warn!("Failed to process image {}: {}", src, e);
                return None;
            }
        };

        let stroked = props.0.contains_key("stroke") || props.0.contains_key("strokeWidth");
        let stroke = stroked.then(|| {
            (
                props
                    .string("stroke")
                    .unwrap_or_else(|| DEFAULT_IMAGE_STROKE.to_string()),
                props
                    .positive("strokeWidth")
                    .unwrap_or(DEFAULT_IMAGE_STROKE_WIDTH),
            )
        });

        let transform = Transform::at(x, y, box_width, box_height);
        let mut content = ImageContent {
            src,
            data_uri: Some(processed.data_uri),
            clip,
            corner_radius,
            stroke: None,
            stroke_width: 0.0,
        };

        match stroke {
            Some((color, stroke_width)) if !clip.is_rectangular() => {
                let overlay = self
                    .factory
                    .shape(
                        ShapeStyle {
                            shape: clip,
                            fill: "transparent".to_string(),
                            stroke: Some(color),
                            stroke_width,
                            corner_radius,
                        },
                        transform,
                    )
                    .with_role(ElementRole::StrokeOverlay);
                let image = self.factory.image(content, transform);
                Some(self.factory.group(vec![overlay, image]))
            }
            Some((color, stroke_width)) => {
                content.stroke = Some(color);
                content.stroke_width = stroke_width;
                Some(self.factory.image(content, transform))
            }
            None => Some(self.factory.image(content, transform)),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Width a node resolves at, given the width its parent offers.
fn effective_width(node: &LayoutNode, available: f32) -> f32 {
    match node.width {
        Some(Dimension::Px(width)) => width,
        Some(Dimension::Auto) => available,
        None => {
            let mut width = available;
            if let Some(min) = node.min_width {
                width = width.max(min);
            }
            if let Some(max) = node.max_width {
                width = width.min(max);
            }
            width
        }
    }
}

/// Leading offset and spacing between items for a justify mode.
///
/// `free` is the content width minus the items' widths (gaps not included).
#[allow(clippy::cast_precision_loss)]
fn justify_spacing(justify: Justify, free: f32, count: usize, gap: f32) -> (f32, f32) {
    if count == 0 {
        return (0.0, gap);
    }
    let n = count as f32;
    let gaps = (n - 1.0) * gap;
    match justify {
        Justify::Start => (0.0, gap),
        Justify::Center => ((free - gaps) / 2.0, gap),
        Justify::End => (free - gaps, gap),
        Justify::Between if count > 1 => (0.0, free / (n - 1.0)),
        Justify::Between => (0.0, gap),
        Justify::Around => (free / n / 2.0, free / n),
        Justify::Evenly => (free / (n + 1.0), free / (n + 1.0)),
    }
}

/// Element type and fully resolved props of a leaf.
///
/// Component defaults come first, instance props override them, and the
/// result is token-resolved.
fn merge_component(
    node: &LayoutNode,
    ctx: &LayoutContext<'_>,
) -> Option<(String, Map<String, Value>)> {
    let mut props = Map::new();
    let mut element_type = node.element_type.clone();

    if let Some(name) = &node.component {
        match ctx.components.get(name) {
            Some(component) => {
                if let Value::Object(defaults) =
                    resolve_prop_refs(&Value::Object(component.props.clone()), &node.props)
                {
                    props = defaults;
                }
                if element_type.is_none() {
                    element_type = Some(component.element_type.clone());
                }
            }
            None => tracing::warn!("Unknown component '{}'", name),
        }
    }

    for (key, value) in &node.props {
        props.insert(key.clone(), value.clone());
    }

    let Some(element_type) = element_type else {
        tracing::warn!("Leaf on page {} has no element type", ctx.page_id);
        return None;
    };
    match ctx.resolver().resolve_deep(&Value::Object(props)) {
        Value::Object(resolved) => Some((element_type, resolved)),
        _ => None,
    }
}

fn parse_text_align(value: &str) -> TextAlign {
    match value {
        "center" => TextAlign::Center,
        "right" => TextAlign::Right,
        "justify" => TextAlign::Justify,
        "left" => TextAlign::Left,
        other => {
            tracing::warn!("Unknown text alignment '{}', using left", other);
            TextAlign::Left
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixels(extent: f32) -> u32 {
    extent.round().max(0.0) as u32
}

fn tag_page(element: &mut PositionedElement, page_id: &str) {
    element.page_id = Some(page_id.to_string());
    if let ElementKind::Group { children } = &mut element.kind {
        for child in children {
            tag_page(child, page_id);
        }
    }
}

/// Typed access to resolved leaf props.
struct Props<'p>(&'p Map<String, Value>);

impl Props<'_> {
    #[allow(clippy::cast_possible_truncation)]
    fn f32(&self, key: &str) -> Option<f32> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64().map(|v| v as f32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn positive(&self, key: &str) -> Option<f32> {
        self.f32(key).filter(|v| *v > 0.0)
    }

    fn string(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(value_to_string)
    }

    fn shape(&self, key: &str) -> ShapeKind {
        match self.string(key) {
            None => ShapeKind::Rect,
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown shape '{}', using rect", name);
                ShapeKind::Rect
            }),
        }
    }
}
