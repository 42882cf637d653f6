//! Positioned elements - the building blocks of a scene.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ChromeStyle;
use crate::shape::ShapeKind;

/// Default text size in pixels.
pub const DEFAULT_FONT_SIZE: f32 = 16.0;
/// Default text font family.
pub const DEFAULT_FONT_FAMILY: &str = "Arial";
/// Default text and shape color.
pub const DEFAULT_COLOR: &str = "#000000";
/// Default text line height multiplier.
pub const DEFAULT_LINE_HEIGHT: f32 = 1.2;
/// Default weight and style keyword.
pub const NORMAL: &str = "normal";
/// Height of a shape leaf with no explicit height.
pub const DEFAULT_SHAPE_HEIGHT: f32 = 2.0;
/// Height of an image leaf with no explicit height.
pub const DEFAULT_IMAGE_HEIGHT: f32 = 150.0;
/// Stroke color for stroked images.
pub const DEFAULT_IMAGE_STROKE: &str = "#ffffff";
/// Stroke width for stroked images.
pub const DEFAULT_IMAGE_STROKE_WIDTH: f32 = 2.0;

/// A point in scene coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// Create a rectangle.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Horizontal center.
    #[must_use]
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Vertical center.
    #[must_use]
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Whether the point lies inside (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// The rectangle moved by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Smallest rectangle containing both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }
}

/// Unique identifier for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Create a new unique element ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Flush left.
    #[default]
    Left,
    /// Centered.
    Center,
    /// Flush right.
    Right,
    /// Justified.
    Justify,
}

/// Text content and typography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Text content.
    pub content: String,
    /// Font size in pixels.
    pub font_size: f32,
    /// Font family name.
    pub font_family: String,
    /// Fill color.
    pub color: String,
    /// Alignment within the box.
    pub text_align: TextAlign,
    /// Line height multiplier.
    pub line_height: f32,
    /// CSS-like weight keyword or number.
    pub font_weight: String,
    /// `normal` or `italic`.
    pub font_style: String,
    /// Extra spacing in thousandths of an em.
    pub char_spacing: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_size: DEFAULT_FONT_SIZE,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            color: DEFAULT_COLOR.to_string(),
            text_align: TextAlign::Left,
            line_height: DEFAULT_LINE_HEIGHT,
            font_weight: NORMAL.to_string(),
            font_style: NORMAL.to_string(),
            char_spacing: 0.0,
        }
    }
}

/// Vector shape styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeStyle {
    /// Outline kind.
    pub shape: ShapeKind,
    /// Fill color (`transparent` for none).
    pub fill: String,
    /// Stroke color.
    pub stroke: Option<String>,
    /// Stroke width.
    pub stroke_width: f32,
    /// Corner radius for rectangles.
    pub corner_radius: f32,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            shape: ShapeKind::Rect,
            fill: DEFAULT_COLOR.to_string(),
            stroke: None,
            stroke_width: 0.0,
            corner_radius: 0.0,
        }
    }
}

/// A raster image placed in the scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageContent {
    /// Original source URL or data URI.
    pub src: String,
    /// Processed pixels (cropped and clipped) as a PNG data URI.
    pub data_uri: Option<String>,
    /// Clip shape applied to the pixels.
    pub clip: ShapeKind,
    /// Corner radius for rectangular clips.
    pub corner_radius: f32,
    /// Stroke color drawn around the clip outline.
    pub stroke: Option<String>,
    /// Stroke width.
    pub stroke_width: f32,
}

impl ImageContent {
    /// Source to draw: processed pixels if available, else the original.
    #[must_use]
    pub fn display_src(&self) -> &str {
        self.data_uri.as_deref().unwrap_or(&self.src)
    }
}

/// The type of content an element contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ElementKind {
    /// A text box.
    Text(TextStyle),
    /// A vector shape.
    Shape(ShapeStyle),
    /// A raster image.
    Image(ImageContent),
    /// Elements moved and selected as one unit.
    Group {
        /// Members, positioned in scene coordinates.
        children: Vec<PositionedElement>,
    },
}

impl ElementKind {
    /// Short type name as used in templates.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Shape(_) => "shape",
            Self::Image(_) => "image",
            Self::Group { .. } => "group",
        }
    }
}

/// Which point of the box `Transform::x`/`y` refer to, per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// Left or top edge.
    #[default]
    Start,
    /// Center.
    Center,
    /// Right or bottom edge.
    End,
}

impl Anchor {
    fn offset(self, extent: f32) -> f32 {
        match self {
            Self::Start => 0.0,
            Self::Center => extent / 2.0,
            Self::End => extent,
        }
    }
}

/// Origin convention of an element's position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Horizontal anchor.
    pub x: Anchor,
    /// Vertical anchor.
    pub y: Anchor,
}

impl Origin {
    /// Position refers to the top-left corner.
    pub const TOP_LEFT: Self = Self {
        x: Anchor::Start,
        y: Anchor::Start,
    };

    /// Position refers to the box center.
    pub const CENTER: Self = Self {
        x: Anchor::Center,
        y: Anchor::Center,
    };
}

/// Transform for positioning and sizing elements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// X position of the origin point.
    pub x: f32,
    /// Y position of the origin point.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Z-index for layering.
    pub z_index: i32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            rotation: 0.0,
            z_index: 0,
        }
    }
}

impl Transform {
    /// A transform at `(x, y)` with the given size.
    #[must_use]
    pub fn at(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Self::default()
        }
    }
}

/// What an element is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    /// User content.
    #[default]
    Content,
    /// Page background fill.
    PageBackground,
    /// Page highlight frame.
    PageFrame,
    /// Outline drawn around a clipped image.
    StrokeOverlay,
}

/// A clip rectangle attached to an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRegion {
    /// Visible region in scene coordinates.
    pub rect: Rect,
    /// Whether the clip is the auto-managed page slot.
    ///
    /// User clips (`auto == false`) are never rewritten.
    pub auto: bool,
}

/// A visual element with a concrete position in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedElement {
    /// Unique identifier.
    pub id: ElementId,
    /// Element content.
    pub kind: ElementKind,
    /// Position and size.
    pub transform: Transform,
    /// Anchor of `transform.x`/`y`.
    #[serde(default)]
    pub origin: Origin,
    /// Opacity from 0 to 1.
    pub opacity: f32,
    /// Owning page.
    pub page_id: Option<String>,
    /// Purpose of the element.
    #[serde(default)]
    pub role: ElementRole,
    /// Whether the element is drawn.
    pub visible: bool,
    /// Whether pointer hits select the element.
    pub selectable: bool,
    /// Whether exports skip the element.
    #[serde(default)]
    pub exclude_from_export: bool,
    /// Optional clip.
    pub clip: Option<ClipRegion>,
    /// Selection chrome.
    #[serde(default)]
    pub chrome: ChromeStyle,
}

impl PositionedElement {
    /// Create a new element with the given kind and default chrome.
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            id: ElementId::new(),
            kind,
            transform: Transform::default(),
            origin: Origin::TOP_LEFT,
            opacity: 1.0,
            page_id: None,
            role: ElementRole::Content,
            visible: true,
            selectable: true,
            exclude_from_export: false,
            clip: None,
            chrome: ChromeStyle::default(),
        }
    }

    /// Set the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the origin convention.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Set the role; non-content roles are not selectable.
    #[must_use]
    pub fn with_role(mut self, role: ElementRole) -> Self {
        self.role = role;
        self.selectable = role == ElementRole::Content;
        self
    }

    /// Set the owning page.
    #[must_use]
    pub fn with_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    /// Set the opacity.
    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Top-left corner regardless of origin convention.
    #[must_use]
    pub fn top_left(&self) -> Point {
        let t = &self.transform;
        Point::new(
            t.x - self.origin.x.offset(t.width),
            t.y - self.origin.y.offset(t.height),
        )
    }

    /// Move so that the top-left corner lands on `point`.
    pub fn set_top_left(&mut self, point: Point) {
        let current = self.top_left();
        self.translate(point.x - current.x, point.y - current.y);
    }

    /// Bounding box.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        let tl = self.top_left();
        Rect::new(tl.x, tl.y, self.transform.width, self.transform.height)
    }

    /// Move by `(dx, dy)`, including group members and user clips.
    ///
    /// Auto clips stay put; they follow the owning page slot instead.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.transform.x += dx;
        self.transform.y += dy;
        if let Some(clip) = self.clip.as_mut().filter(|clip| !clip.auto) {
            clip.rect = clip.rect.translated(dx, dy);
        }
        if let ElementKind::Group { children } = &mut self.kind {
            for child in children {
                child.translate(dx, dy);
            }
        }
    }

    /// Check if a point (in scene coordinates) is within this element.
    #[must_use]
    pub fn contains_point(&self, point: Point) -> bool {
        self.bounds().contains(point)
    }

    /// Whether this element is canvas machinery rather than user content.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.role != ElementRole::Content
    }

    /// Whether other elements may snap to this one.
    #[must_use]
    pub fn is_snap_target(&self) -> bool {
        self.visible && !self.is_internal() && !self.exclude_from_export
    }

    /// Whether the clip may be rewritten by page clipping.
    #[must_use]
    pub fn has_custom_clip(&self) -> bool {
        self.clip.is_some_and(|clip| !clip.auto)
    }
}

/// Builds elements with the configured selection chrome.
#[derive(Debug, Clone, Default)]
pub struct ElementFactory {
    chrome: ChromeStyle,
}

impl ElementFactory {
    /// Create a factory applying the given chrome.
    #[must_use]
    pub fn new(chrome: ChromeStyle) -> Self {
        Self { chrome }
    }

    /// The chrome applied to new elements.
    #[must_use]
    pub fn chrome(&self) -> &ChromeStyle {
        &self.chrome
    }

    /// Any element kind at the given transform.
    #[must_use]
    pub fn element(&self, kind: ElementKind, transform: Transform) -> PositionedElement {
        let mut element = PositionedElement::new(kind).with_transform(transform);
        element.chrome = self.chrome.clone();
        element
    }

    /// A text box.
    #[must_use]
    pub fn text(&self, style: TextStyle, transform: Transform) -> PositionedElement {
        self.element(ElementKind::Text(style), transform)
    }

    /// A vector shape.
    #[must_use]
    pub fn shape(&self, style: ShapeStyle, transform: Transform) -> PositionedElement {
        self.element(ElementKind::Shape(style), transform)
    }

    /// An image.
    #[must_use]
    pub fn image(&self, content: ImageContent, transform: Transform) -> PositionedElement {
        self.element(ElementKind::Image(content), transform)
    }

    /// A group spanning the union of its members.
    #[must_use]
    pub fn group(&self, children: Vec<PositionedElement>) -> PositionedElement {
        let bounds = children
            .iter()
            .map(PositionedElement::bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();
        self.element(
            ElementKind::Group { children },
            Transform::at(bounds.x, bounds.y, bounds.width, bounds.height),
        )
    }

    /// Background fill for a page slot.
    #[must_use]
    pub fn page_background(&self, page_id: &str, rect: Rect, color: &str) -> PositionedElement {
        let style = ShapeStyle {
            fill: color.to_string(),
            ..ShapeStyle::default()
        };
        let mut element = self
            .shape(style, Transform::at(rect.x, rect.y, rect.width, rect.height))
            .with_role(ElementRole::PageBackground)
            .with_page(page_id);
        element.transform.z_index = i32::MIN;
        element
    }

    /// Highlight frame for a page slot, excluded from export.
    #[must_use]
    pub fn page_frame(&self, page_id: &str, rect: Rect) -> PositionedElement {
        let style = ShapeStyle {
            fill: "transparent".to_string(),
            stroke: Some(self.chrome.border_color.clone()),
            stroke_width: 2.0,
            ..ShapeStyle::default()
        };
        let mut element = self
            .shape(style, Transform::at(rect.x, rect.y, rect.width, rect.height))
            .with_role(ElementRole::PageFrame)
            .with_page(page_id);
        element.exclude_from_export = true;
        element
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_left_normalizes_origin() {
        let element = PositionedElement::new(ElementKind::Shape(ShapeStyle::default()))
            .with_transform(Transform::at(100.0, 100.0, 40.0, 20.0))
            .with_origin(Origin::CENTER);
        assert_eq!(element.top_left(), Point::new(80.0, 90.0));
        assert_eq!(element.bounds(), Rect::new(80.0, 90.0, 40.0, 20.0));
    }

    #[test]
    fn test_set_top_left_respects_origin() {
        let mut element = PositionedElement::new(ElementKind::Shape(ShapeStyle::default()))
            .with_transform(Transform::at(0.0, 0.0, 40.0, 20.0))
            .with_origin(Origin::CENTER);
        element.set_top_left(Point::new(10.0, 10.0));
        assert_eq!(element.transform.x, 30.0);
        assert_eq!(element.transform.y, 20.0);
    }

    #[test]
    fn test_group_translate_moves_children() {
        let factory = ElementFactory::default();
        let a = factory.shape(ShapeStyle::default(), Transform::at(0.0, 0.0, 10.0, 10.0));
        let b = factory.shape(ShapeStyle::default(), Transform::at(20.0, 5.0, 10.0, 10.0));
        let mut group = factory.group(vec![a, b]);
        assert_eq!(group.bounds(), Rect::new(0.0, 0.0, 30.0, 15.0));

        group.translate(5.0, 5.0);
        let ElementKind::Group { children } = &group.kind else {
            panic!("expected group");
        };
        assert_eq!(children[1].top_left(), Point::new(25.0, 10.0));
        assert_eq!(group.top_left(), Point::new(5.0, 5.0));
    }

    #[test]
    fn test_translate_moves_user_clip_only() {
        let factory = ElementFactory::default();
        let mut user = factory.shape(ShapeStyle::default(), Transform::at(10.0, 10.0, 20.0, 20.0));
        user.clip = Some(ClipRegion {
            rect: Rect::new(10.0, 10.0, 20.0, 20.0),
            auto: false,
        });
        let mut auto = user.clone();
        auto.clip = Some(ClipRegion {
            rect: Rect::new(0.0, 0.0, 595.0, 842.0),
            auto: true,
        });

        user.set_top_left(Point::new(110.0, 60.0));
        auto.translate(100.0, 50.0);

        assert_eq!(user.clip.map(|c| c.rect), Some(user.bounds()));
        assert_eq!(
            auto.clip.map(|c| c.rect),
            Some(Rect::new(0.0, 0.0, 595.0, 842.0))
        );
    }

    #[test]
    fn test_internal_elements_are_not_snap_targets() {
        let factory = ElementFactory::default();
        let rect = Rect::new(0.0, 0.0, 595.0, 842.0);
        let bg = factory.page_background("p1", rect, "#ffffff");
        let frame = factory.page_frame("p1", rect);
        assert!(bg.is_internal());
        assert!(!bg.selectable);
        assert!(!bg.is_snap_target());
        assert!(!frame.is_snap_target());

        let mut content = factory.text(TextStyle::default(), Transform::default());
        assert!(content.is_snap_target());
        content.visible = false;
        assert!(!content.is_snap_target());
    }

    #[test]
    fn test_factory_applies_chrome() {
        let chrome = ChromeStyle {
            border_color: "#ff0000".to_string(),
            ..ChromeStyle::default()
        };
        let factory = ElementFactory::new(chrome.clone());
        let element = factory.text(TextStyle::default(), Transform::default());
        assert_eq!(element.chrome, chrome);
    }

    #[test]
    fn test_rect_contains_and_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.contains(Point::new(10.0, 10.0)));
        assert!(!a.contains(Point::new(10.1, 5.0)));
        let b = Rect::new(-5.0, 5.0, 5.0, 20.0);
        assert_eq!(a.union(&b), Rect::new(-5.0, 0.0, 15.0, 25.0));
    }

    #[test]
    fn test_element_serde_roundtrip() {
        let element = ElementFactory::default()
            .text(
                TextStyle {
                    content: "Hello".to_string(),
                    ..TextStyle::default()
                },
                Transform::at(1.0, 2.0, 3.0, 4.0),
            )
            .with_page("page-1");
        let json = serde_json::to_string(&element).expect("serialize");
        assert!(json.contains("\"type\":\"text\""));
        let back: PositionedElement = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, element);
    }
}
