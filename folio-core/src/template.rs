//! Scene to template serialization.
//!
//! The inverse of layout resolution: every content element becomes a leaf
//! of an `absolute` page node, placed at its page-relative top-left corner.
//! Resolving the emitted document puts every element back where it was.

use serde_json::{Map, Number, Value};

use crate::element::{
    ElementKind, ElementRole, ImageContent, PositionedElement, ShapeStyle, TextAlign, TextStyle,
    DEFAULT_COLOR, DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_LINE_HEIGHT, NORMAL,
};
use crate::node::{Dimension, HorizontalPosition, LayoutKind, LayoutNode, TemplateDocument};
use crate::page::{Page, PageGeometry, PagingMode};
use crate::scene::Scene;
use crate::shape::ShapeKind;

/// Format version written into serialized templates.
pub const TEMPLATE_VERSION: &str = "1.0";

/// Serialize the content of `scene` into one absolute page node per page.
///
/// Elements are bucketed by the page slot their top-left corner falls in,
/// clamped into the page range, so an element dragged into the gap still
/// lands on a page.
#[must_use]
pub fn scene_to_template(
    scene: &Scene,
    pages: &[Page],
    mode: PagingMode,
    geometry: &PageGeometry,
) -> TemplateDocument {
    let mut buckets: Vec<Vec<LayoutNode>> = vec![Vec::new(); pages.len()];

    for element in scene.elements().filter(|e| !e.is_internal()) {
        let index = geometry.clamped_index_at(element.top_left(), pages.len(), mode);
        let Some(bucket) = buckets.get_mut(index) else {
            continue;
        };
        let offset = geometry.offset(index, mode);
        element_nodes(element, offset.x, offset.y, bucket);
    }

    let pages = pages
        .iter()
        .zip(buckets)
        .map(|(page, children)| LayoutNode {
            id: Some(page.id.clone()),
            background: Some(page.background_color.clone()),
            layout: Some(LayoutKind::Absolute),
            children,
            ..LayoutNode::default()
        })
        .collect::<Vec<_>>();

    tracing::debug!("Serialized {} pages", pages.len());
    TemplateDocument {
        version: Some(TEMPLATE_VERSION.to_string()),
        pages,
        ..TemplateDocument::default()
    }
}

/// Append the leaves for `element` (page offset `(dx, dy)`) to `out`.
fn element_nodes(element: &PositionedElement, dx: f32, dy: f32, out: &mut Vec<LayoutNode>) {
    let (element_type, mut props) = match &element.kind {
        ElementKind::Text(style) => ("text", text_props(style)),
        ElementKind::Shape(style) => ("shape", shape_props(style)),
        ElementKind::Image(content) => ("image", image_props(content, None)),
        ElementKind::Group { children } => {
            if let Some(props) = stroked_image_props(children) {
                ("image", props)
            } else {
                for child in children.iter().filter(|c| !c.is_internal()) {
                    element_nodes(child, dx, dy, out);
                }
                return;
            }
        }
    };

    if (element.opacity - 1.0).abs() > f32::EPSILON {
        props.insert("opacity".to_string(), number(element.opacity));
    }

    let bounds = element.bounds();
    let transform = &element.transform;
    out.push(LayoutNode {
        element_type: Some(element_type.to_string()),
        props,
        x: Some(HorizontalPosition::Px(round1(bounds.x - dx))),
        y: Some(round1(bounds.y - dy)),
        width: Some(Dimension::Px(bounds.width)),
        height: Some(bounds.height),
        z_index: (transform.z_index != 0).then_some(transform.z_index),
        rotation: (transform.rotation.abs() > f32::EPSILON).then_some(transform.rotation),
        ..LayoutNode::default()
    });
}

fn text_props(style: &TextStyle) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("content".to_string(), Value::String(style.content.clone()));
    if (style.font_size - DEFAULT_FONT_SIZE).abs() > f32::EPSILON {
        props.insert("fontSize".to_string(), number(style.font_size));
    }
    insert_unless(&mut props, "fontFamily", &style.font_family, DEFAULT_FONT_FAMILY);
    insert_unless(&mut props, "color", &style.color, DEFAULT_COLOR);
    if style.text_align != TextAlign::Left {
        let align = match style.text_align {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        };
        props.insert("textAlign".to_string(), Value::String(align.to_string()));
    }
    if (style.line_height - DEFAULT_LINE_HEIGHT).abs() > f32::EPSILON {
        props.insert("lineHeight".to_string(), number(style.line_height));
    }
    if style.char_spacing.abs() > f32::EPSILON {
        props.insert("charSpacing".to_string(), number(style.char_spacing));
    }
    insert_unless(&mut props, "fontWeight", &style.font_weight, NORMAL);
    insert_unless(&mut props, "fontStyle", &style.font_style, NORMAL);
    props
}

fn shape_props(style: &ShapeStyle) -> Map<String, Value> {
    let mut props = Map::new();
    if style.shape != ShapeKind::Rect {
        props.insert("shape".to_string(), Value::String(style.shape.to_string()));
    }
    insert_unless(&mut props, "fill", &style.fill, DEFAULT_COLOR);
    if let Some(stroke) = &style.stroke {
        props.insert("stroke".to_string(), Value::String(stroke.clone()));
        props.insert("strokeWidth".to_string(), number(style.stroke_width));
    }
    if style.corner_radius > 0.0 {
        props.insert("cornerRadius".to_string(), number(style.corner_radius));
    }
    props
}

fn image_props(content: &ImageContent, overlay: Option<&ShapeStyle>) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("src".to_string(), Value::String(content.src.clone()));
    if content.clip != ShapeKind::Rect {
        props.insert("shape".to_string(), Value::String(content.clip.to_string()));
    }
    if content.corner_radius > 0.0 {
        props.insert("cornerRadius".to_string(), number(content.corner_radius));
    }
    let stroke = overlay
        .and_then(|style| style.stroke.as_ref().map(|s| (s, style.stroke_width)))
        .or_else(|| content.stroke.as_ref().map(|s| (s, content.stroke_width)));
    if let Some((color, width)) = stroke {
        props.insert("stroke".to_string(), Value::String(color.clone()));
        props.insert("strokeWidth".to_string(), number(width));
    }
    props
}

/// Props for a `[stroke overlay, image]` pair, read back as one stroked image.
fn stroked_image_props(children: &[PositionedElement]) -> Option<Map<String, Value>> {
    let overlay = children.iter().find_map(|c| match (&c.kind, c.role) {
        (ElementKind::Shape(style), ElementRole::StrokeOverlay) => Some(style),
        _ => None,
    })?;
    let image = children.iter().find_map(|c| match &c.kind {
        ElementKind::Image(content) => Some(content),
        _ => None,
    })?;
    Some(image_props(image, Some(overlay)))
}

fn insert_unless(props: &mut Map<String, Value>, key: &str, value: &str, default: &str) {
    if value != default {
        props.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

/// JSON number with f32 noise rounded away.
fn number(value: f32) -> Value {
    let value = (f64::from(value) * 1000.0).round() / 1000.0;
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementFactory, Rect, Transform};
    use crate::layout::LayoutEngine;
    use serde_json::json;

    fn pages(n: usize) -> Vec<Page> {
        (0..n).map(|i| Page::new(Page::default_id(i))).collect()
    }

    #[test]
    fn test_buckets_by_page_slot() {
        let geometry = PageGeometry::default();
        let factory = ElementFactory::default();
        let mut scene = Scene::new();
        let first = geometry.page_rect(0, PagingMode::Vertical);
        scene.add(factory.page_background("page-1", first, "#000"));
        let shape = |x, y| factory.shape(ShapeStyle::default(), Transform::at(x, y, 20.0, 20.0));
        scene.add(shape(40.0, 950.0));
        // Below the last page: clamped onto it.
        scene.add(shape(10.0, 2000.0));

        let doc = scene_to_template(&scene, &pages(2), PagingMode::Vertical, &geometry);
        assert_eq!(doc.pages.len(), 2);
        assert!(doc.pages[0].children.is_empty());
        assert_eq!(doc.pages[1].children.len(), 2);
        assert_eq!(doc.pages[1].children[0].y, Some(48.0));
        assert_eq!(doc.pages[1].layout, Some(LayoutKind::Absolute));
        assert_eq!(doc.pages[1].background.as_deref(), Some("#ffffff"));
    }

    #[test]
    fn test_defaults_are_omitted() {
        let geometry = PageGeometry::default();
        let factory = ElementFactory::default();
        let mut scene = Scene::new();
        let style = TextStyle {
            content: "Hi".to_string(),
            font_size: 24.0,
            ..TextStyle::default()
        };
        let mut text = factory.text(style, Transform::at(10.04, 20.06, 100.0, 30.0));
        text.opacity = 0.5;
        scene.add(text);

        let doc = scene_to_template(&scene, &pages(1), PagingMode::Vertical, &geometry);
        let leaf = &doc.pages[0].children[0];
        assert_eq!(leaf.element_type.as_deref(), Some("text"));
        assert_eq!(leaf.x, Some(HorizontalPosition::Px(10.0)));
        assert_eq!(leaf.y, Some(20.1));
        assert_eq!(leaf.z_index, None);
        assert_eq!(leaf.rotation, None);
        assert_eq!(
            Value::Object(leaf.props.clone()),
            json!({ "content": "Hi", "fontSize": 24.0, "opacity": 0.5 })
        );
    }

    #[tokio::test]
    async fn test_round_trip_within_one_unit() {
        let template = json!({
            "pages": [
                {
                    "id": "cover",
                    "background": "#111111",
                    "layout": "stack",
                    "padding": 40,
                    "gap": 12,
                    "children": [
                        { "type": "text", "props": { "content": "Title", "fontSize": 48, "color": "#ffffff" } },
                        { "type": "shape", "props": { "shape": "circle", "fill": "#ff0000" }, "height": 80 },
                        { "type": "image", "props": { "src": "a.png", "shape": "hexagon", "stroke": "#fff" }, "height": 120, "rotation": 15 }
                    ]
                },
                {
                    "layout": "row",
                    "padding": 20,
                    "children": [
                        { "type": "text", "props": { "content": "Left" }, "width": 200 },
                        { "type": "text", "props": { "content": "Right", "textAlign": "right" }, "grow": 1, "zIndex": 3 }
                    ]
                }
            ]
        })
        .to_string();
        let document = TemplateDocument::from_json(&template).expect("parse");
        let engine = LayoutEngine::new(PageGeometry::default());

        for mode in [PagingMode::Vertical, PagingMode::Horizontal] {
            let first = engine.render_template(&document, mode).await.expect("render");
            let scene = Scene::from(first.elements.clone());
            let serialized =
                scene_to_template(&scene, &first.pages, mode, &PageGeometry::default());
            let second = engine.render_template(&serialized, mode).await.expect("re-render");

            let before: Vec<Rect> = first
                .elements
                .iter()
                .filter(|e| !e.is_internal())
                .map(PositionedElement::bounds)
                .collect();
            let after: Vec<Rect> = second
                .elements
                .iter()
                .filter(|e| !e.is_internal())
                .map(PositionedElement::bounds)
                .collect();
            assert_eq!(before.len(), after.len());
            for (a, b) in before.iter().zip(&after) {
                assert!((a.x - b.x).abs() <= 1.0, "{a:?} vs {b:?}");
                assert!((a.y - b.y).abs() <= 1.0, "{a:?} vs {b:?}");
                assert!((a.width - b.width).abs() <= 1.0, "{a:?} vs {b:?}");
                assert!((a.height - b.height).abs() <= 1.0, "{a:?} vs {b:?}");
            }
            assert_eq!(second.pages, first.pages);
        }
    }

    #[tokio::test]
    async fn test_stroked_image_group_serializes_as_one_leaf() {
        let template = json!({
            "pages": [{
                "layout": "absolute",
                "children": [{
                    "type": "image",
                    "x": 50, "y": 60, "width": 100, "height": 100,
                    "props": { "src": "b.png", "shape": "circle", "stroke": "#00ff00", "strokeWidth": 4 }
                }]
            }]
        })
        .to_string();
        let document = TemplateDocument::from_json(&template).expect("parse");
        let engine = LayoutEngine::new(PageGeometry::default());
        let rendered = engine
            .render_template(&document, PagingMode::Vertical)
            .await
            .expect("render");
        assert!(matches!(rendered.elements[0].kind, ElementKind::Group { .. }));

        let scene = Scene::from(rendered.elements);
        let doc = scene_to_template(
            &scene,
            &rendered.pages,
            PagingMode::Vertical,
            &PageGeometry::default(),
        );
        let leaves = &doc.pages[0].children;
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].element_type.as_deref(), Some("image"));
        assert_eq!(
            Value::Object(leaves[0].props.clone()),
            json!({ "src": "b.png", "shape": "circle", "stroke": "#00ff00", "strokeWidth": 4.0 })
        );
    }
}
