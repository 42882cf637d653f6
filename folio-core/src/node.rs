//! Declarative layout tree and template documents.
//!
//! A template is a list of pages; each page is a [`LayoutNode`] tree in
//! which containers (`stack`, `row`, `columns`, `grid`, `centered`,
//! `absolute`) arrange leaves (`text`, `shape`, `image`, `spacer`).
//!
//! ```json
//! {
//!   "pages": [{
//!     "background": "$colors.paper",
//!     "layout": "stack",
//!     "padding": 40,
//!     "gap": 12,
//!     "children": [
//!       { "type": "text", "props": { "content": "Title", "fontSize": 32 } },
//!       { "use": "divider" }
//!     ]
//!   }],
//!   "tokens": { "colors": { "paper": "#fafafa" } },
//!   "components": { "divider": { "type": "shape", "props": { "height": 2 } } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::CanvasResult;

/// Layout strategy of a container node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LayoutKind {
    /// Children top to bottom.
    Stack,
    /// Children left to right, optionally wrapping.
    Row,
    /// Fixed column split.
    Columns,
    /// Uniform grid.
    Grid,
    /// A narrow stack centered in its container.
    Centered,
    /// Children placed by explicit coordinates.
    Absolute,
    /// Empty vertical space.
    Spacer,
    /// Unrecognized kind, kept for diagnostics.
    Unknown(String),
}

impl From<String> for LayoutKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stack" => Self::Stack,
            "row" => Self::Row,
            "columns" => Self::Columns,
            "grid" => Self::Grid,
            "centered" => Self::Centered,
            "absolute" => Self::Absolute,
            "spacer" => Self::Spacer,
            _ => Self::Unknown(value),
        }
    }
}

impl From<LayoutKind> for String {
    fn from(kind: LayoutKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stack => "stack",
            Self::Row => "row",
            Self::Columns => "columns",
            Self::Grid => "grid",
            Self::Centered => "centered",
            Self::Absolute => "absolute",
            Self::Spacer => "spacer",
            Self::Unknown(name) => name,
        };
        f.write_str(name)
    }
}

/// Main-axis distribution of row children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Justify {
    /// Pack at the start.
    #[default]
    Start,
    /// Pack in the middle.
    Center,
    /// Pack at the end.
    End,
    /// First and last flush with the edges, equal space between.
    Between,
    /// Equal space around each child.
    Around,
    /// Equal space between children and edges.
    Evenly,
}

impl From<String> for Justify {
    fn from(value: String) -> Self {
        match value.as_str() {
            "start" => Self::Start,
            "center" => Self::Center,
            "end" => Self::End,
            "between" => Self::Between,
            "around" => Self::Around,
            "evenly" => Self::Evenly,
            other => {
                tracing::warn!("Unknown justify mode '{}', using start", other);
                Self::Start
            }
        }
    }
}

impl From<Justify> for String {
    fn from(justify: Justify) -> Self {
        match justify {
            Justify::Start => "start",
            Justify::Center => "center",
            Justify::End => "end",
            Justify::Between => "between",
            Justify::Around => "around",
            Justify::Evenly => "evenly",
        }
        .to_string()
    }
}

/// Resolved padding on four sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Insets {
    /// Top inset.
    #[serde(default)]
    pub top: f32,
    /// Right inset.
    #[serde(default)]
    pub right: f32,
    /// Bottom inset.
    #[serde(default)]
    pub bottom: f32,
    /// Left inset.
    #[serde(default)]
    pub left: f32,
}

impl Insets {
    /// Left plus right.
    #[must_use]
    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    /// Top plus bottom.
    #[must_use]
    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// Padding as written in a template: one number or per-side values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Padding {
    /// Same inset on all sides.
    Uniform(f32),
    /// Per-side insets; missing sides are zero.
    Sides(Insets),
}

impl Padding {
    /// Expand to per-side insets.
    #[must_use]
    pub fn insets(&self) -> Insets {
        match *self {
            Self::Uniform(v) => Insets {
                top: v,
                right: v,
                bottom: v,
                left: v,
            },
            Self::Sides(insets) => insets,
        }
    }
}

/// A width that is either a pixel value or `"auto"`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Dimension {
    /// Fixed size in pixels.
    Px(f32),
    /// Take the inherited width without min/max clamping.
    Auto,
}

impl TryFrom<Value> for Dimension {
    type Error = String;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Number(n) => n
                .as_f64()
                .map(|v| Self::Px(v as f32))
                .ok_or_else(|| format!("invalid dimension: {value}")),
            Value::String(s) if s == "auto" => Ok(Self::Auto),
            _ => Err(format!("invalid dimension: {value}")),
        }
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Px(v) => serializer.serialize_f32(*v),
            Self::Auto => serializer.serialize_str("auto"),
        }
    }
}

/// Horizontal placement inside an absolute container.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum HorizontalPosition {
    /// Offset from the content box's left edge.
    Px(f32),
    /// Centered in the content box.
    Center,
}

impl TryFrom<Value> for HorizontalPosition {
    type Error = String;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Number(n) => n
                .as_f64()
                .map(|v| Self::Px(v as f32))
                .ok_or_else(|| format!("invalid x position: {value}")),
            Value::String(s) if s == "center" => Ok(Self::Center),
            _ => Err(format!("invalid x position: {value}")),
        }
    }
}

impl Serialize for HorizontalPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Px(v) => serializer.serialize_f32(*v),
            Self::Center => serializer.serialize_str("center"),
        }
    }
}

/// A node of the declarative layout tree.
///
/// A node is either a container (`layout` and/or `children`) or a leaf
/// (`type` or `use`), never both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutNode {
    /// Page identifier (page roots only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Page background color (page roots only, may be a token).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    /// Layout strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutKind>,
    /// Leaf element type: `text`, `shape`, `image` or `spacer`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    /// Component reference.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Leaf properties.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
    /// Child nodes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LayoutNode>,

    /// Inner padding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<Padding>,
    /// Space between children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<f32>,
    /// Row distribution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justify: Option<Justify>,
    /// Whether a row wraps onto new lines.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub wrap: bool,
    /// Fractional column widths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_widths: Option<Vec<f32>>,
    /// Grid column count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_cols: Option<usize>,

    /// Explicit width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<Dimension>,
    /// Lower clamp for an inherited width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_width: Option<f32>,
    /// Upper clamp for an inherited width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f32>,
    /// Explicit height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    /// Share of the remaining row width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grow: Option<f32>,

    /// Absolute x position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<HorizontalPosition>,
    /// Absolute y position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    /// Top offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<f32>,
    /// Left offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f32>,
    /// Right offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<f32>,
    /// Bottom offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<f32>,

    /// Stacking order for everything this node produces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    /// Rotation in degrees for everything this node produces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
}

impl LayoutNode {
    /// Whether this node produces an element rather than arranging children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.element_type.is_some() || self.component.is_some()
    }

    /// Whether this node is a spacer, by `type` or by `layout`.
    #[must_use]
    pub fn is_spacer(&self) -> bool {
        self.element_type.as_deref() == Some("spacer")
            || matches!(self.layout, Some(LayoutKind::Spacer))
    }

    /// Resolved padding, zero when absent.
    #[must_use]
    pub fn insets(&self) -> Insets {
        self.padding.map(|p| p.insets()).unwrap_or_default()
    }

    /// Explicit pixel width, if any.
    #[must_use]
    pub fn fixed_width(&self) -> Option<f32> {
        match self.width {
            Some(Dimension::Px(w)) => Some(w),
            _ => None,
        }
    }

    /// Positive grow weight, if any.
    #[must_use]
    pub fn grow_weight(&self) -> Option<f32> {
        self.grow.filter(|g| *g > 0.0)
    }
}

/// A reusable leaf definition referenced with `use`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    /// Leaf element type.
    #[serde(rename = "type")]
    pub element_type: String,
    /// Default properties; `"$name"` values refer to instance props.
    #[serde(default)]
    pub props: Map<String, Value>,
}

/// A complete template: pages plus the tokens and components they use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    /// Document identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Page roots, in order.
    pub pages: Vec<LayoutNode>,
    /// Design tokens.
    #[serde(default = "empty_object")]
    pub tokens: Value,
    /// Component library.
    #[serde(default)]
    pub components: BTreeMap<String, ComponentDef>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for TemplateDocument {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            version: None,
            pages: Vec::new(),
            tokens: empty_object(),
            components: BTreeMap::new(),
        }
    }
}

impl TemplateDocument {
    /// Parse a template from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or doesn't match the template schema.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the template to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
