//! The closed set of shapes used for shape leaves and image clipping.
//!
//! Every variant knows how to produce its own [`Outline`] for a bounding
//! box, so renderers never branch on shape names.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_8, PI};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::element::{Point, Rect};

/// Corner radius used for `rounded` when none is given.
pub const DEFAULT_ROUNDED_RADIUS: f32 = 20.0;

/// Ratio of inner to outer radius for stars.
const STAR_INNER_RATIO: f32 = 0.4;

/// A named shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Axis-aligned rectangle (optionally with corner radius).
    #[default]
    Rect,
    /// Rectangle with rounded corners.
    Rounded,
    /// Circle inscribed in the box.
    Circle,
    /// Ellipse filling the box.
    Ellipse,
    /// Upward-pointing triangle.
    Triangle,
    /// Rhombus touching the box edge midpoints.
    Diamond,
    /// Regular pentagon.
    Pentagon,
    /// Regular hexagon.
    Hexagon,
    /// Regular octagon.
    Octagon,
    /// Five-pointed star.
    Star,
    /// Thin rectangle used as a rule.
    Line,
}

impl ShapeKind {
    /// All variants, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Rect,
        Self::Rounded,
        Self::Circle,
        Self::Ellipse,
        Self::Triangle,
        Self::Diamond,
        Self::Pentagon,
        Self::Hexagon,
        Self::Octagon,
        Self::Star,
        Self::Line,
    ];

    /// Name as used in templates.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Rounded => "rounded",
            Self::Circle => "circle",
            Self::Ellipse => "ellipse",
            Self::Triangle => "triangle",
            Self::Diamond => "diamond",
            Self::Pentagon => "pentagon",
            Self::Hexagon => "hexagon",
            Self::Octagon => "octagon",
            Self::Star => "star",
            Self::Line => "line",
        }
    }

    /// Whether the outline is a plain rectangle.
    #[must_use]
    pub fn is_rectangular(self) -> bool {
        matches!(self, Self::Rect | Self::Line)
    }

    /// Whether the shape keeps a 1:1 aspect ratio inside its box.
    #[must_use]
    pub fn is_regular(self) -> bool {
        matches!(
            self,
            Self::Circle | Self::Pentagon | Self::Hexagon | Self::Octagon | Self::Star
        )
    }

    /// Outline of this shape in a `width` x `height` box whose top-left
    /// corner is the origin.
    #[must_use]
    pub fn outline(self, width: f32, height: f32, corner_radius: f32) -> Outline {
        let cx = width / 2.0;
        let cy = height / 2.0;
        let radius = width.min(height) / 2.0;

        match self {
            Self::Rect if corner_radius > 0.0 => Outline::RoundedRect {
                width,
                height,
                radius: corner_radius.min(radius),
            },
            Self::Rect | Self::Line => Outline::Rect { width, height },
            Self::Rounded => Outline::RoundedRect {
                width,
                height,
                radius: if corner_radius > 0.0 {
                    corner_radius
                } else {
                    DEFAULT_ROUNDED_RADIUS
                }
                .min(radius),
            },
            Self::Circle => Outline::Ellipse {
                cx,
                cy,
                rx: radius,
                ry: radius,
            },
            Self::Ellipse => Outline::Ellipse {
                cx,
                cy,
                rx: cx,
                ry: cy,
            },
            Self::Triangle => Outline::Polygon(vec![
                Point::new(cx, 0.0),
                Point::new(width, height),
                Point::new(0.0, height),
            ]),
            Self::Diamond => Outline::Polygon(vec![
                Point::new(cx, 0.0),
                Point::new(width, cy),
                Point::new(cx, height),
                Point::new(0.0, cy),
            ]),
            Self::Pentagon => Outline::Polygon(regular_polygon(cx, cy, radius, 5, -FRAC_PI_2)),
            Self::Hexagon => Outline::Polygon(regular_polygon(cx, cy, radius, 6, -FRAC_PI_2)),
            Self::Octagon => Outline::Polygon(regular_polygon(cx, cy, radius, 8, -FRAC_PI_8)),
            Self::Star => Outline::Polygon(star(cx, cy, radius, radius * STAR_INNER_RATIO, 5)),
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown shape: {s}"))
    }
}

/// Geometry of a shape, relative to its box's top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub enum Outline {
    /// Plain rectangle.
    Rect {
        /// Box width.
        width: f32,
        /// Box height.
        height: f32,
    },
    /// Rectangle with circular corners.
    RoundedRect {
        /// Box width.
        width: f32,
        /// Box height.
        height: f32,
        /// Corner radius.
        radius: f32,
    },
    /// Axis-aligned ellipse.
    Ellipse {
        /// Center x.
        cx: f32,
        /// Center y.
        cy: f32,
        /// Horizontal radius.
        rx: f32,
        /// Vertical radius.
        ry: f32,
    },
    /// Closed polygon.
    Polygon(Vec<Point>),
}

impl Outline {
    /// Tight bounding rectangle.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Rect { width, height } | Self::RoundedRect { width, height, .. } => {
                Rect::new(0.0, 0.0, *width, *height)
            }
            Self::Ellipse { cx, cy, rx, ry } => Rect::new(cx - rx, cy - ry, rx * 2.0, ry * 2.0),
            Self::Polygon(points) => {
                let mut min = Point::new(f32::INFINITY, f32::INFINITY);
                let mut max = Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
                for p in points {
                    min = Point::new(min.x.min(p.x), min.y.min(p.y));
                    max = Point::new(max.x.max(p.x), max.y.max(p.y));
                }
                if points.is_empty() {
                    return Rect::default();
                }
                Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
            }
        }
    }

    /// SVG path data for this outline, translated by `(dx, dy)`.
    #[must_use]
    pub fn to_svg_path(&self, dx: f32, dy: f32) -> String {
        match self {
            Self::Rect { width, height } => {
                format!("M{dx},{dy} h{width} v{height} h{} Z", -width)
            }
            Self::RoundedRect {
                width,
                height,
                radius: r,
            } => {
                let (w, h) = (*width, *height);
                format!(
                    "M{},{dy} H{} A{r},{r} 0 0 1 {},{} V{} A{r},{r} 0 0 1 {},{} H{} A{r},{r} 0 0 1 {dx},{} V{} A{r},{r} 0 0 1 {},{dy} Z",
                    dx + r,
                    dx + w - r,
                    dx + w,
                    dy + r,
                    dy + h - r,
                    dx + w - r,
                    dy + h,
                    dx + r,
                    dy + h - r,
                    dy + r,
                    dx + r,
                )
            }
            Self::Ellipse { cx, cy, rx, ry } => {
                let (x, y) = (cx + dx, cy + dy);
                format!(
                    "M{},{y} A{rx},{ry} 0 1 0 {},{y} A{rx},{ry} 0 1 0 {},{y} Z",
                    x - rx,
                    x + rx,
                    x - rx,
                )
            }
            Self::Polygon(points) => {
                let mut d = String::new();
                for (i, p) in points.iter().enumerate() {
                    let cmd = if i == 0 { 'M' } else { 'L' };
                    d.push_str(&format!("{cmd}{},{} ", p.x + dx, p.y + dy));
                }
                d.push('Z');
                d
            }
        }
    }
}

/// Vertices of a regular polygon with `sides` corners.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn regular_polygon(cx: f32, cy: f32, radius: f32, sides: usize, start: f32) -> Vec<Point> {
    let step = 2.0 * PI / sides as f32;
    (0..sides)
        .map(|i| {
            let angle = step * i as f32 + start;
            Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

/// Vertices of a star with `points` tips, alternating outer and inner radius.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn star(cx: f32, cy: f32, outer: f32, inner: f32, points: usize) -> Vec<Point> {
    let count = points * 2;
    let step = PI / points as f32;
    (0..count)
        .map(|i| {
            let radius = if i % 2 == 0 { outer } else { inner };
            let angle = step * i as f32 - FRAC_PI_2;
            Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}
