//! Smart guides: snapping a dragged element to page and sibling edges.
//!
//! The snapped position is computed from where the element *would* be
//! (pre-drag position plus raw pointer displacement), never from where the
//! previous frame put it.

use serde::{Deserialize, Serialize};

use crate::config::SnapConfig;
use crate::element::{ElementId, Point, Rect};
use crate::scene::Scene;

/// Two targets closer than this are the same line.
const TARGET_EPSILON: f32 = 1e-3;

/// Candidate alignment lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapTargets {
    /// Vertical lines (x coordinates).
    pub xs: Vec<f32>,
    /// Horizontal lines (y coordinates).
    pub ys: Vec<f32>,
}

impl SnapTargets {
    /// Add the left/center/right and top/center/bottom lines of a rectangle.
    pub fn add_rect(&mut self, rect: Rect) {
        self.xs.extend([rect.x, rect.center_x(), rect.right()]);
        self.ys.extend([rect.y, rect.center_y(), rect.bottom()]);
    }

    /// Targets for dragging `moving`: the page's edges and center lines plus
    /// every other element that is a snap target.
    #[must_use]
    pub fn collect(scene: &Scene, page: Rect, moving: ElementId) -> Self {
        let mut targets = Self::default();
        targets.add_rect(page);
        for element in scene.elements() {
            if element.id != moving && element.is_snap_target() {
                targets.add_rect(element.bounds());
            }
        }
        targets
    }
}

/// Orientation of a guide line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideAxis {
    /// A vertical line (x snapped).
    Vertical,
    /// A horizontal line (y snapped).
    Horizontal,
}

/// A guide line segment in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideLine {
    /// Orientation.
    pub axis: GuideAxis,
    /// Start point.
    pub start: Point,
    /// End point.
    pub end: Point,
}

/// Result of snapping one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapOutcome {
    /// Final top-left position.
    pub position: Point,
    /// Target line the element snapped to horizontally.
    pub snapped_x: Option<f32>,
    /// Target line the element snapped to vertically.
    pub snapped_y: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Match {
    offset: f32,
    distance: f32,
    target: f32,
}

/// Snapping state for one drag: the targets snapped to on the previous
/// frame (for hysteresis) and the guides to draw.
#[derive(Debug, Clone, Default)]
pub struct SmartGuides {
    config: SnapConfig,
    active_x: Option<f32>,
    active_y: Option<f32>,
    guides: Vec<GuideLine>,
}

impl SmartGuides {
    /// Create with the given parameters.
    #[must_use]
    pub fn new(config: SnapConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Snapping parameters.
    #[must_use]
    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    /// Guides to draw for the last frame.
    #[must_use]
    pub fn guides(&self) -> &[GuideLine] {
        &self.guides
    }

    /// Targets snapped to on the last frame.
    #[must_use]
    pub fn active(&self) -> (Option<f32>, Option<f32>) {
        (self.active_x, self.active_y)
    }

    /// Forget guides and hysteresis state.
    pub fn clear(&mut self) {
        self.active_x = None;
        self.active_y = None;
        self.guides.clear();
    }

    /// Snap the box `intended` (top-left plus cached size) to the closest
    /// target on each axis. Guides are clipped to `page`.
    pub fn snap(&mut self, intended: Rect, targets: &SnapTargets, page: Rect) -> SnapOutcome {
        let best_x = self.best_match(
            [intended.x, intended.center_x(), intended.right()],
            &targets.xs,
            self.active_x,
        );
        let best_y = self.best_match(
            [intended.y, intended.center_y(), intended.bottom()],
            &targets.ys,
            self.active_y,
        );

        let x = intended.x + best_x.map_or(0.0, |m| m.offset);
        let y = intended.y + best_y.map_or(0.0, |m| m.offset);

        self.active_x = best_x.map(|m| m.target);
        self.active_y = best_y.map(|m| m.target);

        self.guides.clear();
        if let Some(gx) = self.active_x.filter(|gx| (page.x..=page.right()).contains(gx)) {
            self.guides.push(GuideLine {
                axis: GuideAxis::Vertical,
                start: Point::new(gx, page.y),
                end: Point::new(gx, page.bottom()),
            });
        }
        if let Some(gy) = self.active_y.filter(|gy| (page.y..=page.bottom()).contains(gy)) {
            self.guides.push(GuideLine {
                axis: GuideAxis::Horizontal,
                start: Point::new(page.x, gy),
                end: Point::new(page.right(), gy),
            });
        }

        SnapOutcome {
            position: Point::new(self.round(x), self.round(y)),
            snapped_x: self.active_x,
            snapped_y: self.active_y,
        }
    }

    /// Snapping disabled for this frame: the intended position is used
    /// verbatim and all guide state is cleared.
    pub fn bypass(&mut self, intended: Point) -> SnapOutcome {
        self.clear();
        SnapOutcome {
            position: intended,
            snapped_x: None,
            snapped_y: None,
        }
    }

    fn best_match(&self, edges: [f32; 3], targets: &[f32], active: Option<f32>) -> Option<Match> {
        let base = self.config.threshold;
        let held = base * self.config.hysteresis;
        let mut best: Option<Match> = None;
        for edge in edges {
            for &target in targets {
                let distance = (edge - target).abs();
                let is_active = active.is_some_and(|a| (a - target).abs() < TARGET_EPSILON);
                let threshold = if is_active { held } else { base };
                if distance < threshold && best.map_or(true, |b| distance < b.distance) {
                    best = Some(Match {
                        offset: target - edge,
                        distance,
                        target,
                    });
                }
            }
        }
        best
    }

    #[allow(clippy::cast_possible_wrap)]
    fn round(&self, value: f32) -> f32 {
        let factor = 10f32.powi(self.config.decimals as i32);
        (value * factor).round() / factor
    }
}
