//! Easing and the page-swipe settle animation.
//!
//! Animations are driven by explicit timestamps: the host calls
//! [`CanvasController::tick`](crate::controller::CanvasController::tick)
//! with the current time, nothing runs on its own.

use serde::{Deserialize, Serialize};

use crate::element::Point;

/// Easing curves over `t` in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    /// Constant speed.
    Linear,
    /// Accelerating quadratic.
    InQuad,
    /// Decelerating quadratic.
    #[default]
    OutQuad,
    /// Quadratic in then out.
    InOutQuad,
    /// Accelerating cubic.
    InCubic,
    /// Decelerating cubic.
    OutCubic,
    /// Cubic in then out.
    InOutCubic,
}

impl Ease {
    /// Eased progress for `t` (clamped to `[0, 1]`).
    #[must_use]
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
        }
    }
}

/// Animates the viewport pan to a page after a swipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanAnimation {
    /// Pan at the start.
    pub from: Point,
    /// Pan at the end.
    pub to: Point,
    /// Start time in milliseconds.
    pub start_ms: u64,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Page that becomes active when the animation completes.
    pub target_page: usize,
    /// Easing curve.
    pub ease: Ease,
}

impl PanAnimation {
    /// Progress in `[0, 1]` at `now_ms`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn progress(&self, now_ms: u64) -> f32 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        let elapsed = now_ms.saturating_sub(self.start_ms);
        (elapsed as f32 / self.duration_ms as f32).min(1.0)
    }

    /// Pan at `now_ms`.
    #[must_use]
    pub fn value_at(&self, now_ms: u64) -> Point {
        let k = self.ease.apply(self.progress(now_ms));
        Point::new(
            self.from.x + (self.to.x - self.from.x) * k,
            self.from.y + (self.to.y - self.from.y) * k,
        )
    }

    /// Whether the animation has reached its end at `now_ms`.
    #[must_use]
    pub fn is_finished(&self, now_ms: u64) -> bool {
        self.progress(now_ms) >= 1.0
    }
}
