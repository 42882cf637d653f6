//! Paginated coordinate space.
//!
//! Pages sit side by side in one scene coordinate space, separated by a
//! gap, either top to bottom or left to right:
//!
//! ```text
//!  Vertical                 Horizontal
//!  ┌──────┐ y = 0           ┌──────┐  ┌──────┐  ┌──────┐
//!  │  0   │                 │  0   │  │  1   │  │  2   │
//!  └──────┘                 └──────┘  └──────┘  └──────┘
//!    gap                    x = 0     x = w+gap x = 2(w+gap)
//!  ┌──────┐ y = h + gap
//!  │  1   │
//!  └──────┘
//! ```
//!
//! [`PageGeometry::offset`] is the only place that maps a page index to a
//! scene position; everything else derives from it.

use serde::{Deserialize, Serialize};

use crate::element::{Point, Rect};

/// Background color of pages created without one.
pub const DEFAULT_PAGE_BACKGROUND: &str = "#ffffff";

/// Direction in which pages are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagingMode {
    /// Pages stacked top to bottom.
    #[default]
    Vertical,
    /// Pages side by side, left to right.
    Horizontal,
}

/// Page size and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    /// Page width.
    pub width: f32,
    /// Page height.
    pub height: f32,
    /// Space between consecutive pages.
    pub gap: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            gap: 60.0,
        }
    }
}

impl PageGeometry {
    /// Page size along the paging axis.
    #[must_use]
    pub fn extent(&self, mode: PagingMode) -> f32 {
        match mode {
            PagingMode::Vertical => self.height,
            PagingMode::Horizontal => self.width,
        }
    }

    /// Page size across the paging axis.
    #[must_use]
    pub fn cross_extent(&self, mode: PagingMode) -> f32 {
        match mode {
            PagingMode::Vertical => self.width,
            PagingMode::Horizontal => self.height,
        }
    }

    /// Distance between the starts of consecutive pages.
    #[must_use]
    pub fn stride(&self, mode: PagingMode) -> f32 {
        self.extent(mode) + self.gap
    }

    /// Scene position of the top-left corner of page `index`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn offset(&self, index: usize, mode: PagingMode) -> Point {
        let along = index as f32 * self.stride(mode);
        match mode {
            PagingMode::Vertical => Point::new(0.0, along),
            PagingMode::Horizontal => Point::new(along, 0.0),
        }
    }

    /// Scene rectangle occupied by page `index`.
    #[must_use]
    pub fn page_rect(&self, index: usize, mode: PagingMode) -> Rect {
        let origin = self.offset(index, mode);
        Rect::new(origin.x, origin.y, self.width, self.height)
    }

    /// Inverse of [`offset`](Self::offset): the page slot a scene point
    /// falls in along the paging axis. May be negative or past the last page.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn index_at(&self, point: Point, mode: PagingMode) -> i64 {
        let along = match mode {
            PagingMode::Vertical => point.y,
            PagingMode::Horizontal => point.x,
        };
        (along / self.stride(mode)).floor() as i64
    }

    /// [`index_at`](Self::index_at) clamped into `0..count`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    #[must_use]
    pub fn clamped_index_at(&self, point: Point, count: usize, mode: PagingMode) -> usize {
        let last = count.saturating_sub(1) as i64;
        self.index_at(point, mode).clamp(0, last) as usize
    }

    /// Page whose rectangle contains the point, if any.
    #[must_use]
    pub fn page_at_point(&self, point: Point, count: usize, mode: PagingMode) -> Option<usize> {
        (0..count).find(|&i| self.page_rect(i, mode).contains(point))
    }

    /// Center of page `index` along the paging axis.
    #[must_use]
    pub fn page_center(&self, index: usize, mode: PagingMode) -> f32 {
        let rect = self.page_rect(index, mode);
        match mode {
            PagingMode::Vertical => rect.center_y(),
            PagingMode::Horizontal => rect.center_x(),
        }
    }

    /// Total `(width, height)` covered by `count` pages.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn content_size(&self, count: usize, mode: PagingMode) -> (f32, f32) {
        let n = count.max(1) as f32;
        let along = n * self.extent(mode) + (n - 1.0) * self.gap;
        match mode {
            PagingMode::Vertical => (self.width, along),
            PagingMode::Horizontal => (along, self.height),
        }
    }
}

/// One page of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Stable identifier.
    pub id: String,
    /// Background fill.
    pub background_color: String,
}

impl Page {
    /// Create a page with the default background.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            background_color: DEFAULT_PAGE_BACKGROUND.to_string(),
        }
    }

    /// Set the background color.
    #[must_use]
    pub fn with_background(mut self, color: impl Into<String>) -> Self {
        self.background_color = color.into();
        self
    }

    /// Identifier for the page at `index` of a template that did not name it.
    #[must_use]
    pub fn default_id(index: usize) -> String {
        format!("page-{}", index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_per_mode() {
        let geometry = PageGeometry::default();
        assert_eq!(geometry.offset(0, PagingMode::Vertical), Point::new(0.0, 0.0));
        assert_eq!(geometry.offset(2, PagingMode::Vertical), Point::new(0.0, 1804.0));
        assert_eq!(geometry.offset(2, PagingMode::Horizontal), Point::new(1310.0, 0.0));
    }

    #[test]
    fn test_index_at_inverts_offset() {
        let geometry = PageGeometry::default();
        for mode in [PagingMode::Vertical, PagingMode::Horizontal] {
            for index in 0..12 {
                let origin = geometry.offset(index, mode);
                let inside = Point::new(origin.x + 1.0, origin.y + 1.0);
                assert_eq!(geometry.index_at(origin, mode), index as i64);
                assert_eq!(geometry.index_at(inside, mode), index as i64);
            }
        }
    }

    #[test]
    fn test_gap_belongs_to_preceding_slot() {
        let geometry = PageGeometry::default();
        let in_gap = Point::new(10.0, 842.0 + 30.0);
        assert_eq!(geometry.index_at(in_gap, PagingMode::Vertical), 0);
        assert_eq!(geometry.page_at_point(in_gap, 3, PagingMode::Vertical), None);
    }

    #[test]
    fn test_clamped_index() {
        let geometry = PageGeometry::default();
        let above = Point::new(0.0, -500.0);
        let below = Point::new(0.0, 10_000.0);
        assert_eq!(geometry.index_at(above, PagingMode::Vertical), -1);
        assert_eq!(geometry.clamped_index_at(above, 3, PagingMode::Vertical), 0);
        assert_eq!(geometry.clamped_index_at(below, 3, PagingMode::Vertical), 2);
    }

    #[test]
    fn test_page_at_point_checks_full_rect() {
        let geometry = PageGeometry::default();
        let mode = PagingMode::Horizontal;
        assert_eq!(geometry.page_at_point(Point::new(700.0, 100.0), 3, mode), Some(1));
        assert_eq!(geometry.page_at_point(Point::new(700.0, 900.0), 3, mode), None);
        assert_eq!(geometry.page_at_point(Point::new(5000.0, 100.0), 3, mode), None);
    }

    #[test]
    fn test_content_size() {
        let geometry = PageGeometry::default();
        assert_eq!(geometry.content_size(3, PagingMode::Vertical), (595.0, 3.0 * 842.0 + 120.0));
        assert_eq!(geometry.content_size(1, PagingMode::Horizontal), (595.0, 842.0));
    }

    #[test]
    fn test_page_center() {
        let geometry = PageGeometry::default();
        assert_eq!(geometry.page_center(1, PagingMode::Horizontal), 655.0 + 297.5);
    }
}
