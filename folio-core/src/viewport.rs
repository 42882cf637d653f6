//! Pan and zoom.
//!
//! `screen = scene * zoom + pan`. The viewport never looks at the scene; the
//! controller passes in the content rectangle it should keep centered.

use serde::{Deserialize, Serialize};

use crate::config::ZoomLimits;
use crate::element::{Point, Rect};
use crate::page::{PageGeometry, PagingMode};

/// Width, in pages, below which a horizontal viewport is fitted to one page.
const NARROW_VIEWPORT_PAGES: f32 = 1.5;

/// Uniform zoom plus a pan offset in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    zoom: f32,
    pan: Point,
    width: f32,
    height: f32,
    limits: ZoomLimits,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800.0, 600.0, ZoomLimits::default())
    }
}

impl Viewport {
    /// Identity viewport of the given screen size.
    #[must_use]
    pub fn new(width: f32, height: f32, limits: ZoomLimits) -> Self {
        Self {
            zoom: 1.0,
            pan: Point::default(),
            width,
            height,
            limits,
        }
    }

    /// Current zoom.
    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Current pan in screen pixels.
    #[must_use]
    pub fn pan(&self) -> Point {
        self.pan
    }

    /// Screen width.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Screen height.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Screen point to scene point.
    #[must_use]
    pub fn to_scene(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.pan.x) / self.zoom,
            (screen.y - self.pan.y) / self.zoom,
        )
    }

    /// Scene point to screen point.
    #[must_use]
    pub fn to_screen(&self, scene: Point) -> Point {
        Point::new(
            scene.x * self.zoom + self.pan.x,
            scene.y * self.zoom + self.pan.y,
        )
    }

    /// The part of the scene currently on screen.
    #[must_use]
    pub fn visible_scene_rect(&self) -> Rect {
        let origin = self.to_scene(Point::default());
        Rect::new(
            origin.x,
            origin.y,
            self.width / self.zoom,
            self.height / self.zoom,
        )
    }

    /// Set the pan.
    pub fn set_pan(&mut self, pan: Point) {
        self.pan = pan;
    }

    /// Move the pan by a screen delta.
    pub fn relative_pan(&mut self, dx: f32, dy: f32) {
        self.pan.x += dx;
        self.pan.y += dy;
    }

    /// Zoom 1, no pan.
    pub fn set_identity(&mut self) {
        self.zoom = 1.0;
        self.pan = Point::default();
    }

    /// Set the zoom (clamped) keeping the screen origin fixed.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = self.limits.clamp(zoom);
    }

    /// Set the zoom (clamped) keeping the scene point under `screen` fixed.
    pub fn zoom_to_point(&mut self, screen: Point, zoom: f32) {
        let anchor = self.to_scene(screen);
        self.zoom = self.limits.clamp(zoom);
        self.pan = Point::new(
            screen.x - anchor.x * self.zoom,
            screen.y - anchor.y * self.zoom,
        );
    }

    /// Change the screen size.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    /// Pan so that a scene point sits at the screen center.
    pub fn center_on(&mut self, scene: Point) {
        self.pan = Point::new(
            self.width / 2.0 - scene.x * self.zoom,
            self.height / 2.0 - scene.y * self.zoom,
        );
    }

    /// Whether `content` fits on screen horizontally and vertically.
    #[must_use]
    pub fn fits(&self, content: Rect) -> (bool, bool) {
        (
            content.width * self.zoom <= self.width,
            content.height * self.zoom <= self.height,
        )
    }

    /// Force the pan to center `content` on every axis where it fits.
    pub fn apply_centering(&mut self, content: Rect) {
        let (fits_x, fits_y) = self.fits(content);
        if fits_x {
            self.pan.x = (self.width - content.width * self.zoom) / 2.0 - content.x * self.zoom;
        }
        if fits_y {
            self.pan.y = (self.height - content.height * self.zoom) / 2.0 - content.y * self.zoom;
        }
    }

    /// Drop the components of a pan delta on axes where `content` fits.
    #[must_use]
    pub fn lock_pan(&self, dx: f32, dy: f32, content: Rect) -> (f32, f32) {
        let (fits_x, fits_y) = self.fits(content);
        (
            if fits_x { 0.0 } else { dx },
            if fits_y { 0.0 } else { dy },
        )
    }

    /// Zoom that fits one page into a narrow viewport in horizontal mode.
    ///
    /// `None` when the viewport is wide enough or pages stack vertically.
    #[must_use]
    pub fn fit_zoom(&self, geometry: &PageGeometry, mode: PagingMode, margin: f32) -> Option<f32> {
        if mode != PagingMode::Horizontal
            || geometry.width <= 0.0
            || self.width >= geometry.width * NARROW_VIEWPORT_PAGES
        {
            return None;
        }
        Some(self.limits.clamp((self.width - margin).max(1.0) / geometry.width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn test_screen_scene_inverse() {
        let mut viewport = Viewport::new(800.0, 600.0, ZoomLimits::default());
        viewport.zoom_to_point(Point::new(100.0, 50.0), 2.5);
        viewport.relative_pan(-30.0, 12.0);
        let scene = Point::new(321.0, -45.0);
        assert!(approx(viewport.to_scene(viewport.to_screen(scene)), scene));
    }

    #[test]
    fn test_zoom_to_point_keeps_anchor() {
        let mut viewport = Viewport::new(800.0, 600.0, ZoomLimits::default());
        let pointer = Point::new(200.0, 150.0);
        let before = viewport.to_scene(pointer);
        viewport.zoom_to_point(pointer, 3.0);
        assert!(approx(viewport.to_scene(pointer), before));
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut viewport = Viewport::default();
        viewport.zoom_to_point(Point::default(), 500.0);
        assert!((viewport.zoom() - 20.0).abs() < f32::EPSILON);
        viewport.set_zoom(0.0);
        assert!((viewport.zoom() - 0.01).abs() < f32::EPSILON);
    }

    #[test]
    fn test_centering_per_axis() {
        let mut viewport = Viewport::new(1000.0, 500.0, ZoomLimits::default());
        // One page wide, three pages tall.
        let content = Rect::new(0.0, 0.0, 595.0, 2646.0);
        viewport.set_pan(Point::new(-400.0, -300.0));
        viewport.apply_centering(content);
        assert!((viewport.pan().x - 202.5).abs() < 1e-3);
        assert!((viewport.pan().y + 300.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pan_lock() {
        let viewport = Viewport::new(1000.0, 500.0, ZoomLimits::default());
        let content = Rect::new(0.0, 0.0, 595.0, 2646.0);
        assert_eq!(viewport.lock_pan(25.0, -40.0, content), (0.0, -40.0));
    }

    #[test]
    fn test_fit_zoom_only_for_narrow_horizontal() {
        let geometry = PageGeometry::default();
        let narrow = Viewport::new(400.0, 800.0, ZoomLimits::default());
        let zoom = narrow
            .fit_zoom(&geometry, PagingMode::Horizontal, 40.0)
            .expect("narrow viewport fits");
        assert!((zoom - 360.0 / 595.0).abs() < 1e-5);
        assert!(narrow.fit_zoom(&geometry, PagingMode::Vertical, 40.0).is_none());

        let wide = Viewport::new(1400.0, 800.0, ZoomLimits::default());
        assert!(wide.fit_zoom(&geometry, PagingMode::Horizontal, 40.0).is_none());
    }
}
