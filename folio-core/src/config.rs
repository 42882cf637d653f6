//! Canvas configuration.
//!
//! Every field has a default, so a partial JSON document is enough to
//! override a single value:
//!
//! ```json
//! { "snap": { "threshold": 6 }, "page": { "gap": 80 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CanvasResult;
use crate::page::PageGeometry;

/// Selection chrome drawn around selected elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeStyle {
    /// Selection border color.
    pub border_color: String,
    /// Border thickness multiplier at zoom 1.
    pub border_scale: f32,
    /// Resize handle fill.
    pub corner_color: String,
    /// Resize handle outline.
    pub corner_stroke_color: String,
    /// Resize handle size at zoom 1.
    pub corner_size: f32,
    /// Gap between element bounds and the selection border.
    pub padding: f32,
}

impl Default for ChromeStyle {
    fn default() -> Self {
        Self {
            border_color: "#a3e635".to_string(),
            border_scale: 2.0,
            corner_color: "#ffffff".to_string(),
            corner_stroke_color: "#cccccc".to_string(),
            corner_size: 10.0,
            padding: 8.0,
        }
    }
}

impl ChromeStyle {
    /// Chrome with handle size and border thickness compensated for zoom,
    /// so handles keep a constant on-screen size.
    #[must_use]
    pub fn at_zoom(&self, zoom: f32) -> Self {
        let zoom = if zoom > 0.0 { zoom } else { 1.0 };
        Self {
            corner_size: self.corner_size / zoom,
            border_scale: self.border_scale / zoom,
            ..self.clone()
        }
    }
}

/// Smart-guide snapping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Maximum distance (scene units) at which an edge snaps.
    pub threshold: f32,
    /// Multiplier applied to the threshold for the target snapped to on
    /// the previous frame.
    pub hysteresis: f32,
    /// Decimal places kept in snapped positions.
    pub decimals: u32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            threshold: 10.0,
            hysteresis: 1.5,
            decimals: 1,
        }
    }
}

/// Allowed zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomLimits {
    /// Smallest zoom.
    pub min: f32,
    /// Largest zoom.
    pub max: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: 0.01, max: 20.0 }
    }
}

impl ZoomLimits {
    /// Clamp a zoom level into range.
    #[must_use]
    pub fn clamp(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min, self.max)
    }
}

/// Top-level configuration for a canvas controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Page size and spacing.
    pub page: PageGeometry,
    /// Zoom range.
    pub zoom: ZoomLimits,
    /// Wheel zoom factor base: `zoom *= base ^ delta_y`.
    pub wheel_zoom_base: f32,
    /// Zoom above which a touch drag on empty canvas pans instead of swiping.
    pub touch_fit_threshold: f32,
    /// Duration of the page swipe settle animation.
    pub swipe_duration_ms: u64,
    /// Horizontal margin kept when fitting a page into a narrow viewport.
    pub auto_fit_margin: f32,
    /// Snapping parameters.
    pub snap: SnapConfig,
    /// Selection chrome defaults.
    pub chrome: ChromeStyle,
    /// Default pixel density multiplier for exports.
    pub export_multiplier: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            page: PageGeometry::default(),
            zoom: ZoomLimits::default(),
            wheel_zoom_base: 0.999,
            touch_fit_threshold: 1.1,
            swipe_duration_ms: 300,
            auto_fit_margin: 40.0,
            snap: SnapConfig::default(),
            chrome: ChromeStyle::default(),
            export_multiplier: 4.0,
        }
    }
}

impl CanvasConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CanvasConfig::default();
        assert_eq!(config.page.width, 595.0);
        assert_eq!(config.page.height, 842.0);
        assert_eq!(config.page.gap, 60.0);
        assert_eq!(config.snap.threshold, 10.0);
        assert_eq!(config.snap.hysteresis, 1.5);
        assert_eq!(config.swipe_duration_ms, 300);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            CanvasConfig::from_json(r#"{ "snap": { "threshold": 6 }, "page": { "gap": 80 } }"#)
                .expect("parse");
        assert_eq!(config.snap.threshold, 6.0);
        assert_eq!(config.snap.hysteresis, 1.5);
        assert_eq!(config.page.gap, 80.0);
        assert_eq!(config.page.width, 595.0);
    }

    #[test]
    fn test_zoom_clamp() {
        let limits = ZoomLimits::default();
        assert_eq!(limits.clamp(100.0), 20.0);
        assert_eq!(limits.clamp(0.0), 0.01);
        assert_eq!(limits.clamp(2.0), 2.0);
    }

    #[test]
    fn test_chrome_scales_with_zoom() {
        let chrome = ChromeStyle::default().at_zoom(2.0);
        assert_eq!(chrome.corner_size, 5.0);
        assert_eq!(chrome.border_scale, 1.0);
        assert_eq!(chrome.padding, 8.0);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(CanvasConfig::from_json("{ nope").is_err());
    }
}
