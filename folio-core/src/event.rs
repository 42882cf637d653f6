//! Input events for canvas interaction.
//!
//! Coordinates are screen pixels relative to the canvas viewport; the
//! controller converts them to scene coordinates.

use serde::{Deserialize, Serialize};

use crate::element::Point;

/// Modifier keys held during an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyModifiers {
    /// Shift key.
    pub shift: bool,
    /// Control key.
    pub ctrl: bool,
    /// Alt/Option key.
    pub alt: bool,
    /// Meta/Command key.
    pub meta: bool,
}

impl KeyModifiers {
    /// No modifiers held.
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    /// Only shift held.
    pub const SHIFT: Self = Self {
        shift: true,
        ..Self::NONE
    };

    /// Only control held.
    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };

    /// Only alt held.
    pub const ALT: Self = Self {
        alt: true,
        ..Self::NONE
    };

    /// Wheel events zoom instead of panning.
    #[must_use]
    pub fn zooms(&self) -> bool {
        self.ctrl || self.meta
    }

    /// Pointer-down starts a free pan.
    #[must_use]
    pub fn pans(&self) -> bool {
        self.alt
    }

    /// Dragging skips smart-guide snapping.
    #[must_use]
    pub fn disables_snapping(&self) -> bool {
        self.shift
    }
}

/// Device that produced a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    /// Mouse or pen.
    #[default]
    Mouse,
    /// Finger on a touch screen.
    Touch,
}

/// A pointer down, move or up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Pointer identifier (stable for the lifetime of a contact).
    pub pointer_id: u32,
    /// Producing device.
    #[serde(default)]
    pub kind: PointerKind,
    /// X position in screen pixels.
    pub x: f32,
    /// Y position in screen pixels.
    pub y: f32,
    /// Modifier keys.
    #[serde(default)]
    pub modifiers: KeyModifiers,
    /// Timestamp in milliseconds since canvas start.
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl PointerEvent {
    /// A mouse event with no modifiers.
    #[must_use]
    pub fn mouse(pointer_id: u32, x: f32, y: f32) -> Self {
        Self {
            pointer_id,
            kind: PointerKind::Mouse,
            x,
            y,
            modifiers: KeyModifiers::NONE,
            timestamp_ms: 0,
        }
    }

    /// A touch event.
    #[must_use]
    pub fn touch(pointer_id: u32, x: f32, y: f32) -> Self {
        Self {
            kind: PointerKind::Touch,
            ..Self::mouse(pointer_id, x, y)
        }
    }

    /// Set the modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: KeyModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Screen position.
    #[must_use]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A mouse wheel or trackpad scroll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelEvent {
    /// Pointer X in screen pixels.
    pub x: f32,
    /// Pointer Y in screen pixels.
    pub y: f32,
    /// Horizontal scroll amount.
    pub delta_x: f32,
    /// Vertical scroll amount.
    pub delta_y: f32,
    /// Modifier keys.
    #[serde(default)]
    pub modifiers: KeyModifiers,
}

impl WheelEvent {
    /// A scroll with no modifiers.
    #[must_use]
    pub fn new(x: f32, y: f32, delta_x: f32, delta_y: f32) -> Self {
        Self {
            x,
            y,
            delta_x,
            delta_y,
            modifiers: KeyModifiers::NONE,
        }
    }

    /// Set the modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: KeyModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// All input events the canvas controller accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InputEvent {
    /// Contact started.
    PointerDown(PointerEvent),
    /// Contact moved.
    PointerMove(PointerEvent),
    /// Contact ended.
    PointerUp(PointerEvent),
    /// Scroll or zoom.
    Wheel(WheelEvent),
}
