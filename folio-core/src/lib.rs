//! # Folio Core
//!
//! Page layout and interaction logic for paginated design documents.
//! Renders JSON layout templates onto a paginated canvas, lets the user
//! edit the result, serializes it back to a template and exports pages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 folio-core                  │
//! ├─────────────────────────────────────────────┤
//! │  Layout Engine   │  Canvas Controller       │
//! │  - Templates     │  - Pan / zoom / swipe    │
//! │  - Tokens        │  - Drag + smart guides   │
//! │  - Stack / row   │  - Pages and paging mode │
//! │  - Grid / abs    │  - Export orchestration  │
//! ├─────────────────────────────────────────────┤
//! │  Scene Graph     │  Template Serializer     │
//! │  - Elements      │  - Scene → template      │
//! │  - Page index    │  - Defaults omitted      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Pixels are produced elsewhere: image processing and page rasterization
//! sit behind the [`ImageProcessor`] and [`RegionRasterizer`] traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod anim;
pub mod config;
pub mod controller;
pub mod element;
pub mod error;
pub mod event;
pub mod export;
pub mod image;
pub mod layout;
pub mod node;
pub mod page;
pub mod scene;
pub mod shape;
pub mod snap;
pub mod template;
pub mod text;
pub mod tokens;
pub mod viewport;

pub use anim::{Ease, PanAnimation};
pub use config::{CanvasConfig, ChromeStyle, SnapConfig, ZoomLimits};
pub use controller::{
    CanvasController, DragSession, Gesture, StyleUpdate, TextPreset, ZOrder, DUPLICATE_OFFSET,
};
pub use element::{
    ClipRegion, ElementFactory, ElementId, ElementKind, ElementRole, ImageContent, Origin, Point,
    PositionedElement, Rect, ShapeStyle, TextAlign, TextStyle, Transform,
};
pub use error::{CanvasError, CanvasResult};
pub use event::{InputEvent, KeyModifiers, PointerEvent, PointerKind, WheelEvent};
pub use export::{
    ExportKind, ExportOutput, ExportRequest, RasterFormat, RasterImage, RegionRasterizer,
};
pub use image::{
    ImageError, ImageProcessor, ImageRequest, PassthroughImageProcessor, ProcessedImage,
};
pub use layout::{LayoutEngine, LayoutResult, RenderedPage, RenderedTemplate};
pub use node::{ComponentDef, Dimension, LayoutKind, LayoutNode, TemplateDocument};
pub use page::{Page, PageGeometry, PagingMode};
pub use scene::Scene;
pub use shape::{Outline, ShapeKind};
pub use snap::{GuideLine, SmartGuides, SnapTargets};
pub use template::scene_to_template;
pub use text::{HeuristicTextMeasurer, TextMeasurer, TextMetrics};
pub use tokens::TokenResolver;
pub use viewport::Viewport;

/// Folio core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
