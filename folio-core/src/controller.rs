//! Interactive canvas controller.
//!
//! Owns the scene, the pages and the viewport, and turns pointer and wheel
//! events into pans, zooms, page swipes and element drags:
//!
//! ```text
//! pointer down ──► alt / zoomed-in touch on empty canvas ─► Pan
//!              ├─► touch at fit zoom, horizontal, empty  ─► Swipe ─► settle animation
//!              ├─► element hit                           ─► Drag (snapping, page reassignment)
//!              └─► empty canvas                          ─► activate page under pointer
//! ```
//!
//! Only one gesture is active at a time. A second pointer pressing while a
//! gesture is active is rejected; the same pointer pressing again ends the
//! old gesture first.

use serde::{Deserialize, Serialize};

use crate::anim::{Ease, PanAnimation};
use crate::config::CanvasConfig;
use crate::element::{
    ClipRegion, ElementFactory, ElementId, ElementKind, ElementRole, ImageContent, Point,
    PositionedElement, Rect, ShapeStyle, TextAlign, TextStyle, Transform,
};
use crate::error::{CanvasError, CanvasResult};
use crate::event::{InputEvent, PointerEvent, PointerKind, WheelEvent};
use crate::export::{ExportKind, ExportOutput, ExportRequest, RasterImage, RegionRasterizer};
use crate::image::ImageRequest;
use crate::layout::LayoutEngine;
use crate::node::TemplateDocument;
use crate::page::{Page, PageGeometry, PagingMode, DEFAULT_PAGE_BACKGROUND};
use crate::scene::Scene;
use crate::shape::{ShapeKind, DEFAULT_ROUNDED_RADIUS};
use crate::snap::{SmartGuides, SnapTargets};
use crate::template::scene_to_template;
use crate::viewport::Viewport;

/// Offset applied to duplicated elements.
pub const DUPLICATE_OFFSET: f32 = 20.0;

const TEXT_INSERT_OFFSET: Point = Point::new(100.0, 100.0);
const TEXT_INSERT_WIDTH: f32 = 400.0;
const SHAPE_INSERT_OFFSET: Point = Point::new(150.0, 150.0);
const SHAPE_INSERT_FILL: &str = "#4ade80";
const LINE_INSERT_COLOR: &str = "#ffffff";
const IMAGE_INSERT_OFFSET: Point = Point::new(200.0, 200.0);
const IMAGE_INSERT_SIZE: u32 = 200;

/// Text styles offered for new text boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPreset {
    /// Large display heading.
    Headline,
    /// Secondary heading.
    Subhead,
    /// Body copy.
    Body,
}

impl TextPreset {
    /// Style and placeholder content of the preset.
    #[must_use]
    pub fn style(self) -> TextStyle {
        let (content, font_size, font_family, color) = match self {
            Self::Headline => ("New Headline", 72.0, "Bebas Neue", "#d9f99d"),
            Self::Subhead => ("New Subheading", 24.0, "Manrope", "#ffffff"),
            Self::Body => ("Add your body text here", 14.0, "Manrope", "#d4d4d4"),
        };
        TextStyle {
            content: content.to_string(),
            font_size,
            font_family: font_family.to_string(),
            color: color.to_string(),
            text_align: TextAlign::Center,
            ..TextStyle::default()
        }
    }
}

/// Stacking order changes for the selected element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZOrder {
    /// Above all other content.
    Front,
    /// Below all other content.
    Back,
    /// One step up.
    Forward,
    /// One step down.
    Backward,
}

/// Style changes for the selected element. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleUpdate {
    /// Text color or shape fill.
    pub fill: Option<String>,
    /// Font size (text only).
    pub font_size: Option<f32>,
    /// Font family (text only).
    pub font_family: Option<String>,
    /// Alignment (text only).
    pub text_align: Option<TextAlign>,
    /// Opacity from 0 to 1.
    pub opacity: Option<f32>,
}

/// State of an element drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    /// Pointer driving the drag.
    pub pointer_id: u32,
    /// Element being dragged.
    pub element_id: ElementId,
    /// Element top-left when the drag started.
    pub origin: Point,
    /// Pointer position (scene coordinates) when the drag started.
    pub pointer_origin: Point,
    /// Element width, cached for snapping.
    pub width: f32,
    /// Element height, cached for snapping.
    pub height: f32,
}

/// The gesture currently in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Gesture {
    /// No pointer is down.
    #[default]
    Idle,
    /// Free pan of the viewport.
    Pan {
        /// Pointer driving the pan.
        pointer_id: u32,
        /// Last pointer position in screen pixels.
        last: Point,
    },
    /// Horizontal page swipe.
    Swipe {
        /// Pointer driving the swipe.
        pointer_id: u32,
        /// Last pointer x in screen pixels.
        last_x: f32,
    },
    /// Element drag.
    Drag(DragSession),
}

impl Gesture {
    /// Pointer that owns the gesture.
    #[must_use]
    pub fn pointer_id(&self) -> Option<u32> {
        match self {
            Self::Idle => None,
            Self::Pan { pointer_id, .. } | Self::Swipe { pointer_id, .. } => Some(*pointer_id),
            Self::Drag(session) => Some(session.pointer_id),
        }
    }
}

/// Interactive controller over a paginated scene.
#[derive(Debug)]
pub struct CanvasController {
    config: CanvasConfig,
    factory: ElementFactory,
    engine: LayoutEngine,
    scene: Scene,
    pages: Vec<Page>,
    active_page: usize,
    mode: PagingMode,
    viewport: Viewport,
    guides: SmartGuides,
    selection: Option<ElementId>,
    gesture: Gesture,
    animation: Option<PanAnimation>,
}

impl Default for CanvasController {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl CanvasController {
    /// Controller with one empty page.
    #[must_use]
    pub fn new(config: CanvasConfig) -> Self {
        let factory = ElementFactory::new(config.chrome.clone());
        let engine = LayoutEngine::new(config.page).with_factory(factory.clone());
        let mut controller = Self {
            factory,
            engine,
            scene: Scene::new(),
            pages: vec![Page::new(Page::default_id(0))],
            active_page: 0,
            mode: PagingMode::default(),
            viewport: Viewport::new(800.0, 600.0, config.zoom),
            guides: SmartGuides::new(config.snap),
            selection: None,
            gesture: Gesture::Idle,
            animation: None,
            config,
        };
        controller.sync_page_chrome();
        controller
    }

    /// Use a different layout engine (for example one with a pixel image
    /// processor).
    #[must_use]
    pub fn with_engine(mut self, engine: LayoutEngine) -> Self {
        self.engine = engine;
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// The scene.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Pages in order.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Index of the active page.
    #[must_use]
    pub fn active_page(&self) -> usize {
        self.active_page
    }

    /// Paging direction.
    #[must_use]
    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    /// The viewport.
    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Smart-guide state of the current drag.
    #[must_use]
    pub fn guides(&self) -> &SmartGuides {
        &self.guides
    }

    /// Selected element.
    #[must_use]
    pub fn selection(&self) -> Option<ElementId> {
        self.selection
    }

    /// Gesture in progress.
    #[must_use]
    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    /// Whether a swipe settle animation is running.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    fn geometry(&self) -> PageGeometry {
        self.config.page
    }

    fn page_rect(&self, index: usize) -> Rect {
        self.geometry().page_rect(index, self.mode)
    }

    /// Index of the page with the given id.
    #[must_use]
    pub fn page_index(&self, page_id: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.id == page_id)
    }

    fn content_rect(&self) -> Rect {
        let (width, height) = self.geometry().content_size(self.pages.len(), self.mode);
        Rect::new(0.0, 0.0, width, height)
    }

    /// Page whose center along the paging axis is closest to `along`.
    fn nearest_page(&self, along: f32) -> Option<usize> {
        let geometry = self.geometry();
        (0..self.pages.len()).min_by(|&a, &b| {
            let da = (along - geometry.page_center(a, self.mode)).abs();
            let db = (along - geometry.page_center(b, self.mode)).abs();
            da.total_cmp(&db)
        })
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    /// Dispatch any input event.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::StateConflict`] when a pointer presses while
    /// another pointer owns a gesture.
    pub fn handle_event(&mut self, event: &InputEvent) -> CanvasResult<()> {
        match event {
            InputEvent::PointerDown(pointer) => self.pointer_down(pointer)?,
            InputEvent::PointerMove(pointer) => self.pointer_move(pointer),
            InputEvent::PointerUp(pointer) => self.pointer_up(pointer),
            InputEvent::Wheel(wheel) => self.on_wheel(wheel),
        }
        Ok(())
    }

    /// Zoom around the pointer with a zoom modifier held, pan otherwise.
    pub fn on_wheel(&mut self, event: &WheelEvent) {
        if event.modifiers.zooms() {
            let zoom = self.viewport.zoom() * self.config.wheel_zoom_base.powf(event.delta_y);
            self.viewport.zoom_to_point(Point::new(event.x, event.y), zoom);
            self.apply_centering();
            self.refresh_selection_chrome();
            tracing::debug!("Wheel zoom to {}", self.viewport.zoom());
        } else {
            let (dx, dy) = self
                .viewport
                .lock_pan(-event.delta_x, -event.delta_y, self.content_rect());
            self.viewport.relative_pan(dx, dy);
            self.apply_centering();
        }
    }

    /// Start a gesture.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::StateConflict`] if another pointer owns the
    /// active gesture; the new press is dropped.
    pub fn pointer_down(&mut self, event: &PointerEvent) -> CanvasResult<()> {
        if let Some(active) = self.gesture.pointer_id() {
            if active != event.pointer_id {
                tracing::warn!(
                    "Pointer {} pressed while pointer {} owns a gesture, dropping",
                    event.pointer_id,
                    active
                );
                return Err(CanvasError::StateConflict(format!(
                    "pointer {active} already owns a gesture"
                )));
            }
            self.end_gesture();
        }
        self.animation = None;

        let point = self.viewport.to_scene(event.position());
        let hit = self.scene.element_at(point);
        let touch = event.kind == PointerKind::Touch;
        let fitted = self.viewport.zoom() <= self.config.touch_fit_threshold;
        let pointer_id = event.pointer_id;

        if event.modifiers.pans() || (touch && !fitted && hit.is_none()) {
            self.gesture = Gesture::Pan {
                pointer_id,
                last: event.position(),
            };
        } else if touch && fitted && hit.is_none() && self.mode == PagingMode::Horizontal {
            self.gesture = Gesture::Swipe {
                pointer_id,
                last_x: event.x,
            };
        } else if let Some(id) = hit {
            self.select(id)?;
            let bounds = self
                .scene
                .get(id)
                .map(PositionedElement::bounds)
                .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
            self.guides.clear();
            self.gesture = Gesture::Drag(DragSession {
                pointer_id,
                element_id: id,
                origin: Point::new(bounds.x, bounds.y),
                pointer_origin: point,
                width: bounds.width,
                height: bounds.height,
            });
            tracing::debug!("Drag of {} started by pointer {}", id, pointer_id);
        } else {
            self.selection = None;
            let geometry = self.geometry();
            if let Some(index) = geometry.page_at_point(point, self.pages.len(), self.mode) {
                self.activate(index);
            }
        }
        Ok(())
    }

    /// Continue the active gesture. Moves of other pointers are ignored.
    pub fn pointer_move(&mut self, event: &PointerEvent) {
        match self.gesture {
            Gesture::Pan { pointer_id, last } if pointer_id == event.pointer_id => {
                let (dx, dy) =
                    self.viewport
                        .lock_pan(event.x - last.x, event.y - last.y, self.content_rect());
                self.viewport.relative_pan(dx, dy);
                self.gesture = Gesture::Pan {
                    pointer_id,
                    last: event.position(),
                };
            }
            Gesture::Swipe { pointer_id, last_x } if pointer_id == event.pointer_id => {
                self.viewport.relative_pan(event.x - last_x, 0.0);
                self.gesture = Gesture::Swipe {
                    pointer_id,
                    last_x: event.x,
                };
            }
            Gesture::Drag(session) if session.pointer_id == event.pointer_id => {
                self.drag_to(session, event);
            }
            _ => {}
        }
    }

    /// End the active gesture if `event` comes from its pointer.
    pub fn pointer_up(&mut self, event: &PointerEvent) {
        if self.gesture.pointer_id() != Some(event.pointer_id) {
            return;
        }
        match std::mem::take(&mut self.gesture) {
            Gesture::Swipe { .. } => self.settle_swipe(event.timestamp_ms),
            Gesture::Drag(session) => {
                self.guides.clear();
                tracing::debug!("Drag of {} ended", session.element_id);
            }
            Gesture::Pan { .. } | Gesture::Idle => {}
        }
    }

    /// Advance the swipe animation to `now_ms`. Returns whether it is still
    /// running.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let Some(animation) = self.animation else {
            return false;
        };
        self.viewport.set_pan(animation.value_at(now_ms));
        if animation.is_finished(now_ms) {
            self.animation = None;
            self.activate(animation.target_page);
            return false;
        }
        true
    }

    fn end_gesture(&mut self) {
        if let Gesture::Drag(_) = self.gesture {
            self.guides.clear();
        }
        self.gesture = Gesture::Idle;
    }

    fn drag_to(&mut self, session: DragSession, event: &PointerEvent) {
        let pointer = self.viewport.to_scene(event.position());
        // Always from the pre-drag position, never from the last frame.
        let intended = Point::new(
            session.origin.x + pointer.x - session.pointer_origin.x,
            session.origin.y + pointer.y - session.pointer_origin.y,
        );

        let outcome = if event.modifiers.disables_snapping() {
            self.guides.bypass(intended)
        } else {
            let page = self.owning_page_rect(session.element_id);
            let targets = SnapTargets::collect(&self.scene, page, session.element_id);
            let intended = Rect::new(intended.x, intended.y, session.width, session.height);
            self.guides.snap(intended, &targets, page)
        };

        let Some(element) = self.scene.get_mut(session.element_id) else {
            tracing::warn!("Dragged element {} is gone, ending drag", session.element_id);
            self.end_gesture();
            return;
        };
        element.set_top_left(outcome.position);
        self.reassign_page(session.element_id);
    }

    fn owning_page_rect(&self, id: ElementId) -> Rect {
        let index = self
            .scene
            .get(id)
            .and_then(|e| e.page_id.as_deref())
            .and_then(|p| self.page_index(p))
            .unwrap_or(self.active_page);
        self.page_rect(index)
    }

    /// Keep the element on its page while it still overlaps it along the
    /// paging axis, otherwise move it to the page with the nearest center.
    fn reassign_page(&mut self, id: ElementId) {
        let Some(element) = self.scene.get(id) else {
            return;
        };
        if element.is_internal() {
            return;
        }
        let bounds = element.bounds();
        let (start, end, center) = match self.mode {
            PagingMode::Vertical => (bounds.y, bounds.bottom(), bounds.center_y()),
            PagingMode::Horizontal => (bounds.x, bounds.right(), bounds.center_x()),
        };

        let current = element.page_id.as_deref().and_then(|p| self.page_index(p));
        if let Some(index) = current {
            let page = self.page_rect(index);
            let (page_start, page_end) = match self.mode {
                PagingMode::Vertical => (page.y, page.bottom()),
                PagingMode::Horizontal => (page.x, page.right()),
            };
            if start < page_end && end > page_start {
                return;
            }
        }

        let Some(nearest) = self.nearest_page(center) else {
            return;
        };
        if current == Some(nearest) {
            return;
        }
        let page_id = self.pages[nearest].id.clone();
        tracing::info!("Element {} moved to page {}", id, page_id);
        if self.scene.set_page(id, Some(page_id)).is_ok() {
            self.refresh_clip(id);
            self.activate(nearest);
        }
    }

    fn settle_swipe(&mut self, now_ms: u64) {
        let zoom = self.viewport.zoom();
        let pan = self.viewport.pan();
        let center = (self.viewport.width() / 2.0 - pan.x) / zoom;
        let Some(target) = self.nearest_page(center) else {
            return;
        };
        let target_x =
            self.viewport.width() / 2.0 - self.geometry().page_center(target, self.mode) * zoom;
        tracing::debug!("Swipe settling on page {}", target);
        self.animation = Some(PanAnimation {
            from: pan,
            to: Point::new(target_x, pan.y),
            start_ms: now_ms,
            duration_ms: self.config.swipe_duration_ms,
            target_page: target,
            ease: Ease::OutQuad,
        });
    }

    // ------------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------------

    /// Resize the screen, then refit and recenter.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.resize(width, height);
        self.fit_viewport();
    }

    /// Switch the paging direction, moving every page's elements with it.
    pub fn set_paging_mode(&mut self, mode: PagingMode) {
        if mode == self.mode {
            return;
        }
        tracing::info!("Switching paging mode from {:?} to {:?}", self.mode, mode);
        let geometry = self.geometry();
        for (index, page) in self.pages.iter().enumerate() {
            let target = geometry.offset(index, mode);
            let current = self
                .scene
                .page_background(&page.id)
                .map_or_else(|| geometry.offset(index, self.mode), PositionedElement::top_left);
            let (dx, dy) = (target.x - current.x, target.y - current.y);
            if dx.abs() > f32::EPSILON || dy.abs() > f32::EPSILON {
                self.scene.translate_page(&page.id, dx, dy);
            }
        }
        self.mode = mode;
        self.animation = None;
        self.sync_page_chrome();
        self.refresh_all_clips();
        self.fit_viewport();
    }

    /// Fit one page into a narrow horizontal viewport, then center.
    fn fit_viewport(&mut self) {
        let geometry = self.geometry();
        if let Some(zoom) = self
            .viewport
            .fit_zoom(&geometry, self.mode, self.config.auto_fit_margin)
        {
            let center = Point::new(self.viewport.width() / 2.0, self.viewport.height() / 2.0);
            self.viewport.zoom_to_point(center, zoom);
            let zoom = self.viewport.zoom();
            let page = self.page_rect(self.active_page);
            let mut pan = self.viewport.pan();
            pan.x = (self.viewport.width() - geometry.width * zoom) / 2.0 - page.x * zoom;
            self.viewport.set_pan(pan);
        }
        self.apply_centering();
        self.refresh_selection_chrome();
    }

    fn apply_centering(&mut self) {
        let content = self.content_rect();
        self.viewport.apply_centering(content);
    }

    // ------------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------------

    /// Append a page with the active page's background and activate it.
    pub fn add_page(&mut self) -> String {
        let background = self
            .pages
            .get(self.active_page)
            .map_or_else(|| DEFAULT_PAGE_BACKGROUND.to_string(), |p| p.background_color.clone());
        let mut n = self.pages.len();
        let id = loop {
            let id = Page::default_id(n);
            if self.page_index(&id).is_none() {
                break id;
            }
            n += 1;
        };
        self.pages.push(Page::new(id.clone()).with_background(background));
        self.active_page = self.pages.len() - 1;
        self.sync_page_chrome();
        self.apply_centering();
        tracing::info!("Added page {}", id);
        id
    }

    /// Remove a page and its elements. Later pages move up one slot.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PageNotFound`] for a bad index and
    /// [`CanvasError::LastPage`] when only one page is left.
    pub fn delete_page(&mut self, index: usize) -> CanvasResult<Page> {
        if index >= self.pages.len() {
            return Err(CanvasError::PageNotFound(format!("index {index}")));
        }
        if self.pages.len() <= 1 {
            return Err(CanvasError::LastPage);
        }

        let page = self.pages.remove(index);
        let removed = self.scene.remove_page_elements(&page.id);
        let gone = |id: ElementId| removed.iter().any(|e| e.id == id);
        if self.selection.is_some_and(gone) {
            self.selection = None;
        }
        if let Gesture::Drag(session) = self.gesture {
            if gone(session.element_id) {
                self.end_gesture();
            }
        }

        let geometry = self.geometry();
        for later in index..self.pages.len() {
            let from = geometry.offset(later + 1, self.mode);
            let to = geometry.offset(later, self.mode);
            self.scene
                .translate_page(&self.pages[later].id, to.x - from.x, to.y - from.y);
        }

        self.active_page = if self.active_page == index {
            0
        } else if self.active_page > index {
            self.active_page - 1
        } else {
            self.active_page
        };
        self.sync_page_chrome();
        self.refresh_all_clips();
        self.apply_centering();
        tracing::info!("Deleted page {} with {} elements", page.id, removed.len());
        Ok(page)
    }

    /// Make a page active.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PageNotFound`] for a bad index.
    pub fn set_active_page(&mut self, index: usize) -> CanvasResult<()> {
        if index >= self.pages.len() {
            return Err(CanvasError::PageNotFound(format!("index {index}")));
        }
        self.activate(index);
        Ok(())
    }

    fn activate(&mut self, index: usize) {
        let Some(page) = self.pages.get(index) else {
            return;
        };
        let active_id = page.id.clone();
        self.active_page = index;
        for element in self.scene.elements_mut() {
            if element.role == ElementRole::PageFrame {
                element.visible = element.page_id.as_deref() == Some(active_id.as_str());
            }
        }
    }

    /// Change a page's background color.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PageNotFound`] for a bad index.
    pub fn set_page_background(&mut self, index: usize, color: &str) -> CanvasResult<()> {
        let page = self
            .pages
            .get_mut(index)
            .ok_or_else(|| CanvasError::PageNotFound(format!("index {index}")))?;
        page.background_color = color.to_string();
        self.sync_page_chrome();
        Ok(())
    }

    /// Give every page exactly one background (bottom of the stack) and one
    /// highlight frame (top of the stack) at its current slot, and drop the
    /// chrome of pages that no longer exist.
    pub fn sync_page_chrome(&mut self) {
        let stale: Vec<ElementId> = self
            .scene
            .elements()
            .filter(|e| match e.role {
                ElementRole::PageFrame => true,
                ElementRole::PageBackground => e
                    .page_id
                    .as_deref()
                    .map_or(true, |p| self.page_index(p).is_none()),
                ElementRole::Content | ElementRole::StrokeOverlay => false,
            })
            .map(|e| e.id)
            .collect();
        for id in stale {
            self.scene.remove(&id).ok();
        }

        let geometry = self.geometry();
        for (index, page) in self.pages.iter().enumerate() {
            let rect = geometry.page_rect(index, self.mode);
            let existing = self.scene.page_background(&page.id).map(|e| e.id);
            match existing.and_then(|id| self.scene.get_mut(id)) {
                Some(background) => {
                    background.transform.width = rect.width;
                    background.transform.height = rect.height;
                    background.set_top_left(Point::new(rect.x, rect.y));
                    if let ElementKind::Shape(style) = &mut background.kind {
                        style.fill.clone_from(&page.background_color);
                    }
                }
                None => {
                    let background =
                        self.factory
                            .page_background(&page.id, rect, &page.background_color);
                    self.scene.insert(0, background);
                }
            }
        }

        for (index, page) in self.pages.iter().enumerate() {
            let mut frame = self
                .factory
                .page_frame(&page.id, geometry.page_rect(index, self.mode));
            frame.visible = index == self.active_page;
            self.scene.add(frame);
        }
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    /// Replace the document with a resolved template.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::StateConflict`] if a template render is
    /// already in flight.
    pub async fn load_template(&mut self, document: &TemplateDocument) -> CanvasResult<()> {
        let rendered = self.engine.render_template(document, self.mode).await?;

        self.scene.clear();
        self.selection = None;
        self.gesture = Gesture::Idle;
        self.guides.clear();
        self.animation = None;
        self.pages = rendered.pages;
        if self.pages.is_empty() {
            self.pages.push(Page::new(Page::default_id(0)));
        }
        self.active_page = 0;

        // Backgrounds are rebuilt below the content by sync_page_chrome.
        for element in rendered
            .elements
            .into_iter()
            .filter(|e| e.role != ElementRole::PageBackground)
        {
            let id = self.scene.add(element);
            self.refresh_clip(id);
        }
        self.sync_page_chrome();
        self.fit_viewport();
        tracing::info!(
            "Loaded template with {} pages and {} elements",
            self.pages.len(),
            self.scene.len()
        );
        Ok(())
    }

    /// Serialize the scene back into a template.
    #[must_use]
    pub fn to_template(&self) -> TemplateDocument {
        scene_to_template(&self.scene, &self.pages, self.mode, &self.config.page)
    }

    fn insert_on_page(&mut self, element: PositionedElement, index: usize) -> ElementId {
        let element = element.with_page(self.pages[index].id.clone());
        let id = self.scene.add_content(element);
        self.refresh_clip(id);
        self.selection = Some(id);
        self.refresh_selection_chrome();
        self.activate(index);
        id
    }

    /// Add a text box with a preset style on the active page.
    pub fn add_text(&mut self, preset: TextPreset, content: Option<&str>) -> ElementId {
        let mut style = preset.style();
        if let Some(content) = content {
            style.content = content.to_string();
        }
        let page = self.page_rect(self.active_page);
        let height = self.engine.measure_text(&style, TEXT_INSERT_WIDTH).height;
        let element = self.factory.text(
            style,
            Transform::at(
                page.x + TEXT_INSERT_OFFSET.x,
                page.y + TEXT_INSERT_OFFSET.y,
                TEXT_INSERT_WIDTH,
                height,
            ),
        );
        self.insert_on_page(element, self.active_page)
    }

    /// Add a shape with its default size on the active page.
    pub fn add_shape(&mut self, kind: ShapeKind, fill: Option<&str>) -> ElementId {
        let (width, height, corner_radius) = match kind {
            ShapeKind::Rect => (150.0, 100.0, 8.0),
            ShapeKind::Rounded => (150.0, 100.0, DEFAULT_ROUNDED_RADIUS),
            ShapeKind::Ellipse => (160.0, 100.0, 0.0),
            ShapeKind::Triangle => (160.0, 136.0, 0.0),
            ShapeKind::Line => (200.0, 3.0, 0.0),
            ShapeKind::Circle
            | ShapeKind::Diamond
            | ShapeKind::Pentagon
            | ShapeKind::Hexagon
            | ShapeKind::Octagon
            | ShapeKind::Star => (120.0, 120.0, 0.0),
        };
        let default_fill = if kind == ShapeKind::Line {
            LINE_INSERT_COLOR
        } else {
            SHAPE_INSERT_FILL
        };
        let style = ShapeStyle {
            shape: kind,
            fill: fill.unwrap_or(default_fill).to_string(),
            corner_radius,
            ..ShapeStyle::default()
        };
        let page = self.page_rect(self.active_page);
        let element = self.factory.shape(
            style,
            Transform::at(
                page.x + SHAPE_INSERT_OFFSET.x,
                page.y + SHAPE_INSERT_OFFSET.y,
                width,
                height,
            ),
        );
        self.insert_on_page(element, self.active_page)
    }

    /// Add an image on page `page_index`.
    ///
    /// The page is passed explicitly because the image is processed
    /// asynchronously and the active page may change meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PageNotFound`] for a bad index and
    /// [`CanvasError::Image`] if the image cannot be processed.
    pub async fn add_image(&mut self, src: &str, page_index: usize) -> CanvasResult<ElementId> {
        if page_index >= self.pages.len() {
            return Err(CanvasError::PageNotFound(format!("index {page_index}")));
        }
        let request = ImageRequest {
            src: src.to_string(),
            width: IMAGE_INSERT_SIZE,
            height: IMAGE_INSERT_SIZE,
            shape: ShapeKind::Rect,
            corner_radius: 0.0,
        };
        let processed = self.engine.process_image(request).await.map_err(|e| {
            tracing::warn!("Failed to add image {}: {}", src, e);
            e
        })?;
        // The page list may have shrunk while the image was processed.
        if page_index >= self.pages.len() {
            return Err(CanvasError::PageNotFound(format!("index {page_index}")));
        }

        let page = self.page_rect(page_index);
        #[allow(clippy::cast_precision_loss)]
        let (width, height) = (processed.width as f32, processed.height as f32);
        let content = ImageContent {
            src: src.to_string(),
            data_uri: Some(processed.data_uri),
            ..ImageContent::default()
        };
        let element = self.factory.image(
            content,
            Transform::at(
                page.x + IMAGE_INSERT_OFFSET.x,
                page.y + IMAGE_INSERT_OFFSET.y,
                width,
                height,
            ),
        );
        Ok(self.insert_on_page(element, page_index))
    }

    /// Select an element and activate its page.
    ///
    /// # Errors
    ///
    /// Returns an error if the element does not exist or is canvas chrome.
    pub fn select(&mut self, id: ElementId) -> CanvasResult<()> {
        let chrome = self.config.chrome.at_zoom(self.viewport.zoom());
        let element = self
            .scene
            .get_mut(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        if !element.selectable {
            return Err(CanvasError::InvalidOperation(format!(
                "element {id} is not selectable"
            )));
        }
        element.chrome = chrome;
        let page = element.page_id.clone();
        self.selection = Some(id);
        if let Some(index) = page.and_then(|p| self.page_index(&p)) {
            self.activate(index);
        }
        Ok(())
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    fn selected(&self) -> CanvasResult<ElementId> {
        self.selection
            .ok_or_else(|| CanvasError::InvalidOperation("nothing selected".to_string()))
    }

    fn refresh_selection_chrome(&mut self) {
        let chrome = self.config.chrome.at_zoom(self.viewport.zoom());
        if let Some(element) = self.selection.and_then(|id| self.scene.get_mut(id)) {
            element.chrome = chrome;
        }
    }

    /// Remove the selected element.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] if nothing is selected.
    pub fn delete_selected(&mut self) -> CanvasResult<PositionedElement> {
        let id = self.selected()?;
        if let Gesture::Drag(session) = self.gesture {
            if session.element_id == id {
                self.end_gesture();
            }
        }
        let element = self.scene.remove(&id)?;
        self.selection = None;
        Ok(element)
    }

    /// Copy the selected element, offset by [`DUPLICATE_OFFSET`], and select
    /// the copy.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] if nothing is selected.
    pub fn duplicate_selected(&mut self) -> CanvasResult<ElementId> {
        let id = self.selected()?;
        let mut copy = self
            .scene
            .get(id)
            .cloned()
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        renew_ids(&mut copy);
        copy.translate(DUPLICATE_OFFSET, DUPLICATE_OFFSET);
        let copy_id = self.scene.add_content(copy);
        self.reassign_page(copy_id);
        self.refresh_clip(copy_id);
        self.select(copy_id)?;
        Ok(copy_id)
    }

    /// Change the stacking position of the selected element.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] if nothing is selected.
    pub fn reorder_selected(&mut self, order: ZOrder) -> CanvasResult<()> {
        let id = self.selected()?;
        match order {
            ZOrder::Front => self.scene.bring_to_front(id),
            ZOrder::Back => self.scene.send_to_back(id),
            ZOrder::Forward => self.scene.bring_forward(id),
            ZOrder::Backward => self.scene.send_backward(id),
        }
    }

    /// Resize an element, keeping its top-left corner. Group members are
    /// scaled with the group.
    ///
    /// # Errors
    ///
    /// Returns an error if the element does not exist or the size is not
    /// positive.
    pub fn resize_element(&mut self, id: ElementId, width: f32, height: f32) -> CanvasResult<()> {
        if !(width > 0.0 && height > 0.0) {
            return Err(CanvasError::InvalidOperation(format!(
                "invalid size {width}x{height}"
            )));
        }
        let element = self
            .scene
            .get_mut(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        let top_left = element.top_left();
        let sx = width / element.transform.width.max(f32::EPSILON);
        let sy = height / element.transform.height.max(f32::EPSILON);

        let member_bounds: Vec<Rect> = match &element.kind {
            ElementKind::Group { children } => {
                children.iter().map(PositionedElement::bounds).collect()
            }
            _ => Vec::new(),
        };
        element.transform.width = width;
        element.transform.height = height;
        element.set_top_left(top_left);
        if let ElementKind::Group { children } = &mut element.kind {
            for (child, bounds) in children.iter_mut().zip(member_bounds) {
                child.transform.width = bounds.width * sx;
                child.transform.height = bounds.height * sy;
                child.set_top_left(Point::new(
                    top_left.x + (bounds.x - top_left.x) * sx,
                    top_left.y + (bounds.y - top_left.y) * sy,
                ));
            }
        }
        self.reassign_page(id);
        self.refresh_clip(id);
        Ok(())
    }

    /// Apply style changes to the selected element.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] if nothing is selected.
    pub fn restyle_selected(&mut self, update: &StyleUpdate) -> CanvasResult<()> {
        let id = self.selected()?;
        let element = self
            .scene
            .get_mut(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        if let Some(opacity) = update.opacity {
            element.opacity = opacity.clamp(0.0, 1.0);
        }
        apply_style(&mut element.kind, update);
        if let ElementKind::Text(style) = &element.kind {
            element.transform.height = self
                .engine
                .measure_text(style, element.transform.width)
                .height;
        }
        Ok(())
    }

    /// Set a user clip in scene coordinates, or `None` to go back to the
    /// page slot clip. User clips move with the element.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::ElementNotFound`] for an unknown id and
    /// [`CanvasError::InvalidOperation`] for page chrome.
    pub fn set_clip(&mut self, id: ElementId, rect: Option<Rect>) -> CanvasResult<()> {
        let element = self
            .scene
            .get_mut(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        if element.is_internal() {
            return Err(CanvasError::InvalidOperation(format!(
                "element {id} is page chrome"
            )));
        }
        element.clip = rect.map(|rect| ClipRegion { rect, auto: false });
        self.refresh_clip(id);
        Ok(())
    }

    /// Recompute the auto-managed clip of an element to its page slot.
    /// User clips are left alone.
    fn refresh_clip(&mut self, id: ElementId) {
        let rect = match self.scene.get(id) {
            Some(e) if !e.is_internal() && !e.has_custom_clip() => e
                .page_id
                .as_deref()
                .and_then(|p| self.page_index(p))
                .map(|index| self.page_rect(index)),
            _ => None,
        };
        if let (Some(rect), Some(element)) = (rect, self.scene.get_mut(id)) {
            element.clip = Some(ClipRegion { rect, auto: true });
        }
    }

    fn refresh_all_clips(&mut self) {
        let ids: Vec<ElementId> = self
            .scene
            .elements()
            .filter(|e| !e.is_internal())
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.refresh_clip(id);
        }
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Capture pages with selection chrome and page frames hidden and the
    /// viewport at identity. All of that is restored afterwards, whether the
    /// export succeeds or not.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::StateConflict`] during an active gesture and
    /// [`CanvasError::Export`] if no page is valid or any capture fails;
    /// nothing is returned for the pages that did succeed.
    pub fn export<R: RegionRasterizer>(
        &mut self,
        request: &ExportRequest,
        rasterizer: &R,
    ) -> CanvasResult<ExportOutput> {
        if let Some(pointer) = self.gesture.pointer_id() {
            tracing::warn!("Export requested while pointer {} owns a gesture", pointer);
            return Err(CanvasError::StateConflict(format!(
                "pointer {pointer} owns a gesture"
            )));
        }
        tracing::info!(
            "Exporting pages {:?} as {:?}",
            request.page_indices,
            request.kind
        );
        let guard = ExportGuard::enter(self);
        let output = guard.capture(request, rasterizer);
        drop(guard);
        match &output {
            Ok(_) => tracing::info!("Export finished"),
            Err(e) => tracing::warn!("Export failed: {}", e),
        }
        output
    }
}

/// Transient export state. Dropping it restores the viewport, the selection
/// and the page frames.
struct ExportGuard<'a> {
    controller: &'a mut CanvasController,
    viewport: Viewport,
    selection: Option<ElementId>,
    hidden: Vec<ElementId>,
}

impl<'a> ExportGuard<'a> {
    fn enter(controller: &'a mut CanvasController) -> Self {
        let viewport = controller.viewport;
        let selection = controller.selection.take();
        let mut hidden = Vec::new();
        for element in controller.scene.elements_mut() {
            if element.role == ElementRole::PageFrame && element.visible {
                element.visible = false;
                hidden.push(element.id);
            }
        }
        controller.viewport.set_identity();
        Self {
            controller,
            viewport,
            selection,
            hidden,
        }
    }

    fn capture<R: RegionRasterizer>(
        &self,
        request: &ExportRequest,
        rasterizer: &R,
    ) -> CanvasResult<ExportOutput> {
        let controller = &*self.controller;
        let geometry = controller.geometry();
        let multiplier = if request.dpi_multiplier > 0.0 {
            request.dpi_multiplier
        } else {
            controller.config.export_multiplier
        };

        let mut images: Vec<RasterImage> = Vec::new();
        for &index in &request.page_indices {
            if index >= controller.pages.len() {
                tracing::warn!("Skipping export of missing page {}", index);
                continue;
            }
            let region = geometry.page_rect(index, controller.mode);
            let mut image = rasterizer
                .rasterize_region(&controller.scene, region, multiplier, request.format)
                .map_err(|e| CanvasError::Export(format!("page {index}: {e}")))?;
            image.page_index = index;
            images.push(image);
        }
        if images.is_empty() {
            return Err(CanvasError::Export("no valid pages to export".to_string()));
        }

        match request.kind {
            ExportKind::Raster => Ok(ExportOutput::Images(images)),
            ExportKind::Document => rasterizer
                .compose_document(&images, (geometry.width, geometry.height))
                .map(ExportOutput::Document)
                .map_err(|e| CanvasError::Export(e.to_string())),
        }
    }
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        for id in &self.hidden {
            if let Some(element) = self.controller.scene.get_mut(*id) {
                element.visible = true;
            }
        }
        self.controller.viewport = self.viewport;
        self.controller.selection = self.selection;
    }
}

/// Give an element (and its group members) fresh ids.
fn renew_ids(element: &mut PositionedElement) {
    element.id = ElementId::new();
    if let ElementKind::Group { children } = &mut element.kind {
        for child in children {
            renew_ids(child);
        }
    }
}

fn apply_style(kind: &mut ElementKind, update: &StyleUpdate) {
    match kind {
        ElementKind::Text(style) => {
            if let Some(fill) = &update.fill {
                style.color.clone_from(fill);
            }
            if let Some(size) = update.font_size.filter(|s| *s > 0.0) {
                style.font_size = size;
            }
            if let Some(family) = &update.font_family {
                style.font_family.clone_from(family);
            }
            if let Some(align) = update.text_align {
                style.text_align = align;
            }
        }
        ElementKind::Shape(style) => {
            if let Some(fill) = &update.fill {
                style.fill.clone_from(fill);
            }
        }
        ElementKind::Image(_) => {}
        ElementKind::Group { children } => {
            for child in children.iter_mut().filter(|c| !c.is_internal()) {
                apply_style(&mut child.kind, update);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyModifiers;
    use crate::export::RasterFormat;

    fn controller() -> CanvasController {
        CanvasController::new(CanvasConfig::default())
    }

    /// Screen position of a scene point.
    fn screen(controller: &CanvasController, x: f32, y: f32) -> (f32, f32) {
        let p = controller.viewport().to_screen(Point::new(x, y));
        (p.x, p.y)
    }

    fn content(controller: &CanvasController) -> Vec<&PositionedElement> {
        controller
            .scene()
            .elements()
            .filter(|e| !e.is_internal())
            .collect()
    }

    #[test]
    fn test_new_controller_has_page_chrome() {
        let c = controller();
        assert_eq!(c.pages().len(), 1);
        let roles: Vec<ElementRole> = c.scene().elements().map(|e| e.role).collect();
        assert_eq!(roles, vec![ElementRole::PageBackground, ElementRole::PageFrame]);
    }

    #[test]
    fn test_drag_snaps_to_sibling_edge() {
        let mut c = controller();
        let sibling = c.add_shape(ShapeKind::Rect, None);
        c.resize_element(sibling, 50.0, 50.0).expect("resize");
        c.scene
            .get_mut(sibling)
            .expect("sibling")
            .set_top_left(Point::new(109.0, 400.0));

        let moving = c.add_shape(ShapeKind::Rect, None);
        c.resize_element(moving, 40.0, 30.0).expect("resize");
        c.scene
            .get_mut(moving)
            .expect("moving")
            .set_top_left(Point::new(100.0, 100.0));

        let (sx, sy) = screen(&c, 110.0, 110.0);
        c.pointer_down(&PointerEvent::mouse(1, sx, sy)).expect("down");
        assert_eq!(c.selection(), Some(moving));
        c.pointer_move(&PointerEvent::mouse(1, sx + 8.0, sy));

        let moved = c.scene().get(moving).expect("moving").top_left();
        assert!((moved.x - 109.0).abs() < 1e-3, "x = {}", moved.x);
        assert!((moved.y - 100.0).abs() < 1e-3);
        assert_eq!(c.guides().guides().len(), 1);

        c.pointer_up(&PointerEvent::mouse(1, sx + 8.0, sy));
        assert!(c.guides().guides().is_empty());
        assert_eq!(c.gesture(), Gesture::Idle);
    }

    #[test]
    fn test_shift_drag_skips_snapping() {
        let mut c = controller();
        let moving = c.add_shape(ShapeKind::Rect, None);
        c.scene
            .get_mut(moving)
            .expect("moving")
            .set_top_left(Point::new(3.0, 300.0));
        let (sx, sy) = screen(&c, 20.0, 320.0);
        c.pointer_down(&PointerEvent::mouse(1, sx, sy)).expect("down");
        c.pointer_move(
            &PointerEvent::mouse(1, sx + 2.0, sy).with_modifiers(KeyModifiers::SHIFT),
        );
        let moved = c.scene().get(moving).expect("moving").top_left();
        assert!((moved.x - 5.0).abs() < 1e-3);
        assert!(c.guides().guides().is_empty());
    }

    #[test]
    fn test_second_pointer_is_rejected() {
        let mut c = controller();
        let id = c.add_shape(ShapeKind::Rect, None);
        let center = c.scene().get(id).expect("shape").bounds();
        let (sx, sy) = screen(&c, center.center_x(), center.center_y());
        c.pointer_down(&PointerEvent::mouse(1, sx, sy)).expect("down");

        let second = c.pointer_down(&PointerEvent::touch(2, sx, sy));
        assert!(matches!(second, Err(CanvasError::StateConflict(_))));
        assert!(matches!(c.gesture(), Gesture::Drag(s) if s.pointer_id == 1));

        // Same pointer again ends the old session and starts a new one.
        c.pointer_down(&PointerEvent::mouse(1, sx, sy)).expect("re-down");
        assert!(matches!(c.gesture(), Gesture::Drag(s) if s.pointer_id == 1));
    }

    #[test]
    fn test_drag_reassigns_page_sticky_then_nearest() {
        let mut c = controller();
        c.add_page();
        c.set_active_page(0).expect("page 0");
        let id = c.add_shape(ShapeKind::Rect, None);
        c.resize_element(id, 100.0, 100.0).expect("resize");
        c.scene
            .get_mut(id)
            .expect("shape")
            .set_top_left(Point::new(100.0, 700.0));

        let start = screen(&c, 150.0, 750.0);
        c.pointer_down(&PointerEvent::mouse(1, start.0, start.1)).expect("down");

        // Still overlapping page 0 (ends at 842): sticky.
        let zoom = c.viewport().zoom();
        c.pointer_move(&PointerEvent::mouse(1, start.0, start.1 + 120.0 * zoom));
        assert_eq!(
            c.scene().get(id).expect("shape").page_id.as_deref(),
            Some("page-1")
        );

        // Entirely in the gap and closer to page 1's center.
        c.pointer_move(&PointerEvent::mouse(1, start.0, start.1 + 600.0 * zoom));
        let element = c.scene().get(id).expect("shape");
        assert_eq!(element.page_id.as_deref(), Some("page-2"));
        assert_eq!(c.active_page(), 1);
        let clip = element.clip.expect("clip");
        assert!(clip.auto);
        assert_eq!(clip.rect, c.geometry().page_rect(1, PagingMode::Vertical));
    }

    #[test]
    fn test_wheel_zoom_keeps_point_and_clamps() {
        let mut c = controller();
        c.resize(2000.0, 2000.0);
        let wheel = WheelEvent::new(400.0, 300.0, 0.0, -500.0).with_modifiers(KeyModifiers::CTRL);
        c.on_wheel(&wheel);
        let expected = 0.999f32.powf(-500.0);
        assert!((c.viewport().zoom() - expected).abs() < 1e-4);

        for _ in 0..50 {
            c.on_wheel(&wheel);
        }
        assert!((c.viewport().zoom() - 20.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_wheel_pan_locks_fitting_axis() {
        let mut c = controller();
        c.resize(1000.0, 500.0);
        let before = c.viewport().pan();
        c.on_wheel(&WheelEvent::new(0.0, 0.0, 30.0, 40.0));
        let after = c.viewport().pan();
        // Page width fits: x stays centered. Height does not: y pans.
        assert!((after.x - before.x).abs() < f32::EPSILON);
        assert!((after.y - (before.y - 40.0)).abs() < 1e-3);
    }

    #[test]
    fn test_alt_drag_pans() {
        let mut c = controller();
        c.resize(400.0, 300.0);
        c.add_shape(ShapeKind::Rect, None);
        let before = c.viewport().pan();
        let down = PointerEvent::mouse(1, 200.0, 150.0).with_modifiers(KeyModifiers::ALT);
        c.pointer_down(&down).expect("down");
        assert!(matches!(c.gesture(), Gesture::Pan { .. }));
        c.pointer_move(&PointerEvent::mouse(1, 180.0, 100.0));
        let after = c.viewport().pan();
        assert!((after.x - (before.x - 20.0)).abs() < 1e-3);
        assert!((after.y - (before.y - 50.0)).abs() < 1e-3);
    }

    #[test]
    fn test_swipe_settles_on_nearest_page() {
        let mut c = controller();
        c.add_page();
        c.add_page();
        c.set_paging_mode(PagingMode::Horizontal);
        c.set_active_page(0).expect("page 0");
        // Narrow screen: fitted to the active page.
        c.resize(400.0, 800.0);
        let zoom = c.viewport().zoom();
        assert!(zoom < 1.0);

        // Empty spot in the page gap.
        let (sx, sy) = screen(&c, 625.0, 400.0);
        c.pointer_down(&PointerEvent::touch(7, sx, sy)).expect("down");
        assert!(matches!(c.gesture(), Gesture::Swipe { .. }));
        c.pointer_move(&PointerEvent::touch(7, sx - 500.0 * zoom, sy));
        c.pointer_up(&PointerEvent::touch(7, sx - 500.0 * zoom, sy).at(1_000));
        assert!(c.is_animating());

        assert!(c.tick(1_150));
        assert!(!c.tick(1_300));
        assert_eq!(c.active_page(), 1);
        let center = c.viewport().to_scene(Point::new(200.0, 400.0));
        let page_center = c.geometry().page_center(1, PagingMode::Horizontal);
        assert!((center.x - page_center).abs() < 1e-2);
    }

    #[test]
    fn test_touch_on_empty_canvas_when_zoomed_pans() {
        let mut c = controller();
        c.resize(1000.0, 1000.0);
        c.on_wheel(&WheelEvent::new(500.0, 500.0, 0.0, -400.0).with_modifiers(KeyModifiers::CTRL));
        assert!(c.viewport().zoom() > 1.1);
        let empty = c.viewport().to_screen(Point::new(-10.0, 10.0));
        c.pointer_down(&PointerEvent::touch(1, empty.x, empty.y)).expect("down");
        assert!(matches!(c.gesture(), Gesture::Pan { .. }));
    }

    #[test]
    fn test_click_on_page_activates_it() {
        let mut c = controller();
        c.add_page();
        c.set_active_page(0).expect("page 0");
        c.resize(2000.0, 4000.0);
        let (sx, sy) = screen(&c, 300.0, 1200.0);
        c.pointer_down(&PointerEvent::mouse(1, sx, sy)).expect("down");
        assert_eq!(c.active_page(), 1);
        let frames: Vec<bool> = c
            .scene()
            .elements()
            .filter(|e| e.role == ElementRole::PageFrame)
            .map(|e| e.visible)
            .collect();
        assert_eq!(frames, vec![false, true]);
    }

    #[test]
    fn test_mode_flip_preserves_page_relative_positions() {
        let mut c = controller();
        c.add_page();
        let id = c.add_shape(ShapeKind::Star, None);
        let before = c.scene().get(id).expect("star").top_left();
        assert!((before.y - (902.0 + 150.0)).abs() < 1e-3);

        c.set_paging_mode(PagingMode::Horizontal);
        let after = c.scene().get(id).expect("star").top_left();
        assert!((after.x - (655.0 + 150.0)).abs() < 1e-3);
        assert!((after.y - 150.0).abs() < 1e-3);
        let background = c.scene().page_background("page-2").expect("background");
        assert_eq!(background.top_left(), Point::new(655.0, 0.0));

        c.set_paging_mode(PagingMode::Vertical);
        assert_eq!(c.scene().get(id).expect("star").top_left(), before);
    }

    #[test]
    fn test_mode_flip_keeps_user_clips() {
        let mut c = controller();
        let id = c.add_shape(ShapeKind::Rect, None);
        let custom = ClipRegion {
            rect: Rect::new(1.0, 2.0, 3.0, 4.0),
            auto: false,
        };
        c.scene.get_mut(id).expect("shape").clip = Some(custom);
        c.set_paging_mode(PagingMode::Horizontal);
        assert_eq!(c.scene().get(id).expect("shape").clip, Some(custom));
    }

    /// Give an element a user clip equal to its current bounds.
    fn pin_clip(c: &mut CanvasController, id: ElementId) {
        let element = c.scene.get_mut(id).expect("element");
        element.clip = Some(ClipRegion {
            rect: element.bounds(),
            auto: false,
        });
    }

    fn assert_clip_follows(c: &CanvasController, id: ElementId) {
        let element = c.scene().get(id).expect("element");
        let clip = element.clip.expect("clip");
        let bounds = element.bounds();
        assert!(!clip.auto);
        assert!(
            (clip.rect.x - bounds.x).abs() < 1e-3
                && (clip.rect.y - bounds.y).abs() < 1e-3
                && (clip.rect.width - bounds.width).abs() < 1e-3
                && (clip.rect.height - bounds.height).abs() < 1e-3,
            "clip {:?} left behind by {:?}",
            clip.rect,
            bounds
        );
    }

    #[test]
    fn test_set_clip_and_reset_to_page_slot() {
        let mut c = controller();
        let id = c.add_shape(ShapeKind::Rect, None);
        let custom = Rect::new(150.0, 150.0, 10.0, 10.0);
        c.set_clip(id, Some(custom)).expect("clip");
        assert_eq!(
            c.scene().get(id).expect("shape").clip,
            Some(ClipRegion {
                rect: custom,
                auto: false
            })
        );

        c.set_clip(id, None).expect("reset");
        let clip = c.scene().get(id).expect("shape").clip.expect("auto clip");
        assert!(clip.auto);
        assert_eq!(clip.rect, c.page_rect(0));

        let background = c.scene().page_background("page-1").expect("bg").id;
        assert!(matches!(
            c.set_clip(background, Some(custom)),
            Err(CanvasError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_mode_flip_moves_user_clip_with_later_page() {
        let mut c = controller();
        c.add_page();
        let id = c.add_shape(ShapeKind::Rect, None);
        pin_clip(&mut c, id);

        c.set_paging_mode(PagingMode::Horizontal);
        let bounds = c.scene().get(id).expect("shape").bounds();
        assert_eq!(Point::new(bounds.x, bounds.y), Point::new(595.0 + 60.0 + 150.0, 150.0));
        assert_clip_follows(&c, id);

        c.set_paging_mode(PagingMode::Vertical);
        assert_clip_follows(&c, id);
    }

    #[test]
    fn test_delete_page_moves_user_clips_of_later_pages() {
        let mut c = controller();
        c.add_page();
        c.add_page();
        let id = c.add_shape(ShapeKind::Rect, None);
        pin_clip(&mut c, id);

        c.delete_page(0).expect("delete");
        let bounds = c.scene().get(id).expect("shape").bounds();
        assert_eq!(bounds.y, 902.0 + 150.0);
        assert_clip_follows(&c, id);
    }

    #[test]
    fn test_drag_moves_user_clip() {
        let mut c = controller();
        c.add_page();
        let id = c.add_shape(ShapeKind::Rect, None);
        pin_clip(&mut c, id);

        let center = c.scene().get(id).expect("shape").bounds();
        let (sx, sy) = screen(&c, center.center_x(), center.center_y());
        let zoom = c.viewport().zoom();
        c.pointer_down(&PointerEvent::mouse(1, sx, sy)).expect("down");
        let moved = PointerEvent::mouse(1, sx + 30.0 * zoom, sy + 12.0 * zoom)
            .with_modifiers(KeyModifiers::SHIFT);
        c.pointer_move(&moved);
        c.pointer_up(&moved);

        let bounds = c.scene().get(id).expect("shape").bounds();
        assert!((bounds.x - (center.x + 30.0)).abs() < 1e-2);
        assert_clip_follows(&c, id);
    }

    #[test]
    fn test_delete_page_relocates_later_pages() {
        let mut c = controller();
        c.add_page();
        c.add_page();
        let on_third = c.add_shape(ShapeKind::Rect, None);
        c.set_active_page(0).expect("page 0");
        c.add_shape(ShapeKind::Rect, None);

        let removed = c.delete_page(1).expect("delete");
        assert_eq!(removed.id, "page-2");
        assert_eq!(c.pages().len(), 2);
        let moved = c.scene().get(on_third).expect("shape");
        assert_eq!(moved.top_left(), Point::new(150.0, 902.0 + 150.0));
        assert_eq!(
            c.scene().page_background("page-3").expect("bg").top_left(),
            Point::new(0.0, 902.0)
        );
        assert_eq!(content(&c).len(), 2);
    }

    #[test]
    fn test_last_page_cannot_be_deleted() {
        let mut c = controller();
        assert!(matches!(c.delete_page(0), Err(CanvasError::LastPage)));
        assert!(matches!(c.delete_page(3), Err(CanvasError::PageNotFound(_))));
    }

    #[test]
    fn test_add_page_inherits_background() {
        let mut c = controller();
        c.set_page_background(0, "#123456").expect("background");
        let id = c.add_page();
        assert_eq!(id, "page-2");
        assert_eq!(c.pages()[1].background_color, "#123456");
        assert_eq!(c.active_page(), 1);
        let backgrounds = c
            .scene()
            .elements()
            .filter(|e| e.role == ElementRole::PageBackground)
            .count();
        assert_eq!(backgrounds, 2);
    }

    #[test]
    fn test_text_presets() {
        let mut c = controller();
        let id = c.add_text(TextPreset::Headline, None);
        let element = c.scene().get(id).expect("text");
        let ElementKind::Text(style) = &element.kind else {
            panic!("expected text");
        };
        assert_eq!(style.content, "New Headline");
        assert!((style.font_size - 72.0).abs() < f32::EPSILON);
        assert_eq!(style.font_family, "Bebas Neue");
        assert_eq!(element.top_left(), Point::new(100.0, 100.0));
        assert_eq!(c.selection(), Some(id));

        let body = c.add_text(TextPreset::Body, Some("Hello"));
        let ElementKind::Text(style) = &c.scene().get(body).expect("text").kind else {
            panic!("expected text");
        };
        assert_eq!(style.content, "Hello");
        assert_eq!(style.color, "#d4d4d4");
    }

    #[test]
    fn test_duplicate_offsets_and_selects_copy() {
        let mut c = controller();
        let id = c.add_shape(ShapeKind::Circle, Some("#ff0000"));
        let copy = c.duplicate_selected().expect("duplicate");
        assert_ne!(copy, id);
        assert_eq!(c.selection(), Some(copy));
        let original = c.scene().get(id).expect("original").top_left();
        let duplicated = c.scene().get(copy).expect("copy").top_left();
        assert_eq!(duplicated, Point::new(original.x + 20.0, original.y + 20.0));
        // Copy sits above the original and below the frames.
        let position = c.scene().position(copy).expect("position");
        assert_eq!(position, c.scene().len() - 2);
    }

    #[test]
    fn test_selection_ops_require_selection() {
        let mut c = controller();
        assert!(matches!(
            c.delete_selected(),
            Err(CanvasError::InvalidOperation(_))
        ));
        assert!(matches!(
            c.reorder_selected(ZOrder::Front),
            Err(CanvasError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_restyle_and_reorder() {
        let mut c = controller();
        let below = c.add_shape(ShapeKind::Rect, None);
        let text = c.add_text(TextPreset::Subhead, None);
        c.restyle_selected(&StyleUpdate {
            fill: Some("#000000".to_string()),
            font_size: Some(48.0),
            text_align: Some(TextAlign::Right),
            opacity: Some(2.0),
            ..StyleUpdate::default()
        })
        .expect("restyle");
        let element = c.scene().get(text).expect("text");
        let ElementKind::Text(style) = &element.kind else {
            panic!("expected text");
        };
        assert_eq!(style.color, "#000000");
        assert_eq!(style.text_align, TextAlign::Right);
        assert!((element.opacity - 1.0).abs() < f32::EPSILON);

        c.reorder_selected(ZOrder::Back).expect("reorder");
        assert!(c.scene().position(text) < c.scene().position(below));
    }

    #[test]
    fn test_resize_scales_group_members() {
        let mut c = controller();
        let factory = ElementFactory::default();
        let a = factory.shape(ShapeStyle::default(), Transform::at(100.0, 100.0, 50.0, 50.0));
        let b = factory.shape(ShapeStyle::default(), Transform::at(150.0, 150.0, 50.0, 50.0));
        let group = c.insert_on_page(factory.group(vec![a, b]), 0);
        c.resize_element(group, 200.0, 200.0).expect("resize");

        let element = c.scene().get(group).expect("group");
        assert_eq!(element.bounds(), Rect::new(100.0, 100.0, 200.0, 200.0));
        let ElementKind::Group { children } = &element.kind else {
            panic!("expected group");
        };
        assert_eq!(children[1].bounds(), Rect::new(200.0, 200.0, 100.0, 100.0));
        assert!(c.resize_element(group, 0.0, 10.0).is_err());
    }

    #[tokio::test]
    async fn test_load_template_replaces_document() {
        let mut c = controller();
        c.add_shape(ShapeKind::Rect, None);
        let document = TemplateDocument::from_json(
            r##"{
                "pages": [
                    { "id": "a", "background": "#111111", "children": [
                        { "type": "text", "props": { "content": "One" } }
                    ]},
                    { "id": "b", "children": [
                        { "type": "shape", "props": { "fill": "#ff0000" }, "height": 40 }
                    ]}
                ]
            }"##,
        )
        .expect("parse");
        c.load_template(&document).await.expect("load");

        assert_eq!(c.pages().len(), 2);
        assert_eq!(c.pages()[0].background_color, "#111111");
        assert_eq!(content(&c).len(), 2);
        let roles: Vec<ElementRole> = c.scene().elements().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![
                ElementRole::PageBackground,
                ElementRole::PageBackground,
                ElementRole::Content,
                ElementRole::Content,
                ElementRole::PageFrame,
                ElementRole::PageFrame,
            ]
        );
        assert!(content(&c).iter().all(|e| e.clip.is_some_and(|clip| clip.auto)));
    }

    #[tokio::test]
    async fn test_add_image_on_explicit_page() {
        let mut c = controller();
        c.add_page();
        let id = c.add_image("photo.png", 0).await.expect("image");
        let element = c.scene().get(id).expect("image");
        assert_eq!(element.page_id.as_deref(), Some("page-1"));
        assert_eq!(element.bounds(), Rect::new(200.0, 200.0, 200.0, 200.0));
        assert_eq!(c.active_page(), 0);

        assert!(matches!(
            c.add_image("photo.png", 5).await,
            Err(CanvasError::PageNotFound(_))
        ));
        assert!(matches!(c.add_image("", 0).await, Err(CanvasError::Image(_))));
    }

    struct FakeRasterizer {
        fail_on: Option<Rect>,
    }

    impl RegionRasterizer for FakeRasterizer {
        type Error = String;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        fn rasterize_region(
            &self,
            scene: &Scene,
            region: Rect,
            multiplier: f32,
            format: RasterFormat,
        ) -> Result<RasterImage, String> {
            if self.fail_on == Some(region) {
                return Err("boom".to_string());
            }
            let frames_visible = scene
                .elements()
                .any(|e| e.role == ElementRole::PageFrame && e.visible);
            assert!(!frames_visible, "frames must be hidden during export");
            Ok(RasterImage {
                page_index: 0,
                width: (region.width * multiplier) as u32,
                height: (region.height * multiplier) as u32,
                format,
                data: vec![1, 2, 3],
            })
        }

        fn compose_document(
            &self,
            pages: &[RasterImage],
            _page_size: (f32, f32),
        ) -> Result<Vec<u8>, String> {
            Ok(vec![0; pages.len()])
        }
    }

    #[test]
    fn test_export_skips_invalid_pages() {
        let mut c = controller();
        c.add_page();
        let rasterizer = FakeRasterizer { fail_on: None };
        let output = c
            .export(&ExportRequest::raster(vec![1, 9, 0]), &rasterizer)
            .expect("export");
        let ExportOutput::Images(images) = output else {
            panic!("expected images");
        };
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].page_index, 1);
        assert_eq!((images[0].width, images[0].height), (2380, 3368));

        let document = c
            .export(&ExportRequest::document(vec![0, 1]), &rasterizer)
            .expect("document");
        assert_eq!(document, ExportOutput::Document(vec![0, 0]));
    }

    #[test]
    fn test_export_failure_restores_state() {
        let mut c = controller();
        c.add_page();
        c.resize(300.0, 300.0);
        let selected = c.add_shape(ShapeKind::Rect, None);
        c.on_wheel(&WheelEvent::new(10.0, 10.0, 0.0, 200.0).with_modifiers(KeyModifiers::CTRL));
        let viewport = *c.viewport();

        let rasterizer = FakeRasterizer {
            fail_on: Some(c.geometry().page_rect(1, PagingMode::Vertical)),
        };
        let result = c.export(&ExportRequest::raster(vec![0, 1]), &rasterizer);
        assert!(matches!(result, Err(CanvasError::Export(_))));

        assert_eq!(*c.viewport(), viewport);
        assert_eq!(c.selection(), Some(selected));
        let visible_frames = c
            .scene()
            .elements()
            .filter(|e| e.role == ElementRole::PageFrame && e.visible)
            .count();
        assert_eq!(visible_frames, 1);
    }

    #[test]
    fn test_export_rejected_during_gesture() {
        let mut c = controller();
        let down = PointerEvent::mouse(1, 5.0, 5.0).with_modifiers(KeyModifiers::ALT);
        c.pointer_down(&down).expect("down");
        let result = c.export(
            &ExportRequest::raster(vec![0]),
            &FakeRasterizer { fail_on: None },
        );
        assert!(matches!(result, Err(CanvasError::StateConflict(_))));
    }
}
