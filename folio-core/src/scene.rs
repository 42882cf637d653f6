//! Scene graph for managing positioned elements.
//!
//! Elements are kept in stacking order (first drawn first) and indexed by
//! id and by owning page.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::{ElementId, ElementRole, Point, PositionedElement};
use crate::error::{CanvasError, CanvasResult};

/// An ordered collection of positioned elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<PositionedElement>", into = "Vec<PositionedElement>")]
pub struct Scene {
    /// Elements in stacking order.
    elements: Vec<PositionedElement>,
    /// Position of each element in `elements`.
    index: HashMap<ElementId, usize>,
    /// Element ids per owning page.
    by_page: HashMap<String, Vec<ElementId>>,
}

impl From<Vec<PositionedElement>> for Scene {
    fn from(elements: Vec<PositionedElement>) -> Self {
        let mut scene = Self {
            elements,
            ..Self::default()
        };
        scene.reindex();
        scene
    }
}

impl From<Scene> for Vec<PositionedElement> {
    fn from(scene: Scene) -> Self {
        scene.elements
    }
}

impl Scene {
    /// Create an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn reindex(&mut self) {
        self.index.clear();
        self.by_page.clear();
        for (i, element) in self.elements.iter().enumerate() {
            self.index.insert(element.id, i);
            if let Some(page) = &element.page_id {
                self.by_page.entry(page.clone()).or_default().push(element.id);
            }
        }
    }

    /// Add an element on top of the stack.
    pub fn add(&mut self, element: PositionedElement) -> ElementId {
        let id = element.id;
        if let Some(page) = &element.page_id {
            self.by_page.entry(page.clone()).or_default().push(id);
        }
        self.index.insert(id, self.elements.len());
        self.elements.push(element);
        id
    }

    /// Add an element above all content but below the page frames.
    pub fn add_content(&mut self, element: PositionedElement) -> ElementId {
        let ceiling = self.content_ceiling();
        self.insert(ceiling, element)
    }

    /// Insert an element at a stacking position (clamped to the stack size).
    pub fn insert(&mut self, position: usize, element: PositionedElement) -> ElementId {
        let id = element.id;
        let position = position.min(self.elements.len());
        self.elements.insert(position, element);
        self.reindex();
        id
    }

    /// Remove an element from the scene.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not found.
    pub fn remove(&mut self, id: &ElementId) -> CanvasResult<PositionedElement> {
        let position = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        let element = self.elements.remove(position);
        self.reindex();
        Ok(element)
    }

    /// Remove every element owned by a page, returning them in stacking order.
    pub fn remove_page_elements(&mut self, page_id: &str) -> Vec<PositionedElement> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.elements)
            .into_iter()
            .partition(|e| e.page_id.as_deref() == Some(page_id));
        self.elements = kept;
        self.reindex();
        removed
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.index.clear();
        self.by_page.clear();
    }

    /// Get an element by ID.
    #[must_use]
    pub fn get(&self, id: ElementId) -> Option<&PositionedElement> {
        self.index.get(&id).map(|&i| &self.elements[i])
    }

    /// Get a mutable reference to an element by ID.
    ///
    /// Use [`set_page`](Self::set_page) to change the owning page so the
    /// page index stays consistent.
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut PositionedElement> {
        self.index.get(&id).map(|&i| &mut self.elements[i])
    }

    /// Stacking position of an element.
    #[must_use]
    pub fn position(&self, id: ElementId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// All elements in stacking order.
    pub fn elements(&self) -> impl Iterator<Item = &PositionedElement> {
        self.elements.iter()
    }

    /// Mutable access to all elements in stacking order.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut PositionedElement> {
        self.elements.iter_mut()
    }

    /// Elements owned by a page, in stacking order.
    pub fn elements_on_page<'a>(
        &'a self,
        page_id: &'a str,
    ) -> impl Iterator<Item = &'a PositionedElement> + 'a {
        self.elements
            .iter()
            .filter(move |e| e.page_id.as_deref() == Some(page_id))
    }

    /// Ids of the elements owned by a page.
    #[must_use]
    pub fn page_element_ids(&self, page_id: &str) -> &[ElementId] {
        self.by_page.get(page_id).map_or(&[][..], Vec::as_slice)
    }

    /// The background element of a page, if present.
    #[must_use]
    pub fn page_background<'a>(&'a self, page_id: &'a str) -> Option<&'a PositionedElement> {
        self.elements_on_page(page_id)
            .find(|e| e.role == ElementRole::PageBackground)
    }

    /// Change the owning page of an element.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not found.
    pub fn set_page(&mut self, id: ElementId, page_id: Option<String>) -> CanvasResult<()> {
        let element = self
            .get_mut(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        let previous = std::mem::replace(&mut element.page_id, page_id.clone());
        if previous == page_id {
            return Ok(());
        }
        if let Some(previous) = previous {
            if let Some(ids) = self.by_page.get_mut(&previous) {
                ids.retain(|eid| *eid != id);
            }
        }
        if let Some(page) = page_id {
            self.by_page.entry(page).or_default().push(id);
        }
        Ok(())
    }

    /// Move every element owned by a page.
    pub fn translate_page(&mut self, page_id: &str, dx: f32, dy: f32) {
        for element in &mut self.elements {
            if element.page_id.as_deref() == Some(page_id) {
                element.translate(dx, dy);
            }
        }
    }

    /// Topmost visible, selectable element under a scene point.
    #[must_use]
    pub fn element_at(&self, point: Point) -> Option<ElementId> {
        self.elements
            .iter()
            .rev()
            .find(|e| e.visible && e.selectable && e.contains_point(point))
            .map(|e| e.id)
    }

    fn move_to(&mut self, id: ElementId, target: usize) -> CanvasResult<()> {
        let from = self
            .position(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        let element = self.elements.remove(from);
        let target = target.min(self.elements.len());
        self.elements.insert(target, element);
        self.reindex();
        Ok(())
    }

    /// First position above the page backgrounds.
    fn content_floor(&self) -> usize {
        self.elements
            .iter()
            .take_while(|e| e.role == ElementRole::PageBackground)
            .count()
    }

    /// Position just below the trailing page frames.
    fn content_ceiling(&self) -> usize {
        let frames = self
            .elements
            .iter()
            .rev()
            .take_while(|e| e.role == ElementRole::PageFrame)
            .count();
        self.elements.len() - frames
    }

    /// Raise an element above all other content.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not found.
    pub fn bring_to_front(&mut self, id: ElementId) -> CanvasResult<()> {
        let ceiling = self.content_ceiling();
        self.move_to(id, ceiling.saturating_sub(1))
    }

    /// Lower an element below all other content.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not found.
    pub fn send_to_back(&mut self, id: ElementId) -> CanvasResult<()> {
        let floor = self.content_floor();
        self.move_to(id, floor)
    }

    /// Raise an element one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not found.
    pub fn bring_forward(&mut self, id: ElementId) -> CanvasResult<()> {
        let from = self
            .position(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        let ceiling = self.content_ceiling();
        self.move_to(id, (from + 1).min(ceiling.saturating_sub(1)))
    }

    /// Lower an element one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not found.
    pub fn send_backward(&mut self, id: ElementId) -> CanvasResult<()> {
        let from = self
            .position(id)
            .ok_or_else(|| CanvasError::ElementNotFound(id.to_string()))?;
        let floor = self.content_floor();
        self.move_to(id, from.saturating_sub(1).max(floor))
    }

    /// Get the number of elements in the scene.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the scene is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Serialize the scene to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        Ok(serde_json::to_string_pretty(&self.elements)?)
    }

    /// Deserialize a scene from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        let elements: Vec<PositionedElement> = serde_json::from_str(json)?;
        Ok(Self::from(elements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementFactory, Rect, ShapeStyle, TextStyle, Transform};

    fn shape(x: f32, y: f32, page: &str) -> PositionedElement {
        ElementFactory::default()
            .shape(ShapeStyle::default(), Transform::at(x, y, 50.0, 50.0))
            .with_page(page)
    }

    #[test]
    fn test_scene_add_remove() {
        let mut scene = Scene::new();
        let a = scene.add(shape(0.0, 0.0, "p1"));
        let b = scene.add(shape(10.0, 10.0, "p1"));
        assert_eq!(scene.len(), 2);

        let removed = scene.remove(&a).expect("remove");
        assert_eq!(removed.id, a);
        assert_eq!(scene.position(b), Some(0));
        assert!(scene.remove(&a).is_err());
        assert_eq!(scene.page_element_ids("p1"), &[b]);
    }

    #[test]
    fn test_element_at_prefers_topmost() {
        let mut scene = Scene::new();
        let bottom = scene.add(shape(0.0, 0.0, "p1"));
        let top = scene.add(shape(25.0, 25.0, "p1"));
        assert_eq!(scene.element_at(Point::new(30.0, 30.0)), Some(top));
        assert_eq!(scene.element_at(Point::new(5.0, 5.0)), Some(bottom));
        assert_eq!(scene.element_at(Point::new(500.0, 5.0)), None);

        scene.get_mut(top).expect("top").visible = false;
        assert_eq!(scene.element_at(Point::new(30.0, 30.0)), Some(bottom));
    }

    #[test]
    fn test_backgrounds_are_not_hit() {
        let mut scene = Scene::new();
        let factory = ElementFactory::default();
        scene.add(factory.page_background("p1", Rect::new(0.0, 0.0, 595.0, 842.0), "#fff"));
        assert_eq!(scene.element_at(Point::new(10.0, 10.0)), None);
    }

    #[test]
    fn test_set_page_updates_index() {
        let mut scene = Scene::new();
        let id = scene.add(shape(0.0, 0.0, "p1"));
        scene.set_page(id, Some("p2".to_string())).expect("set page");
        assert!(scene.page_element_ids("p1").is_empty());
        assert_eq!(scene.page_element_ids("p2"), &[id]);
        assert_eq!(scene.elements_on_page("p2").count(), 1);
    }

    #[test]
    fn test_page_background_lookup() {
        let factory = ElementFactory::default();
        let mut scene = Scene::new();
        scene.add(shape(0.0, 0.0, "p2"));
        let slot = Rect::new(0.0, 902.0, 595.0, 842.0);
        let bg = scene.add(factory.page_background("p2", slot, "#fff"));
        let page_id = String::from("p2");
        let found = scene.page_background(&page_id).map(|e| e.id);
        drop(page_id);
        assert_eq!(found, Some(bg));
        assert!(scene.page_background("p1").is_none());
    }

    #[test]
    fn test_remove_page_elements() {
        let mut scene = Scene::new();
        scene.add(shape(0.0, 0.0, "p1"));
        let keep = scene.add(shape(0.0, 0.0, "p2"));
        scene.add(shape(0.0, 0.0, "p1"));
        let removed = scene.remove_page_elements("p1");
        assert_eq!(removed.len(), 2);
        assert_eq!(scene.len(), 1);
        assert_eq!(scene.position(keep), Some(0));
    }

    #[test]
    fn test_z_order_respects_page_chrome() {
        let factory = ElementFactory::default();
        let page = Rect::new(0.0, 0.0, 595.0, 842.0);
        let mut scene = Scene::new();
        scene.add(factory.page_background("p1", page, "#fff"));
        let a = scene.add(shape(0.0, 0.0, "p1"));
        let b = scene.add(shape(0.0, 0.0, "p1"));
        scene.add(factory.page_frame("p1", page));

        scene.send_to_back(b).expect("send to back");
        assert_eq!(scene.position(b), Some(1));
        scene.bring_to_front(b).expect("bring to front");
        assert_eq!(scene.position(b), Some(2));
        scene.send_backward(b).expect("send backward");
        assert_eq!(scene.position(b), Some(1));
        assert_eq!(scene.position(a), Some(2));
        scene.bring_forward(b).expect("bring forward");
        assert_eq!(scene.position(b), Some(2));

        let c = scene.add_content(shape(0.0, 0.0, "p1"));
        assert_eq!(scene.position(c), Some(3));
        assert_eq!(scene.len(), 5);
    }

    #[test]
    fn test_translate_page_moves_only_that_page() {
        let mut scene = Scene::new();
        let a = scene.add(shape(0.0, 0.0, "p1"));
        let b = scene.add(shape(0.0, 0.0, "p2"));
        scene.translate_page("p1", 10.0, 20.0);
        assert_eq!(scene.get(a).expect("a").top_left(), Point::new(10.0, 20.0));
        assert_eq!(scene.get(b).expect("b").top_left(), Point::new(0.0, 0.0));
    }

    #[test]
    fn test_json_roundtrip_rebuilds_index() {
        let mut scene = Scene::new();
        let text = ElementFactory::default()
            .text(TextStyle::default(), Transform::default())
            .with_page("p1");
        let id = scene.add(text);
        let json = scene.to_json().expect("serialize");
        let back = Scene::from_json(&json).expect("deserialize");
        assert_eq!(back.len(), 1);
        assert!(back.get(id).is_some());
        assert_eq!(back.page_element_ids("p1"), &[id]);
    }
}
