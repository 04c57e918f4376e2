use std::collections::HashMap;

use super::source::ImageSource;
use crate::types::canvas::{ImageId, ImagePatch, ImageSnapshot, ImageStyle, LayerId, Position};

/// An image instance on the canvas.
#[derive(Debug, Clone)]
pub struct PlacedImage {
    pub id: ImageId,
    pub name: String,
    pub layer_id: LayerId,
    pub src: ImageSource,
    pub pos: Position,
    pub style: ImageStyle,
}

impl PlacedImage {
    pub fn snapshot(&self) -> ImageSnapshot {
        ImageSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            layer_id: self.layer_id.clone(),
            pos: self.pos,
            style: self.style.clone(),
        }
    }

    pub fn from_snapshot(snapshot: ImageSnapshot, src: ImageSource) -> Self {
        Self {
            id: snapshot.id,
            name: snapshot.name,
            layer_id: snapshot.layer_id,
            src,
            pos: snapshot.pos,
            style: snapshot.style,
        }
    }

    /// Field-level update; nested style fields are merged one by one.
    pub fn apply(&mut self, patch: &ImagePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(pos) = patch.pos {
            self.pos = pos;
        }
        if let Some(style) = &patch.style {
            style.apply(&mut self.style);
        }
    }
}

/// Placed images keyed by id, plus the selection.
///
/// Holds no ordering of its own: z-order lives in the owning layer's id
/// sequence.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: HashMap<ImageId, PlacedImage>,
    selected: Option<ImageId>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, id: &ImageId) -> Option<&PlacedImage> {
        self.images.get(id)
    }

    pub fn get_mut(&mut self, id: &ImageId) -> Option<&mut PlacedImage> {
        self.images.get_mut(id)
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.images.contains_key(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &PlacedImage> {
        self.images.values()
    }

    pub fn insert(&mut self, image: PlacedImage) {
        self.images.insert(image.id.clone(), image);
    }

    pub fn update(&mut self, id: &ImageId, patch: &ImagePatch) -> bool {
        let Some(image) = self.images.get_mut(id) else {
            return false;
        };
        image.apply(patch);
        true
    }

    /// Remove an image, dropping its bitmap handle. Clears the selection if
    /// it pointed at this image.
    pub fn remove(&mut self, id: &ImageId) -> Option<PlacedImage> {
        let removed = self.images.remove(id)?;
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        Some(removed)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.images.len();
        self.images.clear();
        self.selected = None;
        count
    }

    pub fn selected_id(&self) -> Option<&ImageId> {
        self.selected.as_ref()
    }

    pub fn selected_image(&self) -> Option<&PlacedImage> {
        self.selected.as_ref().and_then(|id| self.images.get(id))
    }

    pub fn select(&mut self, id: &ImageId) -> bool {
        if !self.images.contains_key(id) {
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}
