use serde::Serialize;
use tracing::{debug, warn};

use super::images::PlacedImage;
use crate::types::canvas::{Direction, ImageId, LayerId, ZOrder};

/// Id and name of the layer every canvas starts with.
pub const DEFAULT_LAYER_ID: &str = "layer_1";
pub const DEFAULT_LAYER_NAME: &str = "Main";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub opacity: f64,
    /// Z-order of the layer's images, bottom first.
    pub image_ids: Vec<ImageId>,
}

impl Layer {
    fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            locked: false,
            opacity: 1.0,
            image_ids: Vec::new(),
        }
    }

    pub fn contains(&self, image_id: &ImageId) -> bool {
        self.image_ids.contains(image_id)
    }
}

/// Ordered layers plus the selected one.
///
/// Each layer's `image_ids` is the only record of image z-order; there is no
/// second global ordering to keep in sync. Never empty.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
    selected: Option<LayerId>,
}

impl Default for LayerRegistry {
    fn default() -> Self {
        let id = LayerId::from(DEFAULT_LAYER_ID);
        Self {
            layers: vec![Layer::new(id.clone(), DEFAULT_LAYER_NAME)],
            selected: Some(id),
        }
    }
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    fn get_mut(&mut self, id: &LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| &l.id == id)
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.get(id).is_some()
    }

    pub fn selected_id(&self) -> Option<&LayerId> {
        self.selected.as_ref()
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn select_layer(&mut self, id: &LayerId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    /// Append a layer named `Layer {n+1}` and select it.
    pub fn add_layer(&mut self) -> LayerId {
        let id = LayerId::generate();
        let name = format!("Layer {}", self.layers.len() + 1);
        debug!(layer_id = %id, %name, "layer added");
        self.layers.push(Layer::new(id.clone(), name));
        self.selected = Some(id.clone());
        id
    }

    /// Remove a layer. Returns `None` when it is the last layer or unknown.
    /// A deleted selected layer hands selection to the first remaining one.
    pub fn delete_layer(&mut self, id: &LayerId) -> Option<Layer> {
        if self.layers.len() <= 1 {
            warn!(layer_id = %id, "Cannot delete the last layer");
            return None;
        }
        let idx = self.layers.iter().position(|l| &l.id == id)?;
        let removed = self.layers.remove(idx);

        if self.selected.as_ref() == Some(id) {
            self.selected = self.layers.first().map(|l| l.id.clone());
        }
        Some(removed)
    }

    pub fn rename_layer(&mut self, id: &LayerId, name: impl Into<String>) -> bool {
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        layer.name = name.into();
        true
    }

    pub fn toggle_visibility(&mut self, id: &LayerId) -> bool {
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        layer.visible = !layer.visible;
        true
    }

    pub fn toggle_lock(&mut self, id: &LayerId) -> bool {
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        layer.locked = !layer.locked;
        true
    }

    /// Stored opacity is always within [0, 1]; NaN is treated as 0.
    pub fn set_layer_opacity(&mut self, x: f64, id: &LayerId) -> bool {
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        layer.opacity = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        true
    }

    pub fn is_layer_locked(&self, id: &LayerId) -> bool {
        self.get(id).map(|l| l.locked).unwrap_or(false)
    }

    pub fn is_layer_visible(&self, id: &LayerId) -> bool {
        self.get(id).map(|l| l.visible).unwrap_or(true)
    }

    /// Swap with the neighbour; `Up` moves toward index 0. No-op at the ends.
    pub fn move_layer(&mut self, id: &LayerId, direction: Direction) -> bool {
        let Some(idx) = self.layers.iter().position(|l| &l.id == id) else {
            return false;
        };
        let target = match direction {
            Direction::Up => idx.checked_sub(1),
            Direction::Down => Some(idx + 1).filter(|&i| i < self.layers.len()),
        };
        let Some(target) = target else {
            return false;
        };
        self.layers.swap(idx, target);
        true
    }

    /// Append to `layer_id` (default: selected layer). An id already in the
    /// target sequence is left where it is. Returns the layer used.
    pub fn add_image_to_layer(
        &mut self,
        image_id: &ImageId,
        layer_id: Option<&LayerId>,
    ) -> Option<LayerId> {
        let target = layer_id.or(self.selected.as_ref())?.clone();
        let layer = self.get_mut(&target)?;
        if !layer.contains(image_id) {
            layer.image_ids.push(image_id.clone());
        }
        Some(target)
    }

    /// Drop the id from whichever layer holds it.
    pub fn remove_image_from_layer(&mut self, image_id: &ImageId) -> Option<LayerId> {
        let mut owner = None;
        for layer in self.layers.iter_mut() {
            let before = layer.image_ids.len();
            layer.image_ids.retain(|id| id != image_id);
            if layer.image_ids.len() != before {
                owner = Some(layer.id.clone());
            }
        }
        owner
    }

    /// Move the id from its current layer to the end of `target`.
    /// No-op when the id is not in any layer or the target does not exist.
    pub fn move_image_to_layer(&mut self, image_id: &ImageId, target: &LayerId) -> bool {
        if !self.contains(target) || self.layer_of(image_id).is_none() {
            return false;
        }
        self.remove_image_from_layer(image_id);
        self.add_image_to_layer(image_id, Some(target)).is_some()
    }

    pub fn layer_of(&self, image_id: &ImageId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.contains(image_id))
    }

    /// Members of `layer_id` in the iteration order of `all_images`.
    pub fn get_layer_images<'a>(
        &self,
        layer_id: &LayerId,
        all_images: impl IntoIterator<Item = &'a PlacedImage>,
    ) -> Vec<&'a PlacedImage> {
        let Some(layer) = self.get(layer_id) else {
            return Vec::new();
        };
        all_images
            .into_iter()
            .filter(|img| layer.contains(&img.id))
            .collect()
    }

    /// Empty a layer's sequence, returning the ids it held.
    pub fn clear_layer(&mut self, id: &LayerId) -> Vec<ImageId> {
        self.get_mut(id)
            .map(|l| std::mem::take(&mut l.image_ids))
            .unwrap_or_default()
    }

    pub fn clear_all(&mut self) -> Vec<ImageId> {
        self.layers
            .iter_mut()
            .flat_map(|l| std::mem::take(&mut l.image_ids))
            .collect()
    }

    /// Reorder an image inside its own layer. `Up` swaps with the next-higher
    /// neighbour. Other layers are untouched.
    pub fn reorder(&mut self, image_id: &ImageId, order: ZOrder) -> bool {
        let Some(layer) = self.layers.iter_mut().find(|l| l.contains(image_id)) else {
            return false;
        };
        let ids = &mut layer.image_ids;
        let Some(idx) = ids.iter().position(|id| id == image_id) else {
            return false;
        };
        let last = ids.len() - 1;
        match order {
            ZOrder::Front => {
                if idx == last {
                    return false;
                }
                let id = ids.remove(idx);
                ids.push(id);
            }
            ZOrder::Back => {
                if idx == 0 {
                    return false;
                }
                let id = ids.remove(idx);
                ids.insert(0, id);
            }
            ZOrder::Up => {
                if idx == last {
                    return false;
                }
                ids.swap(idx, idx + 1);
            }
            ZOrder::Down => {
                if idx == 0 {
                    return false;
                }
                ids.swap(idx, idx - 1);
            }
        }
        true
    }

    /// Every image id, bottom layer first, each layer bottom to top.
    pub fn render_order(&self) -> impl Iterator<Item = &ImageId> {
        self.layers.iter().flat_map(|l| l.image_ids.iter())
    }
}
