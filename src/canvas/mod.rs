//! Editor state: layers, placed images, selection, and the render plan.
//!
//! Layout:
//! - `layers.rs`: ordered layers owning per-layer image z-order
//! - `images.rs`: placed images keyed by id, plus selection
//! - `source.rs`: decoded, shared image bitmaps
//! - `export.rs`: rasterization of the render plan to PNG
//! - `command.rs`: the edit command set applied by the canvas actor

pub mod command;
pub mod export;
pub mod images;
pub mod layers;
pub mod source;

pub use command::{CanvasEdit, EditOutcome, KeyOutcome};
pub use images::{ImageRegistry, PlacedImage};
pub use layers::{Layer, LayerRegistry};
pub use source::ImageSource;

use kurbo::{Point, Rect};
use serde::Serialize;
use tracing::debug;

use crate::error::CollageError;
use crate::types::canvas::{
    CanvasSize, Direction, ImageId, ImagePatch, ImageSnapshot, ImageStyle, KeyPress, LayerId,
    LayerPatch, NewImage, Position, Transform, ZOrder,
};
use export::{Fill, RenderItem, RenderLayer, RenderPlan, image_transform, parse_color};

/// Offset applied to duplicates and to successive uploads of one batch.
pub const CASCADE_OFFSET: f64 = 20.0;
/// Where the first image of an upload batch lands.
pub const DEFAULT_DROP_POSITION: Position = Position::new(100.0, 100.0);

/// Record of image mutations since the last drain, consumed by the
/// persistence write-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageChange {
    /// New image: store the full record (bitmap included).
    Created(ImageId),
    /// Placement, style or layer changed: the snapshot is enough.
    Updated(ImageId),
    Removed(ImageId),
}

/// Composition root: layer registry + image registry.
#[derive(Debug)]
pub struct Canvas {
    size: CanvasSize,
    layers: LayerRegistry,
    images: ImageRegistry,
    changes: Vec<ImageChange>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(CanvasSize::default())
    }
}

impl Canvas {
    pub fn new(size: CanvasSize) -> Self {
        Self {
            size,
            layers: LayerRegistry::new(),
            images: ImageRegistry::new(),
            changes: Vec::new(),
        }
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn set_size(&mut self, size: CanvasSize) {
        self.size = size;
    }

    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }

    pub fn image(&self, id: &ImageId) -> Option<&PlacedImage> {
        self.images.get(id)
    }

    pub fn take_changes(&mut self) -> Vec<ImageChange> {
        std::mem::take(&mut self.changes)
    }

    /// Put changes that could not be written back in front of the queue.
    pub fn requeue_changes(&mut self, mut pending: Vec<ImageChange>) {
        pending.append(&mut self.changes);
        self.changes = pending;
    }

    /// Queue a rewrite of an image's stored record.
    pub fn touch_image(&mut self, id: &ImageId) -> bool {
        if !self.images.contains(id) {
            return false;
        }
        self.changes.push(ImageChange::Updated(id.clone()));
        true
    }

    /// Every member of the layer moved within the sequence.
    fn touch_layer(&mut self, layer_id: &LayerId) {
        if let Some(layer) = self.layers.get(layer_id) {
            self.changes
                .extend(layer.image_ids.iter().cloned().map(ImageChange::Updated));
        }
    }

    /// Position of an image inside its layer's sequence, bottom first.
    pub fn z_index(&self, id: &ImageId) -> Option<usize> {
        self.layers
            .layer_of(id)?
            .image_ids
            .iter()
            .position(|i| i == id)
    }

    // ---- layers -------------------------------------------------------

    pub fn add_layer(&mut self) -> LayerId {
        self.layers.add_layer()
    }

    /// Delete a layer together with the images it holds.
    /// Returns `false` for the last layer or an unknown id.
    pub fn delete_layer(&mut self, id: &LayerId) -> bool {
        let Some(layer) = self.layers.delete_layer(id) else {
            return false;
        };
        for image_id in layer.image_ids {
            if self.images.remove(&image_id).is_some() {
                self.changes.push(ImageChange::Removed(image_id));
            }
        }
        true
    }

    /// Bring a layer to the requested state. Visibility and lock are only
    /// toggled when they differ from the current value, so a repeated patch
    /// changes nothing.
    pub fn update_layer(&mut self, id: &LayerId, patch: &LayerPatch) -> bool {
        let Some((visible, locked)) = self.layers.get(id).map(|l| (l.visible, l.locked)) else {
            return false;
        };
        let mut changed = false;
        if let Some(name) = &patch.name {
            changed |= self.layers.rename_layer(id, name.as_str());
        }
        if patch.visible.is_some_and(|v| v != visible) {
            changed |= self.toggle_visibility(id);
        }
        if patch.locked.is_some_and(|l| l != locked) {
            changed |= self.toggle_lock(id);
        }
        if let Some(opacity) = patch.opacity {
            changed |= self.layers.set_layer_opacity(opacity, id);
        }
        changed
    }

    pub fn toggle_visibility(&mut self, id: &LayerId) -> bool {
        self.layers.toggle_visibility(id)
    }

    pub fn toggle_lock(&mut self, id: &LayerId) -> bool {
        self.layers.toggle_lock(id)
    }

    pub fn move_layer(&mut self, id: &LayerId, direction: Direction) -> bool {
        self.layers.move_layer(id, direction)
    }

    pub fn select_layer(&mut self, id: &LayerId) -> bool {
        self.layers.select_layer(id)
    }

    // ---- image CRUD ---------------------------------------------------

    /// Place a new image on `data.layer_id` (default: selected layer).
    pub fn add_image(&mut self, data: NewImage, src: ImageSource) -> Result<ImageId, CollageError> {
        let layer_id = self.resolve_layer(data.layer_id)?;
        let mut style = ImageStyle::default();
        if let Some(patch) = &data.style {
            patch.apply(&mut style);
        }

        let id = ImageId::generate();
        self.images.insert(PlacedImage {
            id: id.clone(),
            name: data.name,
            layer_id: layer_id.clone(),
            src,
            pos: data.pos,
            style,
        });
        self.layers.add_image_to_layer(&id, Some(&layer_id));
        self.changes.push(ImageChange::Created(id.clone()));
        debug!(image_id = %id, layer_id = %layer_id, "image placed");
        Ok(id)
    }

    /// Place a batch of files, cascading each one by +20/+20 from `start`.
    pub fn add_images_from_files(
        &mut self,
        files: Vec<(String, ImageSource)>,
        layer_id: Option<LayerId>,
        start: Position,
    ) -> Result<Vec<ImageId>, CollageError> {
        let layer_id = self.resolve_layer(layer_id)?;
        files
            .into_iter()
            .enumerate()
            .map(|(i, (name, src))| {
                let step = CASCADE_OFFSET * i as f64;
                self.add_image(
                    NewImage {
                        name,
                        layer_id: Some(layer_id.clone()),
                        pos: start.offset(step, step),
                        style: None,
                    },
                    src,
                )
            })
            .collect()
    }

    /// Put back an image loaded from the durable store under its own id.
    /// Unknown layers fall back to the selected layer.
    pub fn restore_image(&mut self, mut snapshot: ImageSnapshot, src: ImageSource) -> bool {
        if self.images.contains(&snapshot.id) {
            return false;
        }
        if !self.layers.contains(&snapshot.layer_id) {
            let Some(selected) = self.layers.selected_id().cloned() else {
                return false;
            };
            snapshot.layer_id = selected;
            self.changes.push(ImageChange::Updated(snapshot.id.clone()));
        }
        let image = PlacedImage::from_snapshot(snapshot, src);
        self.layers
            .add_image_to_layer(&image.id, Some(&image.layer_id));
        self.images.insert(image);
        true
    }

    pub fn update_image(&mut self, id: &ImageId, patch: &ImagePatch) -> bool {
        if !self.images.update(id, patch) {
            return false;
        }
        self.changes.push(ImageChange::Updated(id.clone()));
        true
    }

    pub fn update_selected_image(&mut self, patch: &ImagePatch) -> bool {
        let Some(id) = self.images.selected_id().cloned() else {
            return false;
        };
        self.update_image(&id, patch)
    }

    /// Remove from the registry and from the owning layer's sequence.
    pub fn delete_image(&mut self, id: &ImageId) -> bool {
        if self.images.remove(id).is_none() {
            return false;
        }
        self.changes.push(ImageChange::Removed(id.clone()));
        if let Some(layer_id) = self.layers.remove_image_from_layer(id) {
            self.touch_layer(&layer_id);
        }
        true
    }

    pub fn delete_selected_image(&mut self) -> Option<ImageId> {
        let id = self.images.selected_id().cloned()?;
        self.delete_image(&id).then_some(id)
    }

    /// Copy with a `(copy)` name suffix, +20/+20 offset, same style and
    /// layer, placed on top of that layer.
    pub fn duplicate_image(&mut self, id: &ImageId) -> Option<ImageId> {
        let original = self.images.get(id)?;
        let data = NewImage {
            name: format!("{} (copy)", original.name),
            layer_id: Some(original.layer_id.clone()),
            pos: original.pos.offset(CASCADE_OFFSET, CASCADE_OFFSET),
            style: None,
        };
        let style = original.style.clone();
        let src = original.src.clone();

        let new_id = self.add_image(data, src).ok()?;
        if let Some(copy) = self.images.get_mut(&new_id) {
            copy.style = style;
        }
        Some(new_id)
    }

    pub fn duplicate_selected_image(&mut self) -> Option<ImageId> {
        let id = self.images.selected_id().cloned()?;
        self.duplicate_image(&id)
    }

    pub fn reset_image_style(&mut self, id: &ImageId) -> bool {
        let Some(image) = self.images.get_mut(id) else {
            return false;
        };
        image.style = ImageStyle::default();
        self.changes.push(ImageChange::Updated(id.clone()));
        true
    }

    // ---- layer membership ---------------------------------------------

    pub fn move_image_to_layer(&mut self, image_id: &ImageId, target: &LayerId) -> bool {
        let source = self.layers.layer_of(image_id).map(|l| l.id.clone());
        if !self.images.contains(image_id) || !self.layers.move_image_to_layer(image_id, target) {
            return false;
        }
        if let Some(image) = self.images.get_mut(image_id) {
            image.layer_id = target.clone();
        }
        if let Some(source) = source.filter(|s| s != target) {
            self.touch_layer(&source);
        }
        self.touch_layer(target);
        true
    }

    /// Images of one layer, bottom to top.
    pub fn get_images_by_layer(&self, layer_id: &LayerId) -> Vec<&PlacedImage> {
        self.layers
            .get(layer_id)
            .map(|l| {
                l.image_ids
                    .iter()
                    .filter_map(|id| self.images.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Members of a layer in global render order.
    pub fn get_layer_images(&self, layer_id: &LayerId) -> Vec<&PlacedImage> {
        self.layers
            .get_layer_images(layer_id, self.images_in_order())
    }

    /// Every image, bottom layer first.
    pub fn images_in_order(&self) -> Vec<&PlacedImage> {
        self.layers
            .render_order()
            .filter_map(|id| self.images.get(id))
            .collect()
    }

    pub fn clear_layer_images(&mut self, layer_id: &LayerId) -> usize {
        let removed = self.layers.clear_layer(layer_id);
        self.drop_images(removed)
    }

    pub fn clear_all_images(&mut self) -> usize {
        let removed = self.layers.clear_all();
        let count = self.drop_images(removed);
        // Anything not referenced by a layer goes too.
        let stray = self.images.clear();
        count + stray
    }

    fn drop_images(&mut self, ids: Vec<ImageId>) -> usize {
        let mut count = 0;
        for id in ids {
            if self.images.remove(&id).is_some() {
                self.changes.push(ImageChange::Removed(id));
                count += 1;
            }
        }
        count
    }

    // ---- z-order --------------------------------------------------------

    pub fn bring_to_front(&mut self, id: &ImageId) -> bool {
        self.reorder(id, ZOrder::Front)
    }

    pub fn send_to_back(&mut self, id: &ImageId) -> bool {
        self.reorder(id, ZOrder::Back)
    }

    pub fn bump(&mut self, id: &ImageId, direction: Direction) -> bool {
        let order = match direction {
            Direction::Up => ZOrder::Up,
            Direction::Down => ZOrder::Down,
        };
        self.reorder(id, order)
    }

    /// Reorder within the owning layer. The whole layer is queued for
    /// persistence since every index past the moved image shifts.
    pub fn reorder(&mut self, id: &ImageId, order: ZOrder) -> bool {
        if !self.layers.reorder(id, order) {
            return false;
        }
        if let Some(layer_id) = self.layers.layer_of(id).map(|l| l.id.clone()) {
            self.touch_layer(&layer_id);
        }
        true
    }

    // ---- selection & interaction ---------------------------------------

    pub fn selected_image(&self) -> Option<&PlacedImage> {
        self.images.selected_image()
    }

    /// Select an image. Images on hidden or locked layers cannot be picked.
    pub fn select_image(&mut self, id: &ImageId) -> bool {
        match self.images.get(id) {
            Some(img) if self.is_interactive(&img.layer_id) => self.images.select(id),
            _ => false,
        }
    }

    pub fn clear_selection(&mut self) {
        self.images.clear_selection();
    }

    /// Pointer click in canvas coordinates: selects the top-most hit image,
    /// or clears the selection on empty canvas.
    pub fn click_at(&mut self, point: Position) -> Option<ImageId> {
        let hit = self.hit_test(point);
        match &hit {
            Some(id) => {
                self.images.select(id);
            }
            None => self.images.clear_selection(),
        }
        hit
    }

    pub fn hit_test(&self, point: Position) -> Option<ImageId> {
        let p = Point::new(point.x, point.y);
        self.images_in_order()
            .into_iter()
            .rev()
            .filter(|img| self.is_interactive(&img.layer_id))
            .find(|img| {
                let transform = image_transform(img.pos, &img.style);
                if transform.determinant().abs() < 1e-12 {
                    return false;
                }
                let local = transform.inverse() * p;
                Rect::new(
                    0.0,
                    0.0,
                    f64::from(img.src.width()),
                    f64::from(img.src.height()),
                )
                .contains(local)
            })
            .map(|img| img.id.clone())
    }

    /// Merge a partial transform onto the selected image. No-op without a
    /// selection or when its layer is locked.
    pub fn transform_selected(&mut self, transform: Transform) -> bool {
        let Some(selected) = self.images.selected_image() else {
            return false;
        };
        if self.layers.is_layer_locked(&selected.layer_id) {
            return false;
        }
        let id = selected.id.clone();
        self.update_image(&id, &transform.into_patch())
    }

    /// Keyboard shortcuts: Delete/Backspace remove the selection,
    /// Ctrl/Cmd+D duplicates it.
    pub fn handle_key(&mut self, key: &KeyPress) -> KeyOutcome {
        if self.images.selected_id().is_none() {
            return KeyOutcome::Ignored;
        }
        match key.key.as_str() {
            "Delete" | "Backspace" => self
                .delete_selected_image()
                .map(KeyOutcome::Deleted)
                .unwrap_or(KeyOutcome::Ignored),
            "d" | "D" if key.ctrl || key.meta => self
                .duplicate_selected_image()
                .map(KeyOutcome::Duplicated)
                .unwrap_or(KeyOutcome::Ignored),
            _ => KeyOutcome::Ignored,
        }
    }

    fn is_interactive(&self, layer_id: &LayerId) -> bool {
        self.layers.is_layer_visible(layer_id) && !self.layers.is_layer_locked(layer_id)
    }

    fn resolve_layer(&self, requested: Option<LayerId>) -> Result<LayerId, CollageError> {
        let id = match requested {
            Some(id) => id,
            None => self
                .layers
                .selected_id()
                .cloned()
                .ok_or_else(|| CollageError::InvalidRequest("no layer selected".to_string()))?,
        };
        if !self.layers.contains(&id) {
            return Err(CollageError::LayerNotFound(id));
        }
        Ok(id)
    }

    // ---- views ------------------------------------------------------------

    /// Find the bitmap behind an image id.
    pub fn source_of(&self, id: &ImageId) -> Option<ImageSource> {
        self.images.get(id).map(|img| img.src.clone())
    }

    pub fn render_plan(&self) -> RenderPlan {
        let layers = self
            .layers
            .iter()
            .filter(|l| l.visible)
            .map(|layer| RenderLayer {
                opacity: layer.opacity,
                items: layer
                    .image_ids
                    .iter()
                    .filter_map(|id| self.images.get(id))
                    .map(|img| RenderItem {
                        source: img.src.clone(),
                        transform: image_transform(img.pos, &img.style),
                        opacity: img.style.opacity,
                        fill: self.fill_of(&img.style),
                    })
                    .collect(),
            })
            .collect();
        RenderPlan {
            size: self.size,
            layers,
        }
    }

    fn fill_of(&self, style: &ImageStyle) -> Option<Fill> {
        if let Some(color) = style.fill.as_deref().and_then(parse_color) {
            return Some(Fill::Color(color));
        }
        let pattern = style.fill_image.as_ref()?;
        let source = self.source_of(&pattern.image_id)?;
        Some(Fill::Pattern {
            source,
            x: pattern.x,
            y: pattern.y,
            repeat: pattern.repeat,
        })
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            size: self.size,
            layers: self.layers.iter().cloned().collect(),
            selected_layer_id: self.layers.selected_id().cloned(),
            images: self
                .images_in_order()
                .into_iter()
                .map(ImageView::from)
                .collect(),
            selected_image_id: self.images.selected_id().cloned(),
        }
    }
}

/// Serializable view of the whole editor state.
#[derive(Debug, Clone, Serialize)]
pub struct CanvasSnapshot {
    pub size: CanvasSize,
    pub layers: Vec<Layer>,
    pub selected_layer_id: Option<LayerId>,
    /// Render order, bottom first.
    pub images: Vec<ImageView>,
    pub selected_image_id: Option<ImageId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    #[serde(flatten)]
    pub snapshot: ImageSnapshot,
    pub src: String,
    pub width: u32,
    pub height: u32,
}

impl From<&PlacedImage> for ImageView {
    fn from(img: &PlacedImage) -> Self {
        Self {
            snapshot: img.snapshot(),
            src: blob_url(&img.id),
            width: img.src.width(),
            height: img.src.height(),
        }
    }
}

/// Path under which an image's original bytes are served.
pub fn blob_url(id: &ImageId) -> String {
    format!("/images/{id}/blob")
}
