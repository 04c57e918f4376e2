use serde::{Deserialize, Serialize};

use super::Canvas;
use crate::error::CollageError;
use crate::types::canvas::{
    CanvasSize, Direction, ImageId, ImagePatch, KeyPress, LayerId, LayerPatch, Position, Transform,
    ZOrder,
};

/// A single mutation of the editor state. Image uploads carry decoded
/// bitmaps and are applied through [`Canvas::add_images_from_files`]
/// directly instead.
#[derive(Debug, Clone)]
pub enum CanvasEdit {
    SetSize(CanvasSize),

    AddLayer,
    DeleteLayer(LayerId),
    UpdateLayer { id: LayerId, patch: LayerPatch },
    MoveLayer { id: LayerId, direction: Direction },
    SelectLayer(LayerId),
    ClearLayer(LayerId),

    UpdateImage { id: ImageId, patch: ImagePatch },
    DeleteImage(ImageId),
    ClearImages,
    DuplicateImage(ImageId),
    ReorderImage { id: ImageId, order: ZOrder },
    MoveImageToLayer { id: ImageId, layer_id: LayerId },
    ResetStyle(ImageId),

    SelectImage(ImageId),
    ClearSelection,
    Click(Position),
    TransformSelected(Transform),
    UpdateSelected(ImagePatch),
    Key(KeyPress),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    /// The edit changed something.
    Applied,
    /// Valid edit with nothing to do (boundary reorder, locked layer, ...).
    Unchanged,
    LayerCreated { layer_id: LayerId },
    ImageCreated { image_id: ImageId },
    Cleared { removed: usize },
    Clicked { image_id: Option<ImageId> },
    Key { result: KeyOutcome },
}

impl EditOutcome {
    fn from_flag(changed: bool) -> Self {
        if changed { Self::Applied } else { Self::Unchanged }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "image_id", rename_all = "snake_case")]
pub enum KeyOutcome {
    Deleted(ImageId),
    Duplicated(ImageId),
    Ignored,
}

impl Canvas {
    /// Apply one edit. Unknown ids are reported as errors; no-op edits on
    /// known ids yield [`EditOutcome::Unchanged`].
    pub fn apply(&mut self, edit: CanvasEdit) -> Result<EditOutcome, CollageError> {
        use CanvasEdit::*;

        let outcome = match edit {
            SetSize(size) => {
                self.set_size(size);
                EditOutcome::Applied
            }

            AddLayer => EditOutcome::LayerCreated {
                layer_id: self.add_layer(),
            },
            DeleteLayer(id) => {
                self.require_layer(&id)?;
                if !self.delete_layer(&id) {
                    return Err(CollageError::LastLayer);
                }
                EditOutcome::Applied
            }
            UpdateLayer { id, patch } => {
                self.require_layer(&id)?;
                EditOutcome::from_flag(self.update_layer(&id, &patch))
            }
            MoveLayer { id, direction } => {
                self.require_layer(&id)?;
                EditOutcome::from_flag(self.move_layer(&id, direction))
            }
            SelectLayer(id) => {
                self.require_layer(&id)?;
                EditOutcome::from_flag(self.select_layer(&id))
            }
            ClearLayer(id) => {
                self.require_layer(&id)?;
                EditOutcome::Cleared {
                    removed: self.clear_layer_images(&id),
                }
            }

            UpdateImage { id, patch } => {
                self.require_image(&id)?;
                EditOutcome::from_flag(self.update_image(&id, &patch))
            }
            DeleteImage(id) => {
                self.require_image(&id)?;
                EditOutcome::from_flag(self.delete_image(&id))
            }
            ClearImages => EditOutcome::Cleared {
                removed: self.clear_all_images(),
            },
            DuplicateImage(id) => {
                self.require_image(&id)?;
                match self.duplicate_image(&id) {
                    Some(image_id) => EditOutcome::ImageCreated { image_id },
                    None => EditOutcome::Unchanged,
                }
            }
            ReorderImage { id, order } => {
                self.require_image(&id)?;
                EditOutcome::from_flag(self.reorder(&id, order))
            }
            MoveImageToLayer { id, layer_id } => {
                self.require_image(&id)?;
                self.require_layer(&layer_id)?;
                EditOutcome::from_flag(self.move_image_to_layer(&id, &layer_id))
            }
            ResetStyle(id) => {
                self.require_image(&id)?;
                EditOutcome::from_flag(self.reset_image_style(&id))
            }

            SelectImage(id) => {
                self.require_image(&id)?;
                EditOutcome::from_flag(self.select_image(&id))
            }
            ClearSelection => {
                self.clear_selection();
                EditOutcome::Applied
            }
            Click(point) => EditOutcome::Clicked {
                image_id: self.click_at(point),
            },
            TransformSelected(transform) => EditOutcome::from_flag(self.transform_selected(transform)),
            UpdateSelected(patch) => EditOutcome::from_flag(self.update_selected_image(&patch)),
            Key(key) => EditOutcome::Key {
                result: self.handle_key(&key),
            },
        };
        Ok(outcome)
    }

    fn require_layer(&self, id: &LayerId) -> Result<(), CollageError> {
        if self.layers().contains(id) {
            Ok(())
        } else {
            Err(CollageError::LayerNotFound(id.clone()))
        }
    }

    fn require_image(&self, id: &ImageId) -> Result<(), CollageError> {
        if self.images().contains(id) {
            Ok(())
        } else {
            Err(CollageError::ImageNotFound(id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::layers::DEFAULT_LAYER_ID;
    use crate::canvas::source::test_support::solid;
    use crate::types::canvas::NewImage;

    #[test]
    fn deleting_last_layer_is_an_error() {
        let mut canvas = Canvas::default();
        let err = canvas
            .apply(CanvasEdit::DeleteLayer(LayerId::from(DEFAULT_LAYER_ID)))
            .unwrap_err();
        assert!(matches!(err, CollageError::LastLayer));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let mut canvas = Canvas::default();
        assert!(matches!(
            canvas.apply(CanvasEdit::UpdateLayer {
                id: LayerId::from("nope"),
                patch: LayerPatch::default(),
            }),
            Err(CollageError::LayerNotFound(_))
        ));
        assert!(matches!(
            canvas.apply(CanvasEdit::DeleteImage(ImageId::from("nope"))),
            Err(CollageError::ImageNotFound(_))
        ));
    }

    #[test]
    fn layer_patch_sets_desired_state() {
        let mut canvas = Canvas::default();
        let id = LayerId::from(DEFAULT_LAYER_ID);
        let hide = CanvasEdit::UpdateLayer {
            id: id.clone(),
            patch: LayerPatch {
                visible: Some(false),
                ..LayerPatch::default()
            },
        };
        assert_eq!(canvas.apply(hide.clone()).unwrap(), EditOutcome::Applied);
        assert_eq!(canvas.apply(hide).unwrap(), EditOutcome::Unchanged);
        assert!(!canvas.layers().is_layer_visible(&id));

        let outcome = canvas
            .apply(CanvasEdit::UpdateLayer {
                id: id.clone(),
                patch: LayerPatch {
                    name: Some("Background".to_string()),
                    locked: Some(true),
                    opacity: Some(2.0),
                    ..LayerPatch::default()
                },
            })
            .unwrap();
        assert_eq!(outcome, EditOutcome::Applied);
        let layer = canvas.layers().get(&id).unwrap();
        assert_eq!(layer.name, "Background");
        assert!(layer.locked);
        assert_eq!(layer.opacity, 1.0);
    }

    #[test]
    fn boundary_reorder_is_unchanged() {
        let mut canvas = Canvas::default();
        let id = canvas
            .add_image(NewImage::default(), solid(1, 1, [0, 0, 0, 255]))
            .unwrap();
        let outcome = canvas
            .apply(CanvasEdit::ReorderImage {
                id,
                order: ZOrder::Front,
            })
            .unwrap();
        assert_eq!(outcome, EditOutcome::Unchanged);
    }

    #[test]
    fn add_layer_reports_new_id() {
        let mut canvas = Canvas::default();
        let EditOutcome::LayerCreated { layer_id } = canvas.apply(CanvasEdit::AddLayer).unwrap()
        else {
            panic!("expected layer id");
        };
        assert_eq!(canvas.layers().selected_id(), Some(&layer_id));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(EditOutcome::Key {
            result: KeyOutcome::Ignored,
        }).unwrap();
        assert_eq!(json["outcome"], "key");
        assert_eq!(json["result"]["action"], "ignored");
    }
}
