use axum::{Json, extract::State};
use serde::Deserialize;

use crate::canvas::{CanvasEdit, CanvasSnapshot, EditOutcome};
use crate::error::CollageError;
use crate::router::CollageState;
use crate::service::canvas_actor::SessionInfo;
use crate::types::canvas::{CanvasSize, ImageId, KeyPress, Position, Transform};

/// GET /session
pub async fn session(State(state): State<CollageState>) -> Result<Json<SessionInfo>, CollageError> {
    Ok(Json(state.handle.session().await?))
}

/// GET /canvas -> layers, images in render order, selection.
pub async fn snapshot(
    State(state): State<CollageState>,
) -> Result<Json<CanvasSnapshot>, CollageError> {
    Ok(Json(state.handle.snapshot().await?))
}

/// PUT /canvas/size
pub async fn set_size(
    State(state): State<CollageState>,
    Json(size): Json<CanvasSize>,
) -> Result<Json<EditOutcome>, CollageError> {
    if size.width == 0 || size.height == 0 {
        return Err(CollageError::InvalidRequest(
            "canvas size must be non-zero".to_string(),
        ));
    }
    Ok(Json(state.handle.edit(CanvasEdit::SetSize(size)).await?))
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub image_id: ImageId,
}

/// POST /selection
pub async fn select_image(
    State(state): State<CollageState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state.handle.edit(CanvasEdit::SelectImage(req.image_id)).await?,
    ))
}

/// DELETE /selection
pub async fn clear_selection(
    State(state): State<CollageState>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(state.handle.edit(CanvasEdit::ClearSelection).await?))
}

/// POST /selection/click with canvas coordinates.
pub async fn click(
    State(state): State<CollageState>,
    Json(point): Json<Position>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(state.handle.edit(CanvasEdit::Click(point)).await?))
}

/// POST /selection/transform
pub async fn transform_selected(
    State(state): State<CollageState>,
    Json(transform): Json<Transform>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::TransformSelected(transform))
            .await?,
    ))
}

/// POST /selection/key
pub async fn key_press(
    State(state): State<CollageState>,
    Json(key): Json<KeyPress>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(state.handle.edit(CanvasEdit::Key(key)).await?))
}
