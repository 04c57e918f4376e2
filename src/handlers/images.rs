use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::canvas::{CanvasEdit, DEFAULT_DROP_POSITION, EditOutcome};
use crate::error::CollageError;
use crate::router::CollageState;
use crate::types::canvas::{ImageId, ImagePatch, LayerId, Position, ZOrder};

#[derive(Debug, Deserialize)]
pub struct UploadFile {
    pub name: String,
    /// Base64 file content; a `data:` URI prefix is accepted.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub files: Vec<UploadFile>,
    #[serde(default)]
    pub layer_id: Option<LayerId>,
    /// First image lands here, the next ones cascade by +20/+20.
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub image_ids: Vec<ImageId>,
}

fn decode_base64(data: &str) -> Result<Vec<u8>, CollageError> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    Ok(base64::engine::general_purpose::STANDARD.decode(payload.trim())?)
}

/// POST /images
pub async fn upload_images(
    State(state): State<CollageState>,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), CollageError> {
    if req.files.is_empty() {
        return Err(CollageError::InvalidRequest("no files".to_string()));
    }
    let files = req
        .files
        .into_iter()
        .map(|f| Ok((f.name, decode_base64(&f.data)?)))
        .collect::<Result<Vec<_>, CollageError>>()?;

    let image_ids = state
        .handle
        .add_images(files, req.layer_id, req.pos.unwrap_or(DEFAULT_DROP_POSITION))
        .await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { image_ids })))
}

/// PATCH /images/{id} with a field-level patch.
pub async fn update_image(
    State(state): State<CollageState>,
    Path(id): Path<String>,
    Json(patch): Json<ImagePatch>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::UpdateImage {
                id: ImageId::from(id),
                patch,
            })
            .await?,
    ))
}

/// DELETE /images/{id}
pub async fn delete_image(
    State(state): State<CollageState>,
    Path(id): Path<String>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::DeleteImage(ImageId::from(id)))
            .await?,
    ))
}

/// DELETE /images -> every image, on every layer, and the store.
pub async fn clear_images(
    State(state): State<CollageState>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(state.handle.edit(CanvasEdit::ClearImages).await?))
}

/// POST /images/{id}/duplicate
pub async fn duplicate_image(
    State(state): State<CollageState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<EditOutcome>), CollageError> {
    let outcome = state
        .handle
        .edit(CanvasEdit::DuplicateImage(ImageId::from(id)))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub order: ZOrder,
}

/// POST /images/{id}/order with `front | back | up | down`.
pub async fn reorder_image(
    State(state): State<CollageState>,
    Path(id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::ReorderImage {
                id: ImageId::from(id),
                order: req.order,
            })
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct MoveToLayerRequest {
    pub layer_id: LayerId,
}

/// POST /images/{id}/layer
pub async fn move_image_to_layer(
    State(state): State<CollageState>,
    Path(id): Path<String>,
    Json(req): Json<MoveToLayerRequest>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::MoveImageToLayer {
                id: ImageId::from(id),
                layer_id: req.layer_id,
            })
            .await?,
    ))
}

/// POST /images/{id}/reset-style
pub async fn reset_style(
    State(state): State<CollageState>,
    Path(id): Path<String>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::ResetStyle(ImageId::from(id)))
            .await?,
    ))
}

/// GET /images/{id}/blob -> the original uploaded bytes.
pub async fn image_blob(
    State(state): State<CollageState>,
    Path(id): Path<String>,
) -> Result<Response, CollageError> {
    let src = state.handle.blob(ImageId::from(id)).await?;
    Ok((
        [(header::CONTENT_TYPE, src.content_type())],
        src.encoded().to_vec(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_accepts_data_uri_prefix() {
        assert_eq!(decode_base64("aGk=").unwrap(), b"hi");
        assert_eq!(decode_base64("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert!(decode_base64("***").is_err());
    }
}
