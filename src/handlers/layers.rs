use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::canvas::{CanvasEdit, EditOutcome};
use crate::error::CollageError;
use crate::router::CollageState;
use crate::types::canvas::{Direction, LayerId, LayerPatch};

/// POST /layers -> new layer, selected.
pub async fn add_layer(
    State(state): State<CollageState>,
) -> Result<(StatusCode, Json<EditOutcome>), CollageError> {
    let outcome = state.handle.edit(CanvasEdit::AddLayer).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// PATCH /layers/{id} -> desired name, visibility, lock and opacity.
pub async fn update_layer(
    State(state): State<CollageState>,
    Path(id): Path<String>,
    Json(patch): Json<LayerPatch>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::UpdateLayer {
                id: LayerId::from(id),
                patch,
            })
            .await?,
    ))
}

/// DELETE /layers/{id} -> 409 for the last layer.
pub async fn delete_layer(
    State(state): State<CollageState>,
    Path(id): Path<String>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::DeleteLayer(LayerId::from(id)))
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct MoveLayerRequest {
    pub direction: Direction,
}

/// POST /layers/{id}/move
pub async fn move_layer(
    State(state): State<CollageState>,
    Path(id): Path<String>,
    Json(req): Json<MoveLayerRequest>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::MoveLayer {
                id: LayerId::from(id),
                direction: req.direction,
            })
            .await?,
    ))
}

/// POST /layers/{id}/select
pub async fn select_layer(
    State(state): State<CollageState>,
    Path(id): Path<String>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::SelectLayer(LayerId::from(id)))
            .await?,
    ))
}

/// POST /layers/{id}/clear -> removes every image on the layer.
pub async fn clear_layer(
    State(state): State<CollageState>,
    Path(id): Path<String>,
) -> Result<Json<EditOutcome>, CollageError> {
    Ok(Json(
        state
            .handle
            .edit(CanvasEdit::ClearLayer(LayerId::from(id)))
            .await?,
    ))
}
