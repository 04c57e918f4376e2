use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::canvas::DEFAULT_DROP_POSITION;
use crate::error::CollageError;
use crate::router::CollageState;
use crate::service::album_query::AlbumQueryView;
use crate::types::canvas::{ImageId, LayerId, Position};
use crate::types::lastfm::Period;

#[derive(Debug, Deserialize)]
pub struct AlbumQueryRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
}

/// PUT /albums/query -> username and/or period.
pub async fn set_query(
    State(state): State<CollageState>,
    Json(req): Json<AlbumQueryRequest>,
) -> Result<Json<AlbumQueryView>, CollageError> {
    Ok(Json(
        state
            .handle
            .set_album_query(req.username, req.period)
            .await?,
    ))
}

/// POST /albums/fetch -> 429 while the cooldown runs.
pub async fn fetch_albums(
    State(state): State<CollageState>,
) -> Result<Json<AlbumQueryView>, CollageError> {
    Ok(Json(state.handle.fetch_albums(&state.client).await?))
}

/// GET /albums
pub async fn list_albums(
    State(state): State<CollageState>,
) -> Result<Json<AlbumQueryView>, CollageError> {
    Ok(Json(state.handle.albums().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaceAlbumRequest {
    #[serde(default)]
    pub layer_id: Option<LayerId>,
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Debug, Serialize)]
pub struct PlaceAlbumResponse {
    pub image_id: ImageId,
}

/// POST /albums/{rank}/place -> artwork downloaded and added as an image.
pub async fn place_album(
    State(state): State<CollageState>,
    Path(rank): Path<u32>,
    body: Option<Json<PlaceAlbumRequest>>,
) -> Result<(StatusCode, Json<PlaceAlbumResponse>), CollageError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let image_id = state
        .handle
        .place_album(
            &state.client,
            rank,
            req.layer_id,
            req.pos.unwrap_or(DEFAULT_DROP_POSITION),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(PlaceAlbumResponse { image_id })))
}
