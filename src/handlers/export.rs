use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::canvas::export::{EXPORT_FILE_NAME, to_data_uri};
use crate::error::CollageError;
use crate::router::CollageState;

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub pixel_ratio: Option<f64>,
}

impl ExportQuery {
    fn ratio(&self, default: f64) -> Result<f64, CollageError> {
        let ratio = self.pixel_ratio.unwrap_or(default);
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(CollageError::InvalidRequest(format!(
                "invalid pixel ratio {ratio}"
            )));
        }
        Ok(ratio)
    }
}

/// GET /export -> PNG download named `collage.png`.
pub async fn export_png(
    State(state): State<CollageState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, CollageError> {
    let ratio = query.ratio(state.pixel_ratio)?;
    let png = state.handle.export_png(ratio).await?;
    let disposition = format!("attachment; filename=\"{EXPORT_FILE_NAME}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        png,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct DataUriResponse {
    pub file_name: &'static str,
    pub data_uri: String,
}

/// GET /export/data-uri
pub async fn export_data_uri(
    State(state): State<CollageState>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<DataUriResponse>, CollageError> {
    let ratio = query.ratio(state.pixel_ratio)?;
    let png = state.handle.export_png(ratio).await?;
    Ok(Json(DataUriResponse {
        file_name: EXPORT_FILE_NAME,
        data_uri: to_data_uri(&png),
    }))
}
