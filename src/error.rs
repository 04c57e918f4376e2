use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

use crate::types::canvas::{ImageId, LayerId};

#[derive(Debug, ThisError)]
pub enum CollageError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Image decode/encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Ractor error: {0}")]
    Actor(String),

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("layer not found: {0}")]
    LayerNotFound(LayerId),

    #[error("image not found: {0}")]
    ImageNotFound(ImageId),

    #[error("no album with rank {0}")]
    AlbumNotFound(u32),

    #[error("album has no artwork")]
    MissingArtwork,

    #[error("artwork exceeds {limit} bytes")]
    ArtworkTooLarge { limit: usize },

    #[error("cannot delete the last layer")]
    LastLayer,

    #[error("no Last.fm username set")]
    MissingUsername,

    #[error("album fetch rate limited; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for CollageError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            CollageError::Database(_) | CollageError::Actor(_) | CollageError::Io(_) => {
                let body = ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                };
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiErrorResponse { error: body }),
                )
                    .into_response();
            }
            CollageError::Reqwest(_) | CollageError::UrlParse(_) => {
                (StatusCode::BAD_GATEWAY, "BAD_GATEWAY")
            }
            CollageError::UpstreamStatus(code) => match *code {
                StatusCode::NOT_FOUND => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                StatusCode::TOO_MANY_REQUESTS => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT"),
                _ => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            },
            CollageError::LayerNotFound(_)
            | CollageError::ImageNotFound(_)
            | CollageError::AlbumNotFound(_)
            | CollageError::MissingArtwork => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CollageError::ArtworkTooLarge { .. } => (StatusCode::BAD_GATEWAY, "ARTWORK_TOO_LARGE"),
            CollageError::LastLayer => (StatusCode::CONFLICT, "LAST_LAYER"),
            CollageError::MissingUsername => (StatusCode::BAD_REQUEST, "MISSING_USERNAME"),
            CollageError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT"),
            CollageError::Json(_)
            | CollageError::Image(_)
            | CollageError::Base64(_)
            | CollageError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body = ApiErrorBody {
            code: code.to_string(),
            message: self.to_string(),
        };
        let mut resp = (status, Json(ApiErrorResponse { error: body })).into_response();
        if let CollageError::RateLimited { retry_after_secs } = self {
            resp.headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        resp
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
