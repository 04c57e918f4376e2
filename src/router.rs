use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post, put},
};

use crate::api::lastfm::LastfmClient;
use crate::config::Config;
use crate::handlers::{albums, canvas, export, images, layers};
use crate::middleware::auth::RequireKeyAuth;
use crate::service::canvas_actor::CanvasHandle;

#[derive(Clone)]
pub struct CollageState {
    pub handle: CanvasHandle,
    pub client: LastfmClient,
    /// Empty disables auth.
    pub key: Arc<str>,
    pub pixel_ratio: f64,
    pub body_limit: usize,
}

impl CollageState {
    pub fn new(handle: CanvasHandle, client: LastfmClient, cfg: &Config) -> Self {
        Self {
            handle,
            client,
            key: Arc::from(cfg.collage_key.as_str()),
            pixel_ratio: cfg.export_pixel_ratio,
            body_limit: cfg.max_upload_bytes,
        }
    }
}

pub fn collage_router(state: CollageState) -> Router {
    Router::new()
        .route("/session", get(canvas::session))
        .route("/canvas", get(canvas::snapshot))
        .route("/canvas/size", put(canvas::set_size))
        .route("/layers", post(layers::add_layer))
        .route(
            "/layers/{id}",
            patch(layers::update_layer).delete(layers::delete_layer),
        )
        .route("/layers/{id}/move", post(layers::move_layer))
        .route("/layers/{id}/select", post(layers::select_layer))
        .route("/layers/{id}/clear", post(layers::clear_layer))
        .route(
            "/images",
            post(images::upload_images).delete(images::clear_images),
        )
        .route(
            "/images/{id}",
            patch(images::update_image).delete(images::delete_image),
        )
        .route("/images/{id}/blob", get(images::image_blob))
        .route("/images/{id}/duplicate", post(images::duplicate_image))
        .route("/images/{id}/order", post(images::reorder_image))
        .route("/images/{id}/layer", post(images::move_image_to_layer))
        .route("/images/{id}/reset-style", post(images::reset_style))
        .route(
            "/selection",
            post(canvas::select_image).delete(canvas::clear_selection),
        )
        .route("/selection/click", post(canvas::click))
        .route("/selection/transform", post(canvas::transform_selected))
        .route("/selection/key", post(canvas::key_press))
        .route("/export", get(export::export_png))
        .route("/export/data-uri", get(export::export_data_uri))
        .route("/albums", get(albums::list_albums))
        .route("/albums/query", put(albums::set_query))
        .route("/albums/fetch", post(albums::fetch_albums))
        .route("/albums/{rank}/place", post(albums::place_album))
        .route_layer(middleware::from_extractor_with_state::<RequireKeyAuth, _>(
            state.clone(),
        ))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .with_state(state)
}
