pub mod album_query;
pub mod canvas_actor;
pub mod image_store;
