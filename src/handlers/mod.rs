//! HTTP handlers, one module per resource.

pub mod albums;
pub mod canvas;
pub mod export;
pub mod images;
pub mod layers;
