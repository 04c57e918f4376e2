pub mod api;
pub mod canvas;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod types;

pub use canvas::Canvas;
pub use error::CollageError;
