//! Durable image store: models and schema.
//!
//! Layout:
//! - `models.rs`: stored image record and its key scheme
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: key-value access to the `kv_images` table

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{IMAGE_KEY_PREFIX, StoredImage, storage_key};
pub use schema::SQLITE_INIT;
pub use sqlite::{ImageStorage, SqlitePool};
