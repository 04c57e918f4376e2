//! SQL DDL for the image key-value table.

/// SQLite schema with:
/// - `key` TEXT PRIMARY KEY, always `image_<id>`
/// - `id` UNIQUE, equal to the in-memory image id
/// - `blob` the original encoded file bytes
/// - `data` JSON placement/style snapshot
/// - `z` index inside the owning layer's sequence, bottom first
/// - `updated_at` RFC3339, informational
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS kv_images (
    key TEXT PRIMARY KEY NOT NULL,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    blob BLOB NOT NULL,
    data TEXT NOT NULL, -- JSON ImageSnapshot
    z INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_kv_images_z ON kv_images(z, updated_at);
"#;
