use crate::db::models::{IMAGE_KEY_PREFIX, StoredImage, storage_key};
use crate::db::schema::SQLITE_INIT;
use crate::error::CollageError;
use crate::types::canvas::{ImageId, ImageSnapshot};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub type SqlitePool = Pool<Sqlite>;

/// Key-value access to stored images. Keys are always `image_<id>`.
#[derive(Clone)]
pub struct ImageStorage {
    pool: SqlitePool,
}

impl ImageStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), CollageError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert the record, or replace every field of an existing one.
    pub async fn upsert(&self, record: &StoredImage) -> Result<(), CollageError> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            r#"
            INSERT INTO kv_images (key, id, name, url, blob, data, z, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                name=excluded.name,
                url=excluded.url,
                blob=excluded.blob,
                data=excluded.data,
                z=excluded.z,
                updated_at=excluded.updated_at
            "#,
        )
        .bind(record.key())
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(&record.url)
        .bind(&record.blob)
        .bind(data)
        .bind(record.z)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrite the snapshot and z index of an existing record, leaving the
    /// blob alone. Returns `false` when no record exists for the id.
    pub async fn update_snapshot(
        &self,
        snapshot: &ImageSnapshot,
        z: i64,
    ) -> Result<bool, CollageError> {
        let data =
            serde_json::to_string(snapshot).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let done = sqlx::query(
            "UPDATE kv_images SET name = ?, data = ?, z = ?, updated_at = ? WHERE key = ?",
        )
        .bind(&snapshot.name)
        .bind(data)
        .bind(z)
        .bind(Utc::now().to_rfc3339())
        .bind(storage_key(&snapshot.id))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Every image record, bottom of each layer first.
    pub async fn list_all(&self) -> Result<Vec<StoredImage>, CollageError> {
        let rows = sqlx::query(
            r#"SELECT id, name, url, blob, data, z FROM kv_images
               WHERE key LIKE ? ESCAPE '\'
               ORDER BY z, updated_at, key"#,
        )
        .bind(format!("{}%", IMAGE_KEY_PREFIX.replace('_', "\\_")))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    pub async fn keys(&self) -> Result<Vec<String>, CollageError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM kv_images ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn delete(&self, id: &ImageId) -> Result<bool, CollageError> {
        self.delete_key(&storage_key(id)).await
    }

    pub async fn delete_key(&self, key: &str) -> Result<bool, CollageError> {
        let done = sqlx::query("DELETE FROM kv_images WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    fn row_to_model(row: SqliteRow) -> Result<StoredImage, CollageError> {
        let id: String = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let url: String = row.try_get("url")?;
        let blob: Vec<u8> = row.try_get("blob")?;
        let data_json: String = row.try_get("data")?;
        let z: i64 = row.try_get("z")?;

        let data: ImageSnapshot =
            serde_json::from_str(&data_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(StoredImage {
            id: ImageId::from(id),
            name,
            url,
            blob,
            data,
            z,
        })
    }
}
