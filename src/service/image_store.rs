use std::collections::HashMap;
use std::str::FromStr;

use futures::future::join_all;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::db::models::{StoredImage, storage_key};
use crate::db::sqlite::ImageStorage;
use crate::error::CollageError;
use crate::types::canvas::{ImageId, ImageSnapshot};

/// Outcome of a bulk clear: keys are deleted one by one, so some may fail.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    pub failed: Vec<String>,
}

/// Durable image store plus an in-memory mirror of what it holds.
///
/// The mirror is only touched after the durable write succeeded.
#[derive(Clone)]
pub struct PersistentImages {
    storage: ImageStorage,
    mirror: HashMap<ImageId, ImageSnapshot>,
}

impl PersistentImages {
    pub async fn open(database_url: &str) -> Result<Self, CollageError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let storage = ImageStorage::new(pool);
        storage.init_schema().await?;

        Ok(Self {
            storage,
            mirror: HashMap::new(),
        })
    }

    /// Read every stored record and rebuild the mirror from it.
    pub async fn load(&mut self) -> Result<Vec<StoredImage>, CollageError> {
        let records = self.storage.list_all().await?;
        self.mirror = records
            .iter()
            .map(|r| (r.id.clone(), r.data.clone()))
            .collect();
        info!(count = records.len(), "stored images loaded");
        Ok(records)
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.mirror.contains_key(id)
    }

    /// Insert or replace by id.
    pub async fn save_image(&mut self, record: &StoredImage) -> Result<(), CollageError> {
        self.storage.upsert(record).await?;
        self.mirror.insert(record.id.clone(), record.data.clone());
        debug!(image_id = %record.id, bytes = record.blob.len(), "image saved");
        Ok(())
    }

    /// Rewrite placement, style and z index only. Returns `false` if the id
    /// is not stored.
    pub async fn update_snapshot(
        &mut self,
        snapshot: &ImageSnapshot,
        z: usize,
    ) -> Result<bool, CollageError> {
        if !self.storage.update_snapshot(snapshot, z as i64).await? {
            return Ok(false);
        }
        self.mirror.insert(snapshot.id.clone(), snapshot.clone());
        Ok(true)
    }

    pub async fn delete_image(&mut self, id: &ImageId) -> Result<bool, CollageError> {
        let removed = self.storage.delete(id).await?;
        self.mirror.remove(id);
        Ok(removed)
    }

    /// Delete every key, one statement per key, concurrently. Failed keys are
    /// logged and reported; they stay in the mirror.
    pub async fn clear_all(&mut self) -> Result<ClearReport, CollageError> {
        let keys = self.storage.keys().await?;
        let storage = &self.storage;
        let results = join_all(keys.iter().map(|key| storage.delete_key(key))).await;

        let mut report = ClearReport::default();
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(_) => report.removed += 1,
                Err(e) => {
                    warn!(%key, error = %e, "failed to delete stored image");
                    report.failed.push(key);
                }
            }
        }

        self.mirror
            .retain(|id, _| report.failed.contains(&storage_key(id)));
        info!(removed = report.removed, failed = report.failed.len(), "store cleared");
        Ok(report)
    }
}
