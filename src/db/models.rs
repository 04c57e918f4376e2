use serde::{Deserialize, Serialize};

use crate::canvas::{PlacedImage, blob_url};
use crate::types::canvas::{ImageId, ImageSnapshot};

pub const IMAGE_KEY_PREFIX: &str = "image_";

/// Store key for an image record.
pub fn storage_key(id: &ImageId) -> String {
    format!("{IMAGE_KEY_PREFIX}{id}")
}

/// One persisted image: original bytes plus the last-known snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: ImageId,
    pub name: String,
    pub url: String,
    #[serde(skip)]
    pub blob: Vec<u8>,
    pub data: ImageSnapshot,
    /// Index inside the owning layer; restore appends in this order.
    pub z: i64,
}

impl StoredImage {
    pub fn new(img: &PlacedImage, z: usize) -> Self {
        Self {
            id: img.id.clone(),
            name: img.name.clone(),
            url: blob_url(&img.id),
            blob: img.src.encoded().to_vec(),
            data: img.snapshot(),
            z: z as i64,
        }
    }

    pub fn key(&self) -> String {
        storage_key(&self.id)
    }
}
