use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use crate::types::canvas::CanvasSize;

/// Album proxy in front of the Last.fm API.
pub const DEFAULT_LASTFM_ENDPOINT: &str = "https://lastfm.nkko.workers.dev/";

/// Runtime configuration, assembled from defaults and `COLLAGE_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub loglevel: String,
    pub listen_addr: String,
    /// Empty disables the API key check.
    pub collage_key: String,
    pub proxy: Option<Url>,
    pub lastfm_endpoint: Url,
    pub album_cooldown_secs: u64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub export_pixel_ratio: f64,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:collage.sqlite".to_string(),
            loglevel: "info".to_string(),
            listen_addr: "0.0.0.0:8000".to_string(),
            collage_key: String::new(),
            proxy: None,
            lastfm_endpoint: Url::parse(DEFAULT_LASTFM_ENDPOINT)
                .expect("default Last.fm endpoint is a valid URL"),
            album_cooldown_secs: 60,
            canvas_width: 800,
            canvas_height: 600,
            export_pixel_ratio: 2.0,
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("COLLAGE_"))
            .extract()
    }

    pub fn canvas_size(&self) -> CanvasSize {
        CanvasSize {
            width: self.canvas_width,
            height: self.canvas_height,
        }
    }

    pub fn album_cooldown(&self) -> Duration {
        Duration::from_secs(self.album_cooldown_secs)
    }
}

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid COLLAGE_* configuration"));
