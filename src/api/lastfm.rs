use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tracing::{debug, error};
use url::Url;

use crate::config::Config;
use crate::error::CollageError;
use crate::types::lastfm::{Period, TopAlbumsResponse};

/// Client for the Last.fm album proxy and the artwork CDN behind it.
#[derive(Clone)]
pub struct LastfmClient {
    client: reqwest::Client,
    endpoint: Url,
    /// Same cap as direct uploads.
    max_artwork_bytes: usize,
}

impl LastfmClient {
    pub fn new(cfg: &Config) -> Result<Self, CollageError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("collage-nexus/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15));
        if let Some(proxy_url) = cfg.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: cfg.lastfm_endpoint.clone(),
            max_artwork_bytes: cfg.max_upload_bytes,
        })
    }

    pub fn top_albums_url(&self, user: &str, period: Period) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("method", "user.getTopAlbums")
            .append_pair("user", user)
            .append_pair("period", period.as_str());
        url
    }

    /// One GET, no retry. Any failure is logged and reported as `None`.
    pub async fn get_top_albums(&self, user: &str, period: Period) -> Option<TopAlbumsResponse> {
        let url = self.top_albums_url(user, period);
        debug!(%user, %period, "fetching top albums");

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(%user, error = %e, "Error fetching albums");
                return None;
            }
        };
        let status = resp.status();
        if !status.is_success() {
            error!(%user, %status, "Error fetching albums: upstream status");
            return None;
        }
        match resp.json::<TopAlbumsResponse>().await {
            Ok(albums) => Some(albums),
            Err(e) => {
                error!(%user, error = %e, "Error fetching albums: bad payload");
                None
            }
        }
    }

    /// Fetch artwork bytes, refusing anything larger than the upload cap.
    /// The body is read chunk by chunk and abandoned once past the cap.
    pub async fn download_artwork(&self, url: &str) -> Result<Vec<u8>, CollageError> {
        let url = Url::parse(url)?;
        let limit = self.max_artwork_bytes;
        let mut resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CollageError::UpstreamStatus(status));
        }
        if resp.content_length().is_some_and(|len| len > limit as u64) {
            return Err(CollageError::ArtworkTooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(CollageError::ArtworkTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        debug!(bytes = body.len(), "artwork downloaded");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, body::Bytes, routing::get};

    /// Serve `/sized` with a content length and `/chunked` without one.
    async fn artwork_server(len: usize) -> String {
        let app = Router::new()
            .route("/sized", get(move || async move { vec![7u8; len] }))
            .route(
                "/chunked",
                get(move || async move {
                    let chunks =
                        (0..2).map(move |_| Ok::<_, std::io::Error>(Bytes::from(vec![7u8; len])));
                    Body::from_stream(futures::stream::iter(chunks))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn client_with_limit(limit: usize) -> LastfmClient {
        LastfmClient::new(&Config {
            max_upload_bytes: limit,
            ..Config::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn artwork_download_respects_upload_cap() {
        let base = artwork_server(600).await;
        let client = client_with_limit(1000);

        let bytes = client.download_artwork(&format!("{base}/sized")).await.unwrap();
        assert_eq!(bytes.len(), 600);

        assert!(matches!(
            client.download_artwork(&format!("{base}/chunked")).await,
            Err(CollageError::ArtworkTooLarge { limit: 1000 })
        ));

        let tight = client_with_limit(100);
        assert!(matches!(
            tight.download_artwork(&format!("{base}/sized")).await,
            Err(CollageError::ArtworkTooLarge { limit: 100 })
        ));
    }

    #[test]
    fn top_albums_url_encodes_user() {
        let client = LastfmClient::new(&Config::default()).unwrap();
        let url = client.top_albums_url("dj shadow&co", Period::SevenDays);
        assert_eq!(url.host_str(), Some("lastfm.nkko.workers.dev"));
        assert_eq!(
            url.query(),
            Some("method=user.getTopAlbums&user=dj+shadow%26co&period=7day")
        );
    }
}
