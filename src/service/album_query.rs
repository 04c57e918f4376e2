use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::CollageError;
use crate::types::lastfm::{Album, Period, TopAlbumsResponse};

/// A permitted album fetch. `generation` ties the eventual result back to
/// the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRequest {
    pub generation: u64,
    pub username: String,
    pub period: Period,
}

/// Last.fm query inputs, the rate-limit timestamp, and the last result.
#[derive(Debug, Clone)]
pub struct AlbumQuery {
    username: String,
    period: Period,
    cooldown: Duration,
    last_request: Option<DateTime<Utc>>,
    generation: u64,
    albums: Vec<Album>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumQueryView {
    pub username: String,
    pub period: Period,
    pub last_request: Option<DateTime<Utc>>,
    pub albums: Vec<Album>,
}

impl AlbumQuery {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            username: String::new(),
            period: Period::default(),
            cooldown,
            last_request: None,
            generation: 0,
            albums: Vec::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into().trim().to_string();
    }

    pub fn set_period(&mut self, period: Period) {
        self.period = period;
    }

    /// Time left before another request is allowed; zero when allowed now.
    pub fn remaining_cooldown(&self, now: DateTime<Utc>) -> Duration {
        let Some(last) = self.last_request else {
            return Duration::ZERO;
        };
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        self.cooldown.saturating_sub(elapsed)
    }

    pub fn can_request(&self, now: DateTime<Utc>) -> bool {
        self.remaining_cooldown(now).is_zero()
    }

    /// Stamp the request time and hand out a request, or refuse it.
    pub fn begin_request(&mut self, now: DateTime<Utc>) -> Result<AlbumRequest, CollageError> {
        if self.username.is_empty() {
            return Err(CollageError::MissingUsername);
        }
        let remaining = self.remaining_cooldown(now);
        if !remaining.is_zero() {
            let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Err(CollageError::RateLimited { retry_after_secs });
        }

        self.last_request = Some(now);
        self.generation += 1;
        debug!(generation = self.generation, user = %self.username, period = %self.period, "album request started");
        Ok(AlbumRequest {
            generation: self.generation,
            username: self.username.clone(),
            period: self.period,
        })
    }

    /// Store a finished fetch. Results of superseded requests are dropped.
    /// A failed fetch (`None`) leaves no albums, same as before any fetch.
    pub fn complete(&mut self, generation: u64, result: Option<TopAlbumsResponse>) -> bool {
        if generation != self.generation {
            debug!(generation, latest = self.generation, "stale album result dropped");
            return false;
        }
        self.albums = result.map(|resp| resp.topalbums.album).unwrap_or_default();
        true
    }

    pub fn find(&self, rank: u32) -> Option<&Album> {
        self.albums.iter().find(|a| a.rank() == Some(rank))
    }

    pub fn view(&self) -> AlbumQueryView {
        AlbumQueryView {
            username: self.username.clone(),
            period: self.period,
            last_request: self.last_request,
            albums: self.albums.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn response(names: &[&str]) -> TopAlbumsResponse {
        let albums: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                serde_json::json!({
                    "artist": {"url": "", "name": "Artist", "mbid": ""},
                    "image": [{"size": "large", "#text": format!("https://img/{name}.png")}],
                    "mbid": "",
                    "url": "",
                    "playcount": "10",
                    "@attr": {"rank": (i + 1).to_string()},
                    "name": name,
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({"topalbums": {"album": albums}})).unwrap()
    }

    fn query() -> AlbumQuery {
        let mut q = AlbumQuery::new(Duration::from_secs(60));
        q.set_username("rj");
        q
    }

    #[test]
    fn requires_username() {
        let mut q = AlbumQuery::new(Duration::from_secs(60));
        q.set_username("   ");
        assert!(matches!(
            q.begin_request(Utc::now()),
            Err(CollageError::MissingUsername)
        ));
    }

    #[test]
    fn blocks_requests_for_the_cooldown() {
        let mut q = query();
        let t0 = Utc::now();
        assert!(q.can_request(t0));
        q.begin_request(t0).unwrap();

        let later = t0 + TimeDelta::seconds(59);
        assert!(!q.can_request(later));
        match q.begin_request(later) {
            Err(CollageError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 1),
            other => panic!("expected rate limit, got {other:?}"),
        }

        let after = t0 + TimeDelta::seconds(60);
        assert!(q.can_request(after));
        assert_eq!(q.begin_request(after).unwrap().generation, 2);
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut q = AlbumQuery::new(Duration::ZERO);
        q.set_username("rj");
        let first = q.begin_request(Utc::now()).unwrap();
        let second = q.begin_request(Utc::now()).unwrap();

        assert!(!q.complete(first.generation, Some(response(&["old"]))));
        assert!(q.albums().is_empty());
        assert!(q.complete(second.generation, Some(response(&["a", "b"]))));
        assert_eq!(q.find(2).map(|a| a.name.as_str()), Some("b"));
    }

    #[test]
    fn failed_fetch_clears_previous_albums() {
        let mut q = AlbumQuery::new(Duration::ZERO);
        q.set_username("rj");
        let r = q.begin_request(Utc::now()).unwrap();
        q.complete(r.generation, Some(response(&["old"])));
        assert_eq!(q.albums().len(), 1);

        let r = q.begin_request(Utc::now()).unwrap();
        assert!(q.complete(r.generation, None));
        assert!(q.albums().is_empty());
        assert!(q.find(1).is_none());
    }

    #[test]
    fn stale_failure_does_not_clear_newer_albums() {
        let mut q = AlbumQuery::new(Duration::ZERO);
        q.set_username("rj");
        let first = q.begin_request(Utc::now()).unwrap();
        let second = q.begin_request(Utc::now()).unwrap();
        q.complete(second.generation, Some(response(&["fresh"])));
        assert!(!q.complete(first.generation, None));
        assert_eq!(q.albums().len(), 1);
    }
}
