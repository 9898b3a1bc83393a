//! Last.fm artwork lookups.

use super::{ImageProvider, ProviderError};
use crate::request_queue::{send_request, RequestQueue, RequestQueueConfig};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_LASTFM_URL: &str = "http://ws.audioscrobbler.com/2.0/";

/// Last.fm error code for unknown artists and albums.
const LASTFM_NOT_FOUND: i64 = 6;

/// Image sizes from the largest to the smallest.
const SIZE_PREFERENCE: [&str; 5] = ["mega", "extralarge", "large", "medium", "small"];

#[derive(Debug, Deserialize)]
struct LfmImage {
    #[serde(rename = "#text")]
    url: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct LfmEntity {
    #[serde(default)]
    image: Vec<LfmImage>,
}

#[derive(Debug, Deserialize)]
struct LfmResponse {
    #[serde(default)]
    album: Option<LfmEntity>,
    #[serde(default)]
    artist: Option<LfmEntity>,
    #[serde(default)]
    error: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl LfmResponse {
    fn into_images(self) -> Result<Vec<LfmImage>, ProviderError> {
        if let Some(code) = self.error {
            return Err(ProviderError::Api {
                code,
                message: self.message.unwrap_or_default(),
            });
        }
        Ok(self
            .album
            .or(self.artist)
            .map(|entity| entity.image)
            .unwrap_or_default())
    }
}

fn select_best_image(images: &[LfmImage]) -> Option<String> {
    SIZE_PREFERENCE.iter().find_map(|size| {
        images
            .iter()
            .find(|image| image.size == *size && !image.url.is_empty())
            .map(|image| image.url.clone())
    })
}

pub struct LastFmClient {
    api_key: String,
    base_url: String,
    queue: RequestQueue,
}

impl LastFmClient {
    pub fn default_queue_config(user_agent: &str) -> RequestQueueConfig {
        RequestQueueConfig {
            max_concurrent_workers: 5,
            max_requests_per_interval: 5,
            user_agent: user_agent.to_string(),
            ..Default::default()
        }
    }

    pub fn new(api_key: &str, base_url: &str, queue_config: RequestQueueConfig) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            queue: RequestQueue::start("lastfm", queue_config)?,
        })
    }

    pub async fn stop(&self) {
        self.queue.stop().await;
    }

    async fn fetch_images(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<LfmImage>, ProviderError> {
        let mut url = format!(
            "{}?method={}&api_key={}&format=json",
            self.base_url,
            method,
            urlencoding::encode(&self.api_key)
        );
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        debug!("Sending Last.fm {} request", method);

        let body = send_request(&self.queue, move |client| {
            client.get(url).header("Accept", "application/json")
        })
        .await
        .map_err(|e| ProviderError::from_request(e, || method.to_string()))?;

        let response: LfmResponse = serde_json::from_slice(&body)?;
        response.into_images()
    }

    /// Try the MusicBrainz id first, then the names with autocorrect.
    async fn lookup(
        &self,
        method: &str,
        mbid: Option<&Uuid>,
        names: &[(&str, &str)],
    ) -> Result<Option<String>, ProviderError> {
        if let Some(mbid) = mbid {
            let mbid = mbid.to_string();
            match self.fetch_images(method, &[("mbid", mbid.as_str())]).await {
                Ok(images) => {
                    if let Some(url) = select_best_image(&images) {
                        return Ok(Some(url));
                    }
                }
                Err(ProviderError::Api { code, message }) => {
                    debug!("Last.fm {} by mbid failed ({}): {}", method, code, message);
                }
                Err(e) => return Err(e),
            }
        }

        let mut params = names.to_vec();
        params.push(("autocorrect", "1"));
        match self.fetch_images(method, &params).await {
            Ok(images) => Ok(select_best_image(&images)),
            Err(ProviderError::Api { code, .. }) if code == LASTFM_NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ImageProvider for LastFmClient {
    async fn get_artist_image(
        &self,
        mbid: Option<&Uuid>,
        artist: &str,
    ) -> Result<Option<String>, ProviderError> {
        self.lookup("artist.getInfo", mbid, &[("artist", artist)])
            .await
    }

    async fn get_album_image(
        &self,
        mbid: Option<&Uuid>,
        artist: &str,
        album: &str,
    ) -> Result<Option<String>, ProviderError> {
        self.lookup("album.getInfo", mbid, &[("artist", artist), ("album", album)])
            .await
    }
}
