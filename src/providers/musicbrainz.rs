//! MusicBrainz web service client.

use super::{MetadataProvider, ProviderAlbum, ProviderArtist, ProviderError, ProviderTrack};
use crate::request_queue::{send_request, RequestQueue, RequestQueueConfig};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_MUSICBRAINZ_URL: &str = "https://musicbrainz.org/ws/2";

/// MusicBrainz id of the "Various Artists" pseudo-artist.
const VARIOUS_ARTISTS_MBID: &str = "89ad4ac3-39f7-470e-963a-56509c546377";

#[derive(Debug, Deserialize)]
struct MbRecording {
    title: String,
    #[serde(default)]
    length: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MbRelease {
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct MbArtistCredit {
    artist: MbCreditedArtist,
}

#[derive(Debug, Deserialize)]
struct MbCreditedArtist {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MbArtist {
    name: String,
    #[serde(default)]
    aliases: Vec<MbAlias>,
}

#[derive(Debug, Deserialize)]
struct MbAlias {
    name: String,
}

pub struct MusicBrainzClient {
    base_url: String,
    queue: RequestQueue,
}

impl MusicBrainzClient {
    /// MusicBrainz asks anonymous clients for at most one request per second.
    pub fn default_queue_config(user_agent: &str) -> RequestQueueConfig {
        RequestQueueConfig {
            max_concurrent_workers: 1,
            max_requests_per_interval: 1,
            user_agent: user_agent.to_string(),
            ..Default::default()
        }
    }

    pub fn new(base_url: &str, queue_config: RequestQueueConfig) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            queue: RequestQueue::start("musicbrainz", queue_config)?,
        })
    }

    pub async fn stop(&self) {
        self.queue.stop().await;
    }

    async fn get_entity<T: DeserializeOwned>(
        &self,
        entity: &str,
        id: &Uuid,
        inc: Option<&str>,
    ) -> Result<T, ProviderError> {
        let mut url = format!("{}/{}/{}?fmt=json", self.base_url, entity, id);
        if let Some(inc) = inc {
            url.push_str("&inc=");
            url.push_str(inc);
        }
        debug!("Fetching MusicBrainz {} {}", entity, id);

        let body = send_request(&self.queue, move |client| {
            client.get(url).header("Accept", "application/json")
        })
        .await
        .map_err(|e| ProviderError::from_request(e, || format!("{} {}", entity, id)))?;

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl MetadataProvider for MusicBrainzClient {
    async fn get_track(&self, id: &Uuid) -> Result<ProviderTrack, ProviderError> {
        let recording: MbRecording = self.get_entity("recording", id, None).await?;
        Ok(ProviderTrack {
            title: recording.title,
            duration_ms: recording.length.filter(|ms| *ms > 0),
        })
    }

    async fn get_album(&self, id: &Uuid) -> Result<ProviderAlbum, ProviderError> {
        let release: MbRelease = self
            .get_entity("release", id, Some("artist-credits"))
            .await?;
        let various_artists = release
            .artist_credit
            .iter()
            .any(|credit| credit.artist.id == VARIOUS_ARTISTS_MBID);
        Ok(ProviderAlbum {
            title: release.title,
            various_artists,
        })
    }

    async fn get_artist(&self, id: &Uuid) -> Result<ProviderArtist, ProviderError> {
        let artist: MbArtist = self.get_entity("artist", id, Some("aliases")).await?;
        let mut aliases: Vec<String> = Vec::with_capacity(artist.aliases.len());
        for alias in artist.aliases {
            if alias.name != artist.name && !aliases.contains(&alias.name) {
                aliases.push(alias.name);
            }
        }
        Ok(ProviderArtist {
            name: artist.name,
            aliases,
        })
    }
}
