//! External metadata sources.
//!
//! Providers are only consulted for identifier-assisted lookups and for
//! backfills. They are never the source of truth for the catalog.

mod lastfm;
mod musicbrainz;
#[cfg(test)]
mod stub_server;

pub use lastfm::{LastFmClient, DEFAULT_LASTFM_URL};
pub use musicbrainz::{MusicBrainzClient, DEFAULT_MUSICBRAINZ_URL};

use crate::request_queue::RequestError;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Provider returned error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Not found at provider: {0}")]
    NotFound(String),

    #[error("Provider disabled")]
    Disabled,
}

impl ProviderError {
    /// Map a 404 from the transport to `NotFound`.
    fn from_request(err: RequestError, what: impl FnOnce() -> String) -> Self {
        match err {
            RequestError::Status { status: 404, .. } => ProviderError::NotFound(what()),
            other => ProviderError::Request(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTrack {
    pub title: String,
    /// Milliseconds, when the provider knows it.
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAlbum {
    pub title: String,
    pub various_artists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderArtist {
    pub name: String,
    pub aliases: Vec<String>,
}

/// Canonical metadata looked up by global identifier.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_track(&self, id: &Uuid) -> Result<ProviderTrack, ProviderError>;

    async fn get_album(&self, id: &Uuid) -> Result<ProviderAlbum, ProviderError>;

    async fn get_artist(&self, id: &Uuid) -> Result<ProviderArtist, ProviderError>;
}

/// Artwork lookup. `Ok(None)` means the provider has no image.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn get_artist_image(
        &self,
        mbid: Option<&Uuid>,
        artist: &str,
    ) -> Result<Option<String>, ProviderError>;

    async fn get_album_image(
        &self,
        mbid: Option<&Uuid>,
        artist: &str,
        album: &str,
    ) -> Result<Option<String>, ProviderError>;
}

/// Stand-in used when metadata lookups are turned off in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl MetadataProvider for DisabledProvider {
    async fn get_track(&self, _id: &Uuid) -> Result<ProviderTrack, ProviderError> {
        Err(ProviderError::Disabled)
    }

    async fn get_album(&self, _id: &Uuid) -> Result<ProviderAlbum, ProviderError> {
        Err(ProviderError::Disabled)
    }

    async fn get_artist(&self, _id: &Uuid) -> Result<ProviderArtist, ProviderError> {
        Err(ProviderError::Disabled)
    }
}

#[async_trait]
impl ImageProvider for DisabledProvider {
    async fn get_artist_image(
        &self,
        _mbid: Option<&Uuid>,
        _artist: &str,
    ) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }

    async fn get_album_image(
        &self,
        _mbid: Option<&Uuid>,
        _artist: &str,
        _album: &str,
    ) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }
}
