//! Listen submission: resolve the credits of a play, then record it.

use super::{associate_album, associate_artists, associate_track};
use super::{AssociateAlbumOpts, AssociateArtistsOpts, AssociateTrackOpts};
use crate::cache::ExpiringCache;
use crate::catalog_store::{Album, Artist, CatalogStore, NewListen, Track};
use crate::error::{storage, CatalogError, CatalogResult};
use crate::providers::{ImageProvider, MetadataProvider};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Now-playing lifetime when the track duration is unknown.
pub const DEFAULT_NOW_PLAYING_TTL: Duration = Duration::from_secs(10 * 60);

/// Listening history is single-tenant.
pub const DEFAULT_USER_ID: i64 = 1;

#[derive(Debug, Clone, Default)]
pub struct ListenSubmission {
    /// Credited artists, primary first.
    pub artist_names: Vec<String>,
    /// Aligned with `artist_names` by index.
    pub artist_musicbrainz_ids: Vec<Option<Uuid>>,
    /// Falls back to the track title when empty.
    pub album_title: String,
    pub album_musicbrainz_id: Option<Uuid>,
    pub track_title: String,
    pub track_musicbrainz_id: Option<Uuid>,
    /// Seconds.
    pub duration: Option<i64>,
    /// Defaults to the submission time.
    pub listened_at: Option<DateTime<Utc>>,
    pub client: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SubmittedListen {
    pub track: Track,
    /// False when the same play was already recorded.
    pub recorded: bool,
}

pub struct ListenService {
    store: Arc<dyn CatalogStore>,
    provider: Arc<dyn MetadataProvider>,
    images: Option<Arc<dyn ImageProvider>>,
    now_playing: Arc<ExpiringCache<i64, i64>>,
}

impl ListenService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        provider: Arc<dyn MetadataProvider>,
        now_playing: Arc<ExpiringCache<i64, i64>>,
    ) -> Self {
        Self {
            store,
            provider,
            images: None,
            now_playing,
        }
    }

    /// Look up artwork for newly seen artists and albums.
    pub fn with_image_provider(mut self, images: Arc<dyn ImageProvider>) -> Self {
        self.images = Some(images);
        self
    }

    /// Resolve the submission to a track and append a listen.
    pub async fn submit(&self, submission: &ListenSubmission) -> CatalogResult<SubmittedListen> {
        let track = self.resolve(submission).await?;
        let listened_at = submission.listened_at.unwrap_or_else(Utc::now);
        let recorded = self
            .store
            .save_listen(&NewListen {
                user_id: submission.user_id.unwrap_or(DEFAULT_USER_ID),
                track_id: track.id,
                listened_at,
                client: submission.client.clone(),
            })
            .map_err(storage("save_listen"))?;
        if recorded {
            info!("Recorded listen of track {} '{}'", track.id, track.title);
        } else {
            debug!("Listen of track {} at {} already recorded", track.id, listened_at);
        }
        Ok(SubmittedListen { track, recorded })
    }

    /// Resolve the submission and mark the track as playing for its duration.
    pub async fn submit_now_playing(&self, submission: &ListenSubmission) -> CatalogResult<Track> {
        let track = self.resolve(submission).await?;
        let ttl = if track.duration > 0 {
            Duration::from_secs(track.duration as u64)
        } else {
            DEFAULT_NOW_PLAYING_TTL
        };
        self.now_playing.set_with_ttl(
            submission.user_id.unwrap_or(DEFAULT_USER_ID),
            track.id,
            ttl,
        );
        debug!("Now playing track {} for {:?}", track.id, ttl);
        Ok(track)
    }

    /// Track currently playing for `user_id`, the default user when `None`.
    pub fn now_playing(&self, user_id: Option<i64>) -> CatalogResult<Option<Track>> {
        let Some(track_id) = self.now_playing.get(&user_id.unwrap_or(DEFAULT_USER_ID)) else {
            return Ok(None);
        };
        self.store.get_track(track_id).map_err(storage("get_track"))
    }

    /// Record a listen of a known track at `listened_at_unix`.
    pub fn submit_listen_for_track(
        &self,
        track_id: i64,
        listened_at_unix: i64,
        client: Option<String>,
    ) -> CatalogResult<bool> {
        let listened_at = DateTime::from_timestamp(listened_at_unix, 0).ok_or_else(|| {
            CatalogError::invalid_input(format!("timestamp {} out of range", listened_at_unix))
        })?;
        if listened_at > Utc::now() {
            return Err(CatalogError::invalid_input(
                "cannot record a listen in the future",
            ));
        }
        if self
            .store
            .get_track(track_id)
            .map_err(storage("get_track"))?
            .is_none()
        {
            return Err(CatalogError::not_found(format!("track {}", track_id)));
        }
        self.store
            .save_listen(&NewListen {
                user_id: DEFAULT_USER_ID,
                track_id,
                listened_at,
                client,
            })
            .map_err(storage("save_listen"))
    }

    async fn resolve(&self, submission: &ListenSubmission) -> CatalogResult<Track> {
        let store = self.store.as_ref();
        let provider = self.provider.as_ref();

        let artists = associate_artists(
            store,
            provider,
            &AssociateArtistsOpts {
                names: submission.artist_names.clone(),
                musicbrainz_ids: submission.artist_musicbrainz_ids.clone(),
            },
        )
        .await?;
        let artist_ids: Vec<i64> = artists.iter().map(|a| a.id).collect();

        let album_title = if submission.album_title.trim().is_empty() {
            submission.track_title.clone()
        } else {
            submission.album_title.clone()
        };
        let album = associate_album(
            store,
            provider,
            &AssociateAlbumOpts {
                artist_ids: artist_ids.clone(),
                title: album_title,
                musicbrainz_id: submission.album_musicbrainz_id,
                various_artists: false,
            },
        )
        .await?;

        let track = associate_track(
            store,
            provider,
            &AssociateTrackOpts {
                artist_ids,
                album_id: album.id,
                title: submission.track_title.clone(),
                musicbrainz_id: submission.track_musicbrainz_id,
                duration: submission.duration,
            },
        )
        .await?;

        self.fill_missing_images(&artists, &album).await;
        Ok(track)
    }

    /// Best effort: failures are logged and the listen goes on.
    async fn fill_missing_images(&self, artists: &[Artist], album: &Album) {
        let Some(images) = &self.images else {
            return;
        };
        for artist in artists.iter().filter(|a| a.image_url.is_none()) {
            match images
                .get_artist_image(artist.musicbrainz_id.as_ref(), &artist.name)
                .await
            {
                Ok(Some(url)) => {
                    if let Err(e) = self.store.set_artist_image(artist.id, &url) {
                        warn!("Failed to store image of artist {}: {:#}", artist.id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("No image for artist '{}': {}", artist.name, e),
            }
        }
        if album.image_url.is_none() {
            let Some(primary) = artists.first() else {
                return;
            };
            match images
                .get_album_image(album.musicbrainz_id.as_ref(), &primary.name, &album.title)
                .await
            {
                Ok(Some(url)) => {
                    if let Err(e) = self.store.set_album_image(album.id, &url) {
                        warn!("Failed to store image of album {}: {:#}", album.id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("No image for album '{}': {}", album.title, e),
            }
        }
    }
}
