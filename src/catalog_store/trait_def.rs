//! CatalogStore trait definition.
//!
//! The resolver and the analytics layer only talk to storage through this
//! trait, so they can be exercised against any backend.

use super::models::*;
use crate::timeframe::TimeRange;
use anyhow::Result;
use thiserror::Error;
use uuid::Uuid;

/// Returned (wrapped in `anyhow::Error`) when a write is rejected by a
/// uniqueness constraint.
#[derive(Debug, Error)]
#[error("duplicate {kind}: {detail}")]
pub struct DuplicateEntity {
    pub kind: EntityKind,
    pub detail: String,
}

/// Trait for catalog storage backends.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Artists
    // =========================================================================

    fn get_artist(&self, id: i64) -> Result<Option<Artist>>;

    fn get_artist_by_musicbrainz_id(&self, mbid: &Uuid) -> Result<Option<Artist>>;

    /// Find an artist having `name` among its aliases.
    fn get_artist_by_name(&self, name: &str) -> Result<Option<Artist>>;

    /// Create an artist and its primary alias in one transaction.
    fn create_artist(&self, artist: &NewArtist) -> Result<Artist>;

    fn set_artist_image(&self, id: i64, image_url: &str) -> Result<()>;

    // =========================================================================
    // Albums
    // =========================================================================

    fn get_album(&self, id: i64) -> Result<Option<Album>>;

    fn get_album_by_musicbrainz_id(&self, mbid: &Uuid) -> Result<Option<Album>>;

    /// Find an album having `title` among its aliases and associated with
    /// every artist in `artist_ids`.
    fn get_album_by_title(&self, title: &str, artist_ids: &[i64]) -> Result<Option<Album>>;

    /// Create an album, its primary alias and its artist associations in one
    /// transaction.
    fn create_album(&self, album: &NewAlbum) -> Result<Album>;

    fn set_album_image(&self, id: i64, image_url: &str) -> Result<()>;

    // =========================================================================
    // Tracks
    // =========================================================================

    fn get_track(&self, id: i64) -> Result<Option<Track>>;

    fn get_track_by_musicbrainz_id(&self, mbid: &Uuid) -> Result<Option<Track>>;

    /// Find a track on `album_id` having `title` among its aliases and
    /// associated with every artist in `artist_ids`.
    fn get_track_by_title(
        &self,
        title: &str,
        album_id: i64,
        artist_ids: &[i64],
    ) -> Result<Option<Track>>;

    /// Create a track, its primary alias and its artist associations in one
    /// transaction. Artists missing from the album are added to it as
    /// non-primary.
    fn create_track(&self, track: &NewTrack) -> Result<Track>;

    fn update_track_duration(&self, id: i64, duration: i64) -> Result<()>;

    /// Keyset scan of tracks with an unknown duration and a known MusicBrainz
    /// id, ordered by ascending id, starting after `after_id`.
    fn get_tracks_missing_duration(&self, after_id: i64, limit: usize) -> Result<Vec<Track>>;

    /// Delete a track with its aliases, associations and listens, then drop
    /// album associations of artists no longer credited on the album (the
    /// album's primary artist is kept).
    fn delete_track(&self, id: i64) -> Result<()>;

    // =========================================================================
    // Identifiers
    // =========================================================================

    /// Set the MusicBrainz id of an entity only if it has none.
    /// Returns false when the entity already carried an id.
    fn set_musicbrainz_id_if_missing(&self, kind: EntityKind, id: i64, mbid: &Uuid)
        -> Result<bool>;

    /// Overwrite the MusicBrainz id of an entity.
    fn set_musicbrainz_id(&self, kind: EntityKind, id: i64, mbid: Option<&Uuid>) -> Result<()>;

    // =========================================================================
    // Aliases
    // =========================================================================

    fn get_aliases(&self, kind: EntityKind, id: i64) -> Result<Vec<Alias>>;

    /// Insert non-primary aliases, ignoring those already present.
    fn add_aliases(&self, kind: EntityKind, id: i64, aliases: &[String], source: &str)
        -> Result<()>;

    /// Make `alias` the only primary alias. Returns false when `alias` is not
    /// an alias of the entity, in which case nothing changes.
    fn set_primary_alias(&self, kind: EntityKind, id: i64, alias: &str) -> Result<bool>;

    /// Remove a non-primary alias. Primary aliases are left untouched.
    fn delete_alias(&self, kind: EntityKind, id: i64, alias: &str) -> Result<()>;

    // =========================================================================
    // Associations
    // =========================================================================

    fn get_track_artists(&self, track_id: i64) -> Result<Vec<ArtistAssociation>>;

    fn get_album_artists(&self, album_id: i64) -> Result<Vec<ArtistAssociation>>;

    /// Associate an artist with a track (non-primary), and with the track's album.
    fn add_artist_to_track(&self, track_id: i64, artist_id: i64) -> Result<()>;

    /// Remove a non-primary association. Primary associations are left untouched.
    fn remove_artist_from_track(&self, track_id: i64, artist_id: i64) -> Result<()>;

    fn add_artist_to_album(&self, album_id: i64, artist_id: i64) -> Result<()>;

    /// Remove a non-primary association. Primary associations are left untouched.
    fn remove_artist_from_album(&self, album_id: i64, artist_id: i64) -> Result<()>;

    // =========================================================================
    // Listens
    // =========================================================================

    /// Append a listen. Returns false if the same (user, track, instant) was
    /// already recorded.
    fn save_listen(&self, listen: &NewListen) -> Result<bool>;

    // =========================================================================
    // Aggregations
    // =========================================================================

    fn count_listens(&self, range: &TimeRange, scope: Scope) -> Result<i64>;

    /// Number of distinct entities of `kind` listened to in `range`.
    fn count_listened(&self, kind: EntityKind, range: &TimeRange) -> Result<i64>;

    /// Number of entities of `kind` whose first ever listen falls in `range`.
    fn count_new(&self, kind: EntityKind, range: &TimeRange) -> Result<i64>;

    /// Sum of the durations of the listened tracks, in seconds.
    fn count_time_listened(&self, range: &TimeRange, scope: Scope) -> Result<i64>;

    fn get_top_artists(&self, query: &TopQuery) -> Result<RankedPage<Artist>>;

    fn get_top_albums(&self, query: &TopQuery) -> Result<RankedPage<Album>>;

    fn get_top_tracks(&self, query: &TopQuery) -> Result<RankedPage<Track>>;

    /// Split the span between the first and the last listen in `scope` into
    /// `buckets` equal intervals and count the listens in each. Fails when
    /// `buckets` is 0 or above `MAX_INTEREST_BUCKETS`.
    fn get_interest(&self, scope: Scope, buckets: usize) -> Result<Vec<InterestBucket>>;

    /// Count listens in each of the given ranges.
    fn get_listen_activity(&self, ranges: &[TimeRange], scope: Scope) -> Result<Vec<i64>>;
}
