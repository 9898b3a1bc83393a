//! Manual corrections: artist credits, identifiers and track deletion.

use super::ensure_exists;
use crate::catalog_store::{ArtistAssociation, CatalogStore, EntityKind};
use crate::error::{storage, CatalogResult};
use tracing::info;
use uuid::Uuid;

pub fn get_track_artists(
    store: &dyn CatalogStore,
    track_id: i64,
) -> CatalogResult<Vec<ArtistAssociation>> {
    ensure_exists(store, EntityKind::Track, track_id)?;
    store
        .get_track_artists(track_id)
        .map_err(storage("get_track_artists"))
}

pub fn get_album_artists(
    store: &dyn CatalogStore,
    album_id: i64,
) -> CatalogResult<Vec<ArtistAssociation>> {
    ensure_exists(store, EntityKind::Album, album_id)?;
    store
        .get_album_artists(album_id)
        .map_err(storage("get_album_artists"))
}

/// Credit an artist on a track, and on the track's album.
pub fn add_artist_to_track(store: &dyn CatalogStore, track_id: i64, artist_id: i64) -> CatalogResult<()> {
    ensure_exists(store, EntityKind::Track, track_id)?;
    ensure_exists(store, EntityKind::Artist, artist_id)?;
    store
        .add_artist_to_track(track_id, artist_id)
        .map_err(storage("add_artist_to_track"))
}

/// Removing the primary artist is a no-op.
pub fn remove_artist_from_track(
    store: &dyn CatalogStore,
    track_id: i64,
    artist_id: i64,
) -> CatalogResult<()> {
    ensure_exists(store, EntityKind::Track, track_id)?;
    store
        .remove_artist_from_track(track_id, artist_id)
        .map_err(storage("remove_artist_from_track"))
}

pub fn add_artist_to_album(store: &dyn CatalogStore, album_id: i64, artist_id: i64) -> CatalogResult<()> {
    ensure_exists(store, EntityKind::Album, album_id)?;
    ensure_exists(store, EntityKind::Artist, artist_id)?;
    store
        .add_artist_to_album(album_id, artist_id)
        .map_err(storage("add_artist_to_album"))
}

/// Removing the primary artist is a no-op.
pub fn remove_artist_from_album(
    store: &dyn CatalogStore,
    album_id: i64,
    artist_id: i64,
) -> CatalogResult<()> {
    ensure_exists(store, EntityKind::Album, album_id)?;
    store
        .remove_artist_from_album(album_id, artist_id)
        .map_err(storage("remove_artist_from_album"))
}

/// Overwrite (or clear) the MusicBrainz id of an entity.
///
/// Fails with `Conflict` when another entity of the same kind holds the id.
pub fn set_global_id(
    store: &dyn CatalogStore,
    kind: EntityKind,
    id: i64,
    mbid: Option<Uuid>,
) -> CatalogResult<()> {
    ensure_exists(store, kind, id)?;
    store
        .set_musicbrainz_id(kind, id, mbid.as_ref())
        .map_err(storage("set_musicbrainz_id"))?;
    match mbid {
        Some(mbid) => info!("Set MusicBrainz id of {} {} to {}", kind, id, mbid),
        None => info!("Cleared MusicBrainz id of {} {}", kind, id),
    }
    Ok(())
}

/// Delete a track together with its aliases, credits and listens.
pub fn delete_track(store: &dyn CatalogStore, track_id: i64) -> CatalogResult<()> {
    ensure_exists(store, EntityKind::Track, track_id)?;
    store
        .delete_track(track_id)
        .map_err(storage("delete_track"))?;
    info!("Deleted track {}", track_id);
    Ok(())
}
