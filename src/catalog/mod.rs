//! Catalog resolution: mapping loosely identified listen metadata onto
//! deduplicated artists, albums and tracks.

mod admin;
mod aliases;
mod associate_album;
mod associate_artist;
mod associate_track;
mod backfill;
mod listens;

pub use admin::{
    add_artist_to_album, add_artist_to_track, delete_track, get_album_artists, get_track_artists,
    remove_artist_from_album, remove_artist_from_track, set_global_id,
};
pub use aliases::{add_aliases, delete_alias, get_aliases, set_primary_alias};
pub use associate_album::{associate_album, AssociateAlbumOpts};
pub use associate_artist::{associate_artists, AssociateArtistsOpts, MUSICBRAINZ_ALIAS_SOURCE};
pub use associate_track::{associate_track, AssociateTrackOpts};
pub use backfill::{backfill_track_durations, BackfillReport, DEFAULT_BACKFILL_PAGE_SIZE};
pub use listens::{
    ListenService, ListenSubmission, SubmittedListen, DEFAULT_NOW_PLAYING_TTL, DEFAULT_USER_ID,
};

use crate::catalog_store::{CatalogStore, EntityKind};
use crate::error::{storage, CatalogError, CatalogResult};
use tracing::{info, warn};
use uuid::Uuid;

fn ensure_exists(store: &dyn CatalogStore, kind: EntityKind, id: i64) -> CatalogResult<()> {
    if id <= 0 {
        return Err(CatalogError::invalid_input(format!("invalid {} id {}", kind, id)));
    }
    let exists = match kind {
        EntityKind::Artist => store.get_artist(id).map(|a| a.is_some()),
        EntityKind::Album => store.get_album(id).map(|a| a.is_some()),
        EntityKind::Track => store.get_track(id).map(|t| t.is_some()),
    }
    .map_err(storage("get_entity"))?;
    if exists {
        Ok(())
    } else {
        Err(CatalogError::not_found(format!("{} {}", kind, id)))
    }
}

/// Give an entity found without an identifier the one it was looked up
/// with. An identifier already stored is never replaced.
///
/// Returns the identifier the entity ends up with.
fn backfill_identifier(
    store: &dyn CatalogStore,
    kind: EntityKind,
    id: i64,
    name: &str,
    current: Option<Uuid>,
    mbid: &Uuid,
) -> CatalogResult<Option<Uuid>> {
    match current {
        None => {
            let updated = store
                .set_musicbrainz_id_if_missing(kind, id, mbid)
                .map_err(storage("set_musicbrainz_id_if_missing"))?;
            if updated {
                info!("Attached MusicBrainz id {} to {} {} '{}'", mbid, kind, id, name);
                Ok(Some(*mbid))
            } else {
                Ok(current)
            }
        }
        Some(existing) if existing != *mbid => {
            warn!(
                "{} {} '{}' already has MusicBrainz id {}, not replacing it with {}",
                kind, id, name, existing, mbid
            );
            Ok(Some(existing))
        }
        Some(existing) => Ok(Some(existing)),
    }
}
