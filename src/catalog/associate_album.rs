//! Album resolution, the coarser sibling of track resolution.

use super::backfill_identifier;
use crate::catalog_store::{Album, CatalogStore, EntityKind, NewAlbum};
use crate::error::{storage, CatalogError, CatalogResult};
use crate::providers::{MetadataProvider, ProviderAlbum};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct AssociateAlbumOpts {
    /// The first artist becomes the primary one.
    pub artist_ids: Vec<i64>,
    pub title: String,
    pub musicbrainz_id: Option<Uuid>,
    pub various_artists: bool,
}

pub async fn associate_album(
    store: &dyn CatalogStore,
    provider: &dyn MetadataProvider,
    opts: &AssociateAlbumOpts,
) -> CatalogResult<Album> {
    if opts.title.trim().is_empty() {
        return Err(CatalogError::invalid_input("album title is required"));
    }
    if opts.artist_ids.is_empty() {
        return Err(CatalogError::invalid_input(
            "at least one artist id is required",
        ));
    }

    let mut canonical: Option<ProviderAlbum> = None;
    if let Some(album) = match_album(store, provider, opts, &mut canonical).await? {
        return Ok(album);
    }

    match create_album(store, opts, canonical.as_ref()) {
        Err(e) if e.is_conflict() => {
            debug!("Conflict creating album '{}', matching again", opts.title);
            match_album(store, provider, opts, &mut canonical)
                .await?
                .ok_or(e)
        }
        other => other,
    }
}

async fn match_album(
    store: &dyn CatalogStore,
    provider: &dyn MetadataProvider,
    opts: &AssociateAlbumOpts,
    canonical: &mut Option<ProviderAlbum>,
) -> CatalogResult<Option<Album>> {
    if let Some(mbid) = opts.musicbrainz_id {
        if let Some(album) = store
            .get_album_by_musicbrainz_id(&mbid)
            .map_err(storage("get_album_by_musicbrainz_id"))?
        {
            return Ok(Some(album));
        }
    }

    if let Some(mut album) = store
        .get_album_by_title(&opts.title, &opts.artist_ids)
        .map_err(storage("get_album_by_title"))?
    {
        if let Some(mbid) = opts.musicbrainz_id {
            album.musicbrainz_id = backfill_identifier(
                store,
                EntityKind::Album,
                album.id,
                &album.title,
                album.musicbrainz_id,
                &mbid,
            )?;
        }
        return Ok(Some(album));
    }

    let Some(mbid) = opts.musicbrainz_id else {
        return Ok(None);
    };
    if canonical.is_none() {
        match provider.get_album(&mbid).await {
            Ok(found) => *canonical = Some(found),
            Err(e) => {
                warn!("Failed to look up release {} for '{}': {}", mbid, opts.title, e);
                return Ok(None);
            }
        }
    }
    let Some(canonical_title) = canonical.as_ref().map(|c| c.title.as_str()) else {
        return Ok(None);
    };
    if canonical_title == opts.title {
        return Ok(None);
    }
    store
        .get_album_by_title(canonical_title, &opts.artist_ids)
        .map_err(storage("get_album_by_title"))
}

fn create_album(
    store: &dyn CatalogStore,
    opts: &AssociateAlbumOpts,
    canonical: Option<&ProviderAlbum>,
) -> CatalogResult<Album> {
    let various_artists = opts.various_artists || canonical.is_some_and(|c| c.various_artists);
    let album = store
        .create_album(&NewAlbum {
            title: opts.title.clone(),
            musicbrainz_id: opts.musicbrainz_id,
            artist_ids: opts.artist_ids.clone(),
            various_artists,
            image_url: None,
        })
        .map_err(storage("create_album"))?;
    info!("Created album {} '{}'", album.id, album.title);
    Ok(album)
}
