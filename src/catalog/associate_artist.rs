//! Artist resolution for the credits of a listen.

use super::backfill_identifier;
use crate::catalog_store::{Artist, CatalogStore, EntityKind, NewArtist};
use crate::error::{storage, CatalogError, CatalogResult};
use crate::providers::{MetadataProvider, ProviderArtist};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Alias source tag for names coming from MusicBrainz.
pub const MUSICBRAINZ_ALIAS_SOURCE: &str = "MusicBrainz";

#[derive(Debug, Clone, Default)]
pub struct AssociateArtistsOpts {
    /// Credited names, primary artist first.
    pub names: Vec<String>,
    /// Identifiers aligned with `names` by index.
    pub musicbrainz_ids: Vec<Option<Uuid>>,
}

/// Resolve every credited artist, in credit order and without duplicates.
pub async fn associate_artists(
    store: &dyn CatalogStore,
    provider: &dyn MetadataProvider,
    opts: &AssociateArtistsOpts,
) -> CatalogResult<Vec<Artist>> {
    let mut artists: Vec<Artist> = Vec::new();
    for (index, name) in opts.names.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let mbid = opts.musicbrainz_ids.get(index).copied().flatten();
        let artist = associate_artist(store, provider, name, mbid).await?;
        if !artists.iter().any(|a| a.id == artist.id) {
            artists.push(artist);
        }
    }
    if artists.is_empty() {
        return Err(CatalogError::invalid_input(
            "at least one artist name is required",
        ));
    }
    Ok(artists)
}

async fn associate_artist(
    store: &dyn CatalogStore,
    provider: &dyn MetadataProvider,
    name: &str,
    mbid: Option<Uuid>,
) -> CatalogResult<Artist> {
    let mut canonical: Option<ProviderArtist> = None;
    if let Some(found) = match_artist(store, provider, name, mbid, &mut canonical).await? {
        return Ok(found);
    }

    match create_artist(store, name, mbid, canonical.as_ref()) {
        Err(e) if e.is_conflict() => {
            debug!("Conflict creating artist '{}', matching again", name);
            match_artist(store, provider, name, mbid, &mut canonical)
                .await?
                .ok_or(e)
        }
        other => other,
    }
}

/// Identifier, then name, then the canonical name from the provider.
async fn match_artist(
    store: &dyn CatalogStore,
    provider: &dyn MetadataProvider,
    name: &str,
    mbid: Option<Uuid>,
    canonical: &mut Option<ProviderArtist>,
) -> CatalogResult<Option<Artist>> {
    if let Some(mbid) = mbid {
        if let Some(artist) = store
            .get_artist_by_musicbrainz_id(&mbid)
            .map_err(storage("get_artist_by_musicbrainz_id"))?
        {
            return Ok(Some(artist));
        }
    }

    if let Some(mut artist) = store
        .get_artist_by_name(name)
        .map_err(storage("get_artist_by_name"))?
    {
        if let Some(mbid) = mbid {
            artist.musicbrainz_id = backfill_identifier(
                store,
                EntityKind::Artist,
                artist.id,
                &artist.name,
                artist.musicbrainz_id,
                &mbid,
            )?;
        }
        return Ok(Some(artist));
    }

    let Some(mbid) = mbid else {
        return Ok(None);
    };
    if canonical.is_none() {
        match provider.get_artist(&mbid).await {
            Ok(found) => *canonical = Some(found),
            Err(e) => {
                warn!("Failed to look up artist {} for '{}': {}", mbid, name, e);
                return Ok(None);
            }
        }
    }
    let Some(canonical_name) = canonical.as_ref().map(|c| c.name.as_str()) else {
        return Ok(None);
    };
    if canonical_name == name {
        return Ok(None);
    }
    let found = store
        .get_artist_by_name(canonical_name)
        .map_err(storage("get_artist_by_name"))?;
    Ok(found)
}

fn create_artist(
    store: &dyn CatalogStore,
    name: &str,
    mbid: Option<Uuid>,
    canonical: Option<&ProviderArtist>,
) -> CatalogResult<Artist> {
    let artist = store
        .create_artist(&NewArtist {
            name: name.to_string(),
            musicbrainz_id: mbid,
            image_url: None,
        })
        .map_err(storage("create_artist"))?;
    info!("Created artist {} '{}'", artist.id, artist.name);

    if let Some(canonical) = canonical {
        let mut aliases = canonical.aliases.clone();
        aliases.push(canonical.name.clone());
        aliases.retain(|alias| alias != name && !alias.trim().is_empty());
        if !aliases.is_empty() {
            store
                .add_aliases(
                    EntityKind::Artist,
                    artist.id,
                    &aliases,
                    MUSICBRAINZ_ALIAS_SOURCE,
                )
                .map_err(storage("add_aliases"))?;
        }
    }
    Ok(artist)
}
