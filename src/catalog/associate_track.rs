//! Track resolution.
//!
//! Matching runs an ordered list of strategies and the first hit wins. When
//! every strategy misses the track is created.

use super::backfill_identifier;
use crate::catalog_store::{CatalogStore, EntityKind, NewTrack, Track};
use crate::error::{storage, CatalogError, CatalogResult};
use crate::providers::MetadataProvider;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct AssociateTrackOpts {
    /// The first artist becomes the primary one.
    pub artist_ids: Vec<i64>,
    pub album_id: i64,
    pub title: String,
    pub musicbrainz_id: Option<Uuid>,
    /// Seconds.
    pub duration: Option<i64>,
}

struct MatchContext<'a> {
    store: &'a dyn CatalogStore,
    provider: &'a dyn MetadataProvider,
    opts: &'a AssociateTrackOpts,
}

type TrackStrategy =
    for<'a> fn(&'a MatchContext<'a>) -> BoxFuture<'a, CatalogResult<Option<Track>>>;

const TRACK_STRATEGIES: &[(&str, TrackStrategy)] = &[
    ("musicbrainz id", match_by_musicbrainz_id),
    ("title", match_by_title),
    ("provider title", match_by_provider_title),
];

/// Find the track described by `opts`, creating it when nothing matches.
pub async fn associate_track(
    store: &dyn CatalogStore,
    provider: &dyn MetadataProvider,
    opts: &AssociateTrackOpts,
) -> CatalogResult<Track> {
    if opts.title.trim().is_empty() {
        return Err(CatalogError::invalid_input("track title is required"));
    }
    if opts.artist_ids.is_empty() {
        return Err(CatalogError::invalid_input(
            "at least one artist id is required",
        ));
    }
    if opts.album_id == 0 {
        return Err(CatalogError::invalid_input("album id is required"));
    }

    let ctx = MatchContext {
        store,
        provider,
        opts,
    };
    if let Some(track) = run_strategies(&ctx).await? {
        return Ok(track);
    }

    match create_track(&ctx) {
        Err(e) if e.is_conflict() => {
            // Someone else created it between our lookups and the insert.
            debug!("Conflict creating track '{}', matching again", opts.title);
            run_strategies(&ctx).await?.ok_or(e)
        }
        other => other,
    }
}

async fn run_strategies(ctx: &MatchContext<'_>) -> CatalogResult<Option<Track>> {
    for (name, strategy) in TRACK_STRATEGIES {
        if let Some(track) = strategy(ctx).await? {
            debug!(
                "Matched track '{}' to {} by {}",
                ctx.opts.title, track.id, name
            );
            return Ok(Some(track));
        }
    }
    Ok(None)
}

fn match_by_musicbrainz_id<'a>(
    ctx: &'a MatchContext<'a>,
) -> BoxFuture<'a, CatalogResult<Option<Track>>> {
    async move {
        let Some(mbid) = ctx.opts.musicbrainz_id else {
            return Ok(None);
        };
        ctx.store
            .get_track_by_musicbrainz_id(&mbid)
            .map_err(storage("get_track_by_musicbrainz_id"))
    }
    .boxed()
}

/// Exact title match. When an identifier was supplied (and therefore missed),
/// a hit without an identifier gets it backfilled.
fn match_by_title<'a>(ctx: &'a MatchContext<'a>) -> BoxFuture<'a, CatalogResult<Option<Track>>> {
    async move {
        let found = ctx
            .store
            .get_track_by_title(&ctx.opts.title, ctx.opts.album_id, &ctx.opts.artist_ids)
            .map_err(storage("get_track_by_title"))?;
        let Some(mut track) = found else {
            return Ok(None);
        };
        if let Some(mbid) = ctx.opts.musicbrainz_id {
            track.musicbrainz_id = backfill_identifier(
                ctx.store,
                EntityKind::Track,
                track.id,
                &track.title,
                track.musicbrainz_id,
                &mbid,
            )?;
        }
        Ok(Some(track))
    }
    .boxed()
}

/// Ask the provider for the canonical title and retry the title match with it.
fn match_by_provider_title<'a>(
    ctx: &'a MatchContext<'a>,
) -> BoxFuture<'a, CatalogResult<Option<Track>>> {
    async move {
        let Some(mbid) = ctx.opts.musicbrainz_id else {
            return Ok(None);
        };
        let canonical = match ctx.provider.get_track(&mbid).await {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(
                    "Failed to look up recording {} for '{}': {}",
                    mbid, ctx.opts.title, e
                );
                return Ok(None);
            }
        };
        if canonical.title == ctx.opts.title {
            return Ok(None);
        }
        ctx.store
            .get_track_by_title(&canonical.title, ctx.opts.album_id, &ctx.opts.artist_ids)
            .map_err(storage("get_track_by_title"))
    }
    .boxed()
}

fn create_track(ctx: &MatchContext<'_>) -> CatalogResult<Track> {
    let opts = ctx.opts;
    let track = ctx
        .store
        .create_track(&NewTrack {
            title: opts.title.clone(),
            album_id: opts.album_id,
            musicbrainz_id: opts.musicbrainz_id,
            duration: opts.duration.unwrap_or(0).max(0),
            artist_ids: opts.artist_ids.clone(),
        })
        .map_err(storage("create_track"))?;
    match opts.musicbrainz_id {
        Some(mbid) => info!(
            "Created track {} '{}' with MusicBrainz id {}",
            track.id, track.title, mbid
        ),
        None => info!("Created track {} '{}'", track.id, track.title),
    }
    Ok(track)
}
