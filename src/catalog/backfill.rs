//! Duration backfill sweep.

use crate::catalog_store::CatalogStore;
use crate::error::{storage, CatalogResult};
use crate::providers::MetadataProvider;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_BACKFILL_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub visited: usize,
    pub updated: usize,
    /// Tracks for which the provider has no usable duration.
    pub skipped: usize,
    /// Provider or per-track update failures.
    pub failed: usize,
    pub cancelled: bool,
}

/// Fill in the duration of tracks that have a MusicBrainz id but no duration.
///
/// Tracks are scanned by ascending id; the cursor moves past every visited
/// track whatever happened to it, so the sweep always terminates. Only a
/// failure to read a page aborts it.
pub async fn backfill_track_durations(
    store: &dyn CatalogStore,
    provider: &dyn MetadataProvider,
    page_size: usize,
    cancel: &CancellationToken,
) -> CatalogResult<BackfillReport> {
    let page_size = page_size.max(1);
    let mut report = BackfillReport::default();
    let mut cursor = 0i64;
    info!("Starting track duration backfill");

    loop {
        let tracks = store
            .get_tracks_missing_duration(cursor, page_size)
            .map_err(storage("get_tracks_missing_duration"))?;
        if tracks.is_empty() {
            break;
        }

        for track in tracks {
            if cancel.is_cancelled() {
                info!("Track duration backfill cancelled after {} tracks", report.visited);
                report.cancelled = true;
                return Ok(report);
            }
            cursor = track.id;
            report.visited += 1;

            let Some(mbid) = track.musicbrainz_id else {
                report.skipped += 1;
                continue;
            };

            let canonical = match provider.get_track(&mbid).await {
                Ok(canonical) => canonical,
                Err(e) => {
                    warn!(
                        "Failed to fetch duration of track {} '{}': {}",
                        track.id, track.title, e
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let seconds = canonical.duration_ms.unwrap_or(0) / 1000;
            if seconds == 0 {
                debug!("No duration known for track {} '{}'", track.id, track.title);
                report.skipped += 1;
                continue;
            }

            match store.update_track_duration(track.id, seconds as i64) {
                Ok(()) => {
                    debug!(
                        "Set duration of track {} '{}' to {}s",
                        track.id, track.title, seconds
                    );
                    report.updated += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to update duration of track {} '{}': {:#}",
                        track.id, track.title, e
                    );
                    report.failed += 1;
                }
            }
        }
    }

    if report.visited == 0 {
        info!("No tracks need a duration backfill");
    } else {
        info!(
            "Track duration backfill complete: {} visited, {} updated, {} skipped, {} failed",
            report.visited, report.updated, report.skipped, report.failed
        );
    }
    Ok(report)
}
