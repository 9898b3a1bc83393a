//! Track duration backfill background job.
//!
//! Listens submitted with a MusicBrainz recording id but without a duration
//! leave tracks with `duration = 0`; this job asks MusicBrainz for the
//! recording length and fills it in.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::catalog::{backfill_track_durations, BackfillReport};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

pub struct DurationBackfillJob {
    /// Zero runs the job once.
    interval: Duration,
    page_size: usize,
    last_report: Mutex<Option<BackfillReport>>,
}

impl DurationBackfillJob {
    pub fn new(interval: Duration, page_size: usize) -> Self {
        Self {
            interval,
            page_size,
            last_report: Mutex::new(None),
        }
    }

    /// Report of the most recent completed (or cancelled) sweep.
    pub fn last_report(&self) -> Option<BackfillReport> {
        self.last_report.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundJob for DurationBackfillJob {
    fn id(&self) -> &'static str {
        "duration_backfill"
    }

    fn name(&self) -> &'static str {
        "Track Duration Backfill"
    }

    fn description(&self) -> &'static str {
        "Fill in missing track durations from MusicBrainz"
    }

    fn schedule(&self) -> JobSchedule {
        if self.interval.is_zero() {
            JobSchedule::Once
        } else {
            JobSchedule::Interval(self.interval)
        }
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let report = backfill_track_durations(
            ctx.catalog_store.as_ref(),
            ctx.metadata_provider.as_ref(),
            self.page_size,
            &ctx.cancellation_token,
        )
        .await
        .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        let cancelled = report.cancelled;
        *self.last_report.lock().unwrap() = Some(report);
        if cancelled {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::{create_tmp_store, seed_album, FakeProvider};
    use crate::catalog_store::{CatalogStore, NewTrack};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    #[test]
    fn test_schedule_from_interval() {
        assert_eq!(
            DurationBackfillJob::new(Duration::ZERO, 10).schedule(),
            JobSchedule::Once
        );
        assert_eq!(
            DurationBackfillJob::new(Duration::from_secs(3600), 10).schedule(),
            JobSchedule::Interval(Duration::from_secs(3600))
        );
    }

    #[tokio::test]
    async fn test_execute_records_report() {
        let (store, _tmp) = create_tmp_store();
        let (artist_id, album_id) = seed_album(&store);
        let mbid = Uuid::new_v4();
        let track = store
            .create_track(&NewTrack {
                title: "Song".to_string(),
                album_id,
                musicbrainz_id: Some(mbid),
                artist_ids: vec![artist_id],
                ..Default::default()
            })
            .unwrap();
        let store: Arc<dyn CatalogStore> = Arc::new(store);
        let provider = FakeProvider::default().with_track(mbid, "Song", Some(61_000));
        let ctx = JobContext::new(CancellationToken::new(), store.clone(), Arc::new(provider));

        let job = DurationBackfillJob::new(Duration::ZERO, 10);
        assert!(job.last_report().is_none());
        job.execute(&ctx).await.unwrap();

        assert_eq!(job.last_report().map(|r| r.updated), Some(1));
        assert_eq!(store.get_track(track.id).unwrap().unwrap().duration, 61);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_reports_cancellation() {
        let (store, _tmp) = create_tmp_store();
        let (artist_id, album_id) = seed_album(&store);
        store
            .create_track(&NewTrack {
                title: "Song".to_string(),
                album_id,
                musicbrainz_id: Some(Uuid::new_v4()),
                artist_ids: vec![artist_id],
                ..Default::default()
            })
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = JobContext::new(token, Arc::new(store), Arc::new(FakeProvider::default()));

        let job = DurationBackfillJob::new(Duration::ZERO, 10);
        assert!(matches!(job.execute(&ctx).await, Err(JobError::Cancelled)));
        assert_eq!(job.last_report().map(|r| r.cancelled), Some(true));
    }
}
