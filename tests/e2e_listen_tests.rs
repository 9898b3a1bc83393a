//! End-to-end tests for listen submission against a fake MusicBrainz
//!
//! Each test runs the full pipeline: credits resolved through the catalog and
//! the MusicBrainz client, listens appended, durations backfilled by the
//! background job and the result read back through the analytics.

mod common;

use chrono::DateTime;
use common::*;
use pezzottify_listen_catalog::analytics::Analytics;
use pezzottify_listen_catalog::background_jobs::jobs::DurationBackfillJob;
use pezzottify_listen_catalog::background_jobs::{JobContext, JobRunner};
use pezzottify_listen_catalog::catalog::ListenSubmission;
use pezzottify_listen_catalog::catalog_store::Scope;
use pezzottify_listen_catalog::timeframe::Timeframe;
use pezzottify_listen_catalog::CatalogStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap()
}

fn at(unix: i64) -> Option<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp(unix, 0)
}

fn kid_a_listen(track_title: &str, recording: Option<&str>, unix: i64) -> ListenSubmission {
    ListenSubmission {
        artist_names: vec!["Radiohead".to_string()],
        artist_musicbrainz_ids: vec![Some(uuid(RADIOHEAD_MBID))],
        album_title: "Kid A".to_string(),
        album_musicbrainz_id: Some(uuid(KID_A_MBID)),
        track_title: track_title.to_string(),
        track_musicbrainz_id: recording.map(uuid),
        listened_at: at(unix),
        client: Some("e2e".to_string()),
        ..Default::default()
    }
}

async fn kid_a_musicbrainz() -> FakeMusicBrainz {
    let musicbrainz = FakeMusicBrainz::spawn().await;
    musicbrainz.add_artist(RADIOHEAD_MBID, "Radiohead", &["レディオヘッド"]);
    musicbrainz.add_release(KID_A_MBID, "Kid A", RADIOHEAD_MBID);
    musicbrainz.add_recording(
        EVERYTHING_MBID,
        "Everything In Its Right Place",
        Some(EVERYTHING_LENGTH_MS),
    );
    musicbrainz.add_recording(IDIOTEQUE_MBID, "Idioteque", Some(IDIOTEQUE_LENGTH_MS));
    musicbrainz
}

#[tokio::test]
async fn test_listens_resolve_backfill_and_aggregate() {
    let musicbrainz = kid_a_musicbrainz().await;
    let catalog = TestCatalog::new(&musicbrainz.base_url);
    let listens = catalog.listen_service();

    let first = listens
        .submit(&kid_a_listen(
            "Everything In Its Right Place",
            Some(EVERYTHING_MBID),
            1_700_000_000,
        ))
        .await
        .unwrap();
    assert!(first.recorded);
    assert_eq!(first.track.duration, 0);
    assert_eq!(first.track.musicbrainz_id, Some(uuid(EVERYTHING_MBID)));

    // Artist aliases from MusicBrainz resolve to the same artist
    let radiohead = catalog
        .store
        .get_artist_by_musicbrainz_id(&uuid(RADIOHEAD_MBID))
        .unwrap()
        .unwrap();
    let by_alias = catalog
        .store
        .get_artist_by_name("レディオヘッド")
        .unwrap()
        .unwrap();
    assert_eq!(by_alias.id, radiohead.id);

    // Same play again is not recorded twice
    let replay = listens
        .submit(&kid_a_listen(
            "Everything In Its Right Place",
            Some(EVERYTHING_MBID),
            1_700_000_000,
        ))
        .await
        .unwrap();
    assert!(!replay.recorded);
    assert_eq!(replay.track.id, first.track.id);

    // A track first seen without an identifier...
    let plain = listens
        .submit(&ListenSubmission {
            artist_names: vec!["レディオヘッド".to_string()],
            album_title: "Kid A".to_string(),
            track_title: "Idioteque".to_string(),
            duration: Some(309),
            listened_at: at(1_700_000_600),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(plain.track.album_id, first.track.album_id);

    // ...is found again through the canonical recording title
    let remaster = listens
        .submit(&kid_a_listen(
            "Idioteque (Remastered)",
            Some(IDIOTEQUE_MBID),
            1_700_001_200,
        ))
        .await
        .unwrap();
    assert_eq!(remaster.track.id, plain.track.id);

    let shutdown = CancellationToken::new();
    let mut runner = JobRunner::new(JobContext::new(
        shutdown.clone(),
        catalog.store(),
        catalog.musicbrainz.clone(),
    ));
    let backfill = Arc::new(DurationBackfillJob::new(Duration::ZERO, 10));
    runner.register_job(backfill.clone());
    runner.run_job("duration_backfill").await.unwrap();

    let report = backfill.last_report().unwrap();
    assert_eq!(report.visited, 1);
    assert_eq!(report.updated, 1);
    assert!(!report.cancelled);
    let backfilled = catalog.store.get_track(first.track.id).unwrap().unwrap();
    assert_eq!(backfilled.duration, 251);

    let analytics = Analytics::new(catalog.store());
    let all_time = Timeframe::default();
    assert_eq!(analytics.count_listens(&all_time, Scope::All).unwrap(), 3);
    assert_eq!(
        analytics
            .count_listens(&all_time, Scope::Track(plain.track.id))
            .unwrap(),
        2
    );
    assert_eq!(
        analytics.count_time_listened(&all_time, Scope::All).unwrap(),
        251 + 2 * 309
    );
    assert_eq!(analytics.count_tracks(&all_time).unwrap(), 2);
    assert_eq!(analytics.count_artists(&all_time).unwrap(), 1);
    assert_eq!(analytics.count_new_albums(&all_time).unwrap(), 1);

    catalog.musicbrainz.stop().await;
}

#[tokio::test]
async fn test_known_identifiers_skip_musicbrainz() {
    let musicbrainz = kid_a_musicbrainz().await;
    let catalog = TestCatalog::new(&musicbrainz.base_url);
    let listens = catalog.listen_service();

    let first = listens
        .submit(&kid_a_listen("Idioteque", Some(IDIOTEQUE_MBID), 1_700_000_000))
        .await
        .unwrap();
    let lookups = musicbrainz.hits();
    assert!(lookups > 0);

    let second = listens
        .submit(&kid_a_listen("Idioteque", Some(IDIOTEQUE_MBID), 1_700_000_400))
        .await
        .unwrap();
    assert!(second.recorded);
    assert_eq!(second.track.id, first.track.id);
    assert_eq!(musicbrainz.hits(), lookups);

    catalog.musicbrainz.stop().await;
}

#[tokio::test]
async fn test_unknown_recording_still_records_listen() {
    let musicbrainz = FakeMusicBrainz::spawn().await;
    let catalog = TestCatalog::new(&musicbrainz.base_url);
    let listens = catalog.listen_service();
    let recording = Uuid::new_v4();

    let submitted = listens
        .submit(&ListenSubmission {
            artist_names: vec!["Unsigned".to_string()],
            album_title: "Demo".to_string(),
            track_title: "Untitled".to_string(),
            track_musicbrainz_id: Some(recording),
            listened_at: at(1_700_000_000),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(submitted.recorded);
    assert_eq!(submitted.track.musicbrainz_id, Some(recording));

    // The backfill can't find it either and leaves the track alone
    let ctx = JobContext::new(
        CancellationToken::new(),
        catalog.store(),
        catalog.musicbrainz.clone(),
    );
    let mut runner = JobRunner::new(ctx);
    let backfill = Arc::new(DurationBackfillJob::new(Duration::ZERO, 10));
    runner.register_job(backfill.clone());
    runner.run_job("duration_backfill").await.unwrap();

    let report = backfill.last_report().unwrap();
    assert_eq!(report.visited, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(
        catalog
            .store
            .get_track(submitted.track.id)
            .unwrap()
            .unwrap()
            .duration,
        0
    );

    catalog.musicbrainz.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_converge() {
    let musicbrainz = kid_a_musicbrainz().await;
    let catalog = TestCatalog::new(&musicbrainz.base_url);
    let listens = Arc::new(catalog.listen_service());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let listens = listens.clone();
        tasks.push(tokio::spawn(async move {
            listens
                .submit(&kid_a_listen(
                    "Everything In Its Right Place",
                    Some(EVERYTHING_MBID),
                    1_700_000_000 + i * 300,
                ))
                .await
        }));
    }
    let mut track_ids = Vec::new();
    for task in tasks {
        let submitted = task.await.unwrap().unwrap();
        assert!(submitted.recorded);
        track_ids.push(submitted.track.id);
    }
    track_ids.dedup();
    assert_eq!(track_ids.len(), 1);

    let analytics = Analytics::new(catalog.store());
    let all_time = Timeframe::default();
    assert_eq!(analytics.count_listens(&all_time, Scope::All).unwrap(), 8);
    assert_eq!(analytics.count_tracks(&all_time).unwrap(), 1);
    assert_eq!(analytics.count_albums(&all_time).unwrap(), 1);
    assert_eq!(analytics.count_artists(&all_time).unwrap(), 1);

    catalog.musicbrainz.stop().await;
}
