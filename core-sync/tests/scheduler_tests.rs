//! Integration tests for full passes, retry triage and recorder ingest

mod common;

use bridge_traits::metadata::SeriesCandidate;
use chrono::Duration;
use common::{remote_episode, row, Harness};
use core_runtime::SyncSettings;
use core_sync::{ResyncTrigger, RowChange, SyncOutcome, SyncScheduler};
use std::sync::Arc;

fn scheduler(h: &Harness) -> SyncScheduler {
    SyncScheduler::new(
        h.repos.clone(),
        h.reconciler.clone(),
        h.locks.clone(),
        h.clock.clone(),
        h.settings.clone(),
    )
}

/// "Foo Show" resolves, "Bar" is unknown upstream, "Baz" is excluded
async fn three_series(h: &Harness) {
    h.ingest(vec![
        row(1, 7, "Foo Show", Some("Pilot")),
        row(2, 8, "Bar", Some("Opening")),
        row(3, 9, "Baz", None),
    ])
    .await;
    h.remote
        .set_search("foo+show", vec![SeriesCandidate::new(42, "Foo Show")])
        .await;
    h.remote
        .set_episodes(42, vec![remote_episode(1001, 42, 1, 1, "Pilot", None)])
        .await;

    let baz = h.series_by_recorder_id(9).await;
    h.edit_series(&baz, |s| s.ignore_remote_match = true).await;
}

// ============================================================================
// Full passes
// ============================================================================

#[tokio::test]
async fn test_full_pass_tallies_outcomes_and_records_run() {
    let h = Harness::new();
    three_series(&h).await;
    let scheduler = scheduler(&h);

    let report = scheduler.run_full_pass().await.unwrap();
    let tallies = report.tallies();
    assert_eq!(tallies.succeeded, 1);
    assert_eq!(tallies.not_found, 1);
    assert_eq!(tallies.ignored, 1);
    assert_eq!(tallies.deferred, 0);
    assert_eq!(tallies.errors, 0);
    assert!(report.run.succeeded);
    assert!(report.run.completed_at.is_some());
    assert!(report.ingest.is_none());

    let latest = h.repos.sync_runs.latest_successful_full().await.unwrap().unwrap();
    assert_eq!(latest.id, report.run.id);
    assert_eq!(latest.tallies, report.run.tallies);

    let foo = h.series_by_recorder_id(7).await;
    assert_eq!(foo.counters.matched, 1);
    // Excluded series never reach the remote service
    assert_eq!(h.remote.searches(), 2);
}

#[tokio::test]
async fn test_series_at_threshold_waits_out_cooldown() {
    let h = Harness::with_settings(
        SyncSettings::default()
            .with_retry_threshold(2)
            .with_retry_cooldown_secs(3600),
    );
    three_series(&h).await;
    let scheduler = scheduler(&h);

    scheduler.run_full_pass().await.unwrap();
    scheduler.run_full_pass().await.unwrap();
    let bar = h.series_by_recorder_id(8).await;
    assert_eq!(bar.consecutive_errors, 2);

    let report = scheduler.run_full_pass().await.unwrap();
    assert_eq!(report.tallies().deferred, 1);
    assert_eq!(report.tallies().not_found, 0);
    assert_eq!(report.tallies().succeeded, 1);

    h.clock.advance(Duration::seconds(3600));
    let report = scheduler.run_full_pass().await.unwrap();
    assert_eq!(report.tallies().deferred, 0);
    assert_eq!(report.tallies().not_found, 1);
    assert_eq!(h.series_by_recorder_id(8).await.consecutive_errors, 3);
}

#[tokio::test]
async fn test_series_below_threshold_retried_immediately() {
    let h = Harness::new();
    three_series(&h).await;
    let scheduler = scheduler(&h);

    scheduler.run_full_pass().await.unwrap();
    let report = scheduler.run_full_pass().await.unwrap();
    assert_eq!(report.tallies().deferred, 0);
    assert_eq!(report.tallies().not_found, 1);
}

#[tokio::test]
async fn test_full_pass_ingests_recorder_feed_first() {
    let h = Harness::new();
    h.recorder
        .set_rows(vec![
            row(1, 7, "Foo Show", Some("Pilot")),
            row(2, 7, "Foo Show", Some("Second")),
        ])
        .await;
    h.remote
        .set_search("foo+show", vec![SeriesCandidate::new(42, "Foo Show")])
        .await;
    h.remote
        .set_episodes(
            42,
            vec![
                remote_episode(1001, 42, 1, 1, "Pilot", None),
                remote_episode(1002, 42, 1, 2, "Second", None),
            ],
        )
        .await;
    let scheduler = scheduler(&h).with_ingestor(h.ingestor.clone());

    let report = scheduler.run_full_pass().await.unwrap();
    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.recordings_added, 2);
    assert_eq!(ingest.series_created, 1);
    assert_eq!(report.tallies().succeeded, 1);

    let foo = h.series_by_recorder_id(7).await;
    assert_eq!(foo.counters.matched, 2);
    assert_eq!(foo.counters.unmatched, 0);
}

#[tokio::test]
async fn test_failed_ingest_does_not_stop_the_pass() {
    let h = Harness::new();
    three_series(&h).await;
    h.recorder.fail_next_fetches(1).await;
    let scheduler = scheduler(&h).with_ingestor(h.ingestor.clone());

    let report = scheduler.run_full_pass().await.unwrap();
    assert!(report.ingest.is_none());
    assert_eq!(report.tallies().succeeded, 1);
}

#[tokio::test]
async fn test_targeted_resync_through_trigger() {
    let h = Harness::new();
    three_series(&h).await;
    let scheduler: Arc<dyn ResyncTrigger> = Arc::new(scheduler(&h));
    let foo = h.series_by_recorder_id(7).await;

    let outcome = scheduler.resync(foo.id).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Success(_)));

    let baz = h.series_by_recorder_id(9).await;
    assert_eq!(scheduler.resync(baz.id).await.unwrap(), SyncOutcome::Ignored);
}

#[tokio::test]
async fn test_concurrent_resyncs_of_one_series_serialize() {
    let h = Harness::new();
    three_series(&h).await;
    let scheduler = Arc::new(scheduler(&h));
    let foo = h.series_by_recorder_id(7).await;
    let foo_id = foo.id;

    let a = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.sync_series(foo_id).await })
    };
    let b = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.sync_series(foo_id).await })
    };
    assert!(matches!(a.await.unwrap().unwrap(), SyncOutcome::Success(_)));
    assert!(matches!(b.await.unwrap().unwrap(), SyncOutcome::Success(_)));

    let foo = h.reload(&foo).await;
    assert_eq!(foo.counters.matched, 1);
    assert_eq!(
        h.repos.episodes.list_live_by_series(foo.id).await.unwrap().len(),
        1
    );
    assert!(h.reconciler.counters().verify(foo.id).await.unwrap().is_consistent());
}

// ============================================================================
// Recorder ingest
// ============================================================================

#[tokio::test]
async fn test_ingest_pages_until_short_page() {
    let h = Harness::new();
    h.recorder
        .set_rows((1..=5).map(|id| row(id, 7, "Foo Show", None)).collect())
        .await;

    let report = h.ingestor.ingest_all().await.unwrap();
    assert_eq!(report.pages, 3);
    assert_eq!(report.rows, 5);
    assert_eq!(report.recordings_added, 5);
    assert_eq!(report.series_created, 1);

    let again = h.ingestor.ingest_all().await.unwrap();
    assert_eq!(again.unchanged, 5);
    assert_eq!(again.recordings_added, 0);

    let foo = h.series_by_recorder_id(7).await;
    assert_eq!(foo.counters.unmatched, 5);
    assert_eq!(foo.counters.active, 5);
}

#[tokio::test]
async fn test_ingest_full_last_page_fetches_empty_page() {
    let h = Harness::new();
    h.recorder
        .set_rows((1..=4).map(|id| row(id, 7, "Foo Show", None)).collect())
        .await;

    let report = h.ingestor.ingest_all().await.unwrap();
    assert_eq!(report.pages, 3);
    assert_eq!(report.rows, 4);
}

#[tokio::test]
async fn test_ingest_row_failure_is_counted_not_fatal() {
    let h = Harness::new();
    h.recorder
        .set_rows(vec![
            row(1, 7, "Foo Show", None),
            row(2, 8, "   ", None),
            row(3, 7, "Foo Show", None),
        ])
        .await;

    let report = h.ingestor.ingest_all().await.unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(report.recordings_added, 2);
    assert!(h.repos.series.find_by_recorder_id(8).await.unwrap().is_none());
}

#[tokio::test]
async fn test_ingest_fetch_failure_is_an_error() {
    let h = Harness::new();
    h.recorder.fail_next_fetches(1).await;
    assert!(h.ingestor.ingest_all().await.is_err());
}

#[tokio::test]
async fn test_ingest_row_changes() {
    let h = Harness::new();
    let original = row(1, 7, "Foo Show", Some("Pilot"));

    assert_eq!(
        h.ingestor.ingest_row(&original).await.unwrap(),
        RowChange::Added {
            series_created: true
        }
    );
    assert_eq!(
        h.ingestor.ingest_row(&original).await.unwrap(),
        RowChange::Unchanged
    );

    let mut changed = original.clone();
    changed.watched = true;
    changed.deleted_at = Some(common::start());
    // Immutable fields are ignored
    changed.title = Some("Renamed".to_string());
    assert_eq!(
        h.ingestor.ingest_row(&changed).await.unwrap(),
        RowChange::Updated {
            deleted: true,
            watched_toggled: true
        }
    );

    let recording = h
        .repos
        .recordings
        .find_by_recorder_id(1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recording.title.as_deref(), Some("Pilot"));
    assert!(recording.watched);
    assert!(recording.is_deleted());

    // Undelete is not applied
    let mut restored = changed.clone();
    restored.deleted_at = None;
    assert_eq!(
        h.ingestor.ingest_row(&restored).await.unwrap(),
        RowChange::Unchanged
    );

    let foo = h.series_by_recorder_id(7).await;
    assert!(h.reconciler.counters().verify(foo.id).await.unwrap().is_consistent());
}
