//! Shared fixtures for the sync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::metadata::{ChangedSeries, RemoteEpisode, RemoteMetadataClient, SeriesCandidate};
use bridge_traits::recorder::{RecorderIngestClient, RecordingRow};
use bridge_traits::time::{Clock, ManualClock};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use core_library::models::Series;
use core_library::tracking::Tracked;
use core_library::Repositories;
use core_runtime::SyncSettings;
use core_sync::{RecordingIngestor, SeriesLocks, SeriesReconciler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Remote metadata service
// ============================================================================

/// In-process metadata service with scripted search results and episode lists
pub struct FakeMetadataService {
    searches: Mutex<HashMap<String, Vec<SeriesCandidate>>>,
    episodes: Mutex<HashMap<i64, Vec<RemoteEpisode>>>,
    /// Changes with the instant they become visible to queries
    changes: Mutex<Vec<(ChangedSeries, DateTime<Utc>)>>,
    failing_searches: Mutex<u32>,
    failing_episode_fetches: Mutex<u32>,
    failing_change_queries: Mutex<u32>,
    clock: Arc<ManualClock>,
    /// Clock advance applied after every changed-since query
    change_query_step: Duration,
    pub search_calls: AtomicUsize,
    pub episode_calls: AtomicUsize,
    pub change_calls: AtomicUsize,
}

impl FakeMetadataService {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            searches: Mutex::new(HashMap::new()),
            episodes: Mutex::new(HashMap::new()),
            changes: Mutex::new(Vec::new()),
            failing_searches: Mutex::new(0),
            failing_episode_fetches: Mutex::new(0),
            failing_change_queries: Mutex::new(0),
            clock,
            change_query_step: Duration::minutes(5),
            search_calls: AtomicUsize::new(0),
            episode_calls: AtomicUsize::new(0),
            change_calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_search(&self, title: &str, candidates: Vec<SeriesCandidate>) {
        self.searches.lock().await.insert(title.to_string(), candidates);
    }

    pub async fn set_episodes(&self, remote_series_id: i64, episodes: Vec<RemoteEpisode>) {
        self.episodes.lock().await.insert(remote_series_id, episodes);
    }

    pub async fn push_change(&self, remote_series_id: i64, last_updated: DateTime<Utc>) {
        self.push_late_change(remote_series_id, last_updated, last_updated)
            .await;
    }

    /// A change stamped `last_updated` that the service only publishes at
    /// `visible_from`
    pub async fn push_late_change(
        &self,
        remote_series_id: i64,
        last_updated: DateTime<Utc>,
        visible_from: DateTime<Utc>,
    ) {
        let change = ChangedSeries {
            remote_series_id,
            last_updated,
        };
        self.changes.lock().await.push((change, visible_from));
    }

    pub async fn fail_next_searches(&self, count: u32) {
        *self.failing_searches.lock().await = count;
    }

    pub async fn fail_next_episode_fetches(&self, count: u32) {
        *self.failing_episode_fetches.lock().await = count;
    }

    pub async fn fail_next_change_queries(&self, count: u32) {
        *self.failing_change_queries.lock().await = count;
    }

    pub fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

async fn take_failure(counter: &Mutex<u32>) -> bool {
    let mut remaining = counter.lock().await;
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl RemoteMetadataClient for FakeMetadataService {
    async fn find_series_matches(
        &self,
        formatted_title: &str,
    ) -> BridgeResult<Vec<SeriesCandidate>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_searches).await {
            return Err(BridgeError::Remote {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(self
            .searches
            .lock()
            .await
            .get(formatted_title)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_episodes_for_series(
        &self,
        remote_series_id: i64,
    ) -> BridgeResult<Vec<RemoteEpisode>> {
        self.episode_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_episode_fetches).await {
            return Err(BridgeError::Parse("truncated episode list".to_string()));
        }
        Ok(self
            .episodes
            .lock()
            .await
            .get(&remote_series_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Only changes published by "now" are visible; every query moves the
    /// clock forward, like a real poll taking wall time
    async fn get_changed_since(&self, since: DateTime<Utc>) -> BridgeResult<Vec<ChangedSeries>> {
        self.change_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_change_queries).await {
            return Err(BridgeError::Remote {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        let now = self.clock.now();
        let visible = self
            .changes
            .lock()
            .await
            .iter()
            .filter(|(c, visible_from)| c.last_updated >= since && *visible_from <= now)
            .map(|(c, _)| *c)
            .collect();
        self.clock.advance(self.change_query_step);
        Ok(visible)
    }
}

pub fn remote_episode(
    id: i64,
    series_id: i64,
    season: i32,
    episode: i32,
    title: &str,
    first_aired: Option<NaiveDate>,
) -> RemoteEpisode {
    RemoteEpisode {
        id,
        series_id,
        season_number: Some(season),
        episode_number: Some(episode),
        absolute_number: None,
        title: Some(title.to_string()),
        first_aired,
        last_updated: None,
    }
}

// ============================================================================
// Recorder feed
// ============================================================================

/// Recorder feed served from a vector
pub struct FakeRecorder {
    rows: Mutex<Vec<RecordingRow>>,
    failing_fetches: Mutex<u32>,
    pub fetch_calls: AtomicUsize,
}

impl FakeRecorder {
    pub fn new(rows: Vec<RecordingRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            failing_fetches: Mutex::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_rows(&self, rows: Vec<RecordingRow>) {
        *self.rows.lock().await = rows;
    }

    pub async fn fail_next_fetches(&self, count: u32) {
        *self.failing_fetches.lock().await = count;
    }
}

#[async_trait]
impl RecorderIngestClient for FakeRecorder {
    async fn fetch_recordings(
        &self,
        offset: usize,
        limit: usize,
    ) -> BridgeResult<Vec<RecordingRow>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_fetches).await {
            return Err(BridgeError::OperationFailed("recorder offline".to_string()));
        }
        let rows = self.rows.lock().await;
        Ok(rows.iter().skip(offset).take(limit).cloned().collect())
    }
}

pub fn row(
    recording_id: i64,
    series_id: i64,
    series_title: &str,
    title: Option<&str>,
) -> RecordingRow {
    RecordingRow {
        recording_id,
        series_id,
        series_title: series_title.to_string(),
        title: title.map(str::to_string),
        episode_number: None,
        air_time: None,
        deleted_at: None,
        watched: false,
        suggestion: false,
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Every sync component wired over one in-memory store
pub struct Harness {
    pub repos: Repositories,
    pub clock: Arc<ManualClock>,
    pub remote: Arc<FakeMetadataService>,
    pub recorder: Arc<FakeRecorder>,
    pub locks: Arc<SeriesLocks>,
    pub settings: SyncSettings,
    pub reconciler: Arc<SeriesReconciler>,
    pub ingestor: Arc<RecordingIngestor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SyncSettings::default().with_recorder_page_size(2))
    }

    pub fn with_settings(settings: SyncSettings) -> Self {
        let repos = Repositories::in_memory();
        let clock = Arc::new(ManualClock::new(start()));
        let remote = Arc::new(FakeMetadataService::new(clock.clone()));
        let recorder = Arc::new(FakeRecorder::new(Vec::new()));
        let locks = Arc::new(SeriesLocks::new());

        let reconciler = Arc::new(
            SeriesReconciler::new(repos.clone(), remote.clone(), clock.clone(), settings.clone())
                .unwrap(),
        );
        let ingestor = Arc::new(RecordingIngestor::new(
            repos.clone(),
            recorder.clone(),
            clock.clone(),
            locks.clone(),
            &settings,
        ));

        Self {
            repos,
            clock,
            remote,
            recorder,
            locks,
            settings,
            reconciler,
            ingestor,
        }
    }

    /// Feed `rows` through the recorder ingest
    pub async fn ingest(&self, rows: Vec<RecordingRow>) {
        self.recorder.set_rows(rows).await;
        let report = self.ingestor.ingest_all().await.unwrap();
        assert_eq!(report.failures, 0);
    }

    pub async fn series_by_recorder_id(&self, recorder_series_id: i64) -> Series {
        self.repos
            .series
            .find_by_recorder_id(recorder_series_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn reload(&self, series: &Series) -> Series {
        self.repos.series.find_by_id(series.id).await.unwrap().unwrap()
    }

    /// Apply `edit` to a stored series and write the changed fields
    pub async fn edit_series(&self, series: &Series, edit: impl FnOnce(&mut Series)) {
        let mut tracked = Tracked::new(self.reload(series).await);
        edit(&mut *tracked);
        if let Some(fields) = tracked.take_changes() {
            self.repos.series.update(&tracked, &fields).await.unwrap();
        }
    }
}
