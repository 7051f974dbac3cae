//! Catalog service façade and bootstrap helpers.
//!
//! This crate wires host-provided implementations (remote metadata client,
//! recorder feed, clock, repositories) into the sync core and exposes the
//! operations a host schedules or an operator triggers. Hosts without their
//! own persistence can start from [`CatalogDependencies::in_memory`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    metadata::RemoteMetadataClient,
    recorder::RecorderIngestClient,
    time::{Clock, SystemClock},
};
use core_library::models::{ErrorLogEntry, ErrorLogId, SeriesCounters, SeriesId};
use core_library::Repositories;
use core_runtime::CatalogConfig;
use core_sync::{
    CounterDrift, CounterMaintainer, CycleReport, ErrorWorkflow, FullSyncReport,
    IncrementalChangeFinder, IngestReport, RecordingIngestor, SeriesLocks, SeriesReconciler,
    SyncOutcome, SyncScheduler, VerificationReport,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregated handle to everything the core needs from its host.
#[derive(Clone)]
pub struct CatalogDependencies {
    pub repositories: Repositories,
    pub metadata: Arc<dyn RemoteMetadataClient>,
    pub recorder: Arc<dyn RecorderIngestClient>,
    pub clock: Arc<dyn Clock>,
}

impl CatalogDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(
        repositories: Repositories,
        metadata: Arc<dyn RemoteMetadataClient>,
        recorder: Arc<dyn RecorderIngestClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repositories,
            metadata,
            recorder,
            clock,
        }
    }

    /// In-memory repositories and the system clock.
    pub fn in_memory(
        metadata: Arc<dyn RemoteMetadataClient>,
        recorder: Arc<dyn RecorderIngestClient>,
    ) -> Self {
        Self::new(
            Repositories::in_memory(),
            metadata,
            recorder,
            Arc::new(SystemClock),
        )
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CatalogService {
    deps: Arc<CatalogDependencies>,
    config: Arc<CatalogConfig>,
    scheduler: Arc<SyncScheduler>,
    locks: Arc<SeriesLocks>,
    ingestor: Arc<RecordingIngestor>,
    change_finder: Arc<IncrementalChangeFinder>,
    errors: Arc<ErrorWorkflow>,
    counters: Arc<CounterMaintainer>,
}

impl CatalogService {
    /// Create a new service from the provided dependencies.
    pub fn new(deps: CatalogDependencies, config: CatalogConfig) -> Result<Self> {
        config.validate()?;

        let repos = deps.repositories.clone();
        let settings = config.sync.clone();
        let locks = Arc::new(SeriesLocks::new());

        let reconciler = Arc::new(SeriesReconciler::new(
            repos.clone(),
            deps.metadata.clone(),
            deps.clock.clone(),
            settings.clone(),
        )?);
        let ingestor = Arc::new(RecordingIngestor::new(
            repos.clone(),
            deps.recorder.clone(),
            deps.clock.clone(),
            locks.clone(),
            &settings,
        ));
        let scheduler = Arc::new(
            SyncScheduler::new(
                repos.clone(),
                reconciler,
                locks.clone(),
                deps.clock.clone(),
                settings.clone(),
            )
            .with_ingestor(ingestor.clone()),
        );
        let change_finder = Arc::new(IncrementalChangeFinder::new(
            repos.clone(),
            deps.metadata.clone(),
            scheduler.clone(),
            deps.clock.clone(),
            config.change_finder.clone(),
        )?);
        let errors = Arc::new(ErrorWorkflow::new(
            repos.clone(),
            deps.clock.clone(),
            settings,
        ));
        let counters = Arc::new(CounterMaintainer::new(repos, deps.clock.clone()));

        Ok(Self {
            deps: Arc::new(deps),
            config: Arc::new(config),
            scheduler,
            locks,
            ingestor,
            change_finder,
            errors,
            counters,
        })
    }

    /// Create a service from a JSON configuration document.
    pub fn from_json(deps: CatalogDependencies, json: &str) -> Result<Self> {
        Self::new(deps, CatalogConfig::from_json(json)?)
    }

    /// Access the underlying dependency bundle.
    pub fn dependencies(&self) -> Arc<CatalogDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Per-series write locks shared by every writer in the service.
    ///
    /// Hosts writing series data outside the service should hold the
    /// series' guard while they do.
    pub fn series_locks(&self) -> Arc<SeriesLocks> {
        Arc::clone(&self.locks)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Ingest the recorder feed, then reconcile every eligible series.
    pub async fn run_full_pass(&self) -> Result<FullSyncReport> {
        Ok(self.scheduler.run_full_pass().await?)
    }

    /// Reconcile one series now.
    pub async fn sync_series(&self, series_id: SeriesId) -> Result<SyncOutcome> {
        Ok(self.scheduler.sync_series(series_id).await?)
    }

    /// Ingest the recorder feed without reconciling.
    pub async fn ingest_recordings(&self) -> Result<IngestReport> {
        Ok(self.ingestor.ingest_all().await?)
    }

    // =========================================================================
    // Change discovery
    // =========================================================================

    pub async fn run_change_cycle(&self) -> Result<CycleReport> {
        Ok(self.change_finder.run_cycle().await?)
    }

    pub async fn verify_change_window(&self) -> Result<VerificationReport> {
        Ok(self.change_finder.verify_window().await?)
    }

    /// Start the change-finder loop on the tokio runtime.
    ///
    /// The loop stops between cycles once `cancel` fires.
    pub fn spawn_change_finder(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let finder = Arc::clone(&self.change_finder);
        info!("Spawning change finder");
        tokio::spawn(async move { finder.run(cancel).await })
    }

    // =========================================================================
    // Operator operations
    // =========================================================================

    pub async fn list_open_errors(&self) -> Result<Vec<ErrorLogEntry>> {
        Ok(self.errors.list_open().await?)
    }

    /// Stop remote matching for the entry's series on its next sync.
    pub async fn ignore_error(&self, id: ErrorLogId) -> Result<ErrorLogEntry> {
        Ok(self.errors.set_ignore(id).await?)
    }

    /// Approve a remote name for a name-mismatch entry.
    pub async fn choose_name(&self, id: ErrorLogId, name: &str) -> Result<ErrorLogEntry> {
        Ok(self.errors.choose_name(id, name).await?)
    }

    /// Compare stored counters with a fresh scan, waiting for any running
    /// write to the series.
    pub async fn verify_counters(&self, series_id: SeriesId) -> Result<CounterDrift> {
        let _guard = self.locks.lock(series_id).await;
        Ok(self.counters.verify(series_id).await?)
    }

    /// Overwrite stored counters with a fresh scan.
    ///
    /// Holds the series lock so no delta lands between the scan and the write.
    pub async fn recompute_counters(&self, series_id: SeriesId) -> Result<SeriesCounters> {
        let _guard = self.locks.lock(series_id).await;
        Ok(self.counters.recompute_from_scratch(series_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::metadata::{ChangedSeries, RemoteEpisode, SeriesCandidate};
    use bridge_traits::recorder::RecordingRow;
    use chrono::{DateTime, Utc};
    use mockall::mock;

    mock! {
        MetadataClient {}

        #[async_trait]
        impl RemoteMetadataClient for MetadataClient {
            async fn find_series_matches(
                &self,
                formatted_title: &str,
            ) -> BridgeResult<Vec<SeriesCandidate>>;
            async fn get_episodes_for_series(
                &self,
                remote_series_id: i64,
            ) -> BridgeResult<Vec<RemoteEpisode>>;
            async fn get_changed_since(
                &self,
                since: DateTime<Utc>,
            ) -> BridgeResult<Vec<ChangedSeries>>;
        }
    }

    mock! {
        Recorder {}

        #[async_trait]
        impl RecorderIngestClient for Recorder {
            async fn fetch_recordings(
                &self,
                offset: usize,
                limit: usize,
            ) -> BridgeResult<Vec<RecordingRow>>;
        }
    }

    fn recording(id: i64, title: &str) -> RecordingRow {
        RecordingRow {
            recording_id: id,
            series_id: 7,
            series_title: "Foo Show".to_string(),
            title: Some(title.to_string()),
            episode_number: None,
            air_time: None,
            deleted_at: None,
            watched: false,
            suggestion: false,
        }
    }

    #[tokio::test]
    async fn test_full_pass_over_feed() {
        let mut metadata = MockMetadataClient::new();
        metadata
            .expect_find_series_matches()
            .withf(|title| title == "foo+show")
            .times(1)
            .returning(|_| Ok(vec![SeriesCandidate::new(42, "Foo Show")]));
        metadata
            .expect_get_episodes_for_series()
            .withf(|id| *id == 42)
            .times(1)
            .returning(|_| {
                Ok(vec![RemoteEpisode {
                    id: 1001,
                    series_id: 42,
                    season_number: Some(1),
                    episode_number: Some(1),
                    absolute_number: None,
                    title: Some("Pilot".to_string()),
                    first_aired: None,
                    last_updated: None,
                }])
            });

        let mut recorder = MockRecorder::new();
        recorder
            .expect_fetch_recordings()
            .returning(|offset, _| match offset {
                0 => Ok(vec![recording(1, "Pilot")]),
                _ => Ok(Vec::new()),
            });

        let service = CatalogService::new(
            CatalogDependencies::in_memory(Arc::new(metadata), Arc::new(recorder)),
            CatalogConfig::default(),
        )
        .unwrap();

        let report = service.run_full_pass().await.unwrap();
        assert_eq!(report.ingest.map(|i| i.recordings_added), Some(1));
        assert_eq!(report.tallies().succeeded, 1);
        assert!(service.list_open_errors().await.unwrap().is_empty());

        let series = service
            .dependencies()
            .repositories
            .series
            .find_by_recorder_id(7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(series.counters.matched, 1);
        assert!(service.verify_counters(series.id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_not_found_surfaces_to_operator() {
        let mut metadata = MockMetadataClient::new();
        metadata
            .expect_find_series_matches()
            .returning(|_| Ok(Vec::new()));

        let mut recorder = MockRecorder::new();
        recorder
            .expect_fetch_recordings()
            .returning(|offset, _| match offset {
                0 => Ok(vec![recording(1, "Pilot")]),
                _ => Ok(Vec::new()),
            });

        let service = CatalogService::new(
            CatalogDependencies::in_memory(Arc::new(metadata), Arc::new(recorder)),
            CatalogConfig::default(),
        )
        .unwrap();

        let report = service.run_full_pass().await.unwrap();
        assert_eq!(report.tallies().not_found, 1);

        let open = service.list_open_errors().await.unwrap();
        assert_eq!(open.len(), 1);
        let ignored = service.ignore_error(open[0].id).await.unwrap();
        assert!(ignored.ignore);

        let outcome = service.sync_series(open[0].series_id).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Ignored);
        assert!(service.list_open_errors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recompute_waits_for_series_writer() {
        let mut metadata = MockMetadataClient::new();
        metadata.expect_find_series_matches().returning(|_| Ok(Vec::new()));
        let mut recorder = MockRecorder::new();
        recorder
            .expect_fetch_recordings()
            .returning(|offset, _| match offset {
                0 => Ok(vec![recording(1, "Pilot")]),
                _ => Ok(Vec::new()),
            });

        let service = CatalogService::new(
            CatalogDependencies::in_memory(Arc::new(metadata), Arc::new(recorder)),
            CatalogConfig::default(),
        )
        .unwrap();
        service.ingest_recordings().await.unwrap();
        let series = service
            .dependencies()
            .repositories
            .series
            .find_by_recorder_id(7)
            .await
            .unwrap()
            .unwrap();

        let guard = service.series_locks().lock(series.id).await;
        let recompute = {
            let service = service.clone();
            let series_id = series.id;
            tokio::spawn(async move { service.recompute_counters(series_id).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!recompute.is_finished());

        drop(guard);
        let counters = recompute.await.unwrap().unwrap();
        assert_eq!(counters.unmatched, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let deps = CatalogDependencies::in_memory(
            Arc::new(MockMetadataClient::new()),
            Arc::new(MockRecorder::new()),
        );
        let result = CatalogService::from_json(deps, r#"{ "sync": { "recorder_page_size": 0 } }"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
