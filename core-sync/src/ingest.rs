//! # Recording Ingest
//!
//! Pulls the recorder's paged feed into the catalog.
//!
//! Per row:
//! - the series is found by its recorder id, or created from the row's title
//! - an unknown recording becomes a `Recording` plus a recording-only
//!   `Episode`, counted as unmatched
//! - a known recording only picks up deletion and watched state; every other
//!   field is immutable once stored
//!
//! A failing row is logged and counted; the rest of the feed still ingests.
//! A failing page fetch ends the run with an error.

use crate::counters::{self, CounterMaintainer};
use crate::error::{Result, SyncError};
use crate::locks::SeriesLocks;
use bridge_traits::recorder::{RecorderIngestClient, RecordingRow};
use bridge_traits::time::Clock;
use core_library::models::{Episode, Recording, RecordingId, Series, SeriesCounters};
use core_library::tracking::Tracked;
use core_library::Repositories;
use core_runtime::SyncSettings;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What one row did to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Added { series_created: bool },
    Updated { deleted: bool, watched_toggled: bool },
    Unchanged,
}

/// Totals for one run over the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub rows: usize,
    pub series_created: usize,
    pub recordings_added: usize,
    pub deletions: usize,
    pub watched_changes: usize,
    pub unchanged: usize,
    pub failures: usize,
}

impl IngestReport {
    fn record(&mut self, change: RowChange) {
        match change {
            RowChange::Added { series_created } => {
                self.recordings_added += 1;
                self.series_created += series_created as usize;
            }
            RowChange::Updated {
                deleted,
                watched_toggled,
            } => {
                self.deletions += deleted as usize;
                self.watched_changes += watched_toggled as usize;
            }
            RowChange::Unchanged => self.unchanged += 1,
        }
    }
}

/// Ingests the recorder feed
pub struct RecordingIngestor {
    repos: Repositories,
    client: Arc<dyn RecorderIngestClient>,
    clock: Arc<dyn Clock>,
    locks: Arc<SeriesLocks>,
    counters: CounterMaintainer,
    page_size: usize,
}

impl RecordingIngestor {
    pub fn new(
        repos: Repositories,
        client: Arc<dyn RecorderIngestClient>,
        clock: Arc<dyn Clock>,
        locks: Arc<SeriesLocks>,
        settings: &SyncSettings,
    ) -> Self {
        let counters = CounterMaintainer::new(repos.clone(), clock.clone());
        Self {
            repos,
            client,
            clock,
            locks,
            counters,
            page_size: settings.recorder_page_size.max(1),
        }
    }

    /// Read the whole feed, page by page, until a short page
    #[instrument(skip(self), fields(page_size = self.page_size))]
    pub async fn ingest_all(&self) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut offset = 0usize;

        loop {
            let page = self.client.fetch_recordings(offset, self.page_size).await?;
            report.pages += 1;
            debug!(offset, rows = page.len(), "Fetched recorder page");

            for row in &page {
                report.rows += 1;
                match self.ingest_row(row).await {
                    Ok(change) => report.record(change),
                    Err(e) => {
                        error!(
                            recording_id = row.recording_id,
                            recorder_series_id = row.series_id,
                            error = %e,
                            "Failed to ingest recording"
                        );
                        report.failures += 1;
                    }
                }
            }

            offset += page.len();
            if page.len() < self.page_size {
                break;
            }
        }

        info!(
            pages = report.pages,
            rows = report.rows,
            added = report.recordings_added,
            deletions = report.deletions,
            watched_changes = report.watched_changes,
            failures = report.failures,
            "Recorder ingest finished"
        );
        Ok(report)
    }

    /// Apply one feed row
    pub async fn ingest_row(&self, row: &RecordingRow) -> Result<RowChange> {
        let (series, series_created) = self.find_or_create_series(row).await?;
        let _guard = self.locks.lock(series.id).await;

        let existing = self
            .repos
            .recordings
            .find_by_recorder_id(row.recording_id)
            .await
            .map_err(|e| SyncError::from_library(series.id, e))?;

        match existing {
            None => {
                self.add_recording(&series, row).await?;
                Ok(RowChange::Added { series_created })
            }
            Some(recording) => self.update_recording(&series, recording, row).await,
        }
    }

    async fn find_or_create_series(&self, row: &RecordingRow) -> Result<(Series, bool)> {
        if let Some(series) = self.repos.series.find_by_recorder_id(row.series_id).await? {
            return Ok((series, false));
        }

        let series = Series::new(row.series_id, row.series_title.clone(), self.clock.now());
        self.repos.series.insert(&series).await?;
        info!(
            series_id = %series.id,
            recorder_series_id = row.series_id,
            title = %series.title,
            "Created series from recorder feed"
        );
        Ok((series, true))
    }

    async fn add_recording(&self, series: &Series, row: &RecordingRow) -> Result<()> {
        let now = self.clock.now();
        let recording = Recording {
            id: RecordingId::new(),
            recorder_recording_id: row.recording_id,
            recorder_series_id: row.series_id,
            series_id: series.id,
            title: row.title.clone(),
            episode_number: row.episode_number,
            air_time: row.air_time,
            deleted_at: row.deleted_at,
            watched: row.watched,
            suggestion: row.suggestion,
            created_at: now,
        };
        self.repos.recordings.insert(&recording).await?;

        let episode = Episode::for_recording(series.id, &recording, now);
        self.repos.episodes.insert(&episode).await?;

        self.counters
            .apply(series.id, counters::recording_added(&recording))
            .await?;
        debug!(recording_id = %recording.id, title = ?recording.title, "Added recording");
        Ok(())
    }

    async fn update_recording(
        &self,
        series: &Series,
        recording: Recording,
        row: &RecordingRow,
    ) -> Result<RowChange> {
        let mut recording = Tracked::new(recording);
        let mut delta = SeriesCounters::default();
        let mut deleted = false;
        let mut watched_toggled = false;

        match (recording.deleted_at, row.deleted_at) {
            (None, Some(deleted_at)) => {
                delta.apply(&counters::recording_deleted(&recording));
                recording.deleted_at = Some(deleted_at);
                deleted = true;
            }
            (Some(_), None) => {
                debug!(recording_id = %recording.id, "Ignoring undelete of a recording");
            }
            _ => {}
        }

        if recording.watched != row.watched {
            recording.watched = row.watched;
            delta.apply(&counters::watched_toggled(&recording));
            watched_toggled = true;
        }

        let Some(fields) = recording.take_changes() else {
            return Ok(RowChange::Unchanged);
        };
        self.repos.recordings.update(&recording, &fields).await?;

        let episode = self
            .repos
            .episodes
            .find_by_recording(recording.id)
            .await
            .map_err(|e| SyncError::from_library(series.id, e))?;

        if episode.is_some() {
            self.counters.apply(series.id, delta).await?;
        } else {
            warn!(
                recording_id = %recording.id,
                "Recording has no live episode; recomputing counters"
            );
            self.counters.recompute_from_scratch(series.id).await?;
        }

        Ok(RowChange::Updated {
            deleted,
            watched_toggled,
        })
    }
}
