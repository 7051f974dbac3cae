//! In-memory implementation of every repository
//!
//! Rows live in plain vectors behind one async `RwLock`. Only primary ids are
//! checked on insert; secondary keys are not constrained, so duplicate rows can
//! exist and unique finders report them as `NonUnique` the way a store without
//! unique indexes would surface them.

use crate::error::{LibraryError, Result};
use crate::models::{
    Episode, EpisodeId, ErrorKind, ErrorLogEntry, ErrorLogId, PossibleMatch, Recording,
    RecordingId, RemoteEpisodeId, RemoteEpisodeRecord, Series, SeriesId, SyncRun, SyncRunKind,
    WorkItem,
};
use crate::repositories::{
    EpisodeRepository, ErrorLogRepository, PossibleMatchRepository, RecordingRepository,
    RemoteEpisodeRepository, SeriesRepository, SyncRunRepository, WorkItemRepository,
};
use crate::tracking::{
    Diffable, EpisodeField, ErrorLogField, RecordingField, RemoteEpisodeField, SeriesField,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Default)]
struct Tables {
    series: Vec<Series>,
    episodes: Vec<Episode>,
    recordings: Vec<Recording>,
    remote_episodes: Vec<RemoteEpisodeRecord>,
    error_log: Vec<ErrorLogEntry>,
    work_items: Vec<WorkItem>,
    possible_matches: Vec<PossibleMatch>,
    sync_runs: Vec<SyncRun>,
}

/// Process-local store backing all repository traits
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// At most one row, or `NonUnique`
fn at_most_one<T: Clone>(rows: Vec<&T>, entity_type: &str, key: String) -> Result<Option<T>> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.first().map(|row| (*row).clone())),
        count => Err(LibraryError::NonUnique {
            entity_type: entity_type.to_string(),
            key,
            count,
        }),
    }
}

fn duplicate_id(entity_type: &str, id: impl ToString) -> LibraryError {
    LibraryError::InvalidInput {
        field: "id".to_string(),
        message: format!("{} {} already exists", entity_type, id.to_string()),
    }
}

/// Copy `fields` from `source` onto the stored row with the same id
fn write_fields<T, F>(
    rows: &mut [T],
    source: &T,
    fields: &[T::Field],
    entity_type: &str,
    id: impl ToString,
    same_row: F,
) -> Result<()>
where
    T: Diffable,
    F: Fn(&T) -> bool,
{
    let row = rows
        .iter_mut()
        .find(|row| same_row(row))
        .ok_or_else(|| LibraryError::not_found(entity_type, id))?;
    row.copy_fields(source, fields);
    Ok(())
}

#[async_trait]
impl SeriesRepository for MemoryStore {
    async fn find_by_id(&self, id: SeriesId) -> Result<Option<Series>> {
        let tables = self.tables.read().await;
        Ok(tables.series.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_recorder_id(&self, recorder_series_id: i64) -> Result<Option<Series>> {
        let tables = self.tables.read().await;
        let rows = tables
            .series
            .iter()
            .filter(|s| s.recorder_series_id == recorder_series_id)
            .collect();
        at_most_one(rows, "Series", format!("recorder id {}", recorder_series_id))
    }

    async fn find_by_remote_id(&self, remote_series_id: i64) -> Result<Option<Series>> {
        let tables = self.tables.read().await;
        let rows = tables
            .series
            .iter()
            .filter(|s| s.remote_series_id == Some(remote_series_id))
            .collect();
        at_most_one(rows, "Series", format!("remote id {}", remote_series_id))
    }

    async fn insert(&self, series: &Series) -> Result<()> {
        series
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "title".to_string(),
                message,
            })?;

        let mut tables = self.tables.write().await;
        if tables.series.iter().any(|s| s.id == series.id) {
            return Err(duplicate_id("Series", series.id));
        }
        tables.series.push(series.clone());
        trace!(series_id = %series.id, "Inserted series");
        Ok(())
    }

    async fn update(&self, series: &Series, fields: &[SeriesField]) -> Result<()> {
        let mut tables = self.tables.write().await;
        write_fields(&mut tables.series, series, fields, "Series", series.id, |s| {
            s.id == series.id
        })
    }

    async fn list(&self) -> Result<Vec<Series>> {
        let tables = self.tables.read().await;
        let mut series = tables.series.clone();
        series.sort_by_key(|s| s.created_at);
        Ok(series)
    }
}

#[async_trait]
impl EpisodeRepository for MemoryStore {
    async fn find_by_id(&self, id: EpisodeId) -> Result<Option<Episode>> {
        let tables = self.tables.read().await;
        Ok(tables.episodes.iter().find(|e| e.id == id).cloned())
    }

    async fn find_by_recording(&self, recording_id: RecordingId) -> Result<Option<Episode>> {
        let tables = self.tables.read().await;
        let rows = tables
            .episodes
            .iter()
            .filter(|e| !e.retired && e.recording_id == Some(recording_id))
            .collect();
        at_most_one(rows, "Episode", format!("recording {}", recording_id))
    }

    async fn find_by_remote_episode(
        &self,
        remote_episode_id: RemoteEpisodeId,
    ) -> Result<Option<Episode>> {
        let tables = self.tables.read().await;
        let rows = tables
            .episodes
            .iter()
            .filter(|e| !e.retired && e.remote_episode_id == Some(remote_episode_id))
            .collect();
        at_most_one(rows, "Episode", format!("remote episode {}", remote_episode_id))
    }

    async fn list_live_by_series(&self, series_id: SeriesId) -> Result<Vec<Episode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .episodes
            .iter()
            .filter(|e| !e.retired && e.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, episode: &Episode) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.episodes.iter().any(|e| e.id == episode.id) {
            return Err(duplicate_id("Episode", episode.id));
        }
        tables.episodes.push(episode.clone());
        Ok(())
    }

    async fn update(&self, episode: &Episode, fields: &[EpisodeField]) -> Result<()> {
        let mut tables = self.tables.write().await;
        write_fields(&mut tables.episodes, episode, fields, "Episode", episode.id, |e| {
            e.id == episode.id
        })
    }
}

#[async_trait]
impl RecordingRepository for MemoryStore {
    async fn find_by_id(&self, id: RecordingId) -> Result<Option<Recording>> {
        let tables = self.tables.read().await;
        Ok(tables.recordings.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_recorder_id(&self, recorder_recording_id: i64) -> Result<Option<Recording>> {
        let tables = self.tables.read().await;
        let rows = tables
            .recordings
            .iter()
            .filter(|r| r.recorder_recording_id == recorder_recording_id)
            .collect();
        at_most_one(
            rows,
            "Recording",
            format!("recorder id {}", recorder_recording_id),
        )
    }

    async fn list_by_series(&self, series_id: SeriesId) -> Result<Vec<Recording>> {
        let tables = self.tables.read().await;
        Ok(tables
            .recordings
            .iter()
            .filter(|r| r.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, recording: &Recording) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.recordings.iter().any(|r| r.id == recording.id) {
            return Err(duplicate_id("Recording", recording.id));
        }
        tables.recordings.push(recording.clone());
        Ok(())
    }

    async fn update(&self, recording: &Recording, fields: &[RecordingField]) -> Result<()> {
        let mut tables = self.tables.write().await;
        write_fields(
            &mut tables.recordings,
            recording,
            fields,
            "Recording",
            recording.id,
            |r| r.id == recording.id,
        )
    }
}

#[async_trait]
impl RemoteEpisodeRepository for MemoryStore {
    async fn find_by_id(&self, id: RemoteEpisodeId) -> Result<Option<RemoteEpisodeRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.remote_episodes.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_remote_id(
        &self,
        remote_episode_id: i64,
    ) -> Result<Option<RemoteEpisodeRecord>> {
        let tables = self.tables.read().await;
        let rows = tables
            .remote_episodes
            .iter()
            .filter(|r| !r.retired && r.remote_episode_id == remote_episode_id)
            .collect();
        at_most_one(
            rows,
            "RemoteEpisode",
            format!("remote episode id {}", remote_episode_id),
        )
    }

    async fn list_live_by_remote_series(
        &self,
        remote_series_id: i64,
    ) -> Result<Vec<RemoteEpisodeRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .remote_episodes
            .iter()
            .filter(|r| !r.retired && r.remote_series_id == remote_series_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: &RemoteEpisodeRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.remote_episodes.iter().any(|r| r.id == record.id) {
            return Err(duplicate_id("RemoteEpisode", record.id));
        }
        tables.remote_episodes.push(record.clone());
        Ok(())
    }

    async fn update(
        &self,
        record: &RemoteEpisodeRecord,
        fields: &[RemoteEpisodeField],
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        write_fields(
            &mut tables.remote_episodes,
            record,
            fields,
            "RemoteEpisode",
            record.id,
            |r| r.id == record.id,
        )
    }
}

#[async_trait]
impl ErrorLogRepository for MemoryStore {
    async fn find_by_id(&self, id: ErrorLogId) -> Result<Option<ErrorLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.error_log.iter().find(|e| e.id == id).cloned())
    }

    async fn find_open(
        &self,
        series_id: SeriesId,
        kind: ErrorKind,
    ) -> Result<Option<ErrorLogEntry>> {
        let tables = self.tables.read().await;
        let rows = tables
            .error_log
            .iter()
            .filter(|e| e.is_open() && e.series_id == series_id && e.kind == kind)
            .collect();
        at_most_one(
            rows,
            "ErrorLogEntry",
            format!("open {} for series {}", kind, series_id),
        )
    }

    async fn list_open_by_series(&self, series_id: SeriesId) -> Result<Vec<ErrorLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .error_log
            .iter()
            .filter(|e| e.is_open() && e.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn list_open(&self) -> Result<Vec<ErrorLogEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<ErrorLogEntry> = tables
            .error_log
            .iter()
            .filter(|e| e.is_open())
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.first_seen_at);
        Ok(entries)
    }

    async fn list_by_series(&self, series_id: SeriesId) -> Result<Vec<ErrorLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .error_log
            .iter()
            .filter(|e| e.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, entry: &ErrorLogEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.error_log.iter().any(|e| e.id == entry.id) {
            return Err(duplicate_id("ErrorLogEntry", entry.id));
        }
        tables.error_log.push(entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &ErrorLogEntry, fields: &[ErrorLogField]) -> Result<()> {
        let mut tables = self.tables.write().await;
        write_fields(
            &mut tables.error_log,
            entry,
            fields,
            "ErrorLogEntry",
            entry.id,
            |e| e.id == entry.id,
        )
    }
}

#[async_trait]
impl WorkItemRepository for MemoryStore {
    async fn exists(&self, remote_series_id: i64, last_updated: DateTime<Utc>) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .work_items
            .iter()
            .any(|w| w.remote_series_id == remote_series_id && w.last_updated == last_updated))
    }

    async fn insert(&self, item: &WorkItem) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.work_items.iter().any(|w| {
            w.remote_series_id == item.remote_series_id && w.last_updated == item.last_updated
        }) {
            return Err(LibraryError::InvalidInput {
                field: "last_updated".to_string(),
                message: format!(
                    "work item for series {} at {} already exists",
                    item.remote_series_id, item.last_updated
                ),
            });
        }
        tables.work_items.push(item.clone());
        Ok(())
    }

    async fn latest_discovered_at(&self) -> Result<Option<DateTime<Utc>>> {
        let tables = self.tables.read().await;
        Ok(tables.work_items.iter().map(|w| w.discovered_at).max())
    }

    async fn list(&self) -> Result<Vec<WorkItem>> {
        let tables = self.tables.read().await;
        Ok(tables.work_items.clone())
    }
}

#[async_trait]
impl PossibleMatchRepository for MemoryStore {
    async fn replace_for_series(
        &self,
        series_id: SeriesId,
        matches: &[PossibleMatch],
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.possible_matches.retain(|m| m.series_id != series_id);
        tables.possible_matches.extend(matches.iter().cloned());
        Ok(())
    }

    async fn list_for_series(&self, series_id: SeriesId) -> Result<Vec<PossibleMatch>> {
        let tables = self.tables.read().await;
        let mut matches: Vec<PossibleMatch> = tables
            .possible_matches
            .iter()
            .filter(|m| m.series_id == series_id)
            .cloned()
            .collect();
        matches.sort_by_key(|m| m.rank);
        Ok(matches)
    }
}

#[async_trait]
impl SyncRunRepository for MemoryStore {
    async fn insert(&self, run: &SyncRun) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.sync_runs.iter().any(|r| r.id == run.id) {
            return Err(duplicate_id("SyncRun", run.id));
        }
        tables.sync_runs.push(run.clone());
        Ok(())
    }

    async fn update(&self, run: &SyncRun) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .sync_runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| LibraryError::not_found("SyncRun", run.id))?;
        *row = run.clone();
        Ok(())
    }

    async fn latest_successful_full(&self) -> Result<Option<SyncRun>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sync_runs
            .iter()
            .filter(|r| r.kind == SyncRunKind::Full && r.succeeded && r.completed_at.is_some())
            .max_by_key(|r| r.started_at)
            .cloned())
    }
}
