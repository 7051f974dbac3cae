//! Domain models for the PVR catalog
//!
//! Series own Episodes; an Episode joins at most one Recording (recorder side)
//! with at most one RemoteEpisodeRecord (metadata side). Rows are never
//! physically deleted: Episodes and remote rows are soft-retired, error log
//! entries are resolved.

use bridge_traits::metadata::RemoteEpisode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a series
    SeriesId
);
entity_id!(
    /// Unique identifier for an episode
    EpisodeId
);
entity_id!(
    /// Unique identifier for a stored recording
    RecordingId
);
entity_id!(
    /// Unique identifier for a stored remote episode row
    RemoteEpisodeId
);
entity_id!(
    /// Unique identifier for an error log entry
    ErrorLogId
);
entity_id!(
    /// Unique identifier for a change-finder work item
    WorkItemId
);
entity_id!(
    /// Unique identifier for a batch sync run
    SyncRunId
);

// =============================================================================
// Series
// =============================================================================

/// Aggregate counters cached on a series.
///
/// Always derivable from the series' live Episode/Recording rows; stored
/// values are an optimization that `recompute` overwrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesCounters {
    /// Recordings present and not deleted
    pub active: i64,
    /// Recordings that were deleted on the recorder
    pub deleted: i64,
    /// Active recordings the recorder made on its own
    pub suggestion: i64,
    pub watched: i64,
    pub unwatched: i64,
    /// Unwatched episodes with no active recording
    pub unwatched_unrecorded: i64,
    /// Recordings linked to a remote episode
    pub matched: i64,
    /// Recordings with no remote episode
    pub unmatched: i64,
    /// Remote episodes with no recording
    pub remote_only: i64,
}

impl SeriesCounters {
    /// Names of the counters that differ from `other`
    pub fn differences(&self, other: &SeriesCounters) -> Vec<&'static str> {
        let pairs = [
            ("active", self.active, other.active),
            ("deleted", self.deleted, other.deleted),
            ("suggestion", self.suggestion, other.suggestion),
            ("watched", self.watched, other.watched),
            ("unwatched", self.unwatched, other.unwatched),
            (
                "unwatched_unrecorded",
                self.unwatched_unrecorded,
                other.unwatched_unrecorded,
            ),
            ("matched", self.matched, other.matched),
            ("unmatched", self.unmatched, other.unmatched),
            ("remote_only", self.remote_only, other.remote_only),
        ];

        pairs
            .iter()
            .filter(|(_, mine, theirs)| mine != theirs)
            .map(|(name, _, _)| *name)
            .collect()
    }

    /// Adds `delta` to every counter
    pub fn apply(&mut self, delta: &SeriesCounters) {
        self.active += delta.active;
        self.deleted += delta.deleted;
        self.suggestion += delta.suggestion;
        self.watched += delta.watched;
        self.unwatched += delta.unwatched;
        self.unwatched_unrecorded += delta.unwatched_unrecorded;
        self.matched += delta.matched;
        self.unmatched += delta.unmatched;
        self.remote_only += delta.remote_only;
    }

    pub fn is_zero(&self) -> bool {
        *self == SeriesCounters::default()
    }
}

/// A show as known to the recorder, optionally tied to a remote series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    /// Display title; replaced when an operator-chosen remote name is accepted
    pub title: String,
    /// Series id on the recorder
    pub recorder_series_id: i64,
    /// Series id on the remote metadata service, once resolved
    pub remote_series_id: Option<i64>,
    /// Operator-supplied search title, preferred over the stored title
    pub remote_title_hint: Option<String>,

    // Flags
    /// Never query the remote service for this series
    pub ignore_remote_match: bool,
    /// Rebuild the remote side on the next sync
    pub needs_rematch: bool,
    /// Stored remote id is wrong; re-resolve and rebuild on the next sync
    pub matched_wrong: bool,

    pub counters: SeriesCounters,

    // Retry bookkeeping
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    pub last_failure_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Series {
    /// Create a series first seen on the recorder
    pub fn new(recorder_series_id: i64, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: SeriesId::new(),
            title: title.into(),
            recorder_series_id,
            remote_series_id: None,
            remote_title_hint: None,
            ignore_remote_match: false,
            needs_rematch: false,
            matched_wrong: false,
            counters: SeriesCounters::default(),
            last_error: None,
            consecutive_errors: 0,
            last_failure_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate series data
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Series title cannot be empty".to_string());
        }

        Ok(())
    }

    /// Whether the stored remote id must be (re)resolved before syncing
    pub fn needs_remote_resolution(&self) -> bool {
        self.remote_series_id.is_none() || self.matched_wrong
    }
}

// =============================================================================
// Episodes & Recordings
// =============================================================================

/// Join row between a recording and a remote episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub series_id: SeriesId,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub absolute_number: Option<i32>,
    pub air_date: Option<NaiveDate>,
    pub title: Option<String>,
    pub recording_id: Option<RecordingId>,
    pub remote_episode_id: Option<RemoteEpisodeId>,
    /// Superseded; excluded from lookups and counters
    pub retired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// Episode created when a recording first appears
    pub fn for_recording(series_id: SeriesId, recording: &Recording, now: DateTime<Utc>) -> Self {
        Self {
            id: EpisodeId::new(),
            series_id,
            season_number: None,
            episode_number: None,
            absolute_number: None,
            air_date: recording.air_time.map(|t| t.date_naive()),
            title: recording.title.clone(),
            recording_id: Some(recording.id),
            remote_episode_id: None,
            retired: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Episode created when a remote episode has no recording
    pub fn for_remote(
        series_id: SeriesId,
        remote: &RemoteEpisodeRecord,
        now: DateTime<Utc>,
    ) -> Self {
        let mut episode = Self {
            id: EpisodeId::new(),
            series_id,
            season_number: None,
            episode_number: None,
            absolute_number: None,
            air_date: None,
            title: None,
            recording_id: None,
            remote_episode_id: Some(remote.id),
            retired: false,
            created_at: now,
            updated_at: now,
        };
        episode.copy_remote_fields(remote);
        episode
    }

    /// Overwrite the descriptive fields with the remote episode's values
    pub fn copy_remote_fields(&mut self, remote: &RemoteEpisodeRecord) {
        self.season_number = remote.season_number;
        self.episode_number = remote.episode_number;
        self.absolute_number = remote.absolute_number;
        self.air_date = remote.first_aired;
        if remote.title.is_some() {
            self.title = remote.title.clone();
        }
    }

    pub fn is_remote_only(&self) -> bool {
        self.recording_id.is_none() && self.remote_episode_id.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.recording_id.is_none() && self.remote_episode_id.is_none()
    }
}

/// A recording reported by the recorder.
///
/// Immutable apart from deletion and watched state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: RecordingId,
    /// Recording id on the recorder
    pub recorder_recording_id: i64,
    /// Parent series id on the recorder
    pub recorder_series_id: i64,
    pub series_id: SeriesId,
    pub title: Option<String>,
    /// Season and episode packed into one integer by the recorder
    pub episode_number: Option<i32>,
    pub air_time: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub watched: bool,
    /// Recorded on the recorder's own initiative
    pub suggestion: bool,
    pub created_at: DateTime<Utc>,
}

impl Recording {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Remote episode metadata stored for a series.
///
/// Refreshed wholesale on each sync of the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEpisodeRecord {
    pub id: RemoteEpisodeId,
    /// Episode id on the remote service
    pub remote_episode_id: i64,
    pub remote_series_id: i64,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub absolute_number: Option<i32>,
    pub title: Option<String>,
    pub first_aired: Option<NaiveDate>,
    pub last_updated: Option<DateTime<Utc>>,
    pub retired: bool,
}

impl RemoteEpisodeRecord {
    pub fn from_remote(remote: &RemoteEpisode) -> Self {
        Self {
            id: RemoteEpisodeId::new(),
            remote_episode_id: remote.id,
            remote_series_id: remote.series_id,
            season_number: remote.season_number,
            episode_number: remote.episode_number,
            absolute_number: remote.absolute_number,
            title: remote.title.clone(),
            first_aired: remote.first_aired,
            last_updated: remote.last_updated,
            retired: false,
        }
    }

    /// Overwrite every remote-sourced field, keeping identity
    pub fn refresh_from(&mut self, remote: &RemoteEpisode) {
        self.remote_series_id = remote.series_id;
        self.season_number = remote.season_number;
        self.episode_number = remote.episode_number;
        self.absolute_number = remote.absolute_number;
        self.title = remote.title.clone();
        self.first_aired = remote.first_aired;
        self.last_updated = remote.last_updated;
    }
}

// =============================================================================
// Error Log
// =============================================================================

/// Why remote-identity resolution failed for a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Search returned no candidates
    NotFound,
    /// Top candidate's name did not match the series title
    NameMismatch,
    /// The remote service failed repeatedly
    LookupFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::NameMismatch => "name_mismatch",
            ErrorKind::LookupFailed => "lookup_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-visible record of a failed identity resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: ErrorLogId,
    pub series_id: SeriesId,
    pub recorder_series_id: i64,
    pub kind: ErrorKind,
    /// Title sent to the remote search
    pub attempted_title: String,
    /// Name of the rejected top candidate (NameMismatch)
    pub candidate_name: Option<String>,
    /// Operator-approved remote name (NameMismatch)
    pub chosen_name: Option<String>,
    /// Transport error text (LookupFailed)
    pub failure_detail: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Operator asked to stop matching this series
    pub ignore: bool,
    pub occurrences: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl ErrorLogEntry {
    pub fn open(
        series: &Series,
        kind: ErrorKind,
        attempted_title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ErrorLogId::new(),
            series_id: series.id,
            recorder_series_id: series.recorder_series_id,
            kind,
            attempted_title: attempted_title.into(),
            candidate_name: None,
            chosen_name: None,
            failure_detail: None,
            resolved: false,
            resolved_at: None,
            ignore: false,
            occurrences: 1,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}

// =============================================================================
// Change discovery & bookkeeping
// =============================================================================

/// A (series, remote last-updated) pair discovered by the change finder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub remote_series_id: i64,
    pub last_updated: DateTime<Utc>,
    pub discovered_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(remote_series_id: i64, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: WorkItemId::new(),
            remote_series_id,
            last_updated,
            discovered_at: now,
        }
    }
}

/// One of the top remote candidates from the latest identity lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossibleMatch {
    pub series_id: SeriesId,
    /// 0-based position in the remote result list
    pub rank: u32,
    pub remote_series_id: i64,
    pub remote_name: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunKind {
    Full,
}

/// Per-outcome counts of a batch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTallies {
    pub succeeded: u32,
    pub not_found: u32,
    pub name_mismatch: u32,
    pub transient_failures: u32,
    pub ignored: u32,
    /// Not eligible under retry triage
    pub deferred: u32,
    /// Series whose pass ended in an error
    pub errors: u32,
}

impl OutcomeTallies {
    pub fn attempted(&self) -> u32 {
        self.succeeded
            + self.not_found
            + self.name_mismatch
            + self.transient_failures
            + self.ignored
            + self.errors
    }
}

/// A batch pass over every series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub kind: SyncRunKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub succeeded: bool,
    pub tallies: OutcomeTallies,
}

impl SyncRun {
    pub fn start_full(now: DateTime<Utc>) -> Self {
        Self {
            id: SyncRunId::new(),
            kind: SyncRunKind::Full,
            started_at: now,
            completed_at: None,
            succeeded: false,
            tallies: OutcomeTallies::default(),
        }
    }

    pub fn complete(&mut self, tallies: OutcomeTallies, succeeded: bool, now: DateTime<Utc>) {
        self.tallies = tallies;
        self.succeeded = succeeded;
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_series_new() {
        let series = Series::new(7, "Foo Show", now());

        assert_eq!(series.recorder_series_id, 7);
        assert!(series.needs_remote_resolution());
        assert!(series.counters.is_zero());
        assert!(series.validate().is_ok());
    }

    #[test]
    fn test_series_validation() {
        let series = Series::new(7, "   ", now());
        assert!(series.validate().is_err());
    }

    #[test]
    fn test_matched_wrong_forces_resolution() {
        let mut series = Series::new(7, "Foo Show", now());
        series.remote_series_id = Some(42);
        assert!(!series.needs_remote_resolution());

        series.matched_wrong = true;
        assert!(series.needs_remote_resolution());
    }

    #[test]
    fn test_counter_differences() {
        let a = SeriesCounters {
            active: 2,
            matched: 1,
            ..Default::default()
        };
        let b = SeriesCounters {
            active: 2,
            matched: 0,
            unmatched: 1,
            ..Default::default()
        };

        assert_eq!(a.differences(&b), vec!["matched", "unmatched"]);
        assert!(a.differences(&a).is_empty());
    }

    #[test]
    fn test_counter_apply() {
        let mut counters = SeriesCounters {
            unmatched: 1,
            ..Default::default()
        };
        counters.apply(&SeriesCounters {
            unmatched: -1,
            matched: 1,
            ..Default::default()
        });

        assert_eq!(counters.unmatched, 0);
        assert_eq!(counters.matched, 1);
    }

    #[test]
    fn test_episode_for_remote_copies_fields() {
        let remote = RemoteEpisodeRecord::from_remote(&RemoteEpisode {
            id: 900,
            series_id: 42,
            season_number: Some(1),
            episode_number: Some(1),
            absolute_number: Some(1),
            title: Some("Pilot".to_string()),
            first_aired: NaiveDate::from_ymd_opt(2024, 1, 1),
            last_updated: None,
        });

        let episode = Episode::for_remote(SeriesId::new(), &remote, now());

        assert!(episode.is_remote_only());
        assert_eq!(episode.title.as_deref(), Some("Pilot"));
        assert_eq!(episode.season_number, Some(1));
        assert_eq!(episode.air_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_sync_run_complete() {
        let mut run = SyncRun::start_full(now());
        let tallies = OutcomeTallies {
            succeeded: 2,
            deferred: 1,
            ..Default::default()
        };
        run.complete(tallies, true, now());

        assert!(run.succeeded);
        assert_eq!(run.tallies.attempted(), 2);
        assert!(run.completed_at.is_some());
    }
}
