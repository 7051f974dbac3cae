//! # Series Counter Maintenance
//!
//! Every series caches aggregate counters over its live episodes. The counters
//! are defined by [`aggregate`]; each Episode-state transition applies a small
//! delta instead of rescanning, and [`CounterMaintainer::recompute_from_scratch`]
//! restores the aggregate whenever a delta may have been lost.
//!
//! ## Aggregate
//!
//! For every live episode with optional recording `r`:
//!
//! | counter | contribution |
//! |---|---|
//! | active | `r` present and not deleted |
//! | deleted | `r` present and deleted |
//! | suggestion | active and `r.suggestion` |
//! | watched / unwatched | `r.watched` (no recording counts as unwatched) |
//! | unwatched_unrecorded | unwatched and not active |
//! | matched / unmatched | `r` present, with / without a remote link |
//! | remote_only | no `r`, remote link present |
//!
//! Episode rows are written before their delta. When a delta write fails the
//! stored counters drift until the next recompute.

use crate::error::{Result, SyncError};
use bridge_traits::time::Clock;
use core_library::models::{Episode, Recording, RecordingId, Series, SeriesCounters, SeriesId};
use core_library::tracking::Tracked;
use core_library::Repositories;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Contribution of one live episode to its series' counters
pub fn episode_contribution(recording: Option<&Recording>, has_remote: bool) -> SeriesCounters {
    let present = recording.is_some();
    let recorded = recording.is_some_and(|r| !r.is_deleted());
    let watched = recording.is_some_and(|r| r.watched);
    let suggestion = recording.is_some_and(|r| r.suggestion);

    SeriesCounters {
        active: recorded as i64,
        deleted: (present && !recorded) as i64,
        suggestion: (recorded && suggestion) as i64,
        watched: watched as i64,
        unwatched: (!watched) as i64,
        unwatched_unrecorded: (!watched && !recorded) as i64,
        matched: (present && has_remote) as i64,
        unmatched: (present && !has_remote) as i64,
        remote_only: (!present && has_remote) as i64,
    }
}

/// Counters derived from a series' live episodes.
///
/// # Errors
///
/// `Invariant` when an episode links a recording that is not in `recordings`.
pub fn aggregate(
    series_id: SeriesId,
    episodes: &[Episode],
    recordings: &HashMap<RecordingId, Recording>,
) -> Result<SeriesCounters> {
    let mut counters = SeriesCounters::default();

    for episode in episodes.iter().filter(|e| !e.retired) {
        let recording = match episode.recording_id {
            Some(recording_id) => Some(recordings.get(&recording_id).ok_or_else(|| {
                SyncError::invariant(
                    series_id,
                    format!(
                        "episode {} links missing recording {}",
                        episode.id, recording_id
                    ),
                )
            })?),
            None => None,
        };
        counters.apply(&episode_contribution(
            recording,
            episode.remote_episode_id.is_some(),
        ));
    }

    Ok(counters)
}

// =============================================================================
// Transition deltas
// =============================================================================

/// A new recording-only episode
pub fn recording_added(recording: &Recording) -> SeriesCounters {
    episode_contribution(Some(recording), false)
}

/// A new remote-only episode
pub fn remote_episode_added() -> SeriesCounters {
    episode_contribution(None, true)
}

/// A recording-only episode gained a remote link
pub fn episode_matched() -> SeriesCounters {
    SeriesCounters {
        matched: 1,
        unmatched: -1,
        ..Default::default()
    }
}

/// A recording moved off its recording-only episode onto a remote-only one;
/// the old episode is retired
pub fn recording_matched_to_remote_only() -> SeriesCounters {
    SeriesCounters {
        remote_only: -1,
        unwatched: -1,
        unwatched_unrecorded: -1,
        unmatched: -1,
        matched: 1,
        ..Default::default()
    }
}

/// `before` is the recording as it was prior to deletion
pub fn recording_deleted(before: &Recording) -> SeriesCounters {
    SeriesCounters {
        active: -1,
        deleted: 1,
        suggestion: -(before.suggestion as i64),
        unwatched_unrecorded: (!before.watched) as i64,
        ..Default::default()
    }
}

/// `after` is the recording with its new watched state
pub fn watched_toggled(after: &Recording) -> SeriesCounters {
    let sign = if after.watched { 1 } else { -1 };
    SeriesCounters {
        watched: sign,
        unwatched: -sign,
        unwatched_unrecorded: if after.is_deleted() { -sign } else { 0 },
        ..Default::default()
    }
}

// =============================================================================
// Maintainer
// =============================================================================

/// Stored counters compared with a fresh aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDrift {
    pub series_id: SeriesId,
    pub stored: SeriesCounters,
    pub actual: SeriesCounters,
    /// Names of the counters that differ
    pub fields: Vec<&'static str>,
}

impl CounterDrift {
    pub fn is_consistent(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Applies counter deltas and recomputes counters for a series
pub struct CounterMaintainer {
    repos: Repositories,
    clock: Arc<dyn Clock>,
}

impl CounterMaintainer {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>) -> Self {
        Self { repos, clock }
    }

    async fn load_series(&self, series_id: SeriesId) -> Result<Tracked<Series>> {
        self.repos
            .series
            .find_by_id(series_id)
            .await?
            .map(Tracked::new)
            .ok_or(SyncError::SeriesNotFound { series_id })
    }

    /// Add `delta` to the stored counters of a series
    pub async fn apply(&self, series_id: SeriesId, delta: SeriesCounters) -> Result<()> {
        if delta.is_zero() {
            return Ok(());
        }

        let mut series = self.load_series(series_id).await?;
        series.counters.apply(&delta);
        series.updated_at = self.clock.now();

        if let Some(fields) = series.take_changes() {
            self.repos.series.update(&series, &fields).await?;
        }
        debug!(series_id = %series_id, delta = ?delta, "Applied counter delta");
        Ok(())
    }

    /// Aggregate counters from the current rows without writing them
    pub async fn compute(&self, series_id: SeriesId) -> Result<SeriesCounters> {
        let episodes = self.repos.episodes.list_live_by_series(series_id).await?;
        let recordings: HashMap<RecordingId, Recording> = self
            .repos
            .recordings
            .list_by_series(series_id)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        aggregate(series_id, &episodes, &recordings)
    }

    /// Re-derive every counter and overwrite the stored values.
    ///
    /// Idempotent: a second call without intervening writes changes nothing.
    pub async fn recompute_from_scratch(&self, series_id: SeriesId) -> Result<SeriesCounters> {
        let actual = self.compute(series_id).await?;
        let mut series = self.load_series(series_id).await?;

        let drifted = series.counters.differences(&actual);
        if !drifted.is_empty() {
            info!(
                series_id = %series_id,
                fields = ?drifted,
                "Recomputed series counters"
            );
            series.counters = actual;
            series.updated_at = self.clock.now();
        }

        if let Some(fields) = series.take_changes() {
            self.repos.series.update(&series, &fields).await?;
        }
        Ok(actual)
    }

    /// Compare stored counters with a fresh aggregate; writes nothing
    pub async fn verify(&self, series_id: SeriesId) -> Result<CounterDrift> {
        let actual = self.compute(series_id).await?;
        let series = self.load_series(series_id).await?;
        let fields = series.counters.differences(&actual);

        if !fields.is_empty() {
            warn!(series_id = %series_id, fields = ?fields, "Series counters drifted");
        }

        Ok(CounterDrift {
            series_id,
            stored: series.counters,
            actual,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_library::models::RemoteEpisodeId;

    fn recording(series_id: SeriesId, deleted: bool, watched: bool, suggestion: bool) -> Recording {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Recording {
            id: RecordingId::new(),
            recorder_recording_id: 1,
            recorder_series_id: 7,
            series_id,
            title: None,
            episode_number: None,
            air_time: None,
            deleted_at: deleted.then_some(now),
            watched,
            suggestion,
            created_at: now,
        }
    }

    fn with_state(base: &Recording, deleted: bool, watched: bool) -> Recording {
        let mut changed = base.clone();
        changed.deleted_at = deleted.then(|| base.created_at);
        changed.watched = watched;
        changed
    }

    #[test]
    fn test_contribution_table() {
        let series_id = SeriesId::new();
        let active = recording(series_id, false, false, true);

        let contribution = episode_contribution(Some(&active), false);
        assert_eq!(
            contribution,
            SeriesCounters {
                active: 1,
                suggestion: 1,
                unwatched: 1,
                unmatched: 1,
                ..Default::default()
            }
        );

        assert_eq!(
            episode_contribution(None, true),
            SeriesCounters {
                unwatched: 1,
                unwatched_unrecorded: 1,
                remote_only: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_deltas_agree_with_contributions() {
        let series_id = SeriesId::new();
        for suggestion in [false, true] {
            for watched in [false, true] {
                let before = recording(series_id, false, watched, suggestion);
                let after = with_state(&before, true, watched);

                let mut counters = episode_contribution(Some(&before), true);
                counters.apply(&recording_deleted(&before));
                assert_eq!(counters, episode_contribution(Some(&after), true));
            }
        }

        for deleted in [false, true] {
            for watched in [false, true] {
                let before = recording(series_id, deleted, watched, false);
                let after = with_state(&before, deleted, !watched);

                let mut counters = episode_contribution(Some(&before), false);
                counters.apply(&watched_toggled(&after));
                assert_eq!(counters, episode_contribution(Some(&after), false));
            }
        }
    }

    #[test]
    fn test_matching_deltas_agree_with_contributions() {
        let series_id = SeriesId::new();
        let rec = recording(series_id, false, true, false);

        let mut counters = episode_contribution(Some(&rec), false);
        counters.apply(&episode_matched());
        assert_eq!(counters, episode_contribution(Some(&rec), true));

        // Recording-only episode plus remote-only episode collapse into one.
        let mut counters = episode_contribution(Some(&rec), false);
        counters.apply(&episode_contribution(None, true));
        counters.apply(&recording_matched_to_remote_only());
        assert_eq!(counters, episode_contribution(Some(&rec), true));
    }

    #[test]
    fn test_aggregate_skips_retired_and_flags_missing_recordings() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let series = Series::new(7, "Foo", now);
        let rec = recording(series.id, false, false, false);

        let live = Episode::for_recording(series.id, &rec, now);
        let mut retired = Episode::for_recording(series.id, &rec, now);
        retired.retired = true;
        retired.remote_episode_id = Some(RemoteEpisodeId::new());

        let recordings = HashMap::from([(rec.id, rec.clone())]);
        let counters = aggregate(series.id, &[live.clone(), retired], &recordings).unwrap();
        assert_eq!(counters, recording_added(&rec));

        let result = aggregate(series.id, &[live], &HashMap::new());
        assert!(matches!(result, Err(SyncError::Invariant { .. })));
    }
}
