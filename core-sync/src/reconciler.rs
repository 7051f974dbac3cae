//! # Series Reconciler
//!
//! Brings one series in line with the remote metadata service.
//!
//! ## Workflow
//!
//! 1. Skip series excluded from remote matching; an operator `ignore` flag on
//!    an open error entry excludes the series permanently
//! 2. Resolve the remote series id when it is missing or flagged wrong,
//!    recording NotFound / NameMismatch entries and the top candidates
//! 3. On `matched_wrong` / `needs_rematch`, drop every remote link, retire the
//!    remote rows and emptied episodes, and recompute counters
//! 4. Fetch the remote episode list and refresh linked episodes; then match
//!    each unmatched recording against every unlinked remote row and add the
//!    rows left over as remote-only episodes
//! 5. Give recordings that are still unmatched a second chance against the
//!    complete remote-only set
//!
//! Remote failures in steps 2 and 4 end the pass with
//! [`SyncOutcome::TransientFailure`]; persistence failures and invariant
//! violations are returned as errors. Callers must serialize passes per
//! series (see [`crate::scheduler::SyncScheduler`]).

use crate::counters::{self, CounterMaintainer};
use crate::error::{Result, SyncError};
use crate::error_workflow::{record_failure, record_success, ErrorContext, ErrorWorkflow};
use bridge_traits::metadata::RemoteMetadataClient;
use bridge_traits::time::Clock;
use core_library::models::{
    Episode, ErrorKind, PossibleMatch, Recording, RecordingId, RemoteEpisodeRecord, Series,
    SeriesId,
};
use core_library::tracking::Tracked;
use core_library::Repositories;
use core_metadata::{
    match_recording, match_remote, IdentityDecision, IdentityLookup, IdentityResolver,
    MatchResult,
};
use core_runtime::SyncSettings;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a series pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Episodes in the remote list
    pub remote_episodes: usize,
    /// Episodes inserted (remote-only or recording-backed)
    pub episodes_created: usize,
    /// Linked episodes whose remote fields changed
    pub episodes_updated: usize,
    /// Recordings linked to a remote row fetched this pass
    pub recordings_matched: usize,
    /// Recordings linked to a remote-only episode
    pub late_matches: usize,
    /// Matcher calls that ended in a tie
    pub ambiguous: usize,
    /// Remote side was torn down and rebuilt
    pub rebuilt: bool,
    /// Series title replaced by an operator-chosen name
    pub renamed: bool,
}

/// Result of one series pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success(SyncStats),
    /// Remote search returned nothing
    NotFound,
    /// Remote search's top result had another name
    NameMismatch,
    /// The remote service failed; retried on a later pass
    TransientFailure { message: String },
    /// Series is excluded from remote matching
    Ignored,
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Success(_) => "success",
            SyncOutcome::NotFound => "not_found",
            SyncOutcome::NameMismatch => "name_mismatch",
            SyncOutcome::TransientFailure { .. } => "transient_failure",
            SyncOutcome::Ignored => "ignored",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reconciles series against a [`RemoteMetadataClient`]
pub struct SeriesReconciler {
    repos: Repositories,
    client: Arc<dyn RemoteMetadataClient>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    identity: IdentityResolver,
    errors: ErrorWorkflow,
    counters: CounterMaintainer,
}

impl SeriesReconciler {
    pub fn new(
        repos: Repositories,
        client: Arc<dyn RemoteMetadataClient>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let identity = IdentityResolver::new(
            client.clone(),
            settings.title_separator.clone(),
            settings.max_possible_matches,
        );
        let errors = ErrorWorkflow::new(repos.clone(), clock.clone(), settings.clone());
        let counters = CounterMaintainer::new(repos.clone(), clock.clone());

        Ok(Self {
            repos,
            client,
            clock,
            settings,
            identity,
            errors,
            counters,
        })
    }

    pub fn counters(&self) -> &CounterMaintainer {
        &self.counters
    }

    pub fn errors(&self) -> &ErrorWorkflow {
        &self.errors
    }

    /// Run one reconciliation pass for a series
    ///
    /// # Errors
    ///
    /// - `SeriesNotFound` if the id is unknown
    /// - `Invariant` when duplicate rows or dangling links are found
    /// - `Library` when a write fails
    #[instrument(skip(self), fields(series_id = %series_id))]
    pub async fn sync_series(&self, series_id: SeriesId) -> Result<SyncOutcome> {
        let series = self
            .repos
            .series
            .find_by_id(series_id)
            .await?
            .ok_or(SyncError::SeriesNotFound { series_id })?;
        let mut series = Tracked::new(series);

        if series.ignore_remote_match {
            debug!("Series excluded from remote matching");
            return Ok(SyncOutcome::Ignored);
        }

        if let Some(entry) = self.errors.ignored_entry(series_id).await? {
            series.ignore_remote_match = true;
            self.commit_series(&mut series).await?;
            self.errors.resolve_ignored(entry).await?;
            info!(title = %series.title, "Operator excluded series from remote matching");
            return Ok(SyncOutcome::Ignored);
        }

        let mut stats = SyncStats::default();
        let previous_remote_id = series.remote_series_id;
        let rebuild = series.matched_wrong || series.needs_rematch;

        if series.needs_remote_resolution() {
            if let Some(outcome) = self.resolve_identity(&mut series, &mut stats).await? {
                return Ok(outcome);
            }
        }

        if rebuild {
            self.rebuild_remote_side(&mut series, previous_remote_id).await?;
            stats.rebuilt = true;
        }

        let remote_series_id = series.remote_series_id.ok_or_else(|| {
            SyncError::invariant(series_id, "remote id missing after resolution")
        })?;

        let remote_episodes = match self.client.get_episodes_for_series(remote_series_id).await {
            Ok(episodes) => episodes,
            Err(e) => {
                let attempted = format!("episodes of remote series {}", remote_series_id);
                return self.transient_failure(&mut series, attempted, e.to_string()).await;
            }
        };
        stats.remote_episodes = remote_episodes.len();

        let fresh = self
            .refresh_remote_rows(series_id, &remote_episodes, &mut stats)
            .await?;
        let mut pass = MatchPass::load(&self.repos, series_id, fresh).await?;

        self.link_recordings(&mut pass, &mut stats).await?;
        self.add_remote_only_episodes(&mut pass, &mut stats).await?;
        self.link_recordings(&mut pass, &mut stats).await?;

        self.errors.resolve_all(series_id).await?;
        record_success(&mut series, self.clock.now());
        self.commit_series(&mut series).await?;

        info!(
            title = %series.title,
            remote_series_id,
            remote_episodes = stats.remote_episodes,
            created = stats.episodes_created,
            updated = stats.episodes_updated,
            matched = stats.recordings_matched,
            late_matches = stats.late_matches,
            ambiguous = stats.ambiguous,
            "Series synchronized"
        );
        Ok(SyncOutcome::Success(stats))
    }

    // =========================================================================
    // Step 2: identity
    // =========================================================================

    /// Resolve the remote id; `Some(outcome)` ends the pass
    async fn resolve_identity(
        &self,
        series: &mut Tracked<Series>,
        stats: &mut SyncStats,
    ) -> Result<Option<SyncOutcome>> {
        let chosen = self.errors.chosen_name(series.id).await?;
        let hint = series.remote_title_hint.clone();

        let result = self
            .identity
            .resolve(&series.title, hint.as_deref(), chosen.as_deref())
            .await;
        let lookup = match result {
            Ok(lookup) => lookup,
            Err(e) => {
                let attempted = self.identity.search_title(&series.title, hint.as_deref());
                return self
                    .transient_failure(series, attempted, e.to_string())
                    .await
                    .map(Some);
            }
        };

        self.store_possible_matches(series.id, &lookup).await?;
        let now = self.clock.now();

        match lookup.decision {
            IdentityDecision::NotFound => {
                self.errors
                    .open_or_refresh(
                        series,
                        ErrorKind::NotFound,
                        ErrorContext::new(&lookup.search_title),
                    )
                    .await?;
                record_failure(series, "no remote series found", now);
                self.commit_series(series).await?;
                warn!(search_title = %lookup.search_title, "No remote series found");
                Ok(Some(SyncOutcome::NotFound))
            }
            IdentityDecision::NameMismatch { candidate } => {
                self.errors
                    .open_or_refresh(
                        series,
                        ErrorKind::NameMismatch,
                        ErrorContext::new(&lookup.search_title).with_candidate(&candidate.name),
                    )
                    .await?;
                record_failure(
                    series,
                    format!("top remote candidate is named {}", candidate.name),
                    now,
                );
                self.commit_series(series).await?;
                warn!(
                    title = %series.title,
                    candidate = %candidate.name,
                    "Remote series name mismatch"
                );
                Ok(Some(SyncOutcome::NameMismatch))
            }
            IdentityDecision::Accepted {
                candidate,
                rename_to,
            } => {
                series.remote_series_id = Some(candidate.id);
                if let Some(name) = rename_to {
                    info!(from = %series.title, to = %name, "Accepted operator-chosen name");
                    series.title = name;
                    stats.renamed = true;
                }
                self.commit_series(series).await?;
                debug!(remote_series_id = candidate.id, "Resolved remote series");
                Ok(None)
            }
        }
    }

    async fn store_possible_matches(
        &self,
        series_id: SeriesId,
        lookup: &IdentityLookup,
    ) -> Result<()> {
        let now = self.clock.now();
        let matches: Vec<PossibleMatch> = lookup
            .candidates
            .iter()
            .take(self.settings.max_possible_matches)
            .enumerate()
            .map(|(rank, candidate)| PossibleMatch {
                series_id,
                rank: rank as u32,
                remote_series_id: candidate.id,
                remote_name: candidate.name.clone(),
                recorded_at: now,
            })
            .collect();

        self.repos
            .possible_matches
            .replace_for_series(series_id, &matches)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Step 3: rebuild
    // =========================================================================

    async fn rebuild_remote_side(
        &self,
        series: &mut Tracked<Series>,
        previous_remote_id: Option<i64>,
    ) -> Result<()> {
        let series_id = series.id;
        let now = self.clock.now();
        let mut unlinked = 0usize;

        for episode in self.repos.episodes.list_live_by_series(series_id).await? {
            let Some(remote_row_id) = episode.remote_episode_id else {
                continue;
            };

            if let Some(row) = self.repos.remote_episodes.find_by_id(remote_row_id).await? {
                self.retire_remote_row(row).await?;
            }

            let mut episode = Tracked::new(episode);
            episode.remote_episode_id = None;
            if episode.recording_id.is_none() {
                episode.retired = true;
            }
            episode.updated_at = now;
            self.commit_episode(&mut episode).await?;
            unlinked += 1;
        }

        let mut remote_ids: Vec<i64> = previous_remote_id.into_iter().collect();
        remote_ids.extend(series.remote_series_id);
        remote_ids.dedup();
        for remote_id in remote_ids {
            for row in self
                .repos
                .remote_episodes
                .list_live_by_remote_series(remote_id)
                .await?
            {
                self.retire_remote_row(row).await?;
            }
        }

        series.matched_wrong = false;
        series.needs_rematch = false;
        self.commit_series(series).await?;
        let counters = self.counters.recompute_from_scratch(series_id).await?;

        info!(
            unlinked,
            matched = counters.matched,
            unmatched = counters.unmatched,
            "Rebuilt remote side of series"
        );
        Ok(())
    }

    async fn retire_remote_row(&self, row: RemoteEpisodeRecord) -> Result<()> {
        let mut row = Tracked::new(row);
        row.retired = true;
        if let Some(fields) = row.take_changes() {
            self.repos.remote_episodes.update(&row, &fields).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Step 4: remote episodes
    // =========================================================================

    async fn upsert_remote_row(
        &self,
        series_id: SeriesId,
        remote: &bridge_traits::metadata::RemoteEpisode,
    ) -> Result<RemoteEpisodeRecord> {
        let existing = self
            .repos
            .remote_episodes
            .find_by_remote_id(remote.id)
            .await
            .map_err(|e| SyncError::from_library(series_id, e))?;

        match existing {
            Some(row) => {
                let mut row = Tracked::new(row);
                row.refresh_from(remote);
                // Listed again upstream, so live again after a rebuild
                row.retired = false;
                if let Some(fields) = row.take_changes() {
                    self.repos.remote_episodes.update(&row, &fields).await?;
                }
                Ok(row.into_inner())
            }
            None => {
                let row = RemoteEpisodeRecord::from_remote(remote);
                self.repos.remote_episodes.insert(&row).await?;
                Ok(row)
            }
        }
    }

    /// Upsert every fetched row and refresh the episodes already linked to
    /// one; returns the rows no episode links yet, in feed order
    async fn refresh_remote_rows(
        &self,
        series_id: SeriesId,
        remote_episodes: &[bridge_traits::metadata::RemoteEpisode],
        stats: &mut SyncStats,
    ) -> Result<Vec<RemoteEpisodeRecord>> {
        let mut fresh: Vec<RemoteEpisodeRecord> = Vec::new();

        for remote in remote_episodes {
            let row = self.upsert_remote_row(series_id, remote).await?;
            let linked = self
                .repos
                .episodes
                .find_by_remote_episode(row.id)
                .await
                .map_err(|e| SyncError::from_library(series_id, e))?;

            match linked {
                Some(episode) => {
                    let mut episode = Tracked::new(episode);
                    episode.copy_remote_fields(&row);
                    if self.commit_episode(&mut episode).await? {
                        stats.episodes_updated += 1;
                    }
                }
                None if fresh.iter().any(|f| f.id == row.id) => {
                    debug!(
                        remote_episode_id = row.remote_episode_id,
                        "Remote episode listed twice"
                    );
                }
                None => fresh.push(row),
            }
        }
        Ok(fresh)
    }

    // =========================================================================
    // Steps 4 and 5: matching
    // =========================================================================

    /// Link unmatched recordings to unlinked remote rows
    ///
    /// Candidates are this pass's unlinked rows followed by the series'
    /// remote-only episodes. Every decision is taken by the recording-side
    /// matcher over all candidates, and a recording is linked only when the
    /// row it picks also picks it back among the unmatched recordings.
    async fn link_recordings(&self, pass: &mut MatchPass, stats: &mut SyncStats) -> Result<()> {
        let mut i = 0;

        while i < pass.unmatched.len() && pass.has_candidates() {
            let rows = pass.candidate_rows();

            let (index, tier) = match match_recording(&pass.unmatched[i], &rows) {
                MatchResult::Matched { index, tier } => (index, tier),
                MatchResult::Ambiguous { tier, candidates } => {
                    warn!(
                        recording_id = %pass.unmatched[i].id,
                        tier = %tier,
                        candidates,
                        "Ambiguous remote match; recording stays unmatched"
                    );
                    stats.ambiguous += 1;
                    i += 1;
                    continue;
                }
                MatchResult::Unmatched => {
                    i += 1;
                    continue;
                }
            };

            let picked_back = matches!(
                match_remote(&rows[index], &pass.unmatched),
                MatchResult::Matched { index: back, .. } if back == i
            );
            if !picked_back {
                warn!(
                    recording_id = %pass.unmatched[i].id,
                    remote_episode_id = rows[index].remote_episode_id,
                    tier = %tier,
                    "Remote episode also fits other recordings; recording stays unmatched"
                );
                stats.ambiguous += 1;
                i += 1;
                continue;
            }

            let recording = pass.unmatched.remove(i);
            debug!(
                remote_episode_id = rows[index].remote_episode_id,
                recording_id = %recording.id,
                tier = %tier,
                "Matched recording to remote episode"
            );

            if index < pass.fresh.len() {
                let row = pass.fresh.remove(index);
                self.link_fresh_row(pass, recording, &row, stats).await?;
                stats.recordings_matched += 1;
            } else {
                let (target, _) = pass.remote_only.remove(index - pass.fresh.len());
                self.link_remote_only(pass, recording, target).await?;
                stats.late_matches += 1;
            }
        }
        Ok(())
    }

    /// Attach a row no episode links yet to the recording's episode
    async fn link_fresh_row(
        &self,
        pass: &mut MatchPass,
        recording: Recording,
        row: &RemoteEpisodeRecord,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let series_id = pass.series_id;

        match pass.episode_by_recording.remove(&recording.id) {
            Some(episode) => {
                let mut episode = Tracked::new(episode);
                episode.remote_episode_id = Some(row.id);
                episode.copy_remote_fields(row);
                self.commit_episode(&mut episode).await?;
                self.counters
                    .apply(series_id, counters::episode_matched())
                    .await?;
            }
            None => {
                warn!(recording_id = %recording.id, "Recording had no episode; creating one");
                let mut episode = Episode::for_recording(series_id, &recording, self.clock.now());
                episode.remote_episode_id = Some(row.id);
                episode.copy_remote_fields(row);
                self.repos.episodes.insert(&episode).await?;
                stats.episodes_created += 1;

                let mut delta = counters::recording_added(&recording);
                delta.apply(&counters::episode_matched());
                self.counters.apply(series_id, delta).await?;
            }
        }
        Ok(())
    }

    /// Move a recording onto a remote-only episode, retiring its own episode
    async fn link_remote_only(
        &self,
        pass: &mut MatchPass,
        recording: Recording,
        target: Episode,
    ) -> Result<()> {
        let delta = match pass.episode_by_recording.remove(&recording.id) {
            Some(old) => {
                let mut old = Tracked::new(old);
                old.retired = true;
                self.commit_episode(&mut old).await?;
                counters::recording_matched_to_remote_only()
            }
            None => {
                let mut delta = counters::recording_added(&recording);
                delta.apply(&counters::recording_matched_to_remote_only());
                delta
            }
        };

        let mut target = Tracked::new(target);
        target.recording_id = Some(recording.id);
        self.commit_episode(&mut target).await?;
        self.counters.apply(pass.series_id, delta).await?;
        Ok(())
    }

    /// Rows left unlinked after matching become remote-only episodes
    async fn add_remote_only_episodes(
        &self,
        pass: &mut MatchPass,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let series_id = pass.series_id;
        let now = self.clock.now();

        for row in std::mem::take(&mut pass.fresh) {
            let episode = Episode::for_remote(series_id, &row, now);
            self.repos.episodes.insert(&episode).await?;
            self.counters
                .apply(series_id, counters::remote_episode_added())
                .await?;
            pass.remote_only.push((episode, row));
            stats.episodes_created += 1;
        }
        Ok(())
    }

    // =========================================================================
    // Failure & persistence helpers
    // =========================================================================

    async fn transient_failure(
        &self,
        series: &mut Tracked<Series>,
        attempted: String,
        message: String,
    ) -> Result<SyncOutcome> {
        record_failure(series, message.clone(), self.clock.now());
        self.commit_series(series).await?;

        warn!(
            title = %series.title,
            consecutive_errors = series.consecutive_errors,
            error = %message,
            "Remote lookup failed"
        );

        if series.consecutive_errors >= self.settings.persist_lookup_failures_after {
            self.errors
                .open_or_refresh(
                    series,
                    ErrorKind::LookupFailed,
                    ErrorContext::new(attempted).with_detail(&message),
                )
                .await?;
        }

        Ok(SyncOutcome::TransientFailure { message })
    }

    async fn commit_series(&self, series: &mut Tracked<Series>) -> Result<bool> {
        if series.is_dirty() {
            series.updated_at = self.clock.now();
        }
        match series.take_changes() {
            Some(fields) => {
                self.repos.series.update(series, &fields).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write changed episode fields; `true` if anything was written
    async fn commit_episode(&self, episode: &mut Tracked<Episode>) -> Result<bool> {
        if episode.is_dirty() {
            episode.updated_at = self.clock.now();
        }
        match episode.take_changes() {
            Some(fields) => {
                self.repos.episodes.update(episode, &fields).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Working set of one series pass
struct MatchPass {
    series_id: SeriesId,
    /// Recordings without a remote link, in recorder order
    unmatched: Vec<Recording>,
    /// Live recording-only episodes keyed by their recording
    episode_by_recording: HashMap<RecordingId, Episode>,
    /// Remote rows no episode links yet
    fresh: Vec<RemoteEpisodeRecord>,
    /// Live remote-only episodes with their remote rows
    remote_only: Vec<(Episode, RemoteEpisodeRecord)>,
}

impl MatchPass {
    async fn load(
        repos: &Repositories,
        series_id: SeriesId,
        fresh: Vec<RemoteEpisodeRecord>,
    ) -> Result<Self> {
        let episodes = repos.episodes.list_live_by_series(series_id).await?;
        let mut recordings = repos.recordings.list_by_series(series_id).await?;
        recordings.sort_by_key(|r| r.recorder_recording_id);

        let mut linked: HashMap<RecordingId, &Episode> = HashMap::new();
        for episode in &episodes {
            if let Some(recording_id) = episode.recording_id {
                if linked.insert(recording_id, episode).is_some() {
                    return Err(SyncError::invariant(
                        series_id,
                        format!("recording {} is linked from several episodes", recording_id),
                    ));
                }
            }
        }

        let mut unmatched = Vec::new();
        let mut episode_by_recording = HashMap::new();
        for recording in recordings {
            match linked.get(&recording.id) {
                Some(episode) if episode.remote_episode_id.is_some() => {}
                Some(episode) => {
                    episode_by_recording.insert(recording.id, (*episode).clone());
                    unmatched.push(recording);
                }
                None => unmatched.push(recording),
            }
        }

        let mut remote_only = Vec::new();
        for episode in episodes.iter().filter(|e| e.is_remote_only()) {
            let Some(row_id) = episode.remote_episode_id else {
                continue;
            };
            let row = repos.remote_episodes.find_by_id(row_id).await?.ok_or_else(|| {
                SyncError::invariant(
                    series_id,
                    format!("episode {} links missing remote row {}", episode.id, row_id),
                )
            })?;
            if !row.retired {
                remote_only.push((episode.clone(), row));
            }
        }

        Ok(Self {
            series_id,
            unmatched,
            episode_by_recording,
            fresh,
            remote_only,
        })
    }

    fn has_candidates(&self) -> bool {
        !self.fresh.is_empty() || !self.remote_only.is_empty()
    }

    /// Fresh rows first, then the rows behind remote-only episodes
    fn candidate_rows(&self) -> Vec<RemoteEpisodeRecord> {
        self.fresh
            .iter()
            .cloned()
            .chain(self.remote_only.iter().map(|(_, row)| row.clone()))
            .collect()
    }
}
