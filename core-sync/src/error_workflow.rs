//! # Series Error Workflow
//!
//! Tracks why a series could not be tied to its remote identity and decides
//! when it is worth trying again.
//!
//! ## Entry lifecycle
//!
//! Per (series, kind) an entry moves `NONE -> OPEN -> RESOLVED`:
//!
//! - a failure of a kind with no open entry opens one
//! - a repeat failure refreshes the open entry (occurrence count, last seen,
//!   context)
//! - any successful sync resolves every open entry of the series
//!
//! Entries are never deleted. Operators can flag an open entry `ignore`, which
//! makes the next sync stop matching the series for good, or record a chosen
//! name on a `NameMismatch` entry, which the next sync accepts.
//!
//! ## Retry triage
//!
//! A series with no open entry is always eligible. With an open entry it stays
//! eligible while its consecutive failures are below the threshold; at or
//! above it, only once the cooldown since the last failure has passed.

use crate::error::{Result, SyncError};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_library::models::{ErrorKind, ErrorLogEntry, ErrorLogId, Series, SeriesId};
use core_library::tracking::Tracked;
use core_library::{LibraryError, Repositories};
use core_runtime::SyncSettings;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether a series should be attempted now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Eligible,
    /// Failing repeatedly; wait until `until`
    CoolingDown { until: DateTime<Utc> },
}

impl RetryDecision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, RetryDecision::Eligible)
    }
}

/// Retry triage for one series
pub fn triage(
    series: &Series,
    has_open_error: bool,
    settings: &SyncSettings,
    now: DateTime<Utc>,
) -> RetryDecision {
    if !has_open_error || series.consecutive_errors < settings.retry_threshold {
        return RetryDecision::Eligible;
    }

    let Some(last_failure) = series.last_failure_at else {
        return RetryDecision::Eligible;
    };

    let cooldown = chrono::Duration::seconds(settings.retry_cooldown_secs as i64);
    let until = last_failure + cooldown;
    if now >= until {
        RetryDecision::Eligible
    } else {
        RetryDecision::CoolingDown { until }
    }
}

/// Stamp a failed attempt on a series
pub fn record_failure(series: &mut Series, message: impl Into<String>, now: DateTime<Utc>) {
    series.consecutive_errors = series.consecutive_errors.saturating_add(1);
    series.last_error = Some(message.into());
    series.last_failure_at = Some(now);
    series.updated_at = now;
}

/// Stamp a successful attempt on a series
pub fn record_success(series: &mut Series, now: DateTime<Utc>) {
    series.consecutive_errors = 0;
    series.last_error = None;
    series.last_failure_at = None;
    series.updated_at = now;
}

/// Context written onto an opened or refreshed entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub attempted_title: String,
    pub candidate_name: Option<String>,
    pub failure_detail: Option<String>,
}

impl ErrorContext {
    pub fn new(attempted_title: impl Into<String>) -> Self {
        Self {
            attempted_title: attempted_title.into(),
            ..Default::default()
        }
    }

    pub fn with_candidate(mut self, name: impl Into<String>) -> Self {
        self.candidate_name = Some(name.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.failure_detail = Some(detail.into());
        self
    }
}

/// Error log operations shared by the reconciler, scheduler and operators
pub struct ErrorWorkflow {
    repos: Repositories,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl ErrorWorkflow {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>, settings: SyncSettings) -> Self {
        Self {
            repos,
            clock,
            settings,
        }
    }

    /// Open an entry of `kind` for the series, or refresh the open one
    pub async fn open_or_refresh(
        &self,
        series: &Series,
        kind: ErrorKind,
        context: ErrorContext,
    ) -> Result<ErrorLogEntry> {
        let now = self.clock.now();
        let existing = self
            .repos
            .error_log
            .find_open(series.id, kind)
            .await
            .map_err(|e| SyncError::from_library(series.id, e))?;

        match existing {
            Some(entry) => {
                let mut entry = Tracked::new(entry);
                entry.occurrences = entry.occurrences.saturating_add(1);
                entry.last_seen_at = now;
                entry.attempted_title = context.attempted_title;
                if context.candidate_name.is_some() {
                    entry.candidate_name = context.candidate_name;
                }
                if context.failure_detail.is_some() {
                    entry.failure_detail = context.failure_detail;
                }

                if let Some(fields) = entry.take_changes() {
                    self.repos.error_log.update(&entry, &fields).await?;
                }
                debug!(
                    series_id = %series.id,
                    kind = %kind,
                    occurrences = entry.occurrences,
                    "Refreshed open error entry"
                );
                Ok(entry.into_inner())
            }
            None => {
                let mut entry = ErrorLogEntry::open(series, kind, context.attempted_title, now);
                entry.candidate_name = context.candidate_name;
                entry.failure_detail = context.failure_detail;
                self.repos.error_log.insert(&entry).await?;
                info!(
                    series_id = %series.id,
                    kind = %kind,
                    title = %series.title,
                    "Opened error entry"
                );
                Ok(entry)
            }
        }
    }

    /// Resolve every open entry of a series; returns how many were resolved
    pub async fn resolve_all(&self, series_id: SeriesId) -> Result<usize> {
        let now = self.clock.now();
        let open = self.repos.error_log.list_open_by_series(series_id).await?;
        let count = open.len();

        for entry in open {
            self.resolve_entry(entry, now).await?;
        }

        if count > 0 {
            info!(series_id = %series_id, resolved = count, "Resolved error entries");
        }
        Ok(count)
    }

    async fn resolve_entry(
        &self,
        entry: ErrorLogEntry,
        now: DateTime<Utc>,
    ) -> Result<ErrorLogEntry> {
        let mut entry = Tracked::new(entry);
        entry.resolved = true;
        entry.resolved_at = Some(now);
        if let Some(fields) = entry.take_changes() {
            self.repos.error_log.update(&entry, &fields).await?;
        }
        Ok(entry.into_inner())
    }

    /// Open entry of the series flagged `ignore` by an operator
    pub async fn ignored_entry(&self, series_id: SeriesId) -> Result<Option<ErrorLogEntry>> {
        let open = self.repos.error_log.list_open_by_series(series_id).await?;
        Ok(open.into_iter().find(|e| e.ignore))
    }

    /// Resolve an ignored entry once the series has been excluded
    pub async fn resolve_ignored(&self, entry: ErrorLogEntry) -> Result<ErrorLogEntry> {
        self.resolve_entry(entry, self.clock.now()).await
    }

    /// Operator-chosen name recorded on the open `NameMismatch` entry
    pub async fn chosen_name(&self, series_id: SeriesId) -> Result<Option<String>> {
        let entry = self
            .repos
            .error_log
            .find_open(series_id, ErrorKind::NameMismatch)
            .await
            .map_err(|e| SyncError::from_library(series_id, e))?;
        Ok(entry.and_then(|e| e.chosen_name))
    }

    /// Whether the series has any open entry
    pub async fn has_open_error(&self, series_id: SeriesId) -> Result<bool> {
        Ok(!self
            .repos
            .error_log
            .list_open_by_series(series_id)
            .await?
            .is_empty())
    }

    /// Retry triage against the current clock
    pub async fn triage(&self, series: &Series) -> Result<RetryDecision> {
        let has_open = self.has_open_error(series.id).await?;
        Ok(triage(series, has_open, &self.settings, self.clock.now()))
    }

    // =========================================================================
    // Operator operations
    // =========================================================================

    async fn open_entry(&self, id: ErrorLogId) -> Result<Tracked<ErrorLogEntry>> {
        let entry = self
            .repos
            .error_log
            .find_by_id(id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity_type: "ErrorLogEntry".to_string(),
                id: id.to_string(),
            })?;

        if entry.resolved {
            return Err(LibraryError::InvalidInput {
                field: "resolved".to_string(),
                message: format!("error entry {} is already resolved", id),
            }
            .into());
        }
        Ok(Tracked::new(entry))
    }

    /// Flag an open entry so the next sync stops matching its series
    pub async fn set_ignore(&self, id: ErrorLogId) -> Result<ErrorLogEntry> {
        let mut entry = self.open_entry(id).await?;
        entry.ignore = true;
        if let Some(fields) = entry.take_changes() {
            self.repos.error_log.update(&entry, &fields).await?;
        }
        info!(entry_id = %id, series_id = %entry.series_id, "Error entry marked ignore");
        Ok(entry.into_inner())
    }

    /// Record the remote name an operator approved for a mismatch
    pub async fn choose_name(
        &self,
        id: ErrorLogId,
        name: impl Into<String>,
    ) -> Result<ErrorLogEntry> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "chosen_name".to_string(),
                message: "chosen name cannot be empty".to_string(),
            }
            .into());
        }

        let mut entry = self.open_entry(id).await?;
        if entry.kind != ErrorKind::NameMismatch {
            warn!(
                entry_id = %id,
                kind = %entry.kind,
                "Chosen name only applies to name mismatches"
            );
            return Err(LibraryError::InvalidInput {
                field: "kind".to_string(),
                message: format!("error entry {} is {}, not a name mismatch", id, entry.kind),
            }
            .into());
        }

        entry.chosen_name = Some(name);
        if let Some(fields) = entry.take_changes() {
            self.repos.error_log.update(&entry, &fields).await?;
        }
        info!(entry_id = %id, series_id = %entry.series_id, "Chosen name recorded");
        Ok(entry.into_inner())
    }

    /// Every open entry, oldest first
    pub async fn list_open(&self) -> Result<Vec<ErrorLogEntry>> {
        Ok(self.repos.error_log.list_open().await?)
    }
}
