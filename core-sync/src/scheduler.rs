//! # Sync Scheduler
//!
//! Runs series reconciliation with per-series serialization.
//!
//! ## Overview
//!
//! - [`SyncScheduler::sync_series`] reconciles one series under its lock; the
//!   change finder reaches it through [`ResyncTrigger`]
//! - [`SyncScheduler::run_full_pass`] records a [`SyncRun`], optionally ingests
//!   the recorder feed, triages every series, reconciles the eligible ones with
//!   bounded concurrency, and completes the run with outcome tallies
//!
//! A series whose pass returns an error is logged and counted; the batch
//! carries on with the other series.

use crate::error::{Result, SyncError};
use crate::error_workflow::{ErrorWorkflow, RetryDecision};
use crate::ingest::{IngestReport, RecordingIngestor};
use crate::locks::SeriesLocks;
use crate::reconciler::{SeriesReconciler, SyncOutcome};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_library::models::{OutcomeTallies, SeriesId, SyncRun};
use core_library::Repositories;
use core_runtime::SyncSettings;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

/// Requests a targeted resync of one series
#[async_trait]
pub trait ResyncTrigger: Send + Sync {
    async fn resync(&self, series_id: SeriesId) -> Result<SyncOutcome>;
}

/// Result of a full pass
#[derive(Debug, Clone)]
pub struct FullSyncReport {
    /// The completed run as stored
    pub run: SyncRun,
    /// Recorder ingest performed before reconciling, if configured
    pub ingest: Option<IngestReport>,
}

impl FullSyncReport {
    pub fn tallies(&self) -> &OutcomeTallies {
        &self.run.tallies
    }
}

fn tally(tallies: &mut OutcomeTallies, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Success(_) => tallies.succeeded += 1,
        SyncOutcome::NotFound => tallies.not_found += 1,
        SyncOutcome::NameMismatch => tallies.name_mismatch += 1,
        SyncOutcome::TransientFailure { .. } => tallies.transient_failures += 1,
        SyncOutcome::Ignored => tallies.ignored += 1,
    }
}

/// Serializes and batches series reconciliation
pub struct SyncScheduler {
    repos: Repositories,
    reconciler: Arc<SeriesReconciler>,
    ingestor: Option<Arc<RecordingIngestor>>,
    errors: ErrorWorkflow,
    locks: Arc<SeriesLocks>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl SyncScheduler {
    pub fn new(
        repos: Repositories,
        reconciler: Arc<SeriesReconciler>,
        locks: Arc<SeriesLocks>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        let errors = ErrorWorkflow::new(repos.clone(), clock.clone(), settings.clone());
        Self {
            repos,
            reconciler,
            ingestor: None,
            errors,
            locks,
            clock,
            settings,
        }
    }

    /// Ingest the recorder feed at the start of every full pass
    pub fn with_ingestor(mut self, ingestor: Arc<RecordingIngestor>) -> Self {
        self.ingestor = Some(ingestor);
        self
    }

    /// Reconcile one series, waiting for any pass already running on it
    pub async fn sync_series(&self, series_id: SeriesId) -> Result<SyncOutcome> {
        let _guard = self.locks.lock(series_id).await;
        self.reconciler.sync_series(series_id).await
    }

    /// Reconcile every eligible series once
    #[instrument(skip(self))]
    pub async fn run_full_pass(&self) -> Result<FullSyncReport> {
        let mut run = SyncRun::start_full(self.clock.now());
        self.repos.sync_runs.insert(&run).await?;
        info!(run_id = %run.id, "Full sync pass started");

        let ingest = match &self.ingestor {
            Some(ingestor) => match ingestor.ingest_all().await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(
                        run_id = %run.id,
                        error = %e,
                        "Recorder ingest failed; reconciling stored recordings"
                    );
                    None
                }
            },
            None => None,
        };

        let mut tallies = OutcomeTallies::default();
        let mut eligible = Vec::new();

        for series in self.repos.series.list().await? {
            if series.ignore_remote_match {
                tallies.ignored += 1;
                continue;
            }

            match self.errors.triage(&series).await? {
                RetryDecision::Eligible => eligible.push(series.id),
                RetryDecision::CoolingDown { until } => {
                    debug!(
                        series_id = %series.id,
                        consecutive_errors = series.consecutive_errors,
                        until = %until,
                        "Series cooling down"
                    );
                    tallies.deferred += 1;
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_series));
        let mut handles = Vec::with_capacity(eligible.len());

        for series_id in eligible {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Internal(e.to_string()))?;
            let reconciler = Arc::clone(&self.reconciler);
            let locks = Arc::clone(&self.locks);

            let handle = tokio::spawn(async move {
                let result = {
                    let _guard = locks.lock(series_id).await;
                    reconciler.sync_series(series_id).await
                };
                drop(permit);
                result
            });
            handles.push((series_id, handle));
        }

        for (series_id, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    debug!(series_id = %series_id, outcome = %outcome, "Series pass finished");
                    tally(&mut tallies, &outcome);
                }
                Ok(Err(e)) => {
                    error!(series_id = %series_id, error = %e, "Series pass failed");
                    tallies.errors += 1;
                }
                Err(e) => {
                    error!(series_id = %series_id, error = %e, "Series task panicked");
                    tallies.errors += 1;
                }
            }
        }

        let succeeded = tallies.errors == 0;
        run.complete(tallies, succeeded, self.clock.now());
        self.repos.sync_runs.update(&run).await?;

        if succeeded {
            info!(
                run_id = %run.id,
                succeeded = tallies.succeeded,
                not_found = tallies.not_found,
                name_mismatch = tallies.name_mismatch,
                transient_failures = tallies.transient_failures,
                ignored = tallies.ignored,
                deferred = tallies.deferred,
                "Full sync pass completed"
            );
        } else {
            warn!(
                run_id = %run.id,
                errors = tallies.errors,
                attempted = tallies.attempted(),
                "Full sync pass completed with errors"
            );
        }

        Ok(FullSyncReport { run, ingest })
    }
}

#[async_trait]
impl ResyncTrigger for SyncScheduler {
    async fn resync(&self, series_id: SeriesId) -> Result<SyncOutcome> {
        self.sync_series(series_id).await
    }
}
