//! # Incremental Change Finder
//!
//! Polls the remote service's changed-since feed and turns each new
//! (remote series, last-updated) pair into a targeted resync.
//!
//! ## Watermark
//!
//! The first cycle starts from the later of the most recent successful full
//! sync's start and the most recent work item's discovery time, or from now
//! when neither exists. Every query looks `safety_buffer` behind the
//! watermark, and the watermark moves to the clock's "now" once a cycle has
//! gone through its pairs. A remote update stamped earlier than the query
//! instant but published after it can therefore fall behind the next window
//! if it lands more than `safety_buffer` late; [`IncrementalChangeFinder::verify_window`]
//! exists to catch exactly that.
//!
//! ## Verification mode
//!
//! Runs the configured number of incremental cycles without creating work
//! items or triggering resyncs, then issues a single query over the same
//! span and reports every pair the incremental cycles should have seen but
//! did not.

use crate::error::{Result, SyncError};
use crate::scheduler::ResyncTrigger;
use bridge_traits::metadata::{ChangedSeries, RemoteMetadataClient};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_library::models::WorkItem;
use core_library::Repositories;
use core_runtime::ChangeFinderConfig;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Totals for one polling cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Lower bound passed to the changed-since query
    pub since: DateTime<Utc>,
    pub pairs_seen: usize,
    /// Pairs for remote series the catalog does not hold
    pub unknown_series: usize,
    /// Pairs already recorded as work items
    pub already_known: usize,
    pub work_items_created: usize,
    pub resyncs_triggered: usize,
    pub resync_failures: usize,
    /// Watermark after the cycle
    pub watermark: DateTime<Utc>,
}

/// Result of a verification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub cycles: usize,
    /// Start of the verified span, safety buffer included
    pub window_start: DateTime<Utc>,
    pub incremental_pairs: BTreeSet<ChangedSeries>,
    pub full_pairs: BTreeSet<ChangedSeries>,
    /// Pairs returned by the full query, no later than the newest
    /// incrementally-seen timestamp, that no incremental cycle returned
    pub defects: Vec<ChangedSeries>,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.defects.is_empty()
    }
}

/// Discovers per-series upstream changes and requests resyncs for them
pub struct IncrementalChangeFinder {
    repos: Repositories,
    client: Arc<dyn RemoteMetadataClient>,
    trigger: Arc<dyn ResyncTrigger>,
    clock: Arc<dyn Clock>,
    config: ChangeFinderConfig,
    watermark: Mutex<Option<DateTime<Utc>>>,
}

impl IncrementalChangeFinder {
    pub fn new(
        repos: Repositories,
        client: Arc<dyn RemoteMetadataClient>,
        trigger: Arc<dyn ResyncTrigger>,
        clock: Arc<dyn Clock>,
        config: ChangeFinderConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repos,
            client,
            trigger,
            clock,
            config,
            watermark: Mutex::new(None),
        })
    }

    /// Current watermark, loading it from storage on first use
    pub async fn watermark(&self) -> Result<DateTime<Utc>> {
        let mut watermark = self.watermark.lock().await;
        match *watermark {
            Some(value) => Ok(value),
            None => {
                let value = self.initial_watermark().await?;
                *watermark = Some(value);
                Ok(value)
            }
        }
    }

    async fn initial_watermark(&self) -> Result<DateTime<Utc>> {
        let last_full = self
            .repos
            .sync_runs
            .latest_successful_full()
            .await?
            .map(|run| run.started_at);
        let last_discovery = self.repos.work_items.latest_discovered_at().await?;

        let initial = match (last_full, last_discovery) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => self.clock.now(),
        };
        debug!(
            last_full = ?last_full,
            last_discovery = ?last_discovery,
            watermark = %initial,
            "Initialized change-finder watermark"
        );
        Ok(initial)
    }

    fn query_start(&self, watermark: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let buffer = chrono::Duration::from_std(self.config.safety_buffer())
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        Ok(watermark - buffer)
    }

    /// Run one polling cycle
    ///
    /// A failed resync is logged and counted; its work item stays recorded,
    /// so the same pair is not retried by later cycles. The series is picked
    /// up again by the next full pass.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let watermark = self.watermark().await?;
        let since = self.query_start(watermark)?;
        let pairs = self.client.get_changed_since(since).await?;

        let mut report = CycleReport {
            since,
            pairs_seen: pairs.len(),
            unknown_series: 0,
            already_known: 0,
            work_items_created: 0,
            resyncs_triggered: 0,
            resync_failures: 0,
            watermark,
        };

        for pair in pairs {
            let series = match self.repos.series.find_by_remote_id(pair.remote_series_id).await {
                Ok(Some(series)) => series,
                Ok(None) => {
                    report.unknown_series += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        remote_series_id = pair.remote_series_id,
                        error = %e,
                        "Series lookup failed for changed remote series"
                    );
                    report.resync_failures += 1;
                    continue;
                }
            };

            if self
                .repos
                .work_items
                .exists(pair.remote_series_id, pair.last_updated)
                .await?
            {
                report.already_known += 1;
                continue;
            }

            let item = WorkItem::new(pair.remote_series_id, pair.last_updated, self.clock.now());
            self.repos.work_items.insert(&item).await?;
            report.work_items_created += 1;

            debug!(
                series_id = %series.id,
                remote_series_id = pair.remote_series_id,
                last_updated = %pair.last_updated,
                "Triggering targeted resync"
            );
            match self.trigger.resync(series.id).await {
                Ok(outcome) => {
                    debug!(series_id = %series.id, outcome = %outcome, "Targeted resync finished");
                    report.resyncs_triggered += 1;
                }
                Err(e) => {
                    error!(series_id = %series.id, error = %e, "Targeted resync failed");
                    report.resync_failures += 1;
                }
            }
        }

        let next = self.clock.now();
        *self.watermark.lock().await = Some(next);
        report.watermark = next;

        info!(
            since = %report.since,
            pairs = report.pairs_seen,
            work_items = report.work_items_created,
            resyncs = report.resyncs_triggered,
            failures = report.resync_failures,
            "Change-finder cycle finished"
        );
        Ok(report)
    }

    /// Poll until `cancel` fires
    ///
    /// Cycle failures are logged; the loop carries on with the next cycle.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            safety_buffer_secs = self.config.safety_buffer_secs,
            "Change finder started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Change-finder cycle failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!("Change finder stopped");
    }

    /// Compare incremental polling against a single full-window query
    ///
    /// Uses its own copy of the watermark; the polling loop's watermark is
    /// left untouched.
    #[instrument(skip(self))]
    pub async fn verify_window(&self) -> Result<VerificationReport> {
        let start = self.watermark().await?;
        let window_start = self.query_start(start)?;
        let mut watermark = start;
        let mut incremental_pairs = BTreeSet::new();

        for cycle in 0..self.config.verification_cycles {
            if cycle > 0 {
                tokio::time::sleep(self.config.poll_interval()).await;
            }

            let since = self.query_start(watermark)?;
            let pairs = self.client.get_changed_since(since).await?;
            debug!(cycle, since = %since, pairs = pairs.len(), "Verification cycle");
            incremental_pairs.extend(pairs);
            watermark = self.clock.now();
        }

        let full_pairs: BTreeSet<ChangedSeries> = self
            .client
            .get_changed_since(window_start)
            .await?
            .into_iter()
            .collect();

        let defects = match incremental_pairs.iter().map(|p| p.last_updated).max() {
            Some(latest) => full_pairs
                .iter()
                .filter(|p| p.last_updated <= latest && !incremental_pairs.contains(p))
                .copied()
                .collect(),
            None => Vec::new(),
        };

        let report = VerificationReport {
            cycles: self.config.verification_cycles,
            window_start,
            incremental_pairs,
            full_pairs,
            defects,
        };

        if report.is_consistent() {
            info!(
                cycles = report.cycles,
                pairs = report.incremental_pairs.len(),
                "Incremental polling matches the full query"
            );
        } else {
            for defect in &report.defects {
                warn!(
                    remote_series_id = defect.remote_series_id,
                    last_updated = %defect.last_updated,
                    "Pair missed by incremental polling"
                );
            }
        }
        Ok(report)
    }
}
