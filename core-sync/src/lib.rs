//! # Episode Sync
//!
//! Keeps the catalog's episodes in step with the recorder and the remote
//! TV-metadata service.
//!
//! ## Overview
//!
//! - Ingesting the recorder feed into series, recordings and episodes
//! - Resolving each series' remote identity and reconciling its episode list
//! - Keeping per-series counters consistent with the episode rows
//! - Tracking identity failures with retry triage and operator overrides
//! - Discovering upstream changes incrementally and resyncing only what moved
//!
//! ## Components
//!
//! - **Recording Ingestor** (`ingest`): Pages through the recorder feed
//! - **Series Reconciler** (`reconciler`): One series' identity + episode pass
//! - **Counter Maintainer** (`counters`): Deltas plus recompute-from-scratch
//! - **Error Workflow** (`error_workflow`): Error log lifecycle and retry triage
//! - **Sync Scheduler** (`scheduler`): Per-series locking and full passes
//! - **Change Finder** (`change_finder`): Changed-since polling loop
//! - **Series Locks** (`locks`): Keyed async mutex shared by ingest and sync

pub mod change_finder;
pub mod counters;
pub mod error;
pub mod error_workflow;
pub mod ingest;
pub mod locks;
pub mod reconciler;
pub mod scheduler;

pub use change_finder::{CycleReport, IncrementalChangeFinder, VerificationReport};
pub use counters::{CounterDrift, CounterMaintainer};
pub use error::{Result, SyncError};
pub use error_workflow::{ErrorContext, ErrorWorkflow, RetryDecision};
pub use ingest::{IngestReport, RecordingIngestor, RowChange};
pub use locks::{SeriesGuard, SeriesLocks};
pub use reconciler::{SeriesReconciler, SyncOutcome, SyncStats};
pub use scheduler::{FullSyncReport, ResyncTrigger, SyncScheduler};
