//! # Repository Pattern Implementation
//!
//! This module provides repository traits for data access and an in-memory
//! store implementing every one of them.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - `update` takes the list of changed fields (see [`crate::tracking`]) and
//!   writes only those
//! - Unique finders return [`crate::LibraryError::NonUnique`] on duplicate rows
//! - [`Repositories`] bundles one handle per entity for injection
//!
//! ## Available Repositories
//!
//! - `SeriesRepository` - Series with flags, counters and retry bookkeeping
//! - `EpisodeRepository` - Recording/remote join rows
//! - `RecordingRepository` - Recorder-side recordings
//! - `RemoteEpisodeRepository` - Stored remote episode metadata
//! - `ErrorLogRepository` - Operator-facing identity resolution failures
//! - `WorkItemRepository` - Change-finder discoveries
//! - `PossibleMatchRepository` - Top remote candidates per series
//! - `SyncRunRepository` - Batch pass bookkeeping

pub mod episode;
pub mod error_log;
pub mod memory;
pub mod possible_match;
pub mod recording;
pub mod remote_episode;
pub mod series;
pub mod sync_run;
pub mod work_item;

pub use episode::EpisodeRepository;
pub use error_log::ErrorLogRepository;
pub use memory::MemoryStore;
pub use possible_match::PossibleMatchRepository;
pub use recording::RecordingRepository;
pub use remote_episode::RemoteEpisodeRepository;
pub use series::SeriesRepository;
pub use sync_run::SyncRunRepository;
pub use work_item::WorkItemRepository;

use std::sync::Arc;

/// One handle per repository, shared by every sync component
#[derive(Clone)]
pub struct Repositories {
    pub series: Arc<dyn SeriesRepository>,
    pub episodes: Arc<dyn EpisodeRepository>,
    pub recordings: Arc<dyn RecordingRepository>,
    pub remote_episodes: Arc<dyn RemoteEpisodeRepository>,
    pub error_log: Arc<dyn ErrorLogRepository>,
    pub work_items: Arc<dyn WorkItemRepository>,
    pub possible_matches: Arc<dyn PossibleMatchRepository>,
    pub sync_runs: Arc<dyn SyncRunRepository>,
}

impl Repositories {
    /// Every repository backed by the same store
    pub fn from_store(store: Arc<MemoryStore>) -> Self {
        Self {
            series: store.clone(),
            episodes: store.clone(),
            recordings: store.clone(),
            remote_episodes: store.clone(),
            error_log: store.clone(),
            work_items: store.clone(),
            possible_matches: store.clone(),
            sync_runs: store,
        }
    }

    /// Repositories over a fresh, empty in-memory store
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }
}
