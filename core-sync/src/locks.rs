//! Per-series mutual exclusion
//!
//! Reconciliation and recorder ingest both mutate a series' rows and cached
//! counters. Every writer holds the series' guard for the duration of its
//! work; different series proceed in parallel.

use core_library::models::SeriesId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Guard held while a series is being written
pub type SeriesGuard = OwnedMutexGuard<()>;

/// Keyed async locks, one per series
#[derive(Default)]
pub struct SeriesLocks {
    locks: Mutex<HashMap<SeriesId, Arc<Mutex<()>>>>,
}

impl SeriesLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a series
    pub async fn lock(&self, series_id: SeriesId) -> SeriesGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(series_id).or_default().clone()
        };
        trace!(series_id = %series_id, "Waiting for series lock");
        lock.lock_owned().await
    }

    /// Exclusive access if the series is not already being written
    pub async fn try_lock(&self, series_id: SeriesId) -> Option<SeriesGuard> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(series_id).or_default().clone()
        };
        lock.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_series_is_exclusive() {
        let locks = SeriesLocks::new();
        let series_id = SeriesId::new();

        let guard = locks.lock(series_id).await;
        assert!(locks.try_lock(series_id).await.is_none());

        drop(guard);
        assert!(locks.try_lock(series_id).await.is_some());
    }

    #[tokio::test]
    async fn test_different_series_do_not_block() {
        let locks = SeriesLocks::new();

        let _first = locks.lock(SeriesId::new()).await;
        assert!(locks.try_lock(SeriesId::new()).await.is_some());
    }
}
