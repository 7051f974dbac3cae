//! Work item repository trait

use crate::error::Result;
use crate::models::WorkItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Change-finder work items. Written once, never mutated.
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// Whether a work item exists for the (series, last-updated) pair
    async fn exists(&self, remote_series_id: i64, last_updated: DateTime<Utc>) -> Result<bool>;

    async fn insert(&self, item: &WorkItem) -> Result<()>;

    /// Discovery time of the newest work item
    async fn latest_discovered_at(&self) -> Result<Option<DateTime<Utc>>>;

    async fn list(&self) -> Result<Vec<WorkItem>>;
}
