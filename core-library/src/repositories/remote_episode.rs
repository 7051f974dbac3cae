//! Remote episode repository trait

use crate::error::Result;
use crate::models::{RemoteEpisodeId, RemoteEpisodeRecord};
use crate::tracking::RemoteEpisodeField;
use async_trait::async_trait;

/// Stored remote episode rows. Finders only see live rows.
#[async_trait]
pub trait RemoteEpisodeRepository: Send + Sync {
    async fn find_by_id(&self, id: RemoteEpisodeId) -> Result<Option<RemoteEpisodeRecord>>;

    /// Live row for a remote episode id
    ///
    /// # Errors
    /// `NonUnique` if several live rows carry the id
    async fn find_by_remote_id(&self, remote_episode_id: i64)
        -> Result<Option<RemoteEpisodeRecord>>;

    /// Live rows of a remote series
    async fn list_live_by_remote_series(
        &self,
        remote_series_id: i64,
    ) -> Result<Vec<RemoteEpisodeRecord>>;

    async fn insert(&self, record: &RemoteEpisodeRecord) -> Result<()>;

    async fn update(&self, record: &RemoteEpisodeRecord, fields: &[RemoteEpisodeField])
        -> Result<()>;
}
