//! Episode repository trait

use crate::error::Result;
use crate::models::{Episode, EpisodeId, RecordingId, RemoteEpisodeId, SeriesId};
use crate::tracking::EpisodeField;
use async_trait::async_trait;

/// Episode repository interface.
///
/// Finders other than `find_by_id` only see live (non-retired) episodes.
#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    async fn find_by_id(&self, id: EpisodeId) -> Result<Option<Episode>>;

    /// Live episode linked to a recording
    ///
    /// # Errors
    /// `NonUnique` if the recording is linked from several live episodes
    async fn find_by_recording(&self, recording_id: RecordingId) -> Result<Option<Episode>>;

    /// Live episode linked to a stored remote episode row
    ///
    /// # Errors
    /// `NonUnique` if the row is linked from several live episodes
    async fn find_by_remote_episode(
        &self,
        remote_episode_id: RemoteEpisodeId,
    ) -> Result<Option<Episode>>;

    /// Live episodes of a series
    async fn list_live_by_series(&self, series_id: SeriesId) -> Result<Vec<Episode>>;

    async fn insert(&self, episode: &Episode) -> Result<()>;

    /// Write the listed fields of `episode`
    async fn update(&self, episode: &Episode, fields: &[EpisodeField]) -> Result<()>;
}
