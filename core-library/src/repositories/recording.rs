//! Recording repository trait

use crate::error::Result;
use crate::models::{Recording, RecordingId, SeriesId};
use crate::tracking::RecordingField;
use async_trait::async_trait;

#[async_trait]
pub trait RecordingRepository: Send + Sync {
    async fn find_by_id(&self, id: RecordingId) -> Result<Option<Recording>>;

    /// Find a recording by the recorder's id for it
    ///
    /// # Errors
    /// `NonUnique` if several rows carry the id
    async fn find_by_recorder_id(&self, recorder_recording_id: i64) -> Result<Option<Recording>>;

    async fn list_by_series(&self, series_id: SeriesId) -> Result<Vec<Recording>>;

    async fn insert(&self, recording: &Recording) -> Result<()>;

    /// Write the listed fields; only deletion and watched state are mutable
    async fn update(&self, recording: &Recording, fields: &[RecordingField]) -> Result<()>;
}
