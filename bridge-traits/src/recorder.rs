//! Personal Video Recorder Feed
//!
//! The recorder exposes its now-playing list as a paged feed. A page shorter
//! than the requested size marks the end of the feed.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recording as reported by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRow {
    /// Recorder-side recording identifier
    pub recording_id: i64,
    /// Recorder-side series identifier
    pub series_id: i64,
    /// Series title as shown on the recorder
    pub series_title: String,
    /// Episode title, when the guide data carried one
    pub title: Option<String>,
    /// Season and episode packed into one integer (e.g. 1203 = S12E03)
    pub episode_number: Option<i32>,
    /// Original air timestamp
    pub air_time: Option<DateTime<Utc>>,
    /// When the recording was deleted from the device, if it was
    pub deleted_at: Option<DateTime<Utc>>,
    pub watched: bool,
    /// Recorded on the device's own initiative rather than by request
    pub suggestion: bool,
}

/// Paged recording feed
#[async_trait]
pub trait RecorderIngestClient: Send + Sync {
    /// Fetch up to `limit` recordings starting at `offset`
    async fn fetch_recordings(&self, offset: usize, limit: usize) -> Result<Vec<RecordingRow>>;
}
