//! Error log repository trait

use crate::error::Result;
use crate::models::{ErrorKind, ErrorLogEntry, ErrorLogId, SeriesId};
use crate::tracking::ErrorLogField;
use async_trait::async_trait;

/// Operator-facing error log. Entries are resolved, never deleted.
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    async fn find_by_id(&self, id: ErrorLogId) -> Result<Option<ErrorLogEntry>>;

    /// The open entry of one kind for a series
    ///
    /// # Errors
    /// `NonUnique` if several open entries of the kind exist
    async fn find_open(&self, series_id: SeriesId, kind: ErrorKind)
        -> Result<Option<ErrorLogEntry>>;

    /// Open entries of a series
    async fn list_open_by_series(&self, series_id: SeriesId) -> Result<Vec<ErrorLogEntry>>;

    /// Every open entry, oldest first
    async fn list_open(&self) -> Result<Vec<ErrorLogEntry>>;

    /// Every entry of a series, resolved ones included
    async fn list_by_series(&self, series_id: SeriesId) -> Result<Vec<ErrorLogEntry>>;

    async fn insert(&self, entry: &ErrorLogEntry) -> Result<()>;

    async fn update(&self, entry: &ErrorLogEntry, fields: &[ErrorLogField]) -> Result<()>;
}
