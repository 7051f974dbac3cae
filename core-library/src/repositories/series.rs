//! Series repository trait

use crate::error::Result;
use crate::models::{Series, SeriesId};
use crate::tracking::SeriesField;
use async_trait::async_trait;

/// Series repository interface for data access operations
#[async_trait]
pub trait SeriesRepository: Send + Sync {
    /// Find a series by its ID
    async fn find_by_id(&self, id: SeriesId) -> Result<Option<Series>>;

    /// Find the series the recorder knows under `recorder_series_id`
    ///
    /// # Errors
    /// `NonUnique` if several rows carry the id
    async fn find_by_recorder_id(&self, recorder_series_id: i64) -> Result<Option<Series>>;

    /// Find the series resolved to `remote_series_id`
    ///
    /// # Errors
    /// `NonUnique` if several rows carry the id
    async fn find_by_remote_id(&self, remote_series_id: i64) -> Result<Option<Series>>;

    /// Insert a new series
    ///
    /// # Errors
    /// Returns error if:
    /// - A series with the same ID already exists
    /// - Series validation fails
    async fn insert(&self, series: &Series) -> Result<()>;

    /// Write the listed fields of `series`
    async fn update(&self, series: &Series, fields: &[SeriesField]) -> Result<()>;

    /// Every series, oldest first
    async fn list(&self) -> Result<Vec<Series>>;
}
