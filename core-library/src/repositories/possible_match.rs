//! Possible match repository trait

use crate::error::Result;
use crate::models::{PossibleMatch, SeriesId};
use async_trait::async_trait;

#[async_trait]
pub trait PossibleMatchRepository: Send + Sync {
    /// Replace every possible match of a series with `matches`
    async fn replace_for_series(&self, series_id: SeriesId, matches: &[PossibleMatch])
        -> Result<()>;

    /// Possible matches of a series ordered by rank
    async fn list_for_series(&self, series_id: SeriesId) -> Result<Vec<PossibleMatch>>;
}
