//! Remote TV-Metadata Service Abstraction
//!
//! The catalog resolves each series to a remote identity, pulls the canonical
//! episode list for it, and polls a "changed since" feed to find series whose
//! metadata moved upstream. Wire format (XML, JSON, API version) is the
//! implementation's business; the core only sees these types.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a series search, in the service's relevance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesCandidate {
    /// Remote series identifier
    pub id: i64,
    /// Series name as the remote service spells it
    pub name: String,
}

impl SeriesCandidate {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Canonical episode metadata for one episode of a remote series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEpisode {
    /// Remote episode identifier
    pub id: i64,
    /// Remote series identifier this episode belongs to
    pub series_id: i64,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub absolute_number: Option<i32>,
    pub title: Option<String>,
    /// First-aired date (calendar day, no time zone)
    pub first_aired: Option<NaiveDate>,
    /// When the remote service last touched this record
    pub last_updated: Option<DateTime<Utc>>,
}

/// A series reported by the changed-since feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangedSeries {
    pub remote_series_id: i64,
    pub last_updated: DateTime<Utc>,
}

/// Remote TV-metadata service
///
/// Every error is treated by callers as transient: it is logged, counted
/// against the series, and retried on a later pass.
#[async_trait]
pub trait RemoteMetadataClient: Send + Sync {
    /// Search series by formatted title
    ///
    /// # Returns
    ///
    /// Candidates ordered best match first. An empty list means the service
    /// knows no series by that name.
    async fn find_series_matches(&self, formatted_title: &str) -> Result<Vec<SeriesCandidate>>;

    /// Fetch the full episode list of a remote series
    async fn get_episodes_for_series(&self, remote_series_id: i64) -> Result<Vec<RemoteEpisode>>;

    /// List every series updated at or after `since`
    ///
    /// A series may appear more than once when it was updated several times
    /// inside the window; each (id, timestamp) pair is significant.
    async fn get_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<ChangedSeries>>;
}
