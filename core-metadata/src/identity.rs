//! # Series Identity Resolution
//!
//! Maps a locally stored series title onto a remote series id.
//!
//! The search title is the operator hint when one is set, otherwise the
//! stored title lower-cased with spaces replaced by the configured separator.
//! The top candidate is accepted when its name equals (ignoring case) the
//! stored title or the search title. A name the operator explicitly chose for
//! an earlier mismatch is accepted as well, and the series is renamed to it.

use crate::error::Result;
use bridge_traits::metadata::{RemoteMetadataClient, SeriesCandidate};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Result of judging the remote candidates for a series
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityDecision {
    /// The top candidate identifies the series
    Accepted {
        candidate: SeriesCandidate,
        /// New title for the series when an operator-chosen name was accepted
        rename_to: Option<String>,
    },
    /// The service returned no candidates
    NotFound,
    /// The top candidate's name does not match
    NameMismatch { candidate: SeriesCandidate },
}

/// One identity lookup: what was asked, what came back, what was decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityLookup {
    pub search_title: String,
    /// Best candidates first, at most the configured number
    pub candidates: Vec<SeriesCandidate>,
    pub decision: IdentityDecision,
}

/// Lower-case `title` and replace spaces with `separator`
pub fn format_search_title(title: &str, separator: &str) -> String {
    title.trim().to_lowercase().replace(' ', separator)
}

fn same_name(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

/// Judge a candidate list for a series
///
/// # Arguments
/// * `stored_title` - Title currently stored on the series
/// * `search_title` - Title that was sent to the remote search
/// * `candidates` - Remote results, best first
/// * `chosen_name` - Operator-approved name from an open mismatch entry
pub fn assess_candidates(
    stored_title: &str,
    search_title: &str,
    candidates: &[SeriesCandidate],
    chosen_name: Option<&str>,
) -> IdentityDecision {
    let Some(top) = candidates.first() else {
        return IdentityDecision::NotFound;
    };

    if same_name(&top.name, stored_title) || same_name(&top.name, search_title) {
        return IdentityDecision::Accepted {
            candidate: top.clone(),
            rename_to: None,
        };
    }

    match chosen_name {
        Some(chosen) if same_name(chosen, &top.name) => IdentityDecision::Accepted {
            candidate: top.clone(),
            rename_to: Some(top.name.clone()),
        },
        _ => IdentityDecision::NameMismatch {
            candidate: top.clone(),
        },
    }
}

/// Looks up remote series identities through a [`RemoteMetadataClient`]
pub struct IdentityResolver {
    client: Arc<dyn RemoteMetadataClient>,
    separator: String,
    max_candidates: usize,
}

impl IdentityResolver {
    pub fn new(
        client: Arc<dyn RemoteMetadataClient>,
        separator: impl Into<String>,
        max_candidates: usize,
    ) -> Self {
        Self {
            client,
            separator: separator.into(),
            max_candidates,
        }
    }

    /// Search title for a series: the hint when present, else the formatted title
    pub fn search_title(&self, stored_title: &str, hint: Option<&str>) -> String {
        match hint.map(str::trim).filter(|hint| !hint.is_empty()) {
            Some(hint) => hint.to_string(),
            None => format_search_title(stored_title, &self.separator),
        }
    }

    /// Query the remote service and judge its answer.
    ///
    /// # Errors
    ///
    /// Any client failure, unchanged. Callers treat it as transient.
    #[instrument(skip(self, hint, chosen_name), fields(title = %stored_title))]
    pub async fn resolve(
        &self,
        stored_title: &str,
        hint: Option<&str>,
        chosen_name: Option<&str>,
    ) -> Result<IdentityLookup> {
        let search_title = self.search_title(stored_title, hint);
        let mut candidates = self.client.find_series_matches(&search_title).await?;
        candidates.truncate(self.max_candidates);

        let decision = assess_candidates(stored_title, &search_title, &candidates, chosen_name);
        debug!(
            search_title = %search_title,
            candidates = candidates.len(),
            decision = ?decision,
            "Assessed remote series candidates"
        );

        Ok(IdentityLookup {
            search_title,
            candidates,
            decision,
        })
    }
}
