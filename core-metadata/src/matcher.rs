//! # Episode Matcher
//!
//! Pairs a recording with a remote episode of the same series using three
//! ordered tiers:
//!
//! 1. **Title** - case-insensitive equality of the two titles
//! 2. **Episode number** - the recorder's packed season/episode integer,
//!    decoded by [`decode_episode_number`]
//! 3. **Air date** - recording start (UTC calendar day) against first-aired date
//!
//! A tier with exactly one hit decides the match. A tier with several hits
//! makes the result [`MatchResult::Ambiguous`] and later tiers are not
//! consulted. A tier with no hits falls through to the next one.
//!
//! Both directions share the tiers: [`match_recording`] looks for a remote
//! episode for one recording, [`match_remote`] looks for a recording for one
//! remote episode.

use core_library::models::{Recording, RemoteEpisodeRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The pass that produced a match or an ambiguity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Title,
    EpisodeNumber,
    AirDate,
}

impl MatchTier {
    pub const ALL: [MatchTier; 3] = [
        MatchTier::Title,
        MatchTier::EpisodeNumber,
        MatchTier::AirDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Title => "title",
            MatchTier::EpisodeNumber => "episode_number",
            MatchTier::AirDate => "air_date",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of matching one subject against a candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// Index into the candidate slice
    Matched { index: usize, tier: MatchTier },
    /// Several candidates tied at `tier`
    Ambiguous { tier: MatchTier, candidates: usize },
    Unmatched,
}

impl MatchResult {
    pub fn matched_index(&self) -> Option<usize> {
        match self {
            MatchResult::Matched { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Split the recorder's packed episode number into (season, episode).
///
/// Values below 100 are episodes of season 1. Larger values are split in the
/// middle of their decimal digits, the season taking the shorter half when
/// the digit count is odd: `203` is S2E3, `1203` is S12E3.
pub fn decode_episode_number(value: i32) -> Option<(i32, i32)> {
    if value < 0 {
        return None;
    }
    if value < 100 {
        return Some((1, value));
    }

    let digits = value.to_string();
    let (season, episode) = digits.split_at(digits.len() / 2);
    Some((season.parse().ok()?, episode.parse().ok()?))
}

fn titles_equal(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

/// Whether `recording` and `remote` agree at `tier`
pub fn tier_agrees(tier: MatchTier, recording: &Recording, remote: &RemoteEpisodeRecord) -> bool {
    match tier {
        MatchTier::Title => match (&recording.title, &remote.title) {
            (Some(left), Some(right)) => titles_equal(left, right),
            _ => false,
        },
        MatchTier::EpisodeNumber => {
            let decoded = recording.episode_number.and_then(decode_episode_number);
            match (decoded, remote.season_number, remote.episode_number) {
                (Some((season, episode)), Some(remote_season), Some(remote_episode)) => {
                    season == remote_season && episode == remote_episode
                }
                _ => false,
            }
        }
        MatchTier::AirDate => match (recording.air_time, remote.first_aired) {
            (Some(air_time), Some(first_aired)) => air_time.date_naive() == first_aired,
            _ => false,
        },
    }
}

fn run_tiers<C>(
    tiers: impl IntoIterator<Item = MatchTier>,
    candidates: &[C],
    agrees: impl Fn(MatchTier, &C) -> bool,
) -> MatchResult {
    for tier in tiers {
        let mut hits = candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| agrees(tier, candidate))
            .map(|(index, _)| index);

        match (hits.next(), hits.count()) {
            (None, _) => continue,
            (Some(index), 0) => return MatchResult::Matched { index, tier },
            (Some(_), others) => {
                return MatchResult::Ambiguous {
                    tier,
                    candidates: others + 1,
                }
            }
        }
    }

    MatchResult::Unmatched
}

/// Find the remote episode for `recording` among `candidates`.
///
/// `candidates` should be the series' remote episodes not yet linked to a
/// recording. The title tier is skipped when the recording has no title.
pub fn match_recording(recording: &Recording, candidates: &[RemoteEpisodeRecord]) -> MatchResult {
    let tiers = MatchTier::ALL
        .into_iter()
        .filter(|tier| *tier != MatchTier::Title || recording.title.is_some());

    run_tiers(tiers, candidates, |tier, remote| {
        tier_agrees(tier, recording, remote)
    })
}

/// Find the recording for `remote` among `candidates`.
///
/// `candidates` should be the series' recordings not yet linked to a remote
/// episode. The title tier is skipped when the remote episode has no title.
pub fn match_remote(remote: &RemoteEpisodeRecord, candidates: &[Recording]) -> MatchResult {
    let tiers = MatchTier::ALL
        .into_iter()
        .filter(|tier| *tier != MatchTier::Title || remote.title.is_some());

    run_tiers(tiers, candidates, |tier, recording| {
        tier_agrees(tier, recording, remote)
    })
}
