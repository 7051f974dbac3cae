//! # Remote Metadata Module
//!
//! Decides how local catalog rows correspond to the remote TV-metadata
//! service.
//!
//! ## Overview
//!
//! This module handles:
//! - Series identity resolution: search title formatting, candidate
//!   judgement and operator name overrides
//! - Episode matching between recordings and remote episodes by title,
//!   packed episode number and air date, with a strict ambiguity policy
//!
//! Both are free of persistence; the sync crate applies their decisions.

pub mod error;
pub mod identity;
pub mod matcher;

pub use error::{MetadataError, Result};
pub use identity::{
    assess_candidates, format_search_title, IdentityDecision, IdentityLookup, IdentityResolver,
};
pub use matcher::{decode_episode_number, match_recording, match_remote, MatchResult, MatchTier};
