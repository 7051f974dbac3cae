//! # Core Configuration Module
//!
//! Tunables for the catalog sync core.
//!
//! ## Overview
//!
//! Configuration is split by consumer:
//!
//! - [`SyncSettings`] - series reconciliation, retry triage, recorder ingest
//!   and the batch scheduler
//! - [`ChangeFinderConfig`] - the incremental change-discovery loop
//! - [`CatalogConfig`] - both of the above plus the log level, loadable from
//!   a JSON document
//!
//! Every struct has working defaults, `with_*` builder methods, and a
//! `validate()` that fails fast with an actionable message.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CatalogConfig, SyncSettings};
//!
//! let settings = SyncSettings::default()
//!     .with_retry_threshold(5)
//!     .with_retry_cooldown_secs(6 * 3600)
//!     .with_max_concurrent_series(8);
//! settings.validate()?;
//!
//! let config = CatalogConfig::from_json(r#"{ "sync": { "title_separator": "-" } }"#)?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::LogLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote services only return this many candidates worth keeping
const MAX_POSSIBLE_MATCHES_LIMIT: usize = 50;

/// Reconciliation, retry-triage, ingest and scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Replaces spaces when a stored title is formatted for remote search
    pub title_separator: String,

    /// Number of remote candidates persisted as possible matches
    pub max_possible_matches: usize,

    /// Consecutive failures after which a series waits out the cooldown
    pub retry_threshold: u32,

    /// Cooldown (seconds) before a series at or above the threshold is retried
    pub retry_cooldown_secs: u64,

    /// Consecutive transient failures before one is written to the error log
    pub persist_lookup_failures_after: u32,

    /// Page size requested from the recorder feed
    pub recorder_page_size: usize,

    /// Maximum series reconciled concurrently by a full pass
    pub max_concurrent_series: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            title_separator: "+".to_string(),
            max_possible_matches: 5,
            retry_threshold: 3,
            retry_cooldown_secs: 24 * 3600,
            persist_lookup_failures_after: 2,
            recorder_page_size: 50,
            max_concurrent_series: 4,
        }
    }
}

impl SyncSettings {
    /// Set the title separator
    pub fn with_title_separator(mut self, separator: impl Into<String>) -> Self {
        self.title_separator = separator.into();
        self
    }

    /// Set how many remote candidates are kept
    pub fn with_max_possible_matches(mut self, max: usize) -> Self {
        self.max_possible_matches = max;
        self
    }

    /// Set the retry threshold
    pub fn with_retry_threshold(mut self, threshold: u32) -> Self {
        self.retry_threshold = threshold;
        self
    }

    /// Set the retry cooldown
    pub fn with_retry_cooldown_secs(mut self, secs: u64) -> Self {
        self.retry_cooldown_secs = secs;
        self
    }

    /// Set how many transient failures are tolerated before logging one
    pub fn with_persist_lookup_failures_after(mut self, attempts: u32) -> Self {
        self.persist_lookup_failures_after = attempts;
        self
    }

    /// Set the recorder page size
    pub fn with_recorder_page_size(mut self, size: usize) -> Self {
        self.recorder_page_size = size;
        self
    }

    /// Set the full-pass concurrency
    pub fn with_max_concurrent_series(mut self, max: usize) -> Self {
        self.max_concurrent_series = max;
        self
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        if self.title_separator.is_empty() {
            return Err(Error::Config(
                "Title separator cannot be empty".to_string(),
            ));
        }

        if self.title_separator.chars().any(char::is_whitespace) {
            return Err(Error::Config(
                "Title separator cannot contain whitespace".to_string(),
            ));
        }

        if self.max_possible_matches == 0
            || self.max_possible_matches > MAX_POSSIBLE_MATCHES_LIMIT
        {
            return Err(Error::Config(format!(
                "max_possible_matches must be between 1 and {}",
                MAX_POSSIBLE_MATCHES_LIMIT
            )));
        }

        if self.retry_threshold == 0 {
            return Err(Error::Config(
                "Retry threshold must be at least 1".to_string(),
            ));
        }

        if self.persist_lookup_failures_after == 0 {
            return Err(Error::Config(
                "persist_lookup_failures_after must be at least 1".to_string(),
            ));
        }

        if self.recorder_page_size == 0 {
            return Err(Error::Config(
                "Recorder page size must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_series == 0 {
            return Err(Error::Config(
                "max_concurrent_series must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Incremental change-discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeFinderConfig {
    /// How far (seconds) each query looks behind the watermark.
    ///
    /// The remote service misses updates in windows shorter than about two
    /// minutes, so this should not go below 120.
    pub safety_buffer_secs: u64,

    /// Sleep (seconds) between polling cycles
    pub poll_interval_secs: u64,

    /// Incremental cycles run by verification mode
    pub verification_cycles: usize,
}

impl Default for ChangeFinderConfig {
    fn default() -> Self {
        Self {
            safety_buffer_secs: 120,
            poll_interval_secs: 300,
            verification_cycles: 5,
        }
    }
}

impl ChangeFinderConfig {
    /// Set the safety buffer
    pub fn with_safety_buffer_secs(mut self, secs: u64) -> Self {
        self.safety_buffer_secs = secs;
        self
    }

    /// Set the polling interval
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set the number of verification cycles
    pub fn with_verification_cycles(mut self, cycles: usize) -> Self {
        self.verification_cycles = cycles;
        self
    }

    pub fn safety_buffer(&self) -> Duration {
        Duration::from_secs(self.safety_buffer_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        if self.safety_buffer_secs > 24 * 3600 {
            return Err(Error::Config(
                "Safety buffer exceeds maximum of 24 hours".to_string(),
            ));
        }

        if self.verification_cycles == 0 {
            return Err(Error::Config(
                "Verification needs at least one incremental cycle".to_string(),
            ));
        }

        Ok(())
    }
}

/// Complete configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub sync: SyncSettings,
    pub change_finder: ChangeFinderConfig,
    pub log_level: LogLevel,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sync: SyncSettings::default(),
            change_finder: ChangeFinderConfig::default(),
            log_level: LogLevel::Info,
        }
    }
}

impl CatalogConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_json(document: &str) -> Result<Self> {
        let config: CatalogConfig = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        self.change_finder.validate()
    }
}
