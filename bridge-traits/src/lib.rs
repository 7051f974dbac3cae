//! # Host Bridge Traits
//!
//! Collaborator traits the catalog core depends on but does not implement.
//!
//! ## Overview
//!
//! This crate defines the contract between the episode-sync core and the
//! services it talks to. The core never constructs a client itself: every
//! component receives its collaborators as `Arc<dyn Trait>` so a new remote
//! API version or recorder model means implementing one trait, not touching
//! the reconciliation flow.
//!
//! ## Traits
//!
//! ### Remote services
//! - [`RemoteMetadataClient`](metadata::RemoteMetadataClient) - TV-metadata
//!   service: series search, episode listing, changed-since feed
//! - [`RecorderIngestClient`](recorder::RecorderIngestClient) - Paged feed of
//!   recordings from the personal video recorder
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert transport and parse errors into it; the core treats every
//! `BridgeError` coming out of a remote call as transient.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across the scheduler's concurrent per-series tasks.

pub mod error;
pub mod metadata;
pub mod recorder;
pub mod time;

pub use error::BridgeError;

pub use metadata::{ChangedSeries, RemoteEpisode, RemoteMetadataClient, SeriesCandidate};
pub use recorder::{RecorderIngestClient, RecordingRow};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
