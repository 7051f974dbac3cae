//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the catalog core:
//! - Logging and tracing infrastructure
//! - Configuration for reconciliation, retry triage, ingest and change discovery
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions and the tunables every sync
//! component reads, so that hosts configure the system in one place.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CatalogConfig, ChangeFinderConfig, SyncSettings};
pub use error::{Error, Result};
