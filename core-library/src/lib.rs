//! # Catalog Library Module
//!
//! Owns the catalog's entities and the repository seams used to read and
//! write them.
//!
//! ## Overview
//!
//! This module manages:
//! - Domain models for series, episodes, recordings and remote episode rows
//! - The operator-facing error log, change-finder work items, possible
//!   matches and sync-run bookkeeping
//! - Field-level change tracking so updates write only what changed
//! - Repository traits per entity, plus an in-memory store implementing all
//!   of them
//!
//! Unique lookups that find more than one row fail with
//! [`LibraryError::NonUnique`] instead of picking one.

pub mod error;
pub mod models;
pub mod repositories;
pub mod tracking;

pub use error::{LibraryError, Result};
pub use repositories::{MemoryStore, Repositories};
pub use tracking::{Diffable, Tracked};
