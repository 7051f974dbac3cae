//! Workspace umbrella crate.
//!
//! Re-exports the catalog crates so host applications can depend on
//! `pvr-catalog` alone and reach the service façade, configuration, logging
//! and the sync core from one place.

pub use bridge_traits as bridge;
pub use core_library as library;
pub use core_metadata as metadata;
pub use core_runtime as runtime;
pub use core_service::{CatalogDependencies, CatalogService, CoreError, Result};
pub use core_sync as sync;
