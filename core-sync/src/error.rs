use core_library::models::SeriesId;
use core_library::LibraryError;
use core_metadata::MetadataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Series {series_id} not found")]
    SeriesNotFound { series_id: SeriesId },

    /// Catalog state that must never occur; aborts the series' pass
    #[error("Invariant violated for series {series_id}: {detail}")]
    Invariant { series_id: SeriesId, detail: String },

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn invariant(series_id: SeriesId, detail: impl Into<String>) -> Self {
        SyncError::Invariant {
            series_id,
            detail: detail.into(),
        }
    }

    /// Library lookups that found duplicate rows surface as invariant violations
    pub fn from_library(series_id: SeriesId, error: LibraryError) -> Self {
        match error {
            LibraryError::NonUnique { .. } => SyncError::invariant(series_id, error.to_string()),
            other => SyncError::Library(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
