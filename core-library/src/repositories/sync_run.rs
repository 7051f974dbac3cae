//! Sync run repository trait

use crate::error::Result;
use crate::models::SyncRun;
use async_trait::async_trait;

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    async fn insert(&self, run: &SyncRun) -> Result<()>;

    /// Overwrite a run (completion writes every field)
    async fn update(&self, run: &SyncRun) -> Result<()>;

    /// Most recently started full run that completed successfully
    async fn latest_successful_full(&self) -> Result<Option<SyncRun>>;
}
