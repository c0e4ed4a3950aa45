//! Backup deletion repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use quire_core::{BackupKey, DeletionBatch, HistoryKey, ResourceId, StructureId};

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PurgeStats {
    /// Backups removed (structure rows).
    pub backups_deleted: u64,
    /// Resource rows removed.
    pub resource_rows: u64,
    /// Content rows removed.
    pub content_rows: u64,
    /// Property rows removed.
    pub property_rows: u64,
}

/// Repository for deleting backups.
///
/// Key listings are ordered by structure, then oldest first (tag, then
/// version), which is the order `quire_core::retention::plan_deletions` expects.
#[async_trait]
pub trait PurgeRepo: Send + Sync {
    /// Keys of one history.
    async fn history_keys(&self, key: &HistoryKey) -> MetadataResult<Vec<BackupKey>>;

    /// Keys of one structure/resource pair.
    async fn resource_keys(
        &self,
        structure_id: StructureId,
        resource_id: ResourceId,
    ) -> MetadataResult<Vec<BackupKey>>;

    /// Keys of every structure holding more than `keep` backups.
    async fn keys_exceeding(&self, keep: u32) -> MetadataResult<Vec<BackupKey>>;

    /// Delete all batches in one transaction.
    async fn delete_batches(&self, batches: &[DeletionBatch]) -> MetadataResult<PurgeStats>;

    /// Delete every backup with a tag at or below `tag_id` in one transaction.
    async fn delete_up_to_tag(&self, tag_id: i32) -> MetadataResult<PurgeStats>;
}
