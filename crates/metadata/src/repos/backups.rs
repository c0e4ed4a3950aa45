//! Backup snapshot repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use quire_core::{
    BackupFile, BackupHeader, BackupId, HistoryKey, Property, ResourceId, ResourceSnapshot,
    StructureId,
};
use time::OffsetDateTime;

/// Everything needed to write one backup.
#[derive(Debug, Clone)]
pub struct NewBackup<'a> {
    pub backup_id: BackupId,
    pub snapshot: &'a ResourceSnapshot,
    pub properties: &'a [Property],
    pub tag_id: i32,
    pub publish_date: OffsetDateTime,
    pub user_created_name: String,
    pub user_last_modified_name: String,
}

/// Result of writing a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenBackup {
    pub backup_id: BackupId,
    pub version_id: i32,
    /// False when a resource record for the same resource and tag already
    /// existed, so neither resource nor content rows were written.
    pub resource_written: bool,
}

/// Repository for backup snapshots.
#[async_trait]
pub trait BackupRepo: Send + Sync {
    /// Write structure, resource, content and property rows in one
    /// transaction. The version is the next one for the snapshot's path.
    async fn write_backup(&self, backup: &NewBackup<'_>) -> MetadataResult<WrittenBackup>;

    /// Read a backup with content by structure id and tag.
    async fn read_backup(&self, tag_id: i32, structure_id: StructureId)
    -> MetadataResult<BackupFile>;

    /// Read a backup with content by root path and tag.
    async fn read_backup_by_path(&self, tag_id: i32, root_path: &str)
    -> MetadataResult<BackupFile>;

    /// All versions of one history, oldest first.
    async fn list_history(&self, key: &HistoryKey) -> MetadataResult<Vec<BackupHeader>>;

    /// The latest backup of every structure/resource pair, newest first.
    async fn list_latest(&self) -> MetadataResult<Vec<BackupHeader>>;

    /// Highest version recorded for a resource (0 when none).
    async fn max_version(&self, resource_id: ResourceId) -> MetadataResult<i32>;

    /// Highest tag a resource was published with (0 when none).
    async fn max_tag(&self, resource_id: ResourceId) -> MetadataResult<i32>;
}
