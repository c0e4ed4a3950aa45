//! Project publish record repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use quire_core::BackupProject;
use time::OffsetDateTime;

/// Repository for project publish records and tag allocation.
#[async_trait]
pub trait ProjectRepo: Send + Sync {
    /// Write a project record and its resource paths in one transaction.
    async fn write_project(&self, project: &BackupProject) -> MetadataResult<()>;

    /// Read the project published with a tag. Fails with `NotFound`.
    async fn read_project(&self, tag_id: i32) -> MetadataResult<BackupProject>;

    /// Most recent project records first, at most `limit`.
    async fn list_projects(&self, limit: u32) -> MetadataResult<Vec<BackupProject>>;

    /// Highest tag published at or before `max_date` (0 when none).
    async fn tag_for_date(&self, max_date: OffsetDateTime) -> MetadataResult<i32>;

    /// Next free publish tag: one above the highest tag used by projects or
    /// resources, 1 on an empty history.
    async fn next_tag(&self) -> MetadataResult<i32>;
}
