//! Backup snapshots as read back from the history.

use crate::ids::{BackupId, ContentId, ResourceId, StructureId};
use crate::resource::ResourceState;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Metadata of one backup snapshot, without content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHeader {
    pub backup_id: BackupId,
    pub tag_id: i32,
    pub version_id: i32,
    pub structure_id: StructureId,
    pub resource_id: ResourceId,
    pub root_path: String,
    pub type_id: i32,
    pub flags: i32,
    pub project_last_modified: Uuid,
    pub state: ResourceState,
    /// When the publish that wrote this backup happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date_published: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub date_created: OffsetDateTime,
    pub user_created: Uuid,
    pub user_created_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date_last_modified: OffsetDateTime,
    pub user_last_modified: Uuid,
    pub user_last_modified_name: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date_released: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date_expired: Option<OffsetDateTime>,
    pub size: i64,
    pub sibling_count: i32,
}

impl BackupHeader {
    /// Key identifying the version history this backup belongs to.
    pub fn history_key(&self) -> HistoryKey {
        HistoryKey {
            root_path: self.root_path.clone(),
            structure_id: self.structure_id,
        }
    }
}

/// A backup snapshot together with its file content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupFile {
    pub header: BackupHeader,
    /// Nil for folders and files recorded without content.
    pub content_id: ContentId,
    pub content: Vec<u8>,
}

/// Identifies the version history of one resource: all backups written for
/// a structure record at a given path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub root_path: String,
    pub structure_id: StructureId,
}

impl HistoryKey {
    pub fn new(root_path: impl Into<String>, structure_id: StructureId) -> Self {
        Self {
            root_path: root_path.into(),
            structure_id,
        }
    }
}

/// The keys needed to delete one backup in any key-matching mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackupKey {
    pub backup_id: BackupId,
    pub structure_id: StructureId,
    pub resource_id: ResourceId,
    pub version_id: i32,
    pub tag_id: i32,
    /// Whether the resource record is shared with sibling structures.
    pub has_siblings: bool,
}
