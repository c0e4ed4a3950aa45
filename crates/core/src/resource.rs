//! Live resource snapshots handed to the history writer.

use crate::ids::{ContentId, ResourceId, StructureId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Publish state of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Unchanged,
    Changed,
    New,
    Deleted,
}

impl ResourceState {
    /// Integer code stored in the history tables.
    pub fn code(self) -> i32 {
        match self {
            Self::Unchanged => 0,
            Self::Changed => 1,
            Self::New => 2,
            Self::Deleted => 3,
        }
    }

    /// Decode a stored state code.
    pub fn from_code(code: i32) -> crate::Result<Self> {
        match code {
            0 => Ok(Self::Unchanged),
            1 => Ok(Self::Changed),
            2 => Ok(Self::New),
            3 => Ok(Self::Deleted),
            other => Err(crate::Error::UnknownState(other)),
        }
    }
}

/// File content of a published resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContent {
    pub content_id: ContentId,
    pub data: Vec<u8>,
}

/// Whether a resource is a folder or a file (with its content when loaded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceBody {
    Folder,
    /// A file. `None` when the content was not loaded by the caller; an
    /// empty blob with a nil content id is recorded in that case.
    File(Option<FileContent>),
}

impl ResourceBody {
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

/// Snapshot of a live resource at publish time.
#[derive(Clone, Debug)]
pub struct ResourceSnapshot {
    pub structure_id: StructureId,
    pub resource_id: ResourceId,
    /// Absolute path of the structure record.
    pub root_path: String,
    pub type_id: i32,
    pub flags: i32,
    pub state: ResourceState,
    pub date_created: OffsetDateTime,
    pub user_created: Uuid,
    pub date_last_modified: OffsetDateTime,
    pub user_last_modified: Uuid,
    /// `None` means released since forever.
    pub date_released: Option<OffsetDateTime>,
    /// `None` means never expires.
    pub date_expired: Option<OffsetDateTime>,
    pub size: i64,
    /// Number of structure records sharing the resource record.
    pub sibling_count: i32,
    /// Project that last modified the resource.
    pub project_last_modified: Uuid,
    pub body: ResourceBody,
}

impl ResourceSnapshot {
    /// Content id and bytes to record for a file; nil/empty when not loaded.
    pub fn content(&self) -> Option<(ContentId, &[u8])> {
        match &self.body {
            ResourceBody::Folder => None,
            ResourceBody::File(Some(content)) => Some((content.content_id, &content.data)),
            ResourceBody::File(None) => Some((ContentId::nil(), &[])),
        }
    }
}
