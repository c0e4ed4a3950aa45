//! Snapshot builders.

use quire_core::{
    ContentId, FileContent, ProjectSnapshot, Property, ResourceBody, ResourceId,
    ResourceSnapshot, ResourceState, StructureId,
};
use time::{Duration, OffsetDateTime, macros::datetime};
use uuid::Uuid;

pub const CREATOR: Uuid = Uuid::from_u128(0x1001);
pub const EDITOR: Uuid = Uuid::from_u128(0x1002);
pub const AUTHORS: Uuid = Uuid::from_u128(0x2001);
pub const MANAGERS: Uuid = Uuid::from_u128(0x2002);

/// Publish date of a tag: one day per tag from 2024-01-01.
pub fn publish_date(tag_id: i32) -> OffsetDateTime {
    datetime!(2024-01-01 0:00 UTC) + Duration::days(i64::from(tag_id))
}

/// A resource identity: structure and resource ids plus a root path.
#[derive(Debug, Clone)]
pub struct TestResource {
    pub structure_id: StructureId,
    pub resource_id: ResourceId,
    pub root_path: String,
}

impl TestResource {
    pub fn new(root_path: &str) -> Self {
        Self {
            structure_id: StructureId::new(),
            resource_id: ResourceId::new(),
            root_path: root_path.to_string(),
        }
    }

    /// Another structure entry pointing at the same resource.
    pub fn sibling(&self, root_path: &str) -> Self {
        Self {
            structure_id: StructureId::new(),
            resource_id: self.resource_id,
            root_path: root_path.to_string(),
        }
    }

    pub fn history_key(&self) -> quire_core::HistoryKey {
        quire_core::HistoryKey::new(self.root_path.clone(), self.structure_id)
    }

    /// File snapshot with the given content.
    pub fn file(&self, data: &[u8]) -> ResourceSnapshot {
        let mut snapshot = self.base();
        snapshot.size = data.len() as i64;
        snapshot.body = ResourceBody::File(Some(FileContent {
            content_id: ContentId::new(),
            data: data.to_vec(),
        }));
        snapshot
    }

    pub fn folder(&self) -> ResourceSnapshot {
        let mut snapshot = self.base();
        snapshot.type_id = 0;
        snapshot.body = ResourceBody::Folder;
        snapshot
    }

    fn base(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            structure_id: self.structure_id,
            resource_id: self.resource_id,
            root_path: self.root_path.clone(),
            type_id: 1,
            flags: 0,
            state: ResourceState::Changed,
            date_created: datetime!(2023-06-01 8:00 UTC),
            user_created: CREATOR,
            date_last_modified: datetime!(2023-12-24 17:30 UTC),
            user_last_modified: EDITOR,
            date_released: None,
            date_expired: None,
            size: 0,
            sibling_count: 1,
            project_last_modified: Uuid::from_u128(0x3001),
            body: ResourceBody::Folder,
        }
    }
}

pub fn title(structure_value: &str, resource_value: &str) -> Property {
    Property::new("Title")
        .with_structure_value(structure_value)
        .with_resource_value(resource_value)
}

pub fn project(resources: &[&str]) -> ProjectSnapshot {
    ProjectSnapshot {
        project_id: Uuid::from_u128(0x4001),
        name: "Offline".to_string(),
        description: "Spring release".to_string(),
        owner_id: CREATOR,
        group_id: AUTHORS,
        manager_group_id: MANAGERS,
        date_created: datetime!(2023-01-15 9:00 UTC),
        project_type: 0,
        resources: resources.iter().map(|r| r.to_string()).collect(),
    }
}
