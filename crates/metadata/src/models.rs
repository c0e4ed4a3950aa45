//! Database models mapping to the history schema.

use crate::error::MetadataResult;
use quire_core::{
    BackupFile, BackupHeader, BackupKey, BackupProject, ContentId, Property, PropertyDefinition,
    PropertyMapping, ResourceSnapshot, ResourceState,
};
use sqlx::FromRow;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// A structure record joined with its resource record.
#[derive(Debug, Clone, FromRow)]
pub struct BackupHeaderRow {
    pub backup_id: Uuid,
    pub publish_tag: i32,
    pub version_id: i32,
    pub structure_id: Uuid,
    pub resource_id: Uuid,
    pub resource_path: String,
    pub structure_state: i32,
    pub date_released: Option<OffsetDateTime>,
    pub date_expired: Option<OffsetDateTime>,
    pub resource_type: i32,
    pub resource_flags: i32,
    pub date_published: OffsetDateTime,
    pub date_created: OffsetDateTime,
    pub user_created: Uuid,
    pub user_created_name: String,
    pub date_last_modified: OffsetDateTime,
    pub user_last_modified: Uuid,
    pub user_last_modified_name: String,
    pub resource_size: i64,
    pub project_last_modified: Uuid,
    pub sibling_count: i32,
}

impl TryFrom<BackupHeaderRow> for BackupHeader {
    type Error = quire_core::Error;

    fn try_from(row: BackupHeaderRow) -> quire_core::Result<Self> {
        Ok(BackupHeader {
            backup_id: row.backup_id.into(),
            tag_id: row.publish_tag,
            version_id: row.version_id,
            structure_id: row.structure_id.into(),
            resource_id: row.resource_id.into(),
            root_path: row.resource_path,
            type_id: row.resource_type,
            flags: row.resource_flags,
            project_last_modified: row.project_last_modified,
            state: ResourceState::from_code(row.structure_state)?,
            date_published: row.date_published,
            date_created: row.date_created,
            user_created: row.user_created,
            user_created_name: row.user_created_name,
            date_last_modified: row.date_last_modified,
            user_last_modified: row.user_last_modified,
            user_last_modified_name: row.user_last_modified_name,
            date_released: row.date_released,
            date_expired: row.date_expired,
            size: row.resource_size,
            sibling_count: row.sibling_count,
        })
    }
}

/// A header row with the content record of its resource, if any.
#[derive(Debug, Clone, FromRow)]
pub struct BackupFileRow {
    #[sqlx(flatten)]
    pub header: BackupHeaderRow,
    pub content_id: Option<Uuid>,
    pub file_content: Option<Vec<u8>>,
}

impl TryFrom<BackupFileRow> for BackupFile {
    type Error = quire_core::Error;

    fn try_from(row: BackupFileRow) -> quire_core::Result<Self> {
        Ok(BackupFile {
            header: row.header.try_into()?,
            content_id: row.content_id.map(ContentId::from).unwrap_or(ContentId::nil()),
            content: row.file_content.unwrap_or_default(),
        })
    }
}

/// Keys of one backup as needed by the deletion planner.
#[derive(Debug, Clone, FromRow)]
pub struct BackupKeyRow {
    pub backup_id: Uuid,
    pub structure_id: Uuid,
    pub resource_id: Uuid,
    pub version_id: i32,
    pub publish_tag: i32,
    /// 1 when the resource record is shared with another structure row.
    pub has_siblings: i32,
}

impl From<BackupKeyRow> for BackupKey {
    fn from(row: BackupKeyRow) -> Self {
        BackupKey {
            backup_id: row.backup_id.into(),
            structure_id: row.structure_id.into(),
            resource_id: row.resource_id.into(),
            version_id: row.version_id,
            tag_id: row.publish_tag,
            has_siblings: row.has_siblings != 0,
        }
    }
}

/// Property definition record.
#[derive(Debug, Clone, FromRow)]
pub struct PropertyDefRow {
    pub propertydef_id: Uuid,
    pub propertydef_name: String,
}

impl From<PropertyDefRow> for PropertyDefinition {
    fn from(row: PropertyDefRow) -> Self {
        PropertyDefinition {
            id: row.propertydef_id.into(),
            name: row.propertydef_name,
        }
    }
}

/// One stored property value with its definition name.
#[derive(Debug, Clone, FromRow)]
pub struct PropertyValueRow {
    pub propertydef_name: String,
    pub property_value: String,
    pub property_mapping_type: i32,
}

/// Project publish record.
#[derive(Debug, Clone, FromRow)]
pub struct BackupProjectRow {
    pub publish_tag: i32,
    pub project_id: Uuid,
    pub project_name: String,
    pub project_description: String,
    pub publish_date: OffsetDateTime,
    pub published_by: Uuid,
    pub published_by_name: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub group_id: Uuid,
    pub group_name: String,
    pub manager_group_id: Uuid,
    pub manager_group_name: String,
    pub date_created: OffsetDateTime,
    pub project_type: i32,
}

impl BackupProjectRow {
    pub fn into_project(self, resources: Vec<String>) -> BackupProject {
        BackupProject {
            tag_id: self.publish_tag,
            project_id: self.project_id,
            name: self.project_name,
            description: self.project_description,
            publish_date: self.publish_date,
            published_by: self.published_by,
            published_by_name: self.published_by_name,
            owner_id: self.owner_id,
            owner_name: self.owner_name,
            group_id: self.group_id,
            group_name: self.group_name,
            manager_group_id: self.manager_group_id,
            manager_group_name: self.manager_group_name,
            date_created: self.date_created,
            project_type: self.project_type,
            resources,
        }
    }
}

// =============================================================================
// Row post-processing shared by both backends
// =============================================================================

/// Convert header rows, failing on undecodable state codes.
pub(crate) fn headers_from_rows(rows: Vec<BackupHeaderRow>) -> MetadataResult<Vec<BackupHeader>> {
    rows.into_iter()
        .map(|row| BackupHeader::try_from(row).map_err(Into::into))
        .collect()
}

/// Record a property value is attached to.
pub(crate) fn mapping_target(snapshot: &ResourceSnapshot, mapping: PropertyMapping) -> Uuid {
    match mapping {
        PropertyMapping::Structure => *snapshot.structure_id.as_uuid(),
        PropertyMapping::Resource => *snapshot.resource_id.as_uuid(),
    }
}

/// Fold stored values into one property per name.
pub(crate) fn merge_property_rows(rows: Vec<PropertyValueRow>) -> MetadataResult<Vec<Property>> {
    let mut merged: BTreeMap<String, Property> = BTreeMap::new();
    for row in rows {
        let mapping = PropertyMapping::from_code(row.property_mapping_type).map_err(|_| {
            crate::MetadataError::Consistency(format!(
                "unknown mapping kind {} for property '{}'",
                row.property_mapping_type, row.propertydef_name
            ))
        })?;
        merged
            .entry(row.propertydef_name.clone())
            .or_insert_with(|| Property::new(row.propertydef_name))
            .set(mapping, row.property_value);
    }
    Ok(merged.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(name: &str, value: &str, mapping: i32) -> PropertyValueRow {
        PropertyValueRow {
            propertydef_name: name.to_string(),
            property_value: value.to_string(),
            property_mapping_type: mapping,
        }
    }

    #[test]
    fn test_merge_property_rows() {
        let merged = merge_property_rows(vec![
            value("Title", "Home", 1),
            value("Title", "Start", 2),
            value("Keywords", "cms", 2),
        ])
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Keywords");
        assert_eq!(merged[0].structure_value, None);
        assert_eq!(merged[1].structure_value.as_deref(), Some("Home"));
        assert_eq!(merged[1].resource_value.as_deref(), Some("Start"));
    }

    #[test]
    fn test_merge_rejects_unknown_mapping() {
        let err = merge_property_rows(vec![value("Title", "Home", 5)]).unwrap_err();
        assert!(matches!(err, crate::MetadataError::Consistency(_)));
        assert!(err.to_string().contains("Title"));
    }
}
