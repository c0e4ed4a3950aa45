//! History store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BackupRepo, ProjectRepo, PropertyRepo, PurgeRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined history store trait.
#[async_trait]
pub trait MetadataStore: BackupRepo + PurgeRepo + PropertyRepo + ProjectRepo + Send + Sync {
    /// Create missing tables and indexes.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based history store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite history database.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and a single
        // connection keeps `:memory:` databases shared across calls.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs,
            "SQLite history store opened; query timeout is advisory only"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::error::StatementContext;
    use crate::models::*;
    use crate::repos::{NewBackup, PurgeStats, WrittenBackup};
    use quire_core::{
        BackupFile, BackupHeader, BackupId, BackupKey, BackupProject, DeletionBatch, HistoryKey,
        KeyMatch, Property, PropertyDefId, PropertyDefinition, ResourceId, StructureId,
    };
    use std::collections::HashMap;
    use time::OffsetDateTime;
    use uuid::Uuid;

    const INSERT_RESOURCE: &str = "INSERT INTO backup_resources (
            backup_id, resource_id, resource_type, resource_flags, date_published,
            date_created, user_created, user_created_name, date_last_modified,
            user_last_modified, user_last_modified_name, resource_state, resource_size,
            project_last_modified, sibling_count, publish_tag, version_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (resource_id, publish_tag) DO NOTHING";

    const INSERT_CONTENT: &str = "INSERT INTO backup_contents (
            backup_id, content_id, resource_id, file_content, publish_tag, version_id
        ) VALUES (?, ?, ?, ?, ?, ?)";

    const INSERT_STRUCTURE: &str = "INSERT INTO backup_structure (
            backup_id, structure_id, resource_id, resource_path, structure_state,
            date_released, date_expired, publish_tag, version_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

    const INSERT_PROPERTY: &str = "INSERT INTO backup_properties (
            property_id, backup_id, propertydef_id, property_mapping_id,
            property_mapping_type, property_value, publish_tag, version_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

    const DELETE_PROPERTIES_BY_BACKUP: &str = "DELETE FROM backup_properties WHERE backup_id = ?";

    const DELETE_STRUCTURE_BY_BACKUP: &str = "DELETE FROM backup_structure WHERE backup_id = ?";

    const DELETE_UNREFERENCED_RESOURCE: &str = "DELETE FROM backup_resources
        WHERE resource_id = ? AND publish_tag = ?
          AND NOT EXISTS (
              SELECT 1 FROM backup_structure s
              WHERE s.resource_id = backup_resources.resource_id
                AND s.publish_tag = backup_resources.publish_tag
          )";

    const DELETE_UNREFERENCED_CONTENT: &str = "DELETE FROM backup_contents
        WHERE resource_id = ? AND publish_tag = ?
          AND NOT EXISTS (
              SELECT 1 FROM backup_structure s
              WHERE s.resource_id = backup_contents.resource_id
                AND s.publish_tag = backup_contents.publish_tag
          )";

    const DELETE_STRUCTURE_BY_VERSION: &str = "DELETE FROM backup_structure
        WHERE resource_id = ? AND version_id = ? AND publish_tag = ?";

    const DELETE_PROPERTIES_UP_TO_TAG: &str = "DELETE FROM backup_properties WHERE publish_tag <= ?";

    const DELETE_STRUCTURE_UP_TO_TAG: &str = "DELETE FROM backup_structure WHERE publish_tag <= ?";

    const DELETE_CONTENTS_UP_TO_TAG: &str = "DELETE FROM backup_contents WHERE publish_tag <= ?";

    const DELETE_RESOURCES_UP_TO_TAG: &str = "DELETE FROM backup_resources WHERE publish_tag <= ?";

    const SELECT_PROPERTY_DEF_ID: &str =
        "SELECT propertydef_id FROM backup_property_defs WHERE propertydef_name = ?";

    #[async_trait]
    impl BackupRepo for SqliteStore {
        async fn write_backup(&self, backup: &NewBackup<'_>) -> MetadataResult<WrittenBackup> {
            let snapshot = backup.snapshot;
            let backup_id = backup.backup_id;
            let mut tx = self.pool.begin().await?;

            let last_version: i32 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(version_id), 0) FROM backup_structure WHERE resource_path = ?",
            )
            .bind(&snapshot.root_path)
            .fetch_one(&mut *tx)
            .await?;
            let version_id = last_version + 1;

            let inserted = sqlx::query(INSERT_RESOURCE)
                .bind(backup_id.as_uuid())
                .bind(snapshot.resource_id.as_uuid())
                .bind(snapshot.type_id)
                .bind(snapshot.flags)
                .bind(backup.publish_date)
                .bind(snapshot.date_created)
                .bind(snapshot.user_created)
                .bind(&backup.user_created_name)
                .bind(snapshot.date_last_modified)
                .bind(snapshot.user_last_modified)
                .bind(&backup.user_last_modified_name)
                .bind(snapshot.state.code())
                .bind(snapshot.size)
                .bind(snapshot.project_last_modified)
                .bind(snapshot.sibling_count)
                .bind(backup.tag_id)
                .bind(version_id)
                .execute(&mut *tx)
                .await
                .stmt(INSERT_RESOURCE)?;
            let resource_written = inserted.rows_affected() > 0;

            if resource_written && let Some((content_id, data)) = snapshot.content() {
                sqlx::query(INSERT_CONTENT)
                    .bind(backup_id.as_uuid())
                    .bind(content_id.as_uuid())
                    .bind(snapshot.resource_id.as_uuid())
                    .bind(data)
                    .bind(backup.tag_id)
                    .bind(version_id)
                    .execute(&mut *tx)
                    .await
                    .stmt(INSERT_CONTENT)?;
            }

            sqlx::query(INSERT_STRUCTURE)
                .bind(backup_id.as_uuid())
                .bind(snapshot.structure_id.as_uuid())
                .bind(snapshot.resource_id.as_uuid())
                .bind(&snapshot.root_path)
                .bind(snapshot.state.code())
                .bind(snapshot.date_released)
                .bind(snapshot.date_expired)
                .bind(backup.tag_id)
                .bind(version_id)
                .execute(&mut *tx)
                .await
                .stmt(INSERT_STRUCTURE)?;

            for property in backup.properties {
                let definition_id: Option<Uuid> = sqlx::query_scalar(SELECT_PROPERTY_DEF_ID)
                    .bind(&property.name)
                    .fetch_optional(&mut *tx)
                    .await
                    .stmt(SELECT_PROPERTY_DEF_ID)?;
                let Some(definition_id) = definition_id else {
                    return Err(MetadataError::NotFound(format!(
                        "property definition '{}' not found",
                        property.name
                    )));
                };

                for (mapping, value) in property.values() {
                    sqlx::query(INSERT_PROPERTY)
                        .bind(Uuid::new_v4())
                        .bind(backup_id.as_uuid())
                        .bind(definition_id)
                        .bind(mapping_target(snapshot, mapping))
                        .bind(mapping.code())
                        .bind(value)
                        .bind(backup.tag_id)
                        .bind(version_id)
                        .execute(&mut *tx)
                        .await
                        .stmt(INSERT_PROPERTY)?;
                }
            }

            tx.commit().await?;

            Ok(WrittenBackup {
                backup_id,
                version_id,
                resource_written,
            })
        }

        async fn read_backup(
            &self,
            tag_id: i32,
            structure_id: StructureId,
        ) -> MetadataResult<BackupFile> {
            let row = sqlx::query_as::<_, BackupFileRow>(concat!(
                backup_file_select!(),
                " WHERE s.publish_tag = ? AND s.structure_id = ?",
                " ORDER BY s.version_id DESC LIMIT 1"
            ))
            .bind(tag_id)
            .bind(structure_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some(row) => Ok(row.try_into()?),
                None => Err(MetadataError::NotFound(format!(
                    "no backup of structure {structure_id} with tag {tag_id}"
                ))),
            }
        }

        async fn read_backup_by_path(
            &self,
            tag_id: i32,
            root_path: &str,
        ) -> MetadataResult<BackupFile> {
            let row = sqlx::query_as::<_, BackupFileRow>(concat!(
                backup_file_select!(),
                " WHERE s.publish_tag = ? AND s.resource_path = ?",
                " ORDER BY s.version_id DESC LIMIT 1"
            ))
            .bind(tag_id)
            .bind(root_path)
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some(row) => Ok(row.try_into()?),
                None => Err(MetadataError::NotFound(format!(
                    "no backup of '{root_path}' with tag {tag_id}"
                ))),
            }
        }

        async fn list_history(&self, key: &HistoryKey) -> MetadataResult<Vec<BackupHeader>> {
            let rows = sqlx::query_as::<_, BackupHeaderRow>(concat!(
                backup_header_select!(),
                " WHERE s.resource_path = ? AND s.structure_id = ?",
                " ORDER BY s.publish_tag, s.version_id"
            ))
            .bind(&key.root_path)
            .bind(key.structure_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            headers_from_rows(rows)
        }

        async fn list_latest(&self) -> MetadataResult<Vec<BackupHeader>> {
            let rows = sqlx::query_as::<_, BackupHeaderRow>(concat!(
                backup_header_select!(),
                latest_backup_filter!(),
                " ORDER BY s.publish_tag DESC, s.version_id DESC"
            ))
            .fetch_all(&self.pool)
            .await?;
            headers_from_rows(rows)
        }

        async fn max_version(&self, resource_id: ResourceId) -> MetadataResult<i32> {
            let version: i32 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(version_id), 0) FROM backup_structure WHERE resource_id = ?",
            )
            .bind(resource_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
            Ok(version)
        }

        async fn max_tag(&self, resource_id: ResourceId) -> MetadataResult<i32> {
            let tag: i32 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(publish_tag), 0) FROM backup_resources WHERE resource_id = ?",
            )
            .bind(resource_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
            Ok(tag)
        }
    }

    #[async_trait]
    impl PurgeRepo for SqliteStore {
        async fn history_keys(&self, key: &HistoryKey) -> MetadataResult<Vec<BackupKey>> {
            let rows = sqlx::query_as::<_, BackupKeyRow>(concat!(
                backup_key_select!(),
                " WHERE s.resource_path = ? AND s.structure_id = ?",
                backup_key_order!()
            ))
            .bind(&key.root_path)
            .bind(key.structure_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn resource_keys(
            &self,
            structure_id: StructureId,
            resource_id: ResourceId,
        ) -> MetadataResult<Vec<BackupKey>> {
            let rows = sqlx::query_as::<_, BackupKeyRow>(concat!(
                backup_key_select!(),
                " WHERE s.structure_id = ? AND s.resource_id = ?",
                backup_key_order!()
            ))
            .bind(structure_id.as_uuid())
            .bind(resource_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn keys_exceeding(&self, keep: u32) -> MetadataResult<Vec<BackupKey>> {
            let rows = sqlx::query_as::<_, BackupKeyRow>(concat!(
                backup_key_select!(),
                " WHERE s.structure_id IN (",
                "   SELECT structure_id FROM backup_structure",
                "   GROUP BY structure_id HAVING COUNT(*) > ?",
                " )",
                backup_key_order!()
            ))
            .bind(i64::from(keep))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn delete_batches(&self, batches: &[DeletionBatch]) -> MetadataResult<PurgeStats> {
            let mut stats = PurgeStats::default();
            if batches.is_empty() {
                return Ok(stats);
            }

            let mut tx = self.pool.begin().await?;
            for batch in batches {
                for key in &batch.keys {
                    let resource_id = key.resource_id.as_uuid();

                    stats.property_rows += sqlx::query(DELETE_PROPERTIES_BY_BACKUP)
                        .bind(key.backup_id.as_uuid())
                        .execute(&mut *tx)
                        .await
                        .stmt(DELETE_PROPERTIES_BY_BACKUP)?
                        .rows_affected();

                    let (structure_sql, structure_delete) = match batch.mode {
                        KeyMatch::BackupId => (
                            DELETE_STRUCTURE_BY_BACKUP,
                            sqlx::query(DELETE_STRUCTURE_BY_BACKUP).bind(key.backup_id.as_uuid()),
                        ),
                        KeyMatch::ResourceVersion => (
                            DELETE_STRUCTURE_BY_VERSION,
                            sqlx::query(DELETE_STRUCTURE_BY_VERSION)
                                .bind(resource_id)
                                .bind(key.version_id)
                                .bind(key.tag_id),
                        ),
                    };
                    stats.backups_deleted += structure_delete
                        .execute(&mut *tx)
                        .await
                        .stmt(structure_sql)?
                        .rows_affected();

                    // Resource and content rows go with the last structure row
                    // referencing them, whichever mode matched that row.
                    stats.content_rows += sqlx::query(DELETE_UNREFERENCED_CONTENT)
                        .bind(resource_id)
                        .bind(key.tag_id)
                        .execute(&mut *tx)
                        .await
                        .stmt(DELETE_UNREFERENCED_CONTENT)?
                        .rows_affected();
                    stats.resource_rows += sqlx::query(DELETE_UNREFERENCED_RESOURCE)
                        .bind(resource_id)
                        .bind(key.tag_id)
                        .execute(&mut *tx)
                        .await
                        .stmt(DELETE_UNREFERENCED_RESOURCE)?
                        .rows_affected();
                }
            }
            tx.commit().await?;

            Ok(stats)
        }

        async fn delete_up_to_tag(&self, tag_id: i32) -> MetadataResult<PurgeStats> {
            let mut tx = self.pool.begin().await?;

            let property_rows = sqlx::query(DELETE_PROPERTIES_UP_TO_TAG)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .stmt(DELETE_PROPERTIES_UP_TO_TAG)?
                .rows_affected();
            let backups_deleted = sqlx::query(DELETE_STRUCTURE_UP_TO_TAG)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .stmt(DELETE_STRUCTURE_UP_TO_TAG)?
                .rows_affected();
            let content_rows = sqlx::query(DELETE_CONTENTS_UP_TO_TAG)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .stmt(DELETE_CONTENTS_UP_TO_TAG)?
                .rows_affected();
            let resource_rows = sqlx::query(DELETE_RESOURCES_UP_TO_TAG)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .stmt(DELETE_RESOURCES_UP_TO_TAG)?
                .rows_affected();

            tx.commit().await?;

            Ok(PurgeStats {
                backups_deleted,
                resource_rows,
                content_rows,
                property_rows,
            })
        }
    }

    #[async_trait]
    impl PropertyRepo for SqliteStore {
        async fn create_property_definition(
            &self,
            name: &str,
        ) -> MetadataResult<PropertyDefinition> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM backup_property_defs WHERE propertydef_name = ?)",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            if exists {
                return Err(MetadataError::AlreadyExists(format!(
                    "property definition '{name}' already exists"
                )));
            }

            let id = PropertyDefId::new();
            sqlx::query(
                "INSERT INTO backup_property_defs (propertydef_id, propertydef_name) VALUES (?, ?)",
            )
            .bind(id.as_uuid())
            .bind(name)
            .execute(&self.pool)
            .await?;

            Ok(PropertyDefinition {
                id,
                name: name.to_string(),
            })
        }

        async fn read_property_definition(&self, name: &str) -> MetadataResult<PropertyDefinition> {
            let row = sqlx::query_as::<_, PropertyDefRow>(
                "SELECT propertydef_id, propertydef_name FROM backup_property_defs WHERE propertydef_name = ?",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            row.map(Into::into).ok_or_else(|| {
                MetadataError::NotFound(format!("property definition '{name}' not found"))
            })
        }

        async fn list_property_definitions(&self) -> MetadataResult<Vec<PropertyDefinition>> {
            let rows = sqlx::query_as::<_, PropertyDefRow>(
                "SELECT propertydef_id, propertydef_name FROM backup_property_defs ORDER BY propertydef_name",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn count_backup_properties(
            &self,
            definition: &PropertyDefinition,
        ) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM backup_properties WHERE propertydef_id = ?")
                    .bind(definition.id.as_uuid())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }

        async fn delete_property_definition(
            &self,
            definition: &PropertyDefinition,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "DELETE FROM backup_property_defs
                 WHERE propertydef_id = ?
                   AND NOT EXISTS (SELECT 1 FROM backup_properties WHERE propertydef_id = ?)",
            )
            .bind(definition.id.as_uuid())
            .bind(definition.id.as_uuid())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(());
            }

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM backup_property_defs WHERE propertydef_id = ?)",
            )
            .bind(definition.id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
            if exists {
                Err(MetadataError::Consistency(format!(
                    "property definition '{}' is still used by backups",
                    definition.name
                )))
            } else {
                Err(MetadataError::NotFound(format!(
                    "property definition '{}' not found",
                    definition.name
                )))
            }
        }

        async fn read_backup_properties(&self, backup_id: BackupId) -> MetadataResult<Vec<Property>> {
            let rows = sqlx::query_as::<_, PropertyValueRow>(
                "SELECT d.propertydef_name, p.property_value, p.property_mapping_type
                 FROM backup_properties p
                 JOIN backup_property_defs d ON d.propertydef_id = p.propertydef_id
                 WHERE p.backup_id = ?
                 ORDER BY d.propertydef_name, p.property_mapping_type",
            )
            .bind(backup_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            merge_property_rows(rows)
        }
    }

    #[async_trait]
    impl ProjectRepo for SqliteStore {
        async fn write_project(&self, project: &BackupProject) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM backup_projects WHERE publish_tag = ?)",
            )
            .bind(project.tag_id)
            .fetch_one(&mut *tx)
            .await?;
            if exists {
                return Err(MetadataError::AlreadyExists(format!(
                    "project record for tag {} already exists",
                    project.tag_id
                )));
            }

            sqlx::query(
                "INSERT INTO backup_projects (
                    publish_tag, project_id, project_name, project_description, publish_date,
                    published_by, published_by_name, owner_id, owner_name, group_id, group_name,
                    manager_group_id, manager_group_name, date_created, project_type
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(project.tag_id)
            .bind(project.project_id)
            .bind(&project.name)
            .bind(&project.description)
            .bind(project.publish_date)
            .bind(project.published_by)
            .bind(&project.published_by_name)
            .bind(project.owner_id)
            .bind(&project.owner_name)
            .bind(project.group_id)
            .bind(&project.group_name)
            .bind(project.manager_group_id)
            .bind(&project.manager_group_name)
            .bind(project.date_created)
            .bind(project.project_type)
            .execute(&mut *tx)
            .await?;

            for path in &project.resources {
                sqlx::query(
                    "INSERT OR IGNORE INTO backup_project_resources (publish_tag, project_id, resource_path)
                     VALUES (?, ?, ?)",
                )
                .bind(project.tag_id)
                .bind(project.project_id)
                .bind(path)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn read_project(&self, tag_id: i32) -> MetadataResult<BackupProject> {
            let row = sqlx::query_as::<_, BackupProjectRow>(
                "SELECT * FROM backup_projects WHERE publish_tag = ?",
            )
            .bind(tag_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                MetadataError::NotFound(format!("no project published with tag {tag_id}"))
            })?;

            let resources: Vec<String> = sqlx::query_scalar(
                "SELECT resource_path FROM backup_project_resources
                 WHERE publish_tag = ? ORDER BY resource_path",
            )
            .bind(tag_id)
            .fetch_all(&self.pool)
            .await?;

            Ok(row.into_project(resources))
        }

        async fn list_projects(&self, limit: u32) -> MetadataResult<Vec<BackupProject>> {
            let rows = sqlx::query_as::<_, BackupProjectRow>(
                "SELECT * FROM backup_projects ORDER BY publish_tag DESC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

            let paths: Vec<(i32, String)> = sqlx::query_as(
                "SELECT publish_tag, resource_path FROM backup_project_resources
                 WHERE publish_tag IN (
                     SELECT publish_tag FROM backup_projects ORDER BY publish_tag DESC LIMIT ?
                 )
                 ORDER BY publish_tag, resource_path",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

            let mut by_tag: HashMap<i32, Vec<String>> = HashMap::new();
            for (tag, path) in paths {
                by_tag.entry(tag).or_default().push(path);
            }

            Ok(rows
                .into_iter()
                .map(|row| {
                    let resources = by_tag.remove(&row.publish_tag).unwrap_or_default();
                    row.into_project(resources)
                })
                .collect())
        }

        async fn tag_for_date(&self, max_date: OffsetDateTime) -> MetadataResult<i32> {
            let tag: i32 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(publish_tag), 0) FROM backup_projects WHERE publish_date <= ?",
            )
            .bind(max_date)
            .fetch_one(&self.pool)
            .await?;
            Ok(tag)
        }

        async fn next_tag(&self) -> MetadataResult<i32> {
            let max_tag: i32 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(tag), 0) FROM (
                     SELECT MAX(publish_tag) AS tag FROM backup_projects
                     UNION ALL
                     SELECT MAX(publish_tag) AS tag FROM backup_resources
                 ) AS tags",
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(max_tag + 1)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- One row per backup: where a structure entry pointed and in which state.
CREATE TABLE IF NOT EXISTS backup_structure (
    backup_id BLOB PRIMARY KEY,
    structure_id BLOB NOT NULL,
    resource_id BLOB NOT NULL,
    resource_path TEXT NOT NULL,
    structure_state INTEGER NOT NULL,
    date_released TEXT,
    date_expired TEXT,
    publish_tag INTEGER NOT NULL,
    version_id INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_backup_structure_path ON backup_structure(resource_path, version_id);
CREATE INDEX IF NOT EXISTS idx_backup_structure_structure ON backup_structure(structure_id, version_id);
CREATE INDEX IF NOT EXISTS idx_backup_structure_resource ON backup_structure(resource_id, publish_tag);
CREATE INDEX IF NOT EXISTS idx_backup_structure_tag ON backup_structure(publish_tag);

-- Resource records, shared by siblings published under the same tag.
CREATE TABLE IF NOT EXISTS backup_resources (
    backup_id BLOB PRIMARY KEY,
    resource_id BLOB NOT NULL,
    resource_type INTEGER NOT NULL,
    resource_flags INTEGER NOT NULL,
    date_published TEXT NOT NULL,
    date_created TEXT NOT NULL,
    user_created BLOB NOT NULL,
    user_created_name TEXT NOT NULL DEFAULT '',
    date_last_modified TEXT NOT NULL,
    user_last_modified BLOB NOT NULL,
    user_last_modified_name TEXT NOT NULL DEFAULT '',
    resource_state INTEGER NOT NULL,
    resource_size INTEGER NOT NULL,
    project_last_modified BLOB NOT NULL,
    sibling_count INTEGER NOT NULL,
    publish_tag INTEGER NOT NULL,
    version_id INTEGER NOT NULL,
    UNIQUE (resource_id, publish_tag)
);
CREATE INDEX IF NOT EXISTS idx_backup_resources_tag ON backup_resources(publish_tag);

-- File contents, one per resource record.
CREATE TABLE IF NOT EXISTS backup_contents (
    backup_id BLOB PRIMARY KEY,
    content_id BLOB NOT NULL,
    resource_id BLOB NOT NULL,
    file_content BLOB NOT NULL,
    publish_tag INTEGER NOT NULL,
    version_id INTEGER NOT NULL,
    UNIQUE (resource_id, publish_tag)
);
CREATE INDEX IF NOT EXISTS idx_backup_contents_tag ON backup_contents(publish_tag);

CREATE TABLE IF NOT EXISTS backup_property_defs (
    propertydef_id BLOB PRIMARY KEY,
    propertydef_name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS backup_properties (
    property_id BLOB PRIMARY KEY,
    backup_id BLOB NOT NULL,
    propertydef_id BLOB NOT NULL REFERENCES backup_property_defs(propertydef_id),
    property_mapping_id BLOB NOT NULL,
    property_mapping_type INTEGER NOT NULL,
    property_value TEXT NOT NULL,
    publish_tag INTEGER NOT NULL,
    version_id INTEGER NOT NULL,
    UNIQUE (backup_id, propertydef_id, property_mapping_type)
);
CREATE INDEX IF NOT EXISTS idx_backup_properties_def ON backup_properties(propertydef_id);
CREATE INDEX IF NOT EXISTS idx_backup_properties_tag ON backup_properties(publish_tag);

-- Project publish records.
CREATE TABLE IF NOT EXISTS backup_projects (
    publish_tag INTEGER PRIMARY KEY,
    project_id BLOB NOT NULL,
    project_name TEXT NOT NULL,
    project_description TEXT NOT NULL,
    publish_date TEXT NOT NULL,
    published_by BLOB NOT NULL,
    published_by_name TEXT NOT NULL DEFAULT '',
    owner_id BLOB NOT NULL,
    owner_name TEXT NOT NULL DEFAULT '',
    group_id BLOB NOT NULL,
    group_name TEXT NOT NULL DEFAULT '',
    manager_group_id BLOB NOT NULL,
    manager_group_name TEXT NOT NULL DEFAULT '',
    date_created TEXT NOT NULL,
    project_type INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_backup_projects_date ON backup_projects(publish_date);

CREATE TABLE IF NOT EXISTS backup_project_resources (
    publish_tag INTEGER NOT NULL,
    project_id BLOB NOT NULL,
    resource_path TEXT NOT NULL,
    PRIMARY KEY (publish_tag, resource_path)
);
"#;
