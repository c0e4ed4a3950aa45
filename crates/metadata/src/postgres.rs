//! PostgreSQL-based history store implementation.

use crate::error::{MetadataError, MetadataResult, StatementContext};
use crate::models::*;
use crate::repos::{
    BackupRepo, NewBackup, ProjectRepo, PropertyRepo, PurgeRepo, PurgeStats, WrittenBackup,
};
use crate::store::MetadataStore;
use async_trait::async_trait;
use quire_core::config::PgSslMode;
use quire_core::{
    BackupFile, BackupHeader, BackupId, BackupKey, BackupProject, DeletionBatch, HistoryKey,
    KeyMatch, Property, PropertyDefId, PropertyDefinition, ResourceId, StructureId,
};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::collections::HashMap;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

const INSERT_RESOURCE: &str = "INSERT INTO backup_resources (
        backup_id, resource_id, resource_type, resource_flags, date_published,
        date_created, user_created, user_created_name, date_last_modified,
        user_last_modified, user_last_modified_name, resource_state, resource_size,
        project_last_modified, sibling_count, publish_tag, version_id
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    ON CONFLICT (resource_id, publish_tag) DO NOTHING";

const INSERT_CONTENT: &str = "INSERT INTO backup_contents (
        backup_id, content_id, resource_id, file_content, publish_tag, version_id
    ) VALUES ($1, $2, $3, $4, $5, $6)";

const INSERT_STRUCTURE: &str = "INSERT INTO backup_structure (
        backup_id, structure_id, resource_id, resource_path, structure_state,
        date_released, date_expired, publish_tag, version_id
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

const INSERT_PROPERTY: &str = "INSERT INTO backup_properties (
        property_id, backup_id, propertydef_id, property_mapping_id,
        property_mapping_type, property_value, publish_tag, version_id
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const DELETE_PROPERTIES_BY_BACKUP: &str = "DELETE FROM backup_properties WHERE backup_id = $1";

const DELETE_STRUCTURE_BY_BACKUP: &str = "DELETE FROM backup_structure WHERE backup_id = $1";

const DELETE_UNREFERENCED_RESOURCE: &str = "DELETE FROM backup_resources
    WHERE resource_id = $1 AND publish_tag = $2
      AND NOT EXISTS (
          SELECT 1 FROM backup_structure s
          WHERE s.resource_id = backup_resources.resource_id
            AND s.publish_tag = backup_resources.publish_tag
      )";

const DELETE_UNREFERENCED_CONTENT: &str = "DELETE FROM backup_contents
    WHERE resource_id = $1 AND publish_tag = $2
      AND NOT EXISTS (
          SELECT 1 FROM backup_structure s
          WHERE s.resource_id = backup_contents.resource_id
            AND s.publish_tag = backup_contents.publish_tag
      )";

const DELETE_STRUCTURE_BY_VERSION: &str = "DELETE FROM backup_structure
    WHERE resource_id = $1 AND version_id = $2 AND publish_tag = $3";

const DELETE_PROPERTIES_UP_TO_TAG: &str = "DELETE FROM backup_properties WHERE publish_tag <= $1";

const DELETE_STRUCTURE_UP_TO_TAG: &str = "DELETE FROM backup_structure WHERE publish_tag <= $1";

const DELETE_CONTENTS_UP_TO_TAG: &str = "DELETE FROM backup_contents WHERE publish_tag <= $1";

const DELETE_RESOURCES_UP_TO_TAG: &str = "DELETE FROM backup_resources WHERE publish_tag <= $1";

const SELECT_PROPERTY_DEF_ID: &str =
    "SELECT propertydef_id FROM backup_property_defs WHERE propertydef_name = $1";

/// PostgreSQL-based history store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a store from individual connection parameters, so the password
    /// can come from the environment instead of a URL in a config file.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL history store"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements hold one command each.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BackupRepo for PostgresStore {
    async fn write_backup(&self, backup: &NewBackup<'_>) -> MetadataResult<WrittenBackup> {
        let snapshot = backup.snapshot;
        let backup_id = backup.backup_id;
        let mut tx = self.pool.begin().await?;

        // Serializes version allocation for a path across concurrent publishers.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&snapshot.root_path)
            .execute(&mut *tx)
            .await?;

        let last_version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_id), 0) FROM backup_structure WHERE resource_path = $1",
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

    async fn read_backup(&self, tag_id: i32, structure_id: StructureId) -> MetadataResult<BackupFile> {
        let row = sqlx::query_as::<_, BackupFileRow>(concat!(
            backup_file_select!(),
            " WHERE s.publish_tag = $1 AND s.structure_id = $2",
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

    async fn read_backup_by_path(&self, tag_id: i32, root_path: &str) -> MetadataResult<BackupFile> {
        let row = sqlx::query_as::<_, BackupFileRow>(concat!(
            backup_file_select!(),
            " WHERE s.publish_tag = $1 AND s.resource_path = $2",
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
            " WHERE s.resource_path = $1 AND s.structure_id = $2",
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
            "SELECT COALESCE(MAX(version_id), 0) FROM backup_structure WHERE resource_id = $1",
        )
        .bind(resource_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(version)
    }

    async fn max_tag(&self, resource_id: ResourceId) -> MetadataResult<i32> {
        let tag: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(publish_tag), 0) FROM backup_resources WHERE resource_id = $1",
        )
        .bind(resource_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(tag)
    }
}

#[async_trait]
impl PurgeRepo for PostgresStore {
    async fn history_keys(&self, key: &HistoryKey) -> MetadataResult<Vec<BackupKey>> {
        let rows = sqlx::query_as::<_, BackupKeyRow>(concat!(
            backup_key_select!(),
            " WHERE s.resource_path = $1 AND s.structure_id = $2",
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
            " WHERE s.structure_id = $1 AND s.resource_id = $2",
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
            "   GROUP BY structure_id HAVING COUNT(*) > $1",
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
impl PropertyRepo for PostgresStore {
    async fn create_property_definition(&self, name: &str) -> MetadataResult<PropertyDefinition> {
        let id = PropertyDefId::new();
        let result = sqlx::query(
            "INSERT INTO backup_property_defs (propertydef_id, propertydef_name) VALUES ($1, $2)
             ON CONFLICT (propertydef_name) DO NOTHING",
        )
        .bind(id.as_uuid())
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::AlreadyExists(format!(
                "property definition '{name}' already exists"
            )));
        }

        Ok(PropertyDefinition {
            id,
            name: name.to_string(),
        })
    }

    async fn read_property_definition(&self, name: &str) -> MetadataResult<PropertyDefinition> {
        let row = sqlx::query_as::<_, PropertyDefRow>(
            "SELECT propertydef_id, propertydef_name FROM backup_property_defs WHERE propertydef_name = $1",
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

    async fn count_backup_properties(&self, definition: &PropertyDefinition) -> MetadataResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM backup_properties WHERE propertydef_id = $1")
                .bind(definition.id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn delete_property_definition(&self, definition: &PropertyDefinition) -> MetadataResult<()> {
        let result = sqlx::query(
            "DELETE FROM backup_property_defs
             WHERE propertydef_id = $1
               AND NOT EXISTS (SELECT 1 FROM backup_properties WHERE propertydef_id = $1)",
        )
        .bind(definition.id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM backup_property_defs WHERE propertydef_id = $1)",
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
             WHERE p.backup_id = $1
             ORDER BY d.propertydef_name, p.property_mapping_type",
        )
        .bind(backup_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        merge_property_rows(rows)
    }
}

#[async_trait]
impl ProjectRepo for PostgresStore {
    async fn write_project(&self, project: &BackupProject) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO backup_projects (
                publish_tag, project_id, project_name, project_description, publish_date,
                published_by, published_by_name, owner_id, owner_name, group_id, group_name,
                manager_group_id, manager_group_name, date_created, project_type
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (publish_tag) DO NOTHING",
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

        if result.rows_affected() == 0 {
            return Err(MetadataError::AlreadyExists(format!(
                "project record for tag {} already exists",
                project.tag_id
            )));
        }

        for path in &project.resources {
            sqlx::query(
                "INSERT INTO backup_project_resources (publish_tag, project_id, resource_path)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (publish_tag, resource_path) DO NOTHING",
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
            "SELECT * FROM backup_projects WHERE publish_tag = $1",
        )
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MetadataError::NotFound(format!("no project published with tag {tag_id}")))?;

        let resources: Vec<String> = sqlx::query_scalar(
            "SELECT resource_path FROM backup_project_resources
             WHERE publish_tag = $1 ORDER BY resource_path",
        )
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(row.into_project(resources))
    }

    async fn list_projects(&self, limit: u32) -> MetadataResult<Vec<BackupProject>> {
        let rows = sqlx::query_as::<_, BackupProjectRow>(
            "SELECT * FROM backup_projects ORDER BY publish_tag DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let tags: Vec<i32> = rows.iter().map(|row| row.publish_tag).collect();
        let paths: Vec<(i32, String)> = sqlx::query_as(
            "SELECT publish_tag, resource_path FROM backup_project_resources
             WHERE publish_tag = ANY($1)
             ORDER BY publish_tag, resource_path",
        )
        .bind(&tags)
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
            "SELECT COALESCE(MAX(publish_tag), 0) FROM backup_projects WHERE publish_date <= $1",
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

#[cfg(test)]
mod tests {
    use super::postgres_schema_statements;

    #[test]
    fn postgres_schema_statements_skips_empty_and_comment_only() {
        let schema = r#"
            -- comment only

            CREATE TABLE foo (id int);
            ;
            -- another comment
            CREATE TABLE bar (id int);
        "#;

        let statements = postgres_schema_statements(schema);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE foo"));
        assert!(statements[1].contains("CREATE TABLE bar"));
    }

    #[test]
    fn embedded_schema_creates_every_table() {
        let statements = postgres_schema_statements(super::POSTGRES_SCHEMA);
        for table in [
            "backup_structure",
            "backup_resources",
            "backup_contents",
            "backup_property_defs",
            "backup_properties",
            "backup_projects",
            "backup_project_resources",
        ] {
            let create = format!("CREATE TABLE IF NOT EXISTS {table} (");
            assert!(
                statements.iter().any(|s| s.contains(&create)),
                "missing table {table}"
            );
        }
    }
}
