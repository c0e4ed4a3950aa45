//! Version retention manager.
//!
//! Writes publish snapshots into the history store and keeps the history
//! within its retention limits. All deletions, whether triggered by a new
//! snapshot or by an explicit purge, go through the same planner
//! (`quire_core::retention::plan_deletions`) and the store's batched delete,
//! so a backup's structure, resource, content and property rows always
//! disappear together.

use crate::directory::{LivePropertyIndex, NoLiveProperties, StaticDirectory, UserDirectory};
use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BackupRepo, NewBackup, ProjectRepo, PropertyRepo, PurgeRepo, PurgeStats};
use crate::store::MetadataStore;
use quire_core::retention::plan_deletions;
use quire_core::{
    BackupFile, BackupHeader, BackupId, BackupProject, HistoryKey, ProjectSnapshot, Property,
    PropertyDefinition, PurgeScope, ResourceId, ResourceSnapshot, RetentionPolicy, StructureId,
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Default cap on the number of project records listed.
pub const DEFAULT_PROJECT_LIST_LIMIT: u32 = 300;

/// Result of [`RetentionManager::create_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SnapshotOutcome {
    pub backup_id: BackupId,
    pub version_id: i32,
    /// Whether resource and content rows were written, as opposed to reused
    /// from a sibling published under the same tag.
    pub resource_written: bool,
    /// Older versions removed to stay within the version limit.
    pub pruned: PurgeStats,
}

/// Coordinates snapshot writes, reads and retention over a history store.
pub struct RetentionManager {
    store: Arc<dyn MetadataStore>,
    directory: Arc<dyn UserDirectory>,
    live_properties: Arc<dyn LivePropertyIndex>,
    project_list_limit: u32,
}

impl RetentionManager {
    /// Manager with an empty directory (names recorded blank) and no live
    /// property usage.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            directory: Arc::new(StaticDirectory::new()),
            live_properties: Arc::new(NoLiveProperties),
            project_list_limit: DEFAULT_PROJECT_LIST_LIMIT,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_live_properties(mut self, live_properties: Arc<dyn LivePropertyIndex>) -> Self {
        self.live_properties = live_properties;
        self
    }

    pub fn with_project_list_limit(mut self, limit: u32) -> Self {
        self.project_list_limit = limit;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Record a published resource and trim its history to `max_versions`.
    ///
    /// The write and the trim run in separate transactions: a failed trim
    /// leaves the new backup in place and is reported as an error.
    pub async fn create_snapshot(
        &self,
        snapshot: &ResourceSnapshot,
        properties: &[Property],
        tag_id: i32,
        publish_date: OffsetDateTime,
        max_versions: u32,
    ) -> MetadataResult<SnapshotOutcome> {
        let (user_created_name, user_last_modified_name) = tokio::join!(
            self.user_name_or_blank(snapshot.user_created),
            self.user_name_or_blank(snapshot.user_last_modified),
        );

        let written = self
            .store
            .write_backup(&NewBackup {
                backup_id: BackupId::new(),
                snapshot,
                properties,
                tag_id,
                publish_date,
                user_created_name,
                user_last_modified_name,
            })
            .await?;

        tracing::debug!(
            backup_id = %written.backup_id,
            root_path = %snapshot.root_path,
            tag_id,
            version_id = written.version_id,
            resource_written = written.resource_written,
            "Backup written"
        );

        let key = HistoryKey::new(snapshot.root_path.clone(), snapshot.structure_id);
        let keys = self.store.history_keys(&key).await?;
        let batches = plan_deletions(&keys, RetentionPolicy::MaxVersions(max_versions));
        let pruned = self.store.delete_batches(&batches).await?;

        if pruned.backups_deleted > 0 {
            tracing::info!(
                root_path = %snapshot.root_path,
                max_versions,
                backups_deleted = pruned.backups_deleted,
                "Pruned old versions"
            );
        }

        Ok(SnapshotOutcome {
            backup_id: written.backup_id,
            version_id: written.version_id,
            resource_written: written.resource_written,
            pruned,
        })
    }

    async fn user_name_or_blank(&self, user_id: Uuid) -> String {
        match self.directory.user_name(user_id).await {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "User lookup failed; recording blank name");
                String::new()
            }
        }
    }

    async fn group_name_or_blank(&self, group_id: Uuid) -> String {
        match self.directory.group_name(group_id).await {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(%group_id, error = %err, "Group lookup failed; recording blank name");
                String::new()
            }
        }
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Delete historical versions outside `policy` within `scope`.
    pub async fn purge(&self, scope: PurgeScope, policy: RetentionPolicy) -> MetadataResult<PurgeStats> {
        let stats = match (scope, policy) {
            (PurgeScope::All, RetentionPolicy::MaxTag(tag_id)) => {
                self.store.delete_up_to_tag(tag_id).await?
            }
            (PurgeScope::All, RetentionPolicy::MaxVersions(keep)) => {
                let keys = self.store.keys_exceeding(keep).await?;
                let batches = plan_deletions(&keys, policy);
                for batch in &batches {
                    tracing::debug!(
                        structure_id = %batch.structure_id,
                        mode = ?batch.mode,
                        backups = batch.keys.len(),
                        "Planned deletion batch"
                    );
                }
                self.store.delete_batches(&batches).await?
            }
            (
                PurgeScope::Resource {
                    structure_id,
                    resource_id,
                },
                policy,
            ) => {
                let keys = self.store.resource_keys(structure_id, resource_id).await?;
                let batches = plan_deletions(&keys, policy);
                self.store.delete_batches(&batches).await?
            }
        };

        tracing::info!(
            scope = ?scope,
            policy = ?policy,
            backups_deleted = stats.backups_deleted,
            resource_rows = stats.resource_rows,
            content_rows = stats.content_rows,
            property_rows = stats.property_rows,
            "History purged"
        );

        Ok(stats)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every version of one history oldest first, or the latest backup of
    /// every resource newest first.
    pub async fn list_headers(&self, key: Option<&HistoryKey>) -> MetadataResult<Vec<BackupHeader>> {
        match key {
            Some(key) => self.store.list_history(key).await,
            None => self.store.list_latest().await,
        }
    }

    pub async fn read_backup(&self, tag_id: i32, structure_id: StructureId) -> MetadataResult<BackupFile> {
        self.store.read_backup(tag_id, structure_id).await
    }

    pub async fn read_backup_by_path(&self, tag_id: i32, root_path: &str) -> MetadataResult<BackupFile> {
        self.store.read_backup_by_path(tag_id, root_path).await
    }

    /// Properties recorded with a backup.
    pub async fn read_properties(&self, header: &BackupHeader) -> MetadataResult<Vec<Property>> {
        self.store.read_backup_properties(header.backup_id).await
    }

    pub async fn max_version(&self, resource_id: ResourceId) -> MetadataResult<i32> {
        self.store.max_version(resource_id).await
    }

    pub async fn max_tag(&self, resource_id: ResourceId) -> MetadataResult<i32> {
        self.store.max_tag(resource_id).await
    }

    pub async fn next_tag(&self) -> MetadataResult<i32> {
        self.store.next_tag().await
    }

    // =========================================================================
    // Property definitions
    // =========================================================================

    pub async fn create_property_definition(&self, name: &str) -> MetadataResult<PropertyDefinition> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MetadataError::Consistency(
                "property definition name must not be blank".to_string(),
            ));
        }
        self.store.create_property_definition(name).await
    }

    pub async fn read_property_definition(&self, name: &str) -> MetadataResult<PropertyDefinition> {
        self.store.read_property_definition(name).await
    }

    pub async fn list_property_definitions(&self) -> MetadataResult<Vec<PropertyDefinition>> {
        self.store.list_property_definitions().await
    }

    /// Delete a definition nothing uses, in the history or the live system.
    pub async fn delete_property_definition(&self, name: &str) -> MetadataResult<()> {
        let definition = self.store.read_property_definition(name).await?;

        let backup_usage = self.store.count_backup_properties(&definition).await?;
        let live_usage = self.live_properties.count_live_mappings(name).await?;
        if backup_usage > 0 || live_usage > 0 {
            return Err(MetadataError::Consistency(format!(
                "property definition '{name}' is in use ({backup_usage} backup values, \
                 {live_usage} live values)"
            )));
        }

        self.store.delete_property_definition(&definition).await?;
        tracing::info!(name, id = %definition.id, "Property definition deleted");
        Ok(())
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Record the project published under `tag_id`.
    ///
    /// An unknown owner fails the write; unknown publisher or group names
    /// are recorded blank.
    pub async fn write_project(
        &self,
        tag_id: i32,
        publish_date: OffsetDateTime,
        project: &ProjectSnapshot,
        published_by: Uuid,
    ) -> MetadataResult<BackupProject> {
        let owner_name = self.directory.user_name(project.owner_id).await?;
        let (published_by_name, group_name, manager_group_name) = tokio::join!(
            self.user_name_or_blank(published_by),
            self.group_name_or_blank(project.group_id),
            self.group_name_or_blank(project.manager_group_id),
        );

        let record = BackupProject {
            tag_id,
            project_id: project.project_id,
            name: project.name.clone(),
            description: project.description.clone(),
            publish_date,
            published_by,
            published_by_name,
            owner_id: project.owner_id,
            owner_name,
            group_id: project.group_id,
            group_name,
            manager_group_id: project.manager_group_id,
            manager_group_name,
            date_created: project.date_created,
            project_type: project.project_type,
            resources: project.resources.clone(),
        };

        self.store.write_project(&record).await?;
        tracing::debug!(tag_id, project = %record.name, "Project publish recorded");
        Ok(record)
    }

    pub async fn read_project(&self, tag_id: i32) -> MetadataResult<BackupProject> {
        self.store.read_project(tag_id).await
    }

    /// Most recent project records, newest first.
    pub async fn list_projects(&self) -> MetadataResult<Vec<BackupProject>> {
        self.store.list_projects(self.project_list_limit).await
    }

    /// Highest tag published at or before `max_date` (0 when none).
    pub async fn tag_for_date(&self, max_date: OffsetDateTime) -> MetadataResult<i32> {
        self.store.tag_for_date(max_date).await
    }
}
