//! Backup property repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use quire_core::{BackupId, Property, PropertyDefinition};

/// Repository for property definitions and stored property values.
#[async_trait]
pub trait PropertyRepo: Send + Sync {
    /// Create a definition. Fails with `AlreadyExists` for a taken name.
    async fn create_property_definition(&self, name: &str) -> MetadataResult<PropertyDefinition>;

    /// Read a definition by name. Fails with `NotFound`.
    async fn read_property_definition(&self, name: &str) -> MetadataResult<PropertyDefinition>;

    /// All definitions, ordered by name.
    async fn list_property_definitions(&self) -> MetadataResult<Vec<PropertyDefinition>>;

    /// Number of backup property rows referencing a definition.
    async fn count_backup_properties(&self, definition: &PropertyDefinition)
    -> MetadataResult<u64>;

    /// Delete a definition that no backup property references.
    ///
    /// The usage check is part of the delete statement, so a definition that
    /// gained a reference after the caller's pre-check is still kept; that
    /// case fails with `Consistency`.
    async fn delete_property_definition(
        &self,
        definition: &PropertyDefinition,
    ) -> MetadataResult<()>;

    /// Properties of one backup, one entry per definition name.
    async fn read_backup_properties(&self, backup_id: BackupId) -> MetadataResult<Vec<Property>>;
}
