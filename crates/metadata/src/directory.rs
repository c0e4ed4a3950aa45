//! Lookups into systems outside the history store.
//!
//! Backups denormalize user and group names, and property definition
//! deletes must respect live usage. Both sources are owned elsewhere, so the
//! retention manager talks to them through these traits.

use crate::error::{MetadataError, MetadataResult};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// Resolves user and group ids to display names.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Name of a user. Fails with `NotFound` for an unknown id.
    async fn user_name(&self, user_id: Uuid) -> MetadataResult<String>;

    /// Name of a group. Fails with `NotFound` for an unknown id.
    async fn group_name(&self, group_id: Uuid) -> MetadataResult<String>;
}

/// In-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<Uuid, String>,
    groups: HashMap<Uuid, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.users.insert(id, name.into());
        self
    }

    pub fn with_group(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.groups.insert(id, name.into());
        self
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn user_name(&self, user_id: Uuid) -> MetadataResult<String> {
        self.users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("user {user_id} not found")))
    }

    async fn group_name(&self, group_id: Uuid) -> MetadataResult<String> {
        self.groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("group {group_id} not found")))
    }
}

/// Counts property values attached to live (non-history) resources.
#[async_trait]
pub trait LivePropertyIndex: Send + Sync {
    /// Number of live values using the named definition.
    async fn count_live_mappings(&self, definition_name: &str) -> MetadataResult<u64>;
}

/// Index for deployments without a live repository: nothing is in use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveProperties;

#[async_trait]
impl LivePropertyIndex for NoLiveProperties {
    async fn count_live_mappings(&self, _definition_name: &str) -> MetadataResult<u64> {
        Ok(0)
    }
}

/// In-memory live usage counts by definition name.
#[derive(Debug, Clone, Default)]
pub struct StaticPropertyIndex {
    counts: HashMap<String, u64>,
}

impl StaticPropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, definition_name: impl Into<String>, count: u64) -> Self {
        self.counts.insert(definition_name.into(), count);
        self
    }
}

#[async_trait]
impl LivePropertyIndex for StaticPropertyIndex {
    async fn count_live_mappings(&self, definition_name: &str) -> MetadataResult<u64> {
        Ok(self.counts.get(definition_name).copied().unwrap_or(0))
    }
}
