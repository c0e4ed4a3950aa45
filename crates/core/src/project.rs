//! Project publish records kept alongside the resource history.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The project being published, as known to the live system.
#[derive(Clone, Debug)]
pub struct ProjectSnapshot {
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    pub owner_id: Uuid,
    pub group_id: Uuid,
    pub manager_group_id: Uuid,
    pub date_created: OffsetDateTime,
    pub project_type: i32,
    /// Root paths the project covers.
    pub resources: Vec<String>,
}

/// A project publish record read back from the history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProject {
    pub tag_id: i32,
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub publish_date: OffsetDateTime,
    pub published_by: Uuid,
    pub published_by_name: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub group_id: Uuid,
    pub group_name: String,
    pub manager_group_id: Uuid,
    pub manager_group_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date_created: OffsetDateTime,
    pub project_type: i32,
    pub resources: Vec<String>,
}
