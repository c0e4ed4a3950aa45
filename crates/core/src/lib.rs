//! Core domain types for the Quire resource history.
//!
//! This crate defines the data model shared by the store and the CLI:
//! - Identifiers for structure, resource, backup and content records
//! - Resource snapshots and backup headers
//! - Properties and their mapping kind
//! - Retention policies and deletion planning
//! - Configuration

pub mod backup;
pub mod config;
pub mod error;
pub mod ids;
pub mod project;
pub mod property;
pub mod resource;
pub mod retention;

pub use backup::{BackupFile, BackupHeader, BackupKey, HistoryKey};
pub use error::{Error, Result};
pub use ids::{BackupId, ContentId, PropertyDefId, ResourceId, StructureId};
pub use project::{BackupProject, ProjectSnapshot};
pub use property::{Property, PropertyDefinition, PropertyMapping};
pub use resource::{FileContent, ResourceBody, ResourceSnapshot, ResourceState};
pub use retention::{DeletionBatch, KeyMatch, PurgeScope, RetentionPolicy};
