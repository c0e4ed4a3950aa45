//! Repository traits for history operations.

pub mod backups;
pub mod projects;
pub mod properties;
pub mod purge;

pub use backups::{BackupRepo, NewBackup, WrittenBackup};
pub use projects::ProjectRepo;
pub use properties::PropertyRepo;
pub use purge::{PurgeRepo, PurgeStats};
