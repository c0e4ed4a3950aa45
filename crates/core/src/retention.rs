//! Retention policies and deletion planning.
//!
//! Planning is pure: the store hands over the backup keys in scope, ordered
//! oldest first per structure, and gets back the batches to delete. Each
//! batch carries the key-matching mode chosen once for its structure.

use crate::backup::BackupKey;
use crate::ids::{ResourceId, StructureId};
use serde::{Deserialize, Serialize};

/// How many historical versions to keep.
///
/// Exactly one dimension applies per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep the newest N versions of each resource.
    MaxVersions(u32),
    /// Delete every version published with a tag at or below T.
    MaxTag(i32),
}

impl RetentionPolicy {
    /// Build a policy from a `(tag, versions)` request pair: a positive tag
    /// selects tag-based deletion, otherwise the version count applies.
    pub fn from_legacy(tag: i32, versions: i32) -> crate::Result<Self> {
        if tag > 0 {
            Ok(Self::MaxTag(tag))
        } else if versions >= 0 {
            Ok(Self::MaxVersions(versions as u32))
        } else {
            Err(crate::Error::InvalidPolicy(format!(
                "version count must not be negative, got {versions}"
            )))
        }
    }
}

/// Which backups a purge considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurgeScope {
    /// Every resource in the history.
    All,
    /// The backups of one structure/resource pair.
    Resource {
        structure_id: StructureId,
        resource_id: ResourceId,
    },
}

/// How the structure row of a backup is matched when deleting.
///
/// In both modes properties match on backup id, and resource and content
/// rows go once no structure row references them any more.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMatch {
    /// No siblings: the structure row matches on resource id, version and
    /// tag.
    ResourceVersion,
    /// Siblings share the resource record: the structure row matches on
    /// backup id.
    BackupId,
}

impl KeyMatch {
    pub fn for_siblings(has_siblings: bool) -> Self {
        if has_siblings {
            Self::BackupId
        } else {
            Self::ResourceVersion
        }
    }
}

/// Backups of one structure to delete with one key-matching mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletionBatch {
    pub structure_id: StructureId,
    pub mode: KeyMatch,
    /// Oldest first.
    pub keys: Vec<BackupKey>,
}

/// Number of versions over the retention limit.
pub fn excess_count(existing: usize, keep: u32) -> usize {
    existing.saturating_sub(keep as usize)
}

/// The oldest entries beyond the newest `keep`, given an oldest-first slice.
pub fn oldest_excess<T>(oldest_first: &[T], keep: u32) -> &[T] {
    &oldest_first[..excess_count(oldest_first.len(), keep)]
}

/// Plan deletions for keys ordered by structure, then oldest first.
///
/// Keys of one structure must be contiguous. Structures left without
/// anything to delete produce no batch.
pub fn plan_deletions(keys: &[BackupKey], policy: RetentionPolicy) -> Vec<DeletionBatch> {
    keys.chunk_by(|a, b| a.structure_id == b.structure_id)
        .filter_map(|group| {
            let doomed: Vec<BackupKey> = match policy {
                RetentionPolicy::MaxVersions(keep) => oldest_excess(group, keep).to_vec(),
                RetentionPolicy::MaxTag(tag) => {
                    group.iter().filter(|k| k.tag_id <= tag).copied().collect()
                }
            };
            if doomed.is_empty() {
                return None;
            }
            let has_siblings = group.iter().any(|k| k.has_siblings);
            Some(DeletionBatch {
                structure_id: group[0].structure_id,
                mode: KeyMatch::for_siblings(has_siblings),
                keys: doomed,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BackupId;

    fn history(structure_id: StructureId, versions: std::ops::RangeInclusive<i32>) -> Vec<BackupKey> {
        let resource_id = ResourceId::new();
        versions
            .map(|v| BackupKey {
                backup_id: BackupId::new(),
                structure_id,
                resource_id,
                version_id: v,
                tag_id: v * 10,
                has_siblings: false,
            })
            .collect()
    }

    #[test]
    fn test_excess_count() {
        assert_eq!(excess_count(7, 5), 2);
        assert_eq!(excess_count(5, 5), 0);
        assert_eq!(excess_count(3, 5), 0);
        assert_eq!(excess_count(4, 0), 4);
    }

    #[test]
    fn test_oldest_excess_keeps_newest() {
        let versions: Vec<i32> = (1..=7).collect();
        assert_eq!(oldest_excess(&versions, 5), &[1, 2]);
        assert!(oldest_excess(&versions, 10).is_empty());
    }

    #[test]
    fn test_legacy_policy_selection() {
        assert_eq!(
            RetentionPolicy::from_legacy(12, 3).unwrap(),
            RetentionPolicy::MaxTag(12)
        );
        assert_eq!(
            RetentionPolicy::from_legacy(0, 3).unwrap(),
            RetentionPolicy::MaxVersions(3)
        );
        assert!(RetentionPolicy::from_legacy(0, -1).is_err());
    }

    #[test]
    fn test_plan_by_versions_per_structure() {
        let a = StructureId::new();
        let b = StructureId::new();
        let mut keys = history(a, 1..=7);
        keys.extend(history(b, 1..=3));

        let plan = plan_deletions(&keys, RetentionPolicy::MaxVersions(5));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].structure_id, a);
        assert_eq!(plan[0].mode, KeyMatch::ResourceVersion);
        let versions: Vec<i32> = plan[0].keys.iter().map(|k| k.version_id).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn test_plan_by_tag() {
        let a = StructureId::new();
        let keys = history(a, 1..=4);
        let plan = plan_deletions(&keys, RetentionPolicy::MaxTag(25));
        let tags: Vec<i32> = plan[0].keys.iter().map(|k| k.tag_id).collect();
        assert_eq!(tags, vec![10, 20]);
    }

    #[test]
    fn test_sibling_mode_selected_once_per_structure() {
        let a = StructureId::new();
        let mut keys = history(a, 1..=3);
        // Only the newest key saw the sibling; the whole structure switches mode.
        keys[2].has_siblings = true;
        let plan = plan_deletions(&keys, RetentionPolicy::MaxVersions(1));
        assert_eq!(plan[0].mode, KeyMatch::BackupId);
        assert_eq!(plan[0].keys.len(), 2);
    }
}
