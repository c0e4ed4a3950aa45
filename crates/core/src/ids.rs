//! Identifier newtypes for history records.
//!
//! All identifiers are UUIDs on the wire and in the database; the newtypes
//! keep structure, resource, backup and content ids from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The nil identifier.
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Parse from a string.
            pub fn parse(s: &str) -> crate::Result<Self> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    crate::Error::InvalidId(format!("invalid {}: {e}", stringify!($name)))
                })
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Whether this is the nil identifier.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifies a structure record (a path entry; siblings have distinct ones).
    StructureId
);
uuid_id!(
    /// Identifies a resource record, shared by all siblings of a resource.
    ResourceId
);
uuid_id!(
    /// Primary key of one backup snapshot.
    BackupId
);
uuid_id!(
    /// Identifies the content blob of a file.
    ContentId
);
uuid_id!(
    /// Identifies a backup property definition.
    PropertyDefId
);
