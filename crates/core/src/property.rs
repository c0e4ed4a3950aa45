//! Properties attached to backups.

use crate::ids::PropertyDefId;
use serde::{Deserialize, Serialize};

/// Which record a property value is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyMapping {
    /// Value belongs to the structure record (not shared with siblings).
    Structure,
    /// Value belongs to the resource record (shared by all siblings).
    Resource,
}

impl PropertyMapping {
    /// Integer code stored in the history tables.
    pub fn code(self) -> i32 {
        match self {
            Self::Structure => 1,
            Self::Resource => 2,
        }
    }

    /// Decode a stored mapping code.
    pub fn from_code(code: i32) -> crate::Result<Self> {
        match code {
            1 => Ok(Self::Structure),
            2 => Ok(Self::Resource),
            other => Err(crate::Error::UnknownMapping(other)),
        }
    }
}

/// A named property with its optional structure and resource values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub structure_value: Option<String>,
    pub resource_value: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_structure_value(mut self, value: impl Into<String>) -> Self {
        self.structure_value = Some(value.into());
        self
    }

    pub fn with_resource_value(mut self, value: impl Into<String>) -> Self {
        self.resource_value = Some(value.into());
        self
    }

    /// Set the value for one mapping kind.
    pub fn set(&mut self, mapping: PropertyMapping, value: String) {
        match mapping {
            PropertyMapping::Structure => self.structure_value = Some(value),
            PropertyMapping::Resource => self.resource_value = Some(value),
        }
    }

    /// Non-blank values to persist, in structure-then-resource order.
    pub fn values(&self) -> impl Iterator<Item = (PropertyMapping, &str)> {
        [
            (PropertyMapping::Structure, self.structure_value.as_deref()),
            (PropertyMapping::Resource, self.resource_value.as_deref()),
        ]
        .into_iter()
        .filter_map(|(mapping, value)| match value {
            Some(v) if !v.trim().is_empty() => Some((mapping, v)),
            _ => None,
        })
    }
}

/// A backup property definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: PropertyDefId,
    pub name: String,
}
