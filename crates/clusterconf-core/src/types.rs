//! Core data model
//!
//! Defines the values that flow between the catalog, codec and diff engine:
//! - Typed property values
//! - Cluster snapshots and pending edits
//! - Per-node status as reported by the control plane

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Monotonic configuration version assigned by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(pub i64);

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster member identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed in-memory property value
///
/// Enum-typed properties decode to [`PropertyValue::String`]; membership is
/// checked by the codec, not carried in the value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Explicit null (nullable properties only)
    Null,
    /// Signed integer
    Integer(i64),
    /// Finite floating point number
    Float(f64),
    /// Boolean flag
    Boolean(bool),
    /// Duration in whole milliseconds; negative values are sentinels
    /// (`-1`: unlimited) accepted only where the schema's range allows them
    Duration(i64),
    /// String or enum member
    String(String),
    /// Homogeneous list
    List(Vec<PropertyValue>),
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::codec::encode(self))
    }
}

/// The cluster's agreed configuration at one point in time
///
/// Holds explicit overrides only; properties left at their schema default
/// are absent. Never mutated in place: [`ClusterSnapshot::apply`] returns a
/// new snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterSnapshot {
    properties: BTreeMap<String, PropertyValue>,
    schema_version: SchemaVersion,
}

impl ClusterSnapshot {
    /// Create snapshot from decoded properties
    #[inline]
    #[must_use]
    pub fn new(properties: BTreeMap<String, PropertyValue>, schema_version: SchemaVersion) -> Self {
        Self {
            properties,
            schema_version,
        }
    }

    /// All overrides, keyed by property name
    #[inline]
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Version this snapshot was read at
    #[inline]
    #[must_use]
    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// Value of a single property, if overridden
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Whether the property carries an override
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Snapshot the control plane would hold after accepting `patch`
    #[must_use]
    pub fn apply(&self, patch: &crate::diff::Patch, version: SchemaVersion) -> Self {
        let mut properties = self.properties.clone();
        for name in patch.removals() {
            properties.remove(name);
        }
        for (name, value) in patch.upserts() {
            properties.insert(name.clone(), value.clone());
        }
        Self::new(properties, version)
    }
}

/// Operation carried by a pending edit
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    /// Assign the proposed value
    Set(PropertyValue),
    /// Clear the override, reverting to the schema default
    Remove,
}

/// A single unit of user intent, consumed by the diff engine
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    /// Canonical property name
    pub name: String,
    /// Requested operation
    pub op: EditOp,
}

impl PendingEdit {
    /// Edit assigning `value` to `name`
    #[inline]
    #[must_use]
    pub fn set(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            op: EditOp::Set(value),
        }
    }

    /// Edit clearing the override on `name`
    #[inline]
    #[must_use]
    pub fn remove(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: EditOp::Remove,
        }
    }
}

/// Configuration status one node reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Reporting node
    pub node_id: NodeId,
    /// Latest configuration version the node has applied
    #[serde(rename = "config_version")]
    pub applied_schema_version: SchemaVersion,
    /// Whether any applied property still needs a restart
    #[serde(default)]
    pub restart: bool,
    /// Properties whose value this node rejected
    #[serde(default, rename = "invalid")]
    pub invalid_properties: BTreeSet<String>,
    /// Properties this node's build does not know
    #[serde(default, rename = "unknown")]
    pub unknown_properties: BTreeSet<String>,
    /// Properties accepted but pending a restart
    #[serde(default, rename = "restart_required")]
    pub restart_required_properties: BTreeSet<String>,
}

impl NodeStatus {
    /// Status with nothing rejected and nothing pending restart
    #[must_use]
    pub fn clean(node_id: NodeId, applied: SchemaVersion) -> Self {
        Self {
            node_id,
            applied_schema_version: applied,
            restart: false,
            invalid_properties: BTreeSet::new(),
            unknown_properties: BTreeSet::new(),
            restart_required_properties: BTreeSet::new(),
        }
    }

    /// Whether the node rejected or failed to recognize any property
    #[inline]
    #[must_use]
    pub fn has_divergence(&self) -> bool {
        !self.invalid_properties.is_empty() || !self.unknown_properties.is_empty()
    }
}
