//! Schema catalog
//!
//! Describes every cluster property the control plane knows about. The
//! catalog is pure data: it is built once from the fetched definitions and
//! consulted by the codec, the document renderer and the session workflows.

use crate::codec;
use crate::error::SchemaError;
use crate::types::PropertyValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wire type of a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueType {
    /// Signed 64-bit integer
    Integer,
    /// Floating point number
    Float,
    /// true / false
    Boolean,
    /// Milliseconds; input accepts unit suffixes
    Duration,
    /// Free-form string
    String,
    /// One of a fixed set of strings
    Enum {
        /// Allowed members
        values: Vec<String>,
    },
    /// Sequence of a single element type
    List {
        /// Element type
        items: Box<ValueType>,
    },
}

impl ValueType {
    /// Human-readable type name
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Integer => "integer".to_string(),
            Self::Float => "float".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Duration => "duration".to_string(),
            Self::String => "string".to_string(),
            Self::Enum { .. } => "enum".to_string(),
            Self::List { items } => format!("list of {}", items.describe()),
        }
    }
}

/// Who gets to see a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Shown to every user
    #[default]
    User,
    /// Low-level knob, shown only when tunables are requested
    Tunable,
    /// Retained for compatibility, never shown
    Deprecated,
}

/// Numeric bounds applied by the codec
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Inclusive lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ValidationRules {
    /// Whether `value` lies within the bounds
    #[inline]
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |lo| value >= lo) && self.max.map_or(true, |hi| value <= hi)
    }
}

fn default_true() -> bool {
    true
}

/// Definition of one cluster property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Unique property name
    pub name: String,
    /// Value type
    pub value_type: ValueType,
    /// Default in wire form, `null` when unset
    #[serde(default)]
    pub default: serde_json::Value,
    /// Visibility class
    #[serde(default)]
    pub visibility: Visibility,
    /// Whether the property may be changed at runtime
    #[serde(default = "default_true")]
    pub mutable: bool,
    /// Whether null is a legal value
    #[serde(default)]
    pub nullable: bool,
    /// Whether a change only takes effect after a node restart
    #[serde(default)]
    pub needs_restart: bool,
    /// Whether the value should be redacted in output
    #[serde(default)]
    pub is_secret: bool,
    /// One-line description
    #[serde(default)]
    pub description: String,
    /// Legacy names resolving to this property
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Bounds for numeric types
    #[serde(default)]
    pub rules: ValidationRules,
}

impl PropertyDefinition {
    /// Create a mutable, user-visible definition with no default
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            default: serde_json::Value::Null,
            visibility: Visibility::User,
            mutable: true,
            nullable: false,
            needs_restart: false,
            is_secret: false,
            description: String::new(),
            aliases: Vec::new(),
            rules: ValidationRules::default(),
        }
    }

    /// With default value (wire form)
    #[must_use]
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = default;
        self
    }

    /// With visibility
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// With inclusive bounds
    #[must_use]
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.rules = ValidationRules { min, max };
        self
    }

    /// Mark immutable
    #[must_use]
    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Mark nullable
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as needing a node restart to take effect
    #[must_use]
    pub fn restart_required(mut self) -> Self {
        self.needs_restart = true;
        self
    }

    /// Mark secret; `get` redacts the value
    #[must_use]
    pub fn secret(mut self) -> Self {
        self.is_secret = true;
        self
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With legacy alias
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Whether this is a tunable
    #[inline]
    #[must_use]
    pub fn is_tunable(&self) -> bool {
        self.visibility == Visibility::Tunable
    }

    /// Whether this may be changed at runtime
    #[inline]
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Whether the property is shown under the given tunables policy
    #[inline]
    #[must_use]
    pub fn is_visible(&self, include_tunables: bool) -> bool {
        match self.visibility {
            Visibility::User => true,
            Visibility::Tunable => include_tunables,
            Visibility::Deprecated => false,
        }
    }

    /// Decoded default, `None` when the schema declares none or it is malformed
    #[must_use]
    pub fn default_value(&self) -> Option<PropertyValue> {
        if self.default.is_null() && !self.nullable {
            return None;
        }
        codec::decode_wire(&self.default, self).ok()
    }

    /// Whether `value` encodes identically to the default
    #[must_use]
    pub fn is_default(&self, value: &PropertyValue) -> bool {
        self.default_value()
            .is_some_and(|d| codec::encode(&d) == codec::encode(value))
    }
}

/// Ordered, name-indexed set of property definitions
///
/// Iteration follows the order the control plane returned. Lookups resolve
/// both canonical names and aliases.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    definitions: IndexMap<String, PropertyDefinition>,
    aliases: HashMap<String, String>,
}

impl SchemaCatalog {
    /// Build catalog from fetched definitions
    ///
    /// # Errors
    /// - `SchemaError::DuplicateProperty` if a name or alias repeats
    pub fn new(definitions: Vec<PropertyDefinition>) -> Result<Self, SchemaError> {
        let mut catalog = Self::default();
        for def in definitions {
            if catalog.definitions.contains_key(&def.name) || catalog.aliases.contains_key(&def.name) {
                return Err(SchemaError::DuplicateProperty(def.name));
            }
            for alias in &def.aliases {
                if catalog.definitions.contains_key(alias) || catalog.aliases.contains_key(alias) {
                    return Err(SchemaError::DuplicateProperty(alias.clone()));
                }
                catalog.aliases.insert(alias.clone(), def.name.clone());
            }
            catalog.definitions.insert(def.name.clone(), def);
        }
        Ok(catalog)
    }

    /// Definitions in catalog order
    pub fn definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.definitions.values()
    }

    /// Number of definitions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the catalog is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Find definition by name or alias
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyDefinition> {
        self.definitions.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|canonical| self.definitions.get(canonical))
        })
    }

    /// Find definition by name or alias
    ///
    /// # Errors
    /// - `SchemaError::NotFound` with close-match suggestions
    pub fn lookup(&self, name: &str) -> Result<&PropertyDefinition, SchemaError> {
        self.get(name).ok_or_else(|| SchemaError::NotFound {
            name: name.to_string(),
            suggestions: self.suggest(name),
        })
    }

    /// Display projection under a tunables policy
    pub fn visible(&self, include_tunables: bool) -> impl Iterator<Item = &PropertyDefinition> {
        self.definitions()
            .filter(move |def| def.is_visible(include_tunables))
    }

    /// Visible properties that may be edited through a document
    pub fn editable(&self, include_tunables: bool) -> impl Iterator<Item = &PropertyDefinition> {
        self.visible(include_tunables).filter(|def| def.is_mutable())
    }

    /// Known names close to `name`, closest first
    #[must_use]
    pub fn suggest(&self, name: &str) -> Vec<String> {
        const MAX_SUGGESTIONS: usize = 3;
        let threshold = (name.len() / 4).max(2);

        let mut scored: Vec<(usize, &str)> = self
            .definitions
            .values()
            .filter(|def| def.visibility != Visibility::Deprecated)
            .map(|def| (edit_distance(name, &def.name), def.name.as_str()))
            .filter(|(distance, _)| *distance <= threshold)
            .collect();
        scored.sort();
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, candidate)| candidate.to_string())
            .collect()
    }
}

/// Levenshtein distance over chars
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            PropertyDefinition::new("retention.ms", ValueType::Duration)
                .with_default(json!(604_800_000))
                .with_alias("log.retention.ms"),
            PropertyDefinition::new("fetch.buffer.bytes", ValueType::Integer)
                .with_visibility(Visibility::Tunable),
            PropertyDefinition::new("legacy.flag", ValueType::Boolean)
                .with_visibility(Visibility::Deprecated),
            PropertyDefinition::new("cluster.id", ValueType::String).immutable(),
        ])
        .unwrap()
    }

    #[test]
    fn lookup_resolves_aliases() {
        let catalog = catalog();
        assert_eq!(catalog.lookup("log.retention.ms").unwrap().name, "retention.ms");
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn lookup_unknown_suggests_close_names() {
        let catalog = catalog();
        match catalog.lookup("retention.m") {
            Err(SchemaError::NotFound { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["retention.ms".to_string()]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn visible_respects_tunables_policy() {
        let catalog = catalog();
        let user: Vec<_> = catalog.visible(false).map(|d| d.name.as_str()).collect();
        assert_eq!(user, vec!["retention.ms", "cluster.id"]);

        let all: Vec<_> = catalog.visible(true).map(|d| d.name.as_str()).collect();
        assert_eq!(all, vec!["retention.ms", "fetch.buffer.bytes", "cluster.id"]);

        let editable: Vec<_> = catalog.editable(true).map(|d| d.name.as_str()).collect();
        assert!(!editable.contains(&"cluster.id"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = SchemaCatalog::new(vec![
            PropertyDefinition::new("a", ValueType::Integer),
            PropertyDefinition::new("b", ValueType::Integer).with_alias("a"),
        ]);
        assert_eq!(result.unwrap_err(), SchemaError::DuplicateProperty("a".into()));
    }

    #[test]
    fn definition_deserializes_from_wire() {
        let def: PropertyDefinition = serde_json::from_value(json!({
            "name": "compression.type",
            "value_type": {"type": "enum", "values": ["none", "gzip"]},
            "default": "none",
            "visibility": "user",
            "description": "Default compression"
        }))
        .unwrap();
        assert!(def.is_mutable());
        assert!(!def.is_tunable());
        assert_eq!(def.default_value(), Some(PropertyValue::String("none".into())));
        assert!(def.is_default(&PropertyValue::String("none".into())));
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }
}
