//! Diff engine
//!
//! Computes the minimal [`Patch`] turning a baseline snapshot into the state
//! described by an ordered list of [`PendingEdit`]s.
//!
//! # Invariants
//! - The working set is always seeded from the *full* baseline, never from a
//!   display-filtered view, so hidden tunables survive untouched.
//! - Edits to the same name collapse last-write-wins.
//! - A set whose encoded value equals the baseline value is dropped.
//! - An explicit removal of an existing override is kept even when the
//!   override equals the schema default.

use crate::codec;
use crate::schema::SchemaCatalog;
use crate::types::{ClusterSnapshot, EditOp, PendingEdit, PropertyValue};
use std::collections::{BTreeMap, BTreeSet};

/// Atomic set of upserts and removals
///
/// Upserts and removals are disjoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    upserts: BTreeMap<String, PropertyValue>,
    removals: BTreeSet<String>,
}

impl Patch {
    /// Add an upsert (cancels a removal of the same name)
    #[must_use]
    pub fn with_upsert(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        let name = name.into();
        self.removals.remove(&name);
        self.upserts.insert(name, value);
        self
    }

    /// Add a removal (cancels an upsert of the same name)
    #[must_use]
    pub fn with_removal(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.upserts.remove(&name);
        self.removals.insert(name);
        self
    }

    /// Properties to assign
    #[inline]
    #[must_use]
    pub fn upserts(&self) -> &BTreeMap<String, PropertyValue> {
        &self.upserts
    }

    /// Properties to clear back to default
    #[inline]
    #[must_use]
    pub fn removals(&self) -> &BTreeSet<String> {
        &self.removals
    }

    /// Whether submitting would change nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    /// Number of properties touched
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }

    /// Every property name the patch touches
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.upserts
            .keys()
            .chain(self.removals.iter())
            .map(String::as_str)
    }

    /// Per-property view against `baseline`, sorted by name
    #[must_use]
    pub fn entries<'a>(&'a self, baseline: &'a ClusterSnapshot) -> Vec<PatchEntry<'a>> {
        let mut entries: Vec<PatchEntry<'a>> = self
            .upserts
            .iter()
            .map(|(name, new)| PatchEntry::Set {
                name,
                old: baseline.get(name),
                new,
            })
            .chain(self.removals.iter().map(|name| PatchEntry::Remove {
                name,
                old: baseline.get(name),
            }))
            .collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }
}

/// One line of a patch, as shown to the user
#[derive(Debug, Clone, PartialEq)]
pub enum PatchEntry<'a> {
    /// Property assigned
    Set {
        /// Property name
        name: &'a str,
        /// Previous override, if any
        old: Option<&'a PropertyValue>,
        /// Value being assigned
        new: &'a PropertyValue,
    },
    /// Override cleared
    Remove {
        /// Property name
        name: &'a str,
        /// Value being cleared
        old: Option<&'a PropertyValue>,
    },
}

impl PatchEntry<'_> {
    /// Property name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Set { name, .. } | Self::Remove { name, .. } => name,
        }
    }
}

/// Compute the patch that realizes `edits` on top of `baseline`
///
/// Returns an empty patch when nothing would change.
#[must_use]
pub fn diff(baseline: &ClusterSnapshot, edits: &[PendingEdit]) -> Patch {
    // Seeded from the full baseline: `None` marks a removed override.
    let mut working: BTreeMap<&str, Option<&PropertyValue>> = baseline
        .properties()
        .iter()
        .map(|(name, value)| (name.as_str(), Some(value)))
        .collect();

    for edit in edits {
        let desired = match &edit.op {
            EditOp::Set(value) => Some(value),
            EditOp::Remove => None,
        };
        working.insert(edit.name.as_str(), desired);
    }

    let mut patch = Patch::default();
    for (name, desired) in working {
        match (baseline.get(name), desired) {
            (Some(old), Some(new)) if codec::encode(old) == codec::encode(new) => {}
            (_, Some(new)) => {
                patch.upserts.insert(name.to_string(), new.clone());
            }
            (Some(_), None) => {
                patch.removals.insert(name.to_string());
            }
            (None, None) => {}
        }
    }
    patch
}

/// Removal-only patch clearing every override that differs from its default
///
/// When `only` is non-empty the reset is limited to those names. Overrides of
/// properties the catalog does not know are cleared too: there is no default
/// to compare them with.
#[must_use]
pub fn force_reset(baseline: &ClusterSnapshot, catalog: &SchemaCatalog, only: &[String]) -> Patch {
    let mut patch = Patch::default();
    for (name, value) in baseline.properties() {
        if !only.is_empty() && !only.iter().any(|n| n == name) {
            continue;
        }
        let is_default = catalog.get(name).is_some_and(|def| def.is_default(value));
        if !is_default {
            patch.removals.insert(name.clone());
        }
    }
    patch
}
