//! Configuration documents
//!
//! The YAML file format shared by `edit`, `export`, `import` and `lint`: a
//! flat mapping of property name to scalar (or sequence) value. Rendered
//! documents list every editable property visible under the tunables
//! policy; properties left at their default appear as comments so the file
//! documents the whole surface without creating overrides on re-import.

use crate::codec::{self, RawValue};
use crate::error::{CodecError, DocumentError, ValidationError, ValidationErrorKind, ValidationReport};
use crate::schema::{PropertyDefinition, SchemaCatalog, Visibility};
use crate::types::{ClusterSnapshot, PendingEdit, PropertyValue};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Result of reading a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    /// One `set` per property present in the document, in document order
    pub edits: Vec<PendingEdit>,
    /// Canonical names of the properties present
    pub present: BTreeSet<String>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
}

impl ParsedDocument {
    /// Edits under full-document replace semantics
    ///
    /// Every name in `shown` that the document no longer contains becomes an
    /// explicit removal.
    #[must_use]
    pub fn into_replacement(self, shown: &BTreeSet<String>) -> Vec<PendingEdit> {
        let mut edits = self.edits;
        edits.extend(
            shown
                .iter()
                .filter(|name| !self.present.contains(*name))
                .map(PendingEdit::remove),
        );
        edits
    }
}

/// Names rendered with a value (the baseline as the user saw it)
#[must_use]
pub fn shown_names(snapshot: &ClusterSnapshot, catalog: &SchemaCatalog, include_tunables: bool) -> BTreeSet<String> {
    catalog
        .editable(include_tunables)
        .filter(|def| snapshot.contains(&def.name))
        .map(|def| def.name.clone())
        .collect()
}

/// Render the editable projection of `snapshot`
#[must_use]
pub fn render(snapshot: &ClusterSnapshot, catalog: &SchemaCatalog, include_tunables: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Cluster configuration properties (config version {}).",
        snapshot.schema_version()
    );
    out.push_str("# Commented properties are at their default. Delete a line to reset it.\n");

    for def in catalog.editable(include_tunables) {
        out.push('\n');
        if !def.description.is_empty() {
            let _ = writeln!(out, "# {}", def.description);
        }
        match snapshot.get(&def.name) {
            Some(value) => out.push_str(&yaml_entry(&def.name, value)),
            None => out.push_str(&commented(&default_entry(def))),
        }
    }
    out
}

/// Parse a document into `set` edits, validating every property
///
/// Tunables are accepted only when `include_tunables` is set. Deprecated
/// properties are skipped with a warning.
///
/// # Errors
/// - `DocumentError::Syntax` if the text is not a YAML mapping
/// - `DocumentError::Invalid` carrying every violation found
pub fn parse(text: &str, catalog: &SchemaCatalog, include_tunables: bool) -> Result<ParsedDocument, DocumentError> {
    parse_with(text, catalog, include_tunables, None)
}

/// Like [`parse`], but tolerates stored values the schema no longer accepts
///
/// A property whose document value still equals what `baseline` holds is
/// kept as present without an edit, even when that value fails validation,
/// so a rendered document always parses back. Changed values are validated
/// as usual.
///
/// # Errors
/// Same as [`parse`].
pub fn parse_against(
    text: &str,
    catalog: &SchemaCatalog,
    include_tunables: bool,
    baseline: &ClusterSnapshot,
) -> Result<ParsedDocument, DocumentError> {
    parse_with(text, catalog, include_tunables, Some(baseline))
}

fn parse_with(
    text: &str,
    catalog: &SchemaCatalog,
    include_tunables: bool,
    baseline: Option<&ClusterSnapshot>,
) -> Result<ParsedDocument, DocumentError> {
    let root: serde_yaml::Value = serde_yaml::from_str(text)?;
    let mapping = match root {
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => {
            return Err(DocumentError::Syntax(
                "expected a mapping of property names to values".to_string(),
            ))
        }
    };

    let mut parsed = ParsedDocument::default();
    let mut report = ValidationReport::default();

    for (key, value) in &mapping {
        let Some(name) = key.as_str() else {
            report.violations.push(
                ValidationError::new(
                    key_text(key),
                    ValidationErrorKind::Malformed("property names must be strings".to_string()),
                )
                .into(),
            );
            continue;
        };

        let Some(def) = catalog.get(name) else {
            report.violations.push(
                ValidationError::new(
                    name,
                    ValidationErrorKind::UnknownProperty {
                        suggestions: catalog.suggest(name),
                    },
                )
                .into(),
            );
            continue;
        };

        if def.visibility == Visibility::Deprecated {
            report
                .warnings
                .push(format!("{name}: property is deprecated and was ignored"));
            continue;
        }
        if def.is_tunable() && !include_tunables {
            report
                .violations
                .push(ValidationError::new(name, ValidationErrorKind::HiddenTunable).into());
            continue;
        }

        let raw = match RawValue::from_yaml(value) {
            Ok(raw) => raw,
            Err(msg) => {
                report
                    .violations
                    .push(ValidationError::new(name, ValidationErrorKind::Malformed(msg)).into());
                continue;
            }
        };

        match codec::decode_input(&raw, def) {
            Ok(decoded) => {
                parsed.present.insert(def.name.clone());
                parsed.edits.push(PendingEdit::set(def.name.clone(), decoded));
            }
            Err(CodecError::Invalid(_)) if baseline.is_some_and(|b| stored_as(b, &def.name, &raw)) => {
                parsed.present.insert(def.name.clone());
                report
                    .warnings
                    .push(format!("{name}: stored value does not match the schema; left unchanged"));
            }
            Err(e) => report.violations.push(e),
        }
    }

    if report.is_clean() {
        parsed.warnings = report.warnings;
        Ok(parsed)
    } else {
        Err(DocumentError::Invalid(report))
    }
}

/// Prefix a rejected document with its violations so the user can fix them
#[must_use]
pub fn annotate(text: &str, report: &ValidationReport) -> String {
    let mut out = String::from("# The following problems were found; fix them and save again:\n");
    for violation in &report.violations {
        let _ = writeln!(out, "#   {violation}");
    }
    // Drop a previous annotation block before prepending the new one.
    let body = text
        .lines()
        .skip_while(|line| line.starts_with("# The following problems") || line.starts_with("#   "))
        .collect::<Vec<_>>()
        .join("\n");
    out.push_str(&body);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn stored_as(baseline: &ClusterSnapshot, name: &str, raw: &RawValue) -> bool {
    baseline
        .get(name)
        .and_then(|stored| RawValue::from_yaml(&codec::to_yaml(stored)).ok())
        .is_some_and(|stored| stored == *raw)
}

fn key_text(key: &serde_yaml::Value) -> String {
    serde_yaml::to_string(key).map_or_else(|_| format!("{key:?}"), |text| text.trim_end().to_string())
}

fn yaml_entry(name: &str, value: &PropertyValue) -> String {
    let mut mapping = serde_yaml::Mapping::new();
    mapping.insert(serde_yaml::Value::String(name.to_string()), codec::to_yaml(value));
    serde_yaml::to_string(&mapping).unwrap_or_else(|_| format!("{name}: {}\n", codec::encode(value)))
}

fn default_entry(def: &PropertyDefinition) -> String {
    match def.default_value() {
        Some(value) => yaml_entry(&def.name, &value),
        None => format!("{}:\n", def.name),
    }
}

fn commented(entry: &str) -> String {
    entry.lines().fold(String::new(), |mut acc, line| {
        let _ = writeln!(acc, "# {line}");
        acc
    })
}
