//! Error types for clusterconf core
//!
//! Provides error handling for:
//! - Value decoding and validation (per property, batchable)
//! - Schema catalog construction and lookup
//! - Configuration document parsing

/// Reasons a proposed value fails validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationErrorKind {
    /// Value does not parse as the property's type
    #[error("expected {expected}, got '{raw}'")]
    TypeMismatch { expected: String, raw: String },

    /// Numeric value outside the declared bounds
    #[error("{value} is out of range ({})", describe_bounds(.min, .max))]
    OutOfRange {
        value: String,
        min: Option<f64>,
        max: Option<f64>,
    },

    /// Value is not a member of the enum
    #[error("'{value}' is not one of [{}]", .allowed.join(", "))]
    NotInEnum { value: String, allowed: Vec<String> },

    /// Null assigned to a non-nullable property
    #[error("null is not allowed")]
    NullNotAllowed,

    /// Name is not in the schema catalog
    #[error("unknown property{}", describe_suggestions(.suggestions))]
    UnknownProperty { suggestions: Vec<String> },

    /// Tunable edited without tunables visibility
    #[error("tunable property; include tunables to edit it")]
    HiddenTunable,

    /// Structurally unusable input (mapping where scalar expected, etc.)
    #[error("{0}")]
    Malformed(String),
}

/// A single property failed validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{name}: {kind}")]
pub struct ValidationError {
    /// Offending property
    pub name: String,
    /// Why it was rejected
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    /// Create validation error for `name`
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Assignment to a property that cannot change at runtime
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: property is immutable")]
pub struct ImmutablePropertyError {
    /// Offending property
    pub name: String,
}

/// Errors produced by the value codec
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Type, range, enum or nullability violation
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Value targets an immutable property
    #[error(transparent)]
    Immutable(#[from] ImmutablePropertyError),
}

impl CodecError {
    /// Property the error refers to
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Invalid(e) => &e.name,
            Self::Immutable(e) => &e.name,
        }
    }
}

/// Schema catalog errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Name is not a known property or alias
    #[error("unknown property: {name}{}", describe_suggestions(.suggestions))]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },

    /// Two definitions (or aliases) share a name
    #[error("duplicate property in schema: {0}")]
    DuplicateProperty(String),
}

/// All violations found in one validation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Hard errors, in document order
    pub violations: Vec<CodecError>,
    /// Non-fatal findings (deprecated properties and the like)
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Whether no violations were found (warnings allowed)
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Names of every property with a violation
    #[must_use]
    pub fn offending_names(&self) -> Vec<&str> {
        self.violations.iter().map(CodecError::name).collect()
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} invalid propert", self.violations.len())?;
        f.write_str(if self.violations.len() == 1 { "y" } else { "ies" })?;
        for v in &self.violations {
            write!(f, "\n  {v}")?;
        }
        Ok(())
    }
}

/// Errors reading a configuration document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Not valid YAML, or not a flat mapping
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Well-formed but one or more properties are invalid
    #[error("{0}")]
    Invalid(ValidationReport),
}

impl From<serde_yaml::Error> for DocumentError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Syntax(e.to_string())
    }
}

fn describe_bounds(min: &Option<f64>, max: &Option<f64>) -> String {
    match (*min, *max) {
        (Some(lo), Some(hi)) => format!("{lo}..={hi}"),
        (Some(lo), None) => format!(">= {lo}"),
        (None, Some(hi)) => format!("<= {hi}"),
        (None, None) => "unbounded".to_string(),
    }
}

fn describe_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean {}?)", suggestions.join(", "))
    }
}
