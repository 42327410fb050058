//! Value codec
//!
//! Converts between user/wire representations and [`PropertyValue`], applying
//! every client-side validation rule on the way in. All input paths (a single
//! CLI argument, a YAML document, the control plane's JSON) are first
//! normalized into a [`RawValue`] so they share one validation routine.

use crate::error::{CodecError, ImmutablePropertyError, ValidationError, ValidationErrorKind};
use crate::schema::{PropertyDefinition, ValidationRules, ValueType};
use crate::types::PropertyValue;

/// Format-independent shape of an incoming value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Explicit null / `~`
    Null,
    /// Any scalar, in its textual form
    Scalar(String),
    /// Sequence of values
    Sequence(Vec<RawValue>),
}

impl RawValue {
    /// Normalize a YAML node
    ///
    /// # Errors
    /// Returns a message for mappings and tagged values, which no property accepts.
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self, String> {
        use serde_yaml::Value;
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Scalar(b.to_string())),
            Value::Number(n) => Ok(Self::Scalar(n.to_string())),
            Value::String(s) => Ok(Self::Scalar(s.clone())),
            Value::Sequence(items) => items
                .iter()
                .map(Self::from_yaml)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Sequence),
            Value::Mapping(_) => Err("nested mappings are not supported".to_string()),
            Value::Tagged(tagged) => Err(format!("tagged value {} is not supported", tagged.tag)),
        }
    }

    /// Normalize a JSON value
    ///
    /// # Errors
    /// Returns a message for objects, which no property accepts.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Scalar(b.to_string())),
            Value::Number(n) => Ok(Self::Scalar(n.to_string())),
            Value::String(s) => Ok(Self::Scalar(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Sequence),
            Value::Object(_) => Err("objects are not supported".to_string()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Scalar(s) => s.clone(),
            Self::Sequence(items) => {
                let parts: Vec<String> = items.iter().map(Self::describe).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

/// Decode a single user-supplied string (e.g. `set <name> <value>`)
///
/// # Errors
/// - `CodecError::Immutable` if the property cannot be assigned
/// - `CodecError::Invalid` on type, range, enum or null violations
pub fn decode(raw: &str, def: &PropertyDefinition) -> Result<PropertyValue, CodecError> {
    decode_input(&RawValue::Scalar(raw.to_string()), def)
}

/// Decode a user-supplied value from any input format
///
/// # Errors
/// Same as [`decode`].
pub fn decode_input(raw: &RawValue, def: &PropertyDefinition) -> Result<PropertyValue, CodecError> {
    if !def.is_mutable() {
        return Err(ImmutablePropertyError {
            name: def.name.clone(),
        }
        .into());
    }
    parse(raw, def).map_err(CodecError::from)
}

/// Decode a value reported by the control plane
///
/// Mutability is not checked: this reads existing state, it does not assign.
///
/// # Errors
/// - `CodecError::Invalid` if the value does not conform to the schema
pub fn decode_wire(value: &serde_json::Value, def: &PropertyDefinition) -> Result<PropertyValue, CodecError> {
    let raw = RawValue::from_json(value)
        .map_err(|msg| ValidationError::new(&def.name, ValidationErrorKind::Malformed(msg)))?;
    parse(&raw, def).map_err(CodecError::from)
}

/// Best-effort typing for values of properties the catalog does not define
#[must_use]
pub fn decode_untyped(value: &serde_json::Value) -> PropertyValue {
    use serde_json::Value;
    match value {
        Value::Null => PropertyValue::Null,
        Value::Bool(b) => PropertyValue::Boolean(*b),
        Value::Number(n) => n
            .as_i64()
            .map(PropertyValue::Integer)
            .or_else(|| n.as_f64().map(PropertyValue::Float))
            .unwrap_or_else(|| PropertyValue::String(n.to_string())),
        Value::String(s) => PropertyValue::String(s.clone()),
        Value::Array(items) => PropertyValue::List(items.iter().map(decode_untyped).collect()),
        Value::Object(_) => PropertyValue::String(value.to_string()),
    }
}

/// Canonical string form; equal strings mean equal values
#[must_use]
pub fn encode(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Null => "null".to_string(),
        PropertyValue::Integer(i) => i.to_string(),
        PropertyValue::Float(f) => f.to_string(),
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::Duration(ms) => ms.to_string(),
        PropertyValue::String(s) => s.clone(),
        PropertyValue::List(_) => to_json(value).to_string(),
    }
}

/// Wire (JSON) form used in patch bodies
#[must_use]
pub fn to_json(value: &PropertyValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::Integer(i) => Value::from(*i),
        PropertyValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::Duration(ms) => Value::from(*ms),
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
    }
}

/// Document (YAML) form used by export and edit
#[must_use]
pub fn to_yaml(value: &PropertyValue) -> serde_yaml::Value {
    use serde_yaml::Value;
    match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::Integer(i) => Value::Number((*i).into()),
        PropertyValue::Float(f) => Value::Number((*f).into()),
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::Duration(ms) => Value::Number((*ms).into()),
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::List(items) => Value::Sequence(items.iter().map(to_yaml).collect()),
    }
}

fn parse(raw: &RawValue, def: &PropertyDefinition) -> Result<PropertyValue, ValidationError> {
    match raw {
        RawValue::Null if def.nullable => return Ok(PropertyValue::Null),
        RawValue::Null => {
            return Err(ValidationError::new(&def.name, ValidationErrorKind::NullNotAllowed));
        }
        RawValue::Scalar(s) if def.nullable && s == "null" => return Ok(PropertyValue::Null),
        _ => {}
    }
    parse_typed(raw, &def.value_type, def)
}

fn parse_typed(
    raw: &RawValue,
    ty: &ValueType,
    def: &PropertyDefinition,
) -> Result<PropertyValue, ValidationError> {
    let mismatch = || {
        ValidationError::new(
            &def.name,
            ValidationErrorKind::TypeMismatch {
                expected: ty.describe(),
                raw: raw.describe(),
            },
        )
    };

    if let ValueType::List { items } = ty {
        let elements = match raw {
            RawValue::Sequence(elements) => elements.clone(),
            RawValue::Scalar(s) => split_list(s).map_err(|_| mismatch())?,
            RawValue::Null => return Err(mismatch()),
        };
        return elements
            .iter()
            .map(|element| parse_typed(element, items, def))
            .collect::<Result<Vec<_>, _>>()
            .map(PropertyValue::List);
    }

    let text = match raw {
        RawValue::Scalar(s) => s.as_str(),
        RawValue::Sequence(_) | RawValue::Null => return Err(mismatch()),
    };

    match ty {
        ValueType::Integer => {
            let value: i64 = text.trim().parse().map_err(|_| mismatch())?;
            check_range(as_f64(value), text, &def.name, &def.rules)?;
            Ok(PropertyValue::Integer(value))
        }
        ValueType::Float => {
            let value: f64 = text.trim().parse().map_err(|_| mismatch())?;
            if !value.is_finite() {
                return Err(mismatch());
            }
            check_range(value, text, &def.name, &def.rules)?;
            Ok(PropertyValue::Float(value))
        }
        ValueType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(PropertyValue::Boolean(true)),
            "false" => Ok(PropertyValue::Boolean(false)),
            _ => Err(mismatch()),
        },
        ValueType::Duration => {
            let ms = parse_duration_ms(text).ok_or_else(mismatch)?;
            // Negative durations only where the declared minimum allows them.
            let rules = ValidationRules {
                min: Some(def.rules.min.unwrap_or(0.0)),
                ..def.rules
            };
            check_range(as_f64(ms), text, &def.name, &rules)?;
            Ok(PropertyValue::Duration(ms))
        }
        ValueType::String => Ok(PropertyValue::String(text.to_string())),
        ValueType::Enum { values } => {
            if values.iter().any(|v| v == text) {
                Ok(PropertyValue::String(text.to_string()))
            } else {
                Err(ValidationError::new(
                    &def.name,
                    ValidationErrorKind::NotInEnum {
                        value: text.to_string(),
                        allowed: values.clone(),
                    },
                ))
            }
        }
        ValueType::List { .. } => Err(mismatch()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: i64) -> f64 {
    value as f64
}

fn check_range(value: f64, shown: &str, name: &str, rules: &ValidationRules) -> Result<(), ValidationError> {
    if rules.contains(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            name,
            ValidationErrorKind::OutOfRange {
                value: shown.trim().to_string(),
                min: rules.min,
                max: rules.max,
            },
        ))
    }
}

/// `[a, b]` JSON, `a,b` comma list, or empty for an empty list
fn split_list(text: &str) -> Result<Vec<RawValue>, String> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        let json: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
        return match RawValue::from_json(&json)? {
            RawValue::Sequence(items) => Ok(items),
            _ => Err("expected a JSON array".to_string()),
        };
    }
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(trimmed
        .split(',')
        .map(|part| RawValue::Scalar(part.trim().to_string()))
        .collect())
}

/// Signed whole number with optional `ms`, `s`, `m` or `h` suffix; bare numbers are ms
fn parse_duration_ms(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let split = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: i64 = digits.parse().ok()?;
    let factor = match unit.trim() {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return None,
    };
    let ms = amount.checked_mul(factor)?;
    Some(if negative { -ms } else { ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Visibility;
    use serde_json::json;

    fn int_def() -> PropertyDefinition {
        PropertyDefinition::new("segment.bytes", ValueType::Integer)
            .with_range(Some(1024.0), Some(1_073_741_824.0))
    }

    fn enum_def() -> PropertyDefinition {
        PropertyDefinition::new(
            "compression.type",
            ValueType::Enum {
                values: vec!["none".into(), "gzip".into(), "zstd".into()],
            },
        )
    }

    #[test]
    fn decodes_integer_within_range() {
        assert_eq!(decode(" 4096 ", &int_def()).unwrap(), PropertyValue::Integer(4096));
    }

    #[test]
    fn out_of_range_enum_and_immutable_are_distinct() {
        let range = decode("12", &int_def()).unwrap_err();
        assert!(matches!(
            range,
            CodecError::Invalid(ValidationError {
                kind: ValidationErrorKind::OutOfRange { .. },
                ..
            })
        ));

        let not_member = decode("brotli", &enum_def()).unwrap_err();
        assert!(matches!(
            not_member,
            CodecError::Invalid(ValidationError {
                kind: ValidationErrorKind::NotInEnum { .. },
                ..
            })
        ));

        let immutable = PropertyDefinition::new("cluster.id", ValueType::String).immutable();
        assert!(matches!(
            decode("abc", &immutable).unwrap_err(),
            CodecError::Immutable(_)
        ));
    }

    #[test]
    fn type_mismatch_reports_expected_type() {
        let err = decode("lots", &int_def()).unwrap_err();
        assert_eq!(err.to_string(), "segment.bytes: expected integer, got 'lots'");
    }

    #[test]
    fn booleans_are_case_insensitive() {
        let def = PropertyDefinition::new("auto.create.topics", ValueType::Boolean);
        assert_eq!(decode("TRUE", &def).unwrap(), PropertyValue::Boolean(true));
        assert!(decode("yes", &def).is_err());
    }

    #[test]
    fn durations_accept_suffixes() {
        let def = PropertyDefinition::new("retention.ms", ValueType::Duration);
        assert_eq!(decode("10m", &def).unwrap(), PropertyValue::Duration(600_000));
        assert_eq!(decode("600000", &def).unwrap(), PropertyValue::Duration(600_000));
        assert!(decode("10 weeks", &def).is_err());
        assert!(decode("--1", &def).is_err());
    }

    #[test]
    fn negative_durations_need_a_negative_minimum() {
        let plain = PropertyDefinition::new("retention.ms", ValueType::Duration);
        assert!(matches!(
            decode("-1", &plain).unwrap_err(),
            CodecError::Invalid(ValidationError {
                kind: ValidationErrorKind::OutOfRange { .. },
                ..
            })
        ));

        let unlimited = PropertyDefinition::new("retention.ms", ValueType::Duration).with_range(Some(-1.0), None);
        assert_eq!(decode("-1", &unlimited).unwrap(), PropertyValue::Duration(-1));
        assert!(decode("-2", &unlimited).is_err());
        assert_eq!(
            decode_wire(&json!(-1), &unlimited).unwrap(),
            PropertyValue::Duration(-1)
        );
        assert_eq!(encode(&PropertyValue::Duration(-1)), "-1");
        assert_eq!(to_json(&PropertyValue::Duration(-1)), json!(-1));
    }

    #[test]
    fn lists_accept_json_comma_and_sequence_forms() {
        let def = PropertyDefinition::new(
            "superusers",
            ValueType::List {
                items: Box::new(ValueType::String),
            },
        );
        let expected = PropertyValue::List(vec![
            PropertyValue::String("admin".into()),
            PropertyValue::String("ops".into()),
        ]);
        assert_eq!(decode("admin, ops", &def).unwrap(), expected);
        assert_eq!(decode(r#"["admin","ops"]"#, &def).unwrap(), expected);
        let seq = RawValue::Sequence(vec![
            RawValue::Scalar("admin".into()),
            RawValue::Scalar("ops".into()),
        ]);
        assert_eq!(decode_input(&seq, &def).unwrap(), expected);
        assert_eq!(decode("", &def).unwrap(), PropertyValue::List(vec![]));
    }

    #[test]
    fn list_elements_are_validated() {
        let def = PropertyDefinition::new(
            "ports",
            ValueType::List {
                items: Box::new(ValueType::Integer),
            },
        );
        assert!(decode("1,two", &def).is_err());
    }

    #[test]
    fn null_only_for_nullable() {
        let plain = PropertyDefinition::new("x", ValueType::Integer);
        let err = decode_input(&RawValue::Null, &plain).unwrap_err();
        assert!(err.to_string().contains("null is not allowed"));

        let nullable = PropertyDefinition::new("x", ValueType::Integer).nullable();
        assert_eq!(decode("null", &nullable).unwrap(), PropertyValue::Null);
    }

    #[test]
    fn wire_decode_ignores_mutability() {
        let def = PropertyDefinition::new("cluster.id", ValueType::String)
            .immutable()
            .with_visibility(Visibility::User);
        assert_eq!(
            decode_wire(&json!("abc"), &def).unwrap(),
            PropertyValue::String("abc".into())
        );
        assert!(decode_wire(&json!({"a": 1}), &def).is_err());
    }

    #[test]
    fn encode_is_canonical() {
        assert_eq!(encode(&PropertyValue::Duration(1000)), "1000");
        assert_eq!(encode(&PropertyValue::Float(2.0)), "2");
        assert_eq!(
            encode(&PropertyValue::List(vec![PropertyValue::String("a,b".into())])),
            r#"["a,b"]"#
        );
    }

    #[test]
    fn yaml_normalization() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("[1, true, x]").unwrap();
        assert_eq!(
            RawValue::from_yaml(&yaml).unwrap(),
            RawValue::Sequence(vec![
                RawValue::Scalar("1".into()),
                RawValue::Scalar("true".into()),
                RawValue::Scalar("x".into()),
            ])
        );
        let mapping: serde_yaml::Value = serde_yaml::from_str("{a: 1}").unwrap();
        assert!(RawValue::from_yaml(&mapping).is_err());
    }

    #[test]
    fn untyped_decode() {
        assert_eq!(decode_untyped(&json!(5)), PropertyValue::Integer(5));
        assert_eq!(decode_untyped(&json!(1.5)), PropertyValue::Float(1.5));
        assert_eq!(
            decode_untyped(&json!(["a"])),
            PropertyValue::List(vec![PropertyValue::String("a".into())])
        );
    }
}
