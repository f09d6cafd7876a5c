//! The validation collaborator and its schema-driven reference impl.
//!
//! # Role
//!
//! The engine hands every raw value to a [`Validator`] before it enters an
//! instance (read path) or a statement (write path). The trait is the seam;
//! [`SchemaValidator`] is the reference implementation, checking values
//! against the declared [`FieldType`]s: nullability, integer widening with
//! range checks, string lengths and patterns, temporal/uuid shapes, and
//! JSON parsing. Regex patterns compile once into a process-wide cache.

use crate::field::{FieldDescriptor, FieldType};
use crate::instance::Instance;
use crate::model::ModelDescriptor;
use crate::value::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

// ============================================================================
// Pattern cache
// ============================================================================

/// Compiled patterns, keyed by source text. Filled on first use and kept
/// for the process lifetime; the declared pattern set is small and fixed.
static PATTERNS: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn compiled(pattern: &str) -> Result<Regex, regex::Error> {
    let cache = PATTERNS.get_or_init(|| RwLock::new(HashMap::new()));
    if let Some(regex) = cache.read().unwrap().get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(pattern)?;
    cache
        .write()
        .unwrap()
        .entry(pattern.to_string())
        .or_insert_with(|| regex.clone());
    Ok(regex)
}

/// Check a string against a cached pattern. An invalid pattern logs a
/// warning and counts as a non-match rather than panicking mid-validation.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match compiled(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "invalid pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Eagerly check that a pattern compiles. Used at registration time so a
/// bad declaration fails at startup, not on first validation.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";
const TIME_PATTERN: &str = r"^\d{2}:\d{2}:\d{2}(\.\d{1,6})?$";
const DATETIME_PATTERN: &str =
    r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d{1,6})?(Z|[+-]\d{2}:\d{2})?$";
const UUID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";
const DECIMAL_PATTERN: &str = r"^[+-]?\d+(\.\d+)?$";

// ============================================================================
// Collaborator trait
// ============================================================================

/// A failed validation, scoped to the offending field when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFault {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationFault {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn instance(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "field `{field}`: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// The validation/serialization collaborator.
///
/// `check` validates and coerces one value; `construct` builds a whole
/// instance from selected field values. The engine surfaces faults as
/// hydration errors on reads and persistence errors on writes.
pub trait Validator: Send + Sync {
    fn check(
        &self,
        model: &str,
        field: &FieldDescriptor,
        value: Value,
    ) -> Result<Value, ValidationFault>;

    fn construct(
        &self,
        model: &ModelDescriptor,
        values: Vec<(String, Value)>,
    ) -> Result<Instance, ValidationFault>;
}

// ============================================================================
// Reference implementation
// ============================================================================

/// Knobs for [`SchemaValidator`] strictness.
#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    /// Accept narrower integers for wider fields (and vice versa when the
    /// value fits), normalizing to the field's canonical variant.
    pub widen_integers: bool,
    /// Enforce declared string patterns.
    pub patterns: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            widen_integers: true,
            patterns: true,
        }
    }
}

/// Validates values purely from the registered schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator {
    options: ValidateOptions,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ValidateOptions) -> Self {
        Self { options }
    }

    fn check_integer(
        &self,
        field: &FieldDescriptor,
        value: Value,
        min: i64,
        max: i64,
        wide: bool,
    ) -> Result<Value, ValidationFault> {
        let raw = match value {
            Value::Int(i) if self.options.widen_integers || !wide => i64::from(i),
            Value::BigInt(i) if self.options.widen_integers || wide => i,
            other => {
                return Err(type_fault(field, &other));
            }
        };
        if raw < min || raw > max {
            return Err(ValidationFault::new(
                &field.name,
                format!("{raw} is out of range for {}", field.field_type),
            ));
        }
        if wide {
            Ok(Value::BigInt(raw))
        } else {
            Ok(Value::Int(raw as i32))
        }
    }

    fn check_text_shape(
        &self,
        field: &FieldDescriptor,
        text: String,
        pattern: &str,
        label: &str,
        wrap: fn(String) -> Value,
    ) -> Result<Value, ValidationFault> {
        if matches_pattern(&text, pattern) {
            Ok(wrap(text))
        } else {
            Err(ValidationFault::new(
                &field.name,
                format!("`{text}` is not a valid {label}"),
            ))
        }
    }
}

fn type_fault(field: &FieldDescriptor, value: &Value) -> ValidationFault {
    ValidationFault::new(
        &field.name,
        format!(
            "expected {}, got {}",
            field.field_type,
            value.type_name()
        ),
    )
}

impl Validator for SchemaValidator {
    fn check(
        &self,
        _model: &str,
        field: &FieldDescriptor,
        value: Value,
    ) -> Result<Value, ValidationFault> {
        if value.is_null() {
            if field.nullable {
                return Ok(Value::Null);
            }
            return Err(ValidationFault::new(
                &field.name,
                "NULL is not allowed here",
            ));
        }

        match field.field_type {
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(value),
                other => Err(type_fault(field, &other)),
            },
            FieldType::SmallInteger => {
                self.check_integer(field, value, i64::from(i16::MIN), i64::from(i16::MAX), false)
            }
            FieldType::Integer => {
                self.check_integer(field, value, i64::from(i32::MIN), i64::from(i32::MAX), false)
            }
            FieldType::BigInteger => self.check_integer(field, value, i64::MIN, i64::MAX, true),
            FieldType::Float => match value {
                Value::Double(_) => Ok(value),
                Value::Int(i) => Ok(Value::Double(f64::from(i))),
                Value::BigInt(i) => Ok(Value::Double(i as f64)),
                other => Err(type_fault(field, &other)),
            },
            FieldType::Decimal { scale, .. } => {
                let text = match value {
                    Value::Decimal(s) | Value::Text(s) => s,
                    Value::Int(i) => i.to_string(),
                    Value::BigInt(i) => i.to_string(),
                    other => return Err(type_fault(field, &other)),
                };
                if !matches_pattern(&text, DECIMAL_PATTERN) {
                    return Err(ValidationFault::new(
                        &field.name,
                        format!("`{text}` is not a decimal number"),
                    ));
                }
                let digits_after = text.split('.').nth(1).map_or(0, str::len);
                if digits_after > usize::from(scale) {
                    return Err(ValidationFault::new(
                        &field.name,
                        format!("`{text}` exceeds scale {scale}"),
                    ));
                }
                Ok(Value::Decimal(text))
            }
            FieldType::String { max_length } => {
                let text = match value {
                    Value::Text(s) => s,
                    other => return Err(type_fault(field, &other)),
                };
                if let Some(max) = max_length {
                    let len = text.chars().count();
                    if len > max as usize {
                        return Err(ValidationFault::new(
                            &field.name,
                            format!("length {len} exceeds maximum {max}"),
                        ));
                    }
                }
                if self.options.patterns {
                    if let Some(pattern) = &field.pattern {
                        if !matches_pattern(&text, pattern) {
                            return Err(ValidationFault::new(
                                &field.name,
                                format!("`{text}` does not match the declared pattern"),
                            ));
                        }
                    }
                }
                Ok(Value::Text(text))
            }
            FieldType::Text => {
                let text = match value {
                    Value::Text(s) => s,
                    other => return Err(type_fault(field, &other)),
                };
                if self.options.patterns {
                    if let Some(pattern) = &field.pattern {
                        if !matches_pattern(&text, pattern) {
                            return Err(ValidationFault::new(
                                &field.name,
                                format!("`{text}` does not match the declared pattern"),
                            ));
                        }
                    }
                }
                Ok(Value::Text(text))
            }
            FieldType::Binary => match value {
                Value::Bytes(_) => Ok(value),
                other => Err(type_fault(field, &other)),
            },
            FieldType::Date => match value {
                Value::Date(s) | Value::Text(s) => {
                    self.check_text_shape(field, s, DATE_PATTERN, "date", Value::Date)
                }
                other => Err(type_fault(field, &other)),
            },
            FieldType::Time => match value {
                Value::Time(s) | Value::Text(s) => {
                    self.check_text_shape(field, s, TIME_PATTERN, "time", Value::Time)
                }
                other => Err(type_fault(field, &other)),
            },
            FieldType::DateTime => match value {
                Value::DateTime(s) | Value::Text(s) => {
                    self.check_text_shape(field, s, DATETIME_PATTERN, "datetime", Value::DateTime)
                }
                other => Err(type_fault(field, &other)),
            },
            FieldType::Json => match value {
                Value::Json(_) => Ok(value),
                Value::Text(s) => match serde_json::from_str(&s) {
                    Ok(parsed) => Ok(Value::Json(parsed)),
                    Err(e) => Err(ValidationFault::new(
                        &field.name,
                        format!("invalid JSON: {e}"),
                    )),
                },
                other => Err(type_fault(field, &other)),
            },
            FieldType::Uuid => match value {
                Value::Uuid(s) | Value::Text(s) => {
                    self.check_text_shape(field, s, UUID_PATTERN, "uuid", Value::Uuid)
                }
                other => Err(type_fault(field, &other)),
            },
        }
    }

    fn construct(
        &self,
        model: &ModelDescriptor,
        values: Vec<(String, Value)>,
    ) -> Result<Instance, ValidationFault> {
        let mut instance = Instance::new(&model.name);
        for (name, value) in values {
            let Some(field) = model.field(&name) else {
                return Err(ValidationFault::instance(format!(
                    "model `{}` has no field `{name}`",
                    model.name
                )));
            };
            let checked = self.check(&model.name, field, value)?;
            instance.set(name, checked);
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDecl;

    fn field(name: &str, field_type: FieldType) -> FieldDescriptor {
        FieldDescriptor::from_decl(FieldDecl::new(name, field_type))
    }

    fn check(field_desc: &FieldDescriptor, value: Value) -> Result<Value, ValidationFault> {
        SchemaValidator::new().check("Test", field_desc, value)
    }

    #[test]
    fn test_null_rules() {
        let required = field("name", FieldType::Text);
        assert!(check(&required, Value::Null).is_err());

        let optional = FieldDescriptor::from_decl(
            FieldDecl::new("nickname", FieldType::Text).nullable(true),
        );
        assert_eq!(check(&optional, Value::Null), Ok(Value::Null));
    }

    #[test]
    fn test_integer_widening_and_range() {
        let big = field("id", FieldType::BigInteger);
        assert_eq!(check(&big, Value::Int(7)), Ok(Value::BigInt(7)));

        let small = field("rank", FieldType::SmallInteger);
        assert!(check(&small, Value::BigInt(40_000)).is_err());
        assert_eq!(check(&small, Value::BigInt(12)), Ok(Value::Int(12)));
    }

    #[test]
    fn test_string_length() {
        let name = field(
            "name",
            FieldType::String {
                max_length: Some(4),
            },
        );
        assert!(check(&name, Value::Text("abcd".into())).is_ok());
        let err = check(&name, Value::Text("abcde".into())).unwrap_err();
        assert!(err.message.contains("exceeds maximum 4"), "{err}");
    }

    #[test]
    fn test_pattern_enforcement() {
        let code = FieldDescriptor::from_decl(
            FieldDecl::new("code", FieldType::Text).pattern(r"^[A-Z]{3}$"),
        );
        assert!(check(&code, Value::Text("ABC".into())).is_ok());
        assert!(check(&code, Value::Text("abc".into())).is_err());

        let lax = SchemaValidator::with_options(ValidateOptions {
            patterns: false,
            ..ValidateOptions::default()
        });
        assert!(lax.check("Test", &code, Value::Text("abc".into())).is_ok());
    }

    #[test]
    fn test_temporal_shapes() {
        let date = field("published", FieldType::Date);
        assert_eq!(
            check(&date, Value::Text("2024-03-01".into())),
            Ok(Value::Date("2024-03-01".into()))
        );
        assert!(check(&date, Value::Text("03/01/2024".into())).is_err());

        let ts = field("created", FieldType::DateTime);
        assert!(check(&ts, Value::Text("2024-03-01T08:30:00Z".into())).is_ok());
        assert!(check(&ts, Value::Text("2024-03-01 08:30:00".into())).is_ok());
        assert!(check(&ts, Value::Text("yesterday".into())).is_err());
    }

    #[test]
    fn test_uuid_shape() {
        let id = field("token", FieldType::Uuid);
        assert!(check(&id, Value::Text("550e8400-e29b-41d4-a716-446655440000".into())).is_ok());
        assert!(check(&id, Value::Text("not-a-uuid".into())).is_err());
    }

    #[test]
    fn test_decimal_scale() {
        let price = field(
            "price",
            FieldType::Decimal {
                precision: 10,
                scale: 2,
            },
        );
        assert_eq!(
            check(&price, Value::Text("19.99".into())),
            Ok(Value::Decimal("19.99".into()))
        );
        assert!(check(&price, Value::Text("19.999".into())).is_err());
        assert_eq!(check(&price, Value::BigInt(5)), Ok(Value::Decimal("5".into())));
    }

    #[test]
    fn test_json_from_text() {
        let meta = field("meta", FieldType::Json);
        let checked = check(&meta, Value::Text(r#"{"a":1}"#.into())).unwrap();
        assert_eq!(checked, Value::Json(serde_json::json!({"a": 1})));
        assert!(check(&meta, Value::Text("{broken".into())).is_err());
    }

    #[test]
    fn test_construct_rejects_unknown_field() {
        use crate::model::ModelDecl;
        use crate::registry::RegistryBuilder;

        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ModelDecl::new("Note", "notes")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .field(FieldDecl::new("body", FieldType::Text)),
            )
            .unwrap();
        let registry = builder.finalize().unwrap();
        let note = registry.get("Note").unwrap();

        let validator = SchemaValidator::new();
        let ok = validator
            .construct(
                note,
                vec![
                    ("id".into(), Value::BigInt(1)),
                    ("body".into(), Value::Text("hi".into())),
                ],
            )
            .unwrap();
        assert_eq!(ok.get("id"), Some(&Value::BigInt(1)));

        let err = validator
            .construct(note, vec![("ghost".into(), Value::Null)])
            .unwrap_err();
        assert!(err.message.contains("no field `ghost`"), "{err}");
    }

    #[test]
    fn test_invalid_pattern_is_nonmatch() {
        assert!(!matches_pattern("anything", r"[unclosed"));
        assert!(validate_pattern(r"[unclosed").is_some());
        assert!(validate_pattern(r"^[a-z]+$").is_none());
    }
}
