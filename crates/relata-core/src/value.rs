//! Raw value currency passed between the engine, validator, compiler, and driver.
//!
//! A [`Value`] is the untyped-but-tagged representation of one column cell:
//! statement parameters carry them to the driver, rows carry them back, and
//! the validator coerces them against declared field types before they enter
//! an instance. Temporal and UUID values are carried as ISO-8601 / canonical
//! strings; drivers that have richer native types convert at their boundary.

use serde::Serialize;
use std::fmt;

/// A single database value.
///
/// Serialization is untagged so snapshots read naturally (`Text("x")`
/// becomes `"x"`); the string-backed variants make untagged
/// deserialization ambiguous, so `Deserialize` is deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// Arbitrary-precision decimal, canonical string form.
    Decimal(String),
    /// Text / varchar.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Calendar date, `YYYY-MM-DD`.
    Date(String),
    /// Time of day, `HH:MM:SS[.ffffff]`.
    Time(String),
    /// Timestamp, ISO-8601.
    DateTime(String),
    /// UUID, canonical hyphenated form.
    Uuid(String),
    /// JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// True if this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
        }
    }

    /// Integer view, widening `Int` to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::BigInt(i) => Some(*i),
            _ => None,
        }
    }

    /// String view for text-backed variants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s)
            | Value::Decimal(s)
            | Value::Date(s)
            | Value::Time(s)
            | Value::DateTime(s)
            | Value::Uuid(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Float view, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::Int(i) => Some(f64::from(*i)),
            Value::BigInt(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Canonical map key for identity and deduplication, tagged by variant
    /// family so values of different types never collide. `Int` and
    /// `BigInt` normalize to one key since drivers narrow freely. NULL has
    /// no key: a NULL primary key never identifies a row.
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(format!("b:{b}")),
            Value::Int(i) => Some(format!("i:{i}")),
            Value::BigInt(i) => Some(format!("i:{i}")),
            Value::Double(f) => Some(format!("f:{:016x}", f.to_bits())),
            Value::Decimal(s) => Some(format!("d:{s}")),
            Value::Text(s) => Some(format!("t:{s}")),
            Value::Bytes(b) => {
                let mut key = String::with_capacity(2 + b.len() * 2);
                key.push_str("y:");
                for byte in b {
                    use std::fmt::Write;
                    // Writing to a String cannot fail.
                    let _ = write!(key, "{byte:02x}");
                }
                Some(key)
            }
            Value::Date(s) => Some(format!("a:{s}")),
            Value::Time(s) => Some(format!("c:{s}")),
            Value::DateTime(s) => Some(format!("s:{s}")),
            Value::Uuid(s) => Some(format!("u:{s}")),
            Value::Json(j) => Some(format!("j:{j}")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(s) => write!(f, "{s}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(s) | Value::Time(s) | Value::DateTime(s) => write!(f, "'{s}'"),
            Value::Uuid(s) => write!(f, "'{s}'"),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_detection() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::BigInt(7).as_i64(), Some(7));
        assert_eq!(Value::Text("7".into()).as_i64(), None);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(Some(3i64)), Value::BigInt(3));
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
    }

    #[test]
    fn test_dedup_key_normalizes_integers() {
        assert_eq!(Value::Int(1).dedup_key(), Value::BigInt(1).dedup_key());
        assert_ne!(
            Value::Text("a".into()).dedup_key(),
            Value::Uuid("a".into()).dedup_key()
        );
    }

    #[test]
    fn test_dedup_key_null_is_absent() {
        assert_eq!(Value::Null.dedup_key(), None);
        assert_eq!(Value::BigInt(42).dedup_key().as_deref(), Some("i:42"));
    }

    #[test]
    fn test_display_renders_literals() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Text("hi".into()).to_string(), "'hi'");
        assert_eq!(Value::BigInt(5).to_string(), "5");
    }

    #[test]
    fn test_serialize_untagged() {
        let json = serde_json::to_string(&Value::BigInt(9)).unwrap();
        assert_eq!(json, "9");
        let json = serde_json::to_string(&Value::Null).unwrap();
        assert_eq!(json, "null");
    }
}
