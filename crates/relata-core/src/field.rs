//! Logical field types and field declarations.
//!
//! # Role
//!
//! The field layer declares what a column *means* (logical type plus
//! schema-level constraints) without committing to any dialect's physical
//! type. Declarations ([`FieldDecl`]) are what application code hands to the
//! registry; descriptors ([`FieldDescriptor`]) are what the sealed registry
//! hands back, with column names fixed and foreign-key references resolved.
//!
//! # Example
//!
//! ```
//! use relata_core::field::{FieldDecl, FieldType};
//!
//! let id = FieldDecl::new("id", FieldType::BigInteger)
//!     .primary_key(true)
//!     .auto_increment(true);
//! let name = FieldDecl::new("name", FieldType::String { max_length: Some(120) })
//!     .nullable(false);
//! ```

use crate::value::Value;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Logical types
// ============================================================================

/// Logical column type, independent of any SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Boolean,
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    /// Fixed-point decimal with declared precision and scale.
    Decimal { precision: u8, scale: u8 },
    /// Bounded string; `None` leaves the bound to the database.
    String { max_length: Option<u32> },
    /// Unbounded text.
    Text,
    Binary,
    Date,
    Time,
    DateTime,
    Json,
    Uuid,
}

impl FieldType {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::SmallInteger => "smallinteger",
            FieldType::Integer => "integer",
            FieldType::BigInteger => "biginteger",
            FieldType::Float => "float",
            FieldType::Decimal { .. } => "decimal",
            FieldType::String { .. } => "string",
            FieldType::Text => "text",
            FieldType::Binary => "binary",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::DateTime => "datetime",
            FieldType::Json => "json",
            FieldType::Uuid => "uuid",
        }
    }

    /// True for the integer family.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::SmallInteger | FieldType::Integer | FieldType::BigInteger
        )
    }

    /// True for types carried as strings in [`Value`].
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::String { .. }
                | FieldType::Text
                | FieldType::Date
                | FieldType::Time
                | FieldType::DateTime
                | FieldType::Uuid
                | FieldType::Decimal { .. }
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            FieldType::String {
                max_length: Some(n),
            } => write!(f, "string({n})"),
            other => f.write_str(other.name()),
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// One field as declared by application code.
///
/// Chainable setters mirror the declaration order people actually write:
/// type first, then constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub field_type: FieldType,
    /// Column name override; defaults to the field name.
    pub column: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    /// Static default applied when an instance omits the field on insert.
    pub default: Option<Value>,
    /// Regex the validator enforces on string-typed values.
    pub pattern: Option<String>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            column: None,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
            pattern: None,
        }
    }

    /// Override the column name.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    #[must_use]
    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    #[must_use]
    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn pattern(mut self, regex: impl Into<String>) -> Self {
        self.pattern = Some(regex.into());
        self
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Resolved reference from a foreign-key column to its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    /// Target model name.
    pub model: String,
    /// Target field name (the target's primary key).
    pub field: String,
    /// Relation on the source model that synthesized this column.
    pub relation: String,
}

/// One field in a sealed [`ModelDescriptor`](crate::model::ModelDescriptor).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub default: Option<Value>,
    pub pattern: Option<String>,
    /// Present when this column was synthesized for a to-one relation.
    pub references: Option<ForeignKeyRef>,
}

impl FieldDescriptor {
    /// Seal a declaration into a descriptor.
    pub fn from_decl(decl: FieldDecl) -> Self {
        let column = decl.column.unwrap_or_else(|| decl.name.clone());
        Self {
            name: decl.name,
            column,
            field_type: decl.field_type,
            nullable: decl.nullable,
            primary_key: decl.primary_key,
            auto_increment: decl.auto_increment,
            unique: decl.unique,
            default: decl.default,
            pattern: decl.pattern,
            references: None,
        }
    }

    /// True when this column belongs to a relation rather than plain data.
    pub fn is_foreign_key(&self) -> bool {
        self.references.is_some()
    }
}
