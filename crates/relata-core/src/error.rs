//! Error taxonomy for the mapper core.
//!
//! Five terminal failure families, each carrying enough context (model name,
//! relation path, field name) to diagnose without a debugger:
//!
//! - [`ConfigurationError`]: invalid declarations, caught at registration
//!   or finalize time; always fatal, never retried.
//! - [`UnknownRelationError`]: a dot path named a relation that does not
//!   exist at that point in the path.
//! - [`QueryExecutionError`]: a read failed (driver failure or cardinality
//!   violation on single-row terminals).
//! - [`PersistenceError`]: a write failed (driver, validation, hook, or a
//!   rolled-back cascade).
//! - [`HydrationError`]: row data could not be turned into an instance.
//!
//! The core never retries and never returns partial results; every failure
//! surfaces exactly one of these.

use std::fmt;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Driver-level failure
// ============================================================================

/// Failure reported by the driver collaborator.
///
/// The engine never interprets these beyond wrapping them; `kind` exists so
/// callers can distinguish, say, a constraint violation from a lost
/// connection without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

/// Broad classes of driver failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Connection lost or unavailable.
    Connection,
    /// The statement itself failed (syntax, missing table, type error).
    Statement,
    /// A database constraint rejected the write.
    Constraint {
        /// Constraint name when the driver reports one.
        constraint: Option<String>,
    },
    /// The driver does not support the requested operation.
    Unsupported,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Statement-failure shorthand, the most common stub in tests.
    pub fn statement(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Statement, message)
    }

    /// Constraint-violation shorthand.
    pub fn constraint(name: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(
            DriverErrorKind::Constraint {
                constraint: name.map(str::to_string),
            },
            message,
        )
    }

    /// True when the failure is a constraint violation.
    pub fn is_constraint(&self) -> bool {
        matches!(self.kind, DriverErrorKind::Constraint { .. })
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DriverErrorKind::Connection => write!(f, "connection failure: {}", self.message),
            DriverErrorKind::Statement => write!(f, "statement failure: {}", self.message),
            DriverErrorKind::Constraint { constraint } => match constraint {
                Some(name) => write!(f, "constraint `{name}` violated: {}", self.message),
                None => write!(f, "constraint violated: {}", self.message),
            },
            DriverErrorKind::Unsupported => write!(f, "unsupported operation: {}", self.message),
        }
    }
}

impl std::error::Error for DriverError {}

// ============================================================================
// Taxonomy context structs
// ============================================================================

/// Invalid model or relation declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    /// Model being declared, when one is in scope.
    pub model: Option<String>,
    pub message: String,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "configuration error on `{model}`: {}", self.message),
            None => write!(f, "configuration error: {}", self.message),
        }
    }
}

/// A relation path segment that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRelationError {
    /// Model the bad segment was looked up on.
    pub model: String,
    /// The segment that failed to resolve.
    pub segment: String,
    /// The full dot path as requested.
    pub path: String,
}

impl fmt::Display for UnknownRelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown relation `{}` on model `{}` (in path `{}`)",
            self.segment, self.model, self.path
        )
    }
}

/// How a read failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    /// The driver reported a failure.
    Driver(DriverError),
    /// A single-row terminal matched nothing.
    NoRows,
    /// A single-row terminal matched more than one row.
    MultipleRows { count: usize },
}

/// Read-path failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryExecutionError {
    /// Root model of the query.
    pub model: String,
    pub kind: QueryFailure,
}

impl fmt::Display for QueryExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            QueryFailure::Driver(err) => {
                write!(f, "query on `{}` failed: {err}", self.model)
            }
            QueryFailure::NoRows => {
                write!(f, "query on `{}` matched no rows", self.model)
            }
            QueryFailure::MultipleRows { count } => {
                write!(
                    f,
                    "query on `{}` matched {count} rows where one was expected",
                    self.model
                )
            }
        }
    }
}

/// Which write operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Insert,
    Update,
    Delete,
    Link,
    Transaction,
}

impl WriteOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteOperation::Insert => "insert",
            WriteOperation::Update => "update",
            WriteOperation::Delete => "delete",
            WriteOperation::Link => "link",
            WriteOperation::Transaction => "transaction",
        }
    }
}

/// How a write failed.
#[derive(Debug)]
pub enum PersistFailure {
    /// The driver rejected the write.
    Driver(DriverError),
    /// The validator rejected a value before any row was written.
    Validation {
        field: Option<String>,
        message: String,
    },
    /// A pre-write hook aborted the operation.
    Hook(String),
    /// A cascade failed partway; the transaction was rolled back.
    RolledBack(Box<Error>),
}

/// Write-path failure.
#[derive(Debug)]
pub struct PersistenceError {
    /// Model the write targeted.
    pub model: String,
    pub operation: WriteOperation,
    pub kind: PersistFailure,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.operation.as_str();
        match &self.kind {
            PersistFailure::Driver(err) => {
                write!(f, "{op} on `{}` failed: {err}", self.model)
            }
            PersistFailure::Validation { field, message } => match field {
                Some(field) => write!(
                    f,
                    "{op} on `{}` rejected: field `{field}`: {message}",
                    self.model
                ),
                None => write!(f, "{op} on `{}` rejected: {message}", self.model),
            },
            PersistFailure::Hook(message) => {
                write!(f, "{op} on `{}` aborted by hook: {message}", self.model)
            }
            PersistFailure::RolledBack(source) => {
                write!(f, "{op} on `{}` rolled back: {source}", self.model)
            }
        }
    }
}

/// Failure while turning row data into an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationError {
    pub model: String,
    /// Field under construction, when the failure is field-scoped.
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for HydrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(
                f,
                "hydration of `{}` failed at field `{field}`: {}",
                self.model, self.message
            ),
            None => write!(f, "hydration of `{}` failed: {}", self.model, self.message),
        }
    }
}

// ============================================================================
// Top-level error
// ============================================================================

/// Terminal error for every fallible operation in the workspace.
#[derive(Debug)]
pub enum Error {
    Configuration(ConfigurationError),
    UnknownRelation(UnknownRelationError),
    Query(QueryExecutionError),
    Persistence(PersistenceError),
    Hydration(HydrationError),
}

impl Error {
    /// Configuration failure with no model in scope.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(ConfigurationError {
            model: None,
            message: message.into(),
        })
    }

    /// Configuration failure scoped to one model.
    pub fn config_for(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration(ConfigurationError {
            model: Some(model.into()),
            message: message.into(),
        })
    }

    pub fn unknown_relation(
        model: impl Into<String>,
        segment: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Error::UnknownRelation(UnknownRelationError {
            model: model.into(),
            segment: segment.into(),
            path: path.into(),
        })
    }

    /// Driver failure on the read path.
    pub fn query_driver(model: impl Into<String>, err: DriverError) -> Self {
        Error::Query(QueryExecutionError {
            model: model.into(),
            kind: QueryFailure::Driver(err),
        })
    }

    pub fn no_rows(model: impl Into<String>) -> Self {
        Error::Query(QueryExecutionError {
            model: model.into(),
            kind: QueryFailure::NoRows,
        })
    }

    pub fn multiple_rows(model: impl Into<String>, count: usize) -> Self {
        Error::Query(QueryExecutionError {
            model: model.into(),
            kind: QueryFailure::MultipleRows { count },
        })
    }

    /// Driver failure on the write path.
    pub fn write_driver(
        model: impl Into<String>,
        operation: WriteOperation,
        err: DriverError,
    ) -> Self {
        Error::Persistence(PersistenceError {
            model: model.into(),
            operation,
            kind: PersistFailure::Driver(err),
        })
    }

    /// Validator rejection on the write path.
    pub fn write_validation(
        model: impl Into<String>,
        operation: WriteOperation,
        field: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Persistence(PersistenceError {
            model: model.into(),
            operation,
            kind: PersistFailure::Validation {
                field,
                message: message.into(),
            },
        })
    }

    /// Pre-write hook abort.
    pub fn write_hook(
        model: impl Into<String>,
        operation: WriteOperation,
        message: impl Into<String>,
    ) -> Self {
        Error::Persistence(PersistenceError {
            model: model.into(),
            operation,
            kind: PersistFailure::Hook(message.into()),
        })
    }

    /// Cascade failure after rollback, wrapping the original error.
    pub fn rolled_back(model: impl Into<String>, source: Error) -> Self {
        Error::Persistence(PersistenceError {
            model: model.into(),
            operation: WriteOperation::Transaction,
            kind: PersistFailure::RolledBack(Box::new(source)),
        })
    }

    pub fn hydration(
        model: impl Into<String>,
        field: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Hydration(HydrationError {
            model: model.into(),
            field,
            message: message.into(),
        })
    }

    /// True for configuration failures, the always-fatal family.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(e) => e.fmt(f),
            Error::UnknownRelation(e) => e.fmt(f),
            Error::Query(e) => e.fmt(f),
            Error::Persistence(e) => e.fmt(f),
            Error::Hydration(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(QueryExecutionError {
                kind: QueryFailure::Driver(err),
                ..
            }) => Some(err),
            Error::Persistence(PersistenceError {
                kind: PersistFailure::Driver(err),
                ..
            }) => Some(err),
            Error::Persistence(PersistenceError {
                kind: PersistFailure::RolledBack(source),
                ..
            }) => Some(source.as_ref()),
            _ => None,
        }
    }
}
