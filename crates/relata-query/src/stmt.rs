//! Abstract statements handed to the statement compiler.
//!
//! These are the fully resolved forms the planner produces: aliases and
//! columns instead of models and field paths, with no registry access
//! needed to render them. Compilation to SQL text lives behind the
//! [`StatementCompiler`](crate::compiler::StatementCompiler) seam.

use crate::filter::CmpOp;
use crate::queryset::Direction;
use relata_core::value::Value;

/// A column qualified by the table alias it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// One output column with its result alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub source: ColumnRef,
    pub alias: String,
}

impl SelectColumn {
    pub fn new(source: ColumnRef, alias: impl Into<String>) -> Self {
        Self {
            source,
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// One join clause: `kind table AS alias ON left = right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// A predicate over resolved columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Cmp {
        column: ColumnRef,
        op: CmpOp,
        value: Value,
    },
    In {
        column: ColumnRef,
        values: Vec<Value>,
    },
    IsNull {
        column: ColumnRef,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Conjunction, flattening nested `And` nodes.
    #[must_use]
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }
}

/// One ORDER BY term over a resolved column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub direction: Direction,
}

/// An abstract SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    pub alias: String,
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub joins: Vec<Join>,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectStatement {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            distinct: false,
            columns: Vec::new(),
            joins: Vec::new(),
            predicate: None,
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// AND the given predicate onto whatever is already there.
    pub fn restrict(&mut self, predicate: Predicate) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }
}

/// An abstract INSERT of a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

/// An abstract UPDATE against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    pub predicate: Option<Predicate>,
}

/// An abstract DELETE against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub predicate: Option<Predicate>,
}
