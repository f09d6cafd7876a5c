//! The async driver collaborator.
//!
//! # Role
//!
//! The engine never talks SQL dialects or sockets; it hands a compiled
//! [`SqlQuery`] to a [`Driver`] and awaits the outcome. Drivers own
//! connection management, pooling, transactions, and their own cancellation
//! contract. Every method is a suspension point: implementations should
//! check `cx.cancel_reason()` where they can stop cleanly and return
//! [`Outcome::Cancelled`] rather than completing doomed work.

use crate::error::DriverError;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::fmt;

/// One compiled, parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} params]", self.sql, self.params.len())
    }
}

/// Async database driver.
///
/// Reads return rows; writes return affected-row counts or, for inserts,
/// the server-generated key when the statement asked for one. Transaction
/// state is connection-scoped inside the driver; the engine only brackets
/// cascades with `begin`/`commit`/`rollback`.
pub trait Driver: Send + Sync {
    /// Execute a read and collect all rows.
    fn fetch(
        &self,
        cx: &Cx,
        query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<Vec<Row>, DriverError>> + Send;

    /// Execute a write, returning the affected-row count.
    fn execute(
        &self,
        cx: &Cx,
        query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<u64, DriverError>> + Send;

    /// Execute an insert, returning the generated primary key when the
    /// driver produces one (`None` when the statement supplied the key).
    fn insert(
        &self,
        cx: &Cx,
        query: &SqlQuery,
    ) -> impl std::future::Future<Output = Outcome<Option<Value>, DriverError>> + Send;

    /// Open a transaction on the underlying connection.
    fn begin(&self, cx: &Cx) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send;

    /// Commit the open transaction.
    fn commit(&self, cx: &Cx)
        -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send;

    /// Roll back the open transaction.
    fn rollback(
        &self,
        cx: &Cx,
    ) -> impl std::future::Future<Output = Outcome<(), DriverError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_display_hides_param_values() {
        let query = SqlQuery::new(
            "SELECT \"id\" FROM \"books\" WHERE \"id\" = $1",
            vec![Value::BigInt(1)],
        );
        let text = query.to_string();
        assert!(text.contains("[1 params]"));
        assert!(!text.contains("= 1 "));
    }
}
