//! Statement compilation behind the [`StatementCompiler`] seam.
//!
//! The planner produces abstract statements; a compiler renders them into
//! parameterized SQL for one dialect. [`AnsiCompiler`] is the reference
//! implementation and covers the three placeholder/quoting styles the
//! drivers in this ecosystem speak.

use crate::filter::CmpOp;
use crate::queryset::Direction;
use crate::stmt::{
    DeleteStatement, InsertStatement, JoinKind, Predicate, SelectStatement, UpdateStatement,
};
use relata_core::driver::SqlQuery;
use relata_core::value::Value;

/// SQL dialect for placeholder style and identifier quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
    Mysql,
}

impl Dialect {
    /// Placeholder for the `i`-th parameter (1-based).
    pub fn placeholder(&self, i: usize) -> String {
        match self {
            Dialect::Postgres => format!("${i}"),
            Dialect::Sqlite => format!("?{i}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("\"{ident}\""),
            Dialect::Mysql => format!("`{ident}`"),
        }
    }
}

/// Compiles abstract statements into dialect-correct parameterized SQL.
pub trait StatementCompiler: Send + Sync {
    fn select(&self, stmt: &SelectStatement) -> SqlQuery;

    /// Count the rows the statement would produce, ignoring ordering and
    /// limit/offset. When the statement is `DISTINCT`, the first output
    /// column is counted distinctly.
    fn count(&self, stmt: &SelectStatement) -> SqlQuery;

    /// An existence probe for the statement's row set.
    fn exists(&self, stmt: &SelectStatement) -> SqlQuery;

    fn insert(&self, stmt: &InsertStatement) -> SqlQuery;

    fn update(&self, stmt: &UpdateStatement) -> SqlQuery;

    fn delete(&self, stmt: &DeleteStatement) -> SqlQuery;
}

/// Reference compiler producing plain ANSI-style SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiCompiler {
    dialect: Dialect,
}

impl AnsiCompiler {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn column(&self, table: &str, column: &str) -> String {
        if table.is_empty() {
            // Bulk UPDATE/DELETE predicates reference the target table bare.
            return self.dialect.quote(column);
        }
        format!("{}.{}", self.dialect.quote(table), self.dialect.quote(column))
    }

    fn from_clause(&self, stmt: &SelectStatement) -> String {
        let mut sql = String::from(" FROM ");
        sql.push_str(&stmt.table);
        if stmt.alias != stmt.table {
            sql.push_str(" AS ");
            sql.push_str(&stmt.alias);
        }
        for join in &stmt.joins {
            match join.kind {
                JoinKind::Inner => sql.push_str(" JOIN "),
                JoinKind::Left => sql.push_str(" LEFT JOIN "),
            }
            sql.push_str(&join.table);
            sql.push_str(" AS ");
            sql.push_str(&join.alias);
            sql.push_str(" ON ");
            sql.push_str(&self.column(&join.left.table, &join.left.column));
            sql.push_str(" = ");
            sql.push_str(&self.column(&join.right.table, &join.right.column));
        }
        sql
    }

    fn where_clause(&self, predicate: Option<&Predicate>, params: &mut Vec<Value>) -> String {
        match predicate {
            Some(pred) => {
                let mut sql = String::from(" WHERE ");
                self.render_predicate(pred, &mut sql, params);
                sql
            }
            None => String::new(),
        }
    }

    fn render_predicate(&self, pred: &Predicate, sql: &mut String, params: &mut Vec<Value>) {
        match pred {
            Predicate::Cmp { column, op, value } => {
                sql.push_str(&self.column(&column.table, &column.column));
                sql.push_str(match op {
                    CmpOp::Eq => " = ",
                    CmpOp::Ne => " <> ",
                    CmpOp::Gt => " > ",
                    CmpOp::Gte => " >= ",
                    CmpOp::Lt => " < ",
                    CmpOp::Lte => " <= ",
                    CmpOp::Contains => " LIKE ",
                });
                params.push(value.clone());
                sql.push_str(&self.dialect.placeholder(params.len()));
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    // An empty list matches nothing.
                    sql.push_str("1 = 0");
                    return;
                }
                sql.push_str(&self.column(&column.table, &column.column));
                sql.push_str(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    params.push(value.clone());
                    sql.push_str(&self.dialect.placeholder(params.len()));
                }
                sql.push(')');
            }
            Predicate::IsNull { column } => {
                sql.push_str(&self.column(&column.table, &column.column));
                sql.push_str(" IS NULL");
            }
            Predicate::And(parts) => self.render_group(parts, " AND ", sql, params),
            Predicate::Or(parts) => self.render_group(parts, " OR ", sql, params),
            Predicate::Not(inner) => {
                sql.push_str("NOT (");
                self.render_predicate(inner, sql, params);
                sql.push(')');
            }
        }
    }

    fn render_group(
        &self,
        parts: &[Predicate],
        sep: &str,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        sql.push('(');
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                sql.push_str(sep);
            }
            self.render_predicate(part, sql, params);
        }
        sql.push(')');
    }

    fn tail_clauses(&self, stmt: &SelectStatement) -> String {
        let mut sql = String::new();
        if !stmt.order.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, term) in stmt.order.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&self.column(&term.column.table, &term.column.column));
                match term.direction {
                    Direction::Asc => sql.push_str(" ASC"),
                    Direction::Desc => sql.push_str(" DESC"),
                }
            }
        }
        if let Some(limit) = stmt.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = stmt.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }
}

impl StatementCompiler for AnsiCompiler {
    fn select(&self, stmt: &SelectStatement) -> SqlQuery {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");
        if stmt.distinct {
            sql.push_str("DISTINCT ");
        }
        for (i, col) in stmt.columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.column(&col.source.table, &col.source.column));
            sql.push_str(" AS ");
            sql.push_str(&self.dialect.quote(&col.alias));
        }
        sql.push_str(&self.from_clause(stmt));
        sql.push_str(&self.where_clause(stmt.predicate.as_ref(), &mut params));
        sql.push_str(&self.tail_clauses(stmt));
        SqlQuery::new(sql, params)
    }

    fn count(&self, stmt: &SelectStatement) -> SqlQuery {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");
        if stmt.distinct {
            if let Some(first) = stmt.columns.first() {
                sql.push_str("COUNT(DISTINCT ");
                sql.push_str(&self.column(&first.source.table, &first.source.column));
                sql.push(')');
            } else {
                sql.push_str("COUNT(*)");
            }
        } else {
            sql.push_str("COUNT(*)");
        }
        sql.push_str(&self.from_clause(stmt));
        sql.push_str(&self.where_clause(stmt.predicate.as_ref(), &mut params));
        SqlQuery::new(sql, params)
    }

    fn exists(&self, stmt: &SelectStatement) -> SqlQuery {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT EXISTS (SELECT 1");
        sql.push_str(&self.from_clause(stmt));
        sql.push_str(&self.where_clause(stmt.predicate.as_ref(), &mut params));
        sql.push(')');
        SqlQuery::new(sql, params)
    }

    fn insert(&self, stmt: &InsertStatement) -> SqlQuery {
        if stmt.columns.is_empty() {
            let sql = match self.dialect {
                Dialect::Mysql => format!("INSERT INTO {} () VALUES ()", stmt.table),
                _ => format!("INSERT INTO {} DEFAULT VALUES", stmt.table),
            };
            return SqlQuery::new(sql, Vec::new());
        }
        let placeholders: Vec<_> = (1..=stmt.values.len())
            .map(|i| self.dialect.placeholder(i))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            stmt.table,
            stmt.columns.join(", "),
            placeholders.join(", ")
        );
        SqlQuery::new(sql, stmt.values.clone())
    }

    fn update(&self, stmt: &UpdateStatement) -> SqlQuery {
        let mut params = Vec::new();
        let mut sets = Vec::new();
        for (column, value) in &stmt.assignments {
            params.push(value.clone());
            sets.push(format!(
                "{} = {}",
                column,
                self.dialect.placeholder(params.len())
            ));
        }
        let mut sql = format!("UPDATE {} SET {}", stmt.table, sets.join(", "));
        sql.push_str(&self.where_clause(stmt.predicate.as_ref(), &mut params));
        SqlQuery::new(sql, params)
    }

    fn delete(&self, stmt: &DeleteStatement) -> SqlQuery {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", stmt.table);
        sql.push_str(&self.where_clause(stmt.predicate.as_ref(), &mut params));
        SqlQuery::new(sql, params)
    }
}
