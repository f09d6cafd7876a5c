//! Result rows returned by the driver collaborator.
//!
//! A [`Row`] pairs result-column names (the aliases the compiled statement
//! asked for) with [`Value`]s. Lookup is by name; the hydration engine knows
//! which aliases belong to which relation path, so rows themselves stay
//! flat and dumb.

use crate::value::Value;

/// One flat result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from `(column, value)` pairs, preserving order.
    pub fn from_pairs<C, V, I>(pairs: I) -> Self
    where
        C: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (C, V)>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in result order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a value by column name. First match wins when a statement
    /// produced duplicate aliases.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// True when the named column exists, even if its value is NULL.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Value at a positional index.
    pub fn value_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let row = Row::from_pairs([("id", Value::BigInt(1)), ("name", Value::Text("a".into()))]);
        assert_eq!(row.get("id"), Some(&Value::BigInt(1)));
        assert_eq!(row.get("name"), Some(&Value::Text("a".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_null_column_is_present() {
        let row = Row::from_pairs([("author__id", Value::Null)]);
        assert!(row.has_column("author__id"));
        assert_eq!(row.get("author__id"), Some(&Value::Null));
    }

    #[test]
    fn test_order_preserved() {
        let row = Row::from_pairs([("b", 2i64), ("a", 1i64)]);
        assert_eq!(row.columns(), &["b".to_string(), "a".to_string()]);
        assert_eq!(row.value_at(0), Some(&Value::BigInt(2)));
    }
}
