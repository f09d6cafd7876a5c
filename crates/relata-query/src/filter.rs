//! Predicate trees over field paths.
//!
//! Filters are pure data: a tree of comparisons combined with `and`/`or`/
//! `not`, each leaf naming a field either on the root model (`"title"`) or
//! across relations (`"author.name"`). Nothing here touches the registry;
//! paths are resolved when the query is planned.
//!
//! # Example
//!
//! ```
//! use relata_query::filter::{Cond, Filter};
//!
//! let pred = Cond::field("author.name")
//!     .eq("Tolkien")
//!     .and(Cond::field("year").gte(1937));
//! let inverted = !pred.clone();
//! assert_ne!(pred, inverted);
//! ```

use relata_core::path::RelationPath;
use relata_core::value::Value;

/// A dotted reference to a field, possibly across relations.
///
/// The final segment is the field name; everything before it is a relation
/// path starting at the query's root model. Parsing never fails; bad
/// segments are reported with full context when the path is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    relations: RelationPath,
    field: String,
}

impl FieldPath {
    /// Parse a dotted reference such as `"author.publisher.name"`.
    pub fn parse(raw: &str) -> Self {
        let mut segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        let field = segments.pop().unwrap_or_default();
        Self {
            relations: RelationPath::from_segments(segments),
            field,
        }
    }

    /// A reference to a field on the root model itself.
    pub fn root(field: impl Into<String>) -> Self {
        Self {
            relations: RelationPath::from_segments(Vec::new()),
            field: field.into(),
        }
    }

    /// The relation hops leading to the field's model (empty for root fields).
    pub fn relations(&self) -> &RelationPath {
        &self.relations
    }

    /// The field name on the model the relations lead to.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// True when the reference names a field on the root model directly.
    pub fn is_root(&self) -> bool {
        self.relations.is_empty()
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.relations.is_empty() {
            f.write_str(&self.field)
        } else {
            write!(f, "{}.{}", self.relations, self.field)
        }
    }
}

impl From<&str> for FieldPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for FieldPath {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

/// Comparison operators usable in filter leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match on textual fields.
    Contains,
}

/// A predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Cmp {
        target: FieldPath,
        op: CmpOp,
        value: Value,
    },
    In {
        target: FieldPath,
        values: Vec<Value>,
    },
    IsNull {
        target: FieldPath,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Conjunction, flattening nested `And` nodes.
    #[must_use]
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening nested `Or` nodes.
    #[must_use]
    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Conjunction of every filter in the iterator.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::And(filters.into_iter().collect())
    }

    /// Disjunction of every filter in the iterator.
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::Or(filters.into_iter().collect())
    }

    /// Visit every field path referenced anywhere in the tree.
    pub(crate) fn walk_paths(&self, visit: &mut impl FnMut(&FieldPath)) {
        match self {
            Filter::Cmp { target, .. } | Filter::In { target, .. } | Filter::IsNull { target } => {
                visit(target);
            }
            Filter::And(parts) | Filter::Or(parts) => {
                for part in parts {
                    part.walk_paths(visit);
                }
            }
            Filter::Not(inner) => inner.walk_paths(visit),
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

/// Entry point for building filter leaves.
///
/// # Example
///
/// ```
/// use relata_query::filter::Cond;
///
/// let adult = Cond::field("age").gte(18);
/// let named = Cond::field("author.name").contains("Tol");
/// let listed = Cond::field("id").is_in([1, 2, 3]);
/// let _ = adult.and(named).and(listed);
/// ```
#[derive(Debug, Clone)]
pub struct Cond {
    target: FieldPath,
}

impl Cond {
    /// Start a condition on a field reference (`"title"`, `"author.name"`).
    pub fn field(path: impl Into<FieldPath>) -> Self {
        Self {
            target: path.into(),
        }
    }

    fn cmp(self, op: CmpOp, value: impl Into<Value>) -> Filter {
        Filter::Cmp {
            target: self.target,
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.cmp(CmpOp::Eq, value)
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.cmp(CmpOp::Ne, value)
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.cmp(CmpOp::Gt, value)
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.cmp(CmpOp::Gte, value)
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.cmp(CmpOp::Lt, value)
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.cmp(CmpOp::Lte, value)
    }

    /// Substring match; compiles to a `LIKE` with the value wrapped in `%`.
    #[must_use]
    pub fn contains(self, value: impl Into<String>) -> Filter {
        self.cmp(CmpOp::Contains, Value::Text(value.into()))
    }

    /// Membership in a value list. An empty list matches nothing.
    #[must_use]
    pub fn is_in<I, T>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Filter::In {
            target: self.target,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_null(self) -> Filter {
        Filter::IsNull {
            target: self.target,
        }
    }

    /// Sugar for `!is_null()`.
    #[must_use]
    pub fn not_null(self) -> Filter {
        !Filter::IsNull {
            target: self.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_parse() {
        let root = FieldPath::parse("title");
        assert!(root.is_root());
        assert_eq!(root.field(), "title");

        let nested = FieldPath::parse("author.publisher.name");
        assert_eq!(nested.relations().segments(), ["author", "publisher"]);
        assert_eq!(nested.field(), "name");
        assert_eq!(nested.to_string(), "author.publisher.name");
    }

    #[test]
    fn test_cond_builders() {
        let f = Cond::field("age").gte(18);
        assert_eq!(
            f,
            Filter::Cmp {
                target: FieldPath::root("age"),
                op: CmpOp::Gte,
                value: Value::Int(18),
            }
        );

        let c = Cond::field("title").contains("Ring");
        assert!(matches!(
            c,
            Filter::Cmp {
                op: CmpOp::Contains,
                ..
            }
        ));

        let i = Cond::field("id").is_in([1, 2]);
        assert_eq!(
            i,
            Filter::In {
                target: FieldPath::root("id"),
                values: vec![Value::Int(1), Value::Int(2)],
            }
        );
    }

    #[test]
    fn test_and_flattens() {
        let f = Cond::field("a")
            .eq(1)
            .and(Cond::field("b").eq(2))
            .and(Cond::field("c").eq(3));
        match f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_or_flattens() {
        let f = Cond::field("a")
            .eq(1)
            .or(Cond::field("b").eq(2))
            .or(Cond::field("c").eq(3));
        match f {
            Filter::Or(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn test_not_operator() {
        let f = !Cond::field("deleted").eq(true);
        assert!(matches!(f, Filter::Not(_)));

        let n = Cond::field("publisher").not_null();
        assert!(matches!(n, Filter::Not(inner) if matches!(*inner, Filter::IsNull { .. })));
    }

    #[test]
    fn test_walk_paths() {
        let f = Cond::field("author.name")
            .eq("x")
            .and(!Cond::field("year").is_null());
        let mut seen = Vec::new();
        f.walk_paths(&mut |p| seen.push(p.to_string()));
        assert_eq!(seen, ["author.name", "year"]);
    }
}
