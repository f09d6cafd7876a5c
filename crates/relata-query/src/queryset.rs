//! The immutable query builder.
//!
//! # Role
//!
//! [`QuerySpec`] is pure data: every builder call returns a new spec and
//! never touches the registry or the database. Mistakes such as unknown
//! relation paths or conflicting field selections are therefore reported
//! when the spec is planned by a terminal, not while building.
//!
//! [`QuerySet`] binds a spec to the collaborators (registry, driver,
//! compiler, validator) and adds the terminals that actually execute.
//!
//! # Example
//!
//! ```
//! use relata_query::filter::Cond;
//! use relata_query::queryset::{Order, QuerySpec};
//!
//! let spec = QuerySpec::new("Book")
//!     .filter(Cond::field("author.name").eq("Tolkien"))
//!     .select_related("author")
//!     .order_by(Order::asc("title"))
//!     .limit(10);
//! assert_eq!(spec.model(), "Book");
//! ```

use crate::compiler::StatementCompiler;
use crate::executor::QueryContext;
use crate::filter::{FieldPath, Filter};
use crate::hydrate::HydratedGraph;
use asupersync::{Cx, Outcome};
use relata_core::driver::Driver;
use relata_core::error::Error;
use relata_core::instance::Instance;
use relata_core::path::RelationPath;
use relata_core::validate::Validator;
use relata_core::value::Value;

/// Sort direction for an [`Order`] term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering term: a field reference plus direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub(crate) target: FieldPath,
    pub(crate) direction: Direction,
}

impl Order {
    pub fn asc(target: impl Into<FieldPath>) -> Self {
        Self {
            target: target.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(target: impl Into<FieldPath>) -> Self {
        Self {
            target: target.into(),
            direction: Direction::Desc,
        }
    }
}

/// An immutable description of one query, rooted at a registered model.
///
/// Without an `order_by`, `limit`/`offset` are applied but row order is
/// whatever the database returns.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub(crate) model: String,
    pub(crate) filter: Option<Filter>,
    pub(crate) order: Vec<Order>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) select_related: Vec<RelationPath>,
    pub(crate) prefetch: Vec<RelationPath>,
    pub(crate) only: Vec<String>,
    pub(crate) exclude_fields: Vec<String>,
}

impl QuerySpec {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// The root model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Add a predicate; multiple calls are combined with AND.
    #[must_use]
    pub fn filter(mut self, predicate: Filter) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Add a negated predicate; sugar for `filter(!predicate)`.
    #[must_use]
    pub fn exclude(self, predicate: Filter) -> Self {
        self.filter(!predicate)
    }

    /// Append an ordering term.
    #[must_use]
    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Load a to-one relation path in the same round trip via a join.
    #[must_use]
    pub fn select_related(mut self, path: impl Into<RelationPath>) -> Self {
        self.select_related.push(path.into());
        self
    }

    /// Load a relation path via a follow-up query keyed by parent keys.
    /// Required for to-many relations.
    #[must_use]
    pub fn prefetch_related(mut self, path: impl Into<RelationPath>) -> Self {
        self.prefetch.push(path.into());
        self
    }

    /// Restrict root-model fetching to the named fields. The primary key
    /// and any foreign keys needed by eager loads are always kept.
    /// Combining with `exclude_fields` fails when the query is planned.
    #[must_use]
    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Drop the named fields from root-model fetching. The primary key and
    /// foreign keys needed by eager loads are always kept.
    #[must_use]
    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Column assignments for bulk updates, built `set` by `set`.
///
/// # Example
///
/// ```
/// use relata_query::queryset::Assignments;
///
/// let sets = Assignments::new().set("in_print", false).set("year", 0);
/// assert_eq!(sets.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Assignments {
    pub(crate) pairs: Vec<(String, Value)>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pairs.push((field.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A [`QuerySpec`] bound to the collaborators, with executing terminals.
///
/// Builder calls stay pure; only the terminal methods suspend on the
/// driver.
#[derive(Debug)]
pub struct QuerySet<'e, D, C, V> {
    ctx: QueryContext<'e, D, C, V>,
    spec: QuerySpec,
}

impl<'e, D, C, V> QuerySet<'e, D, C, V>
where
    D: Driver,
    C: StatementCompiler,
    V: Validator,
{
    pub fn new(ctx: QueryContext<'e, D, C, V>, model: impl Into<String>) -> Self {
        Self {
            ctx,
            spec: QuerySpec::new(model),
        }
    }

    /// Bind an already-built spec.
    pub fn from_spec(ctx: QueryContext<'e, D, C, V>, spec: QuerySpec) -> Self {
        Self { ctx, spec }
    }

    /// The accumulated spec.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    #[must_use]
    pub fn filter(mut self, predicate: Filter) -> Self {
        self.spec = self.spec.filter(predicate);
        self
    }

    #[must_use]
    pub fn exclude(mut self, predicate: Filter) -> Self {
        self.spec = self.spec.exclude(predicate);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: Order) -> Self {
        self.spec = self.spec.order_by(order);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.spec = self.spec.limit(n);
        self
    }

    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.spec = self.spec.offset(n);
        self
    }

    #[must_use]
    pub fn select_related(mut self, path: impl Into<RelationPath>) -> Self {
        self.spec = self.spec.select_related(path);
        self
    }

    #[must_use]
    pub fn prefetch_related(mut self, path: impl Into<RelationPath>) -> Self {
        self.spec = self.spec.prefetch_related(path);
        self
    }

    #[must_use]
    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec = self.spec.only(fields);
        self
    }

    #[must_use]
    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec = self.spec.exclude_fields(fields);
        self
    }

    /// Fetch every matching root instance with its requested eager loads.
    pub async fn fetch_all(&self, cx: &Cx) -> Outcome<Vec<Instance>, Error> {
        self.ctx.fetch_all(cx, &self.spec).await
    }

    /// Fetch the full hydrated graph.
    pub async fn fetch_graph(&self, cx: &Cx) -> Outcome<HydratedGraph, Error> {
        self.ctx.fetch_graph(cx, &self.spec).await
    }

    /// Fetch exactly one instance; zero or multiple rows is a query error.
    pub async fn fetch_one(&self, cx: &Cx) -> Outcome<Instance, Error> {
        self.ctx.fetch_one(cx, &self.spec).await
    }

    /// Fetch at most one instance; multiple rows is a query error.
    pub async fn fetch_optional(&self, cx: &Cx) -> Outcome<Option<Instance>, Error> {
        self.ctx.fetch_optional(cx, &self.spec).await
    }

    /// Primary-key lookup sugar: filters on the root primary key and
    /// requires exactly one row.
    pub async fn get(&self, cx: &Cx, pk: impl Into<Value>) -> Outcome<Instance, Error> {
        self.ctx.get(cx, &self.spec, pk.into()).await
    }

    /// Count matching root rows without hydrating them.
    pub async fn count(&self, cx: &Cx) -> Outcome<u64, Error> {
        self.ctx.count(cx, &self.spec).await
    }

    /// True when at least one root row matches.
    pub async fn exists(&self, cx: &Cx) -> Outcome<bool, Error> {
        self.ctx.exists(cx, &self.spec).await
    }

    /// Bulk UPDATE against the root table; returns affected rows.
    /// Relation paths in the filter are rejected when planning.
    pub async fn update_where(&self, cx: &Cx, sets: Assignments) -> Outcome<u64, Error> {
        self.ctx.update_where(cx, &self.spec, sets).await
    }

    /// Bulk DELETE against the root table; returns affected rows.
    /// Relation paths in the filter are rejected when planning.
    pub async fn delete_where(&self, cx: &Cx) -> Outcome<u64, Error> {
        self.ctx.delete_where(cx, &self.spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Cond;

    #[test]
    fn test_builder_returns_new_specs() {
        let base = QuerySpec::new("Book");
        let filtered = base.clone().filter(Cond::field("year").gt(1900));
        assert!(base.filter.is_none());
        assert!(filtered.filter.is_some());
    }

    #[test]
    fn test_filter_calls_merge_with_and() {
        let spec = QuerySpec::new("Book")
            .filter(Cond::field("year").gt(1900))
            .filter(Cond::field("in_print").eq(true));
        match spec.filter {
            Some(Filter::And(parts)) => assert_eq!(parts.len(), 2),
            other => panic!("expected merged And, got {other:?}"),
        }
    }

    #[test]
    fn test_exclude_negates() {
        let spec = QuerySpec::new("Book").exclude(Cond::field("year").lt(1900));
        assert!(matches!(spec.filter, Some(Filter::Not(_))));
    }

    #[test]
    fn test_accumulates_paths_and_fields() {
        let spec = QuerySpec::new("Book")
            .select_related("author.publisher")
            .prefetch_related("reviews")
            .only(["id", "title"])
            .order_by(Order::desc("year"))
            .limit(5)
            .offset(10);
        assert_eq!(spec.select_related.len(), 1);
        assert_eq!(spec.select_related[0].segments(), ["author", "publisher"]);
        assert_eq!(spec.prefetch.len(), 1);
        assert_eq!(spec.only, ["id", "title"]);
        assert_eq!(spec.order[0].direction, Direction::Desc);
        assert_eq!(spec.limit, Some(5));
        assert_eq!(spec.offset, Some(10));
    }

    #[test]
    fn test_assignments() {
        let sets = Assignments::new().set("year", 1955).set("title", "x");
        assert_eq!(sets.pairs[0].0, "year");
        assert_eq!(sets.pairs[1].1, Value::Text("x".into()));
    }
}
