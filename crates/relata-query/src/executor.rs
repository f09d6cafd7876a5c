//! Query execution against the three collaborators.
//!
//! # Role
//!
//! [`QueryContext`] borrows the registry plus the driver, compiler, and
//! validator, and turns planned specs into driven statements: plan, check
//! for cancellation, compile, await the driver, hydrate. Prefetch levels
//! run as follow-up statements after the root rows are in, sequentially
//! and depth-first, so a failure at any level surfaces before any partial
//! graph escapes.
//!
//! Every await is bracketed by the structured-concurrency contract:
//! cancellation is checked before work is sent to the driver, and every
//! driver outcome is matched in full so `Cancelled` and `Panicked` pass
//! through untouched.

use crate::compiler::StatementCompiler;
use crate::filter::Cond;
use crate::hydrate::{self, HydratedGraph, Hydrator};
use crate::plan::{Planner, PrefetchPlan};
use crate::queryset::{Assignments, QuerySpec};
use crate::stmt::Predicate;
use asupersync::{Cx, Outcome};
use relata_core::driver::Driver;
use relata_core::error::{Error, WriteOperation};
use relata_core::instance::Instance;
use relata_core::registry::ModelRegistry;
use relata_core::validate::Validator;
use relata_core::value::Value;
use std::collections::HashSet;
use std::fmt;

/// Borrowed collaborators for executing queries. Cheap to copy; a
/// [`QuerySet`](crate::queryset::QuerySet) carries one by value.
pub struct QueryContext<'e, D, C, V> {
    registry: &'e ModelRegistry,
    driver: &'e D,
    compiler: &'e C,
    validator: &'e V,
}

impl<D, C, V> Clone for QueryContext<'_, D, C, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D, C, V> Copy for QueryContext<'_, D, C, V> {}

impl<D, C, V> fmt::Debug for QueryContext<'_, D, C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext").finish_non_exhaustive()
    }
}

impl<'e, D, C, V> QueryContext<'e, D, C, V>
where
    D: Driver,
    C: StatementCompiler,
    V: Validator,
{
    pub fn new(
        registry: &'e ModelRegistry,
        driver: &'e D,
        compiler: &'e C,
        validator: &'e V,
    ) -> Self {
        Self {
            registry,
            driver,
            compiler,
            validator,
        }
    }

    pub fn registry(&self) -> &'e ModelRegistry {
        self.registry
    }

    pub fn driver(&self) -> &'e D {
        self.driver
    }

    pub fn compiler(&self) -> &'e C {
        self.compiler
    }

    pub fn validator(&self) -> &'e V {
        self.validator
    }

    /// Fetch matching roots with their eager and prefetched relations.
    pub async fn fetch_all(&self, cx: &Cx, spec: &QuerySpec) -> Outcome<Vec<Instance>, Error> {
        match self.fetch_graph(cx, spec).await {
            Outcome::Ok(graph) => Outcome::Ok(graph.roots),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    /// Fetch the full graph: root statement, then one prefetch statement
    /// per planned level, keyed by the parent values actually loaded.
    #[tracing::instrument(level = "debug", skip(self, cx, spec), fields(model = %spec.model()))]
    pub async fn fetch_graph(&self, cx: &Cx, spec: &QuerySpec) -> Outcome<HydratedGraph, Error> {
        let plan = match Planner::new(self.registry).plan(spec) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.select(&plan.statement);
        let rows = match self.driver.fetch(cx, &query).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(Error::query_driver(&plan.model, e)),
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };
        // A cancellation that landed while the fetch was in flight must not
        // surface as a hydrated graph.
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let hydrator = Hydrator::new(self.registry, self.validator);
        let mut roots = match hydrator.roots(&plan, &rows) {
            Ok(roots) => roots,
            Err(e) => return Outcome::Err(e),
        };
        for level in &plan.prefetch {
            match self.run_prefetch(cx, &mut roots, level).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                Outcome::Panicked(payload) => return Outcome::Panicked(payload),
            }
        }
        Outcome::Ok(HydratedGraph {
            model: plan.model,
            roots,
        })
    }

    /// Fetch exactly one root.
    pub async fn fetch_one(&self, cx: &Cx, spec: &QuerySpec) -> Outcome<Instance, Error> {
        let graph = match self.fetch_graph(cx, spec).await {
            Outcome::Ok(graph) => graph,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };
        let HydratedGraph { model, mut roots } = graph;
        match roots.pop() {
            Some(instance) if roots.is_empty() => Outcome::Ok(instance),
            Some(_) => Outcome::Err(Error::multiple_rows(model, roots.len() + 1)),
            None => Outcome::Err(Error::no_rows(model)),
        }
    }

    /// Fetch at most one root.
    pub async fn fetch_optional(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
    ) -> Outcome<Option<Instance>, Error> {
        let graph = match self.fetch_graph(cx, spec).await {
            Outcome::Ok(graph) => graph,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };
        let HydratedGraph { model, mut roots } = graph;
        if roots.len() > 1 {
            return Outcome::Err(Error::multiple_rows(model, roots.len()));
        }
        Outcome::Ok(roots.pop())
    }

    /// Primary-key lookup: root filter on the pk plus exactly-one semantics.
    pub async fn get(&self, cx: &Cx, spec: &QuerySpec, pk: Value) -> Outcome<Instance, Error> {
        let root = match self.registry.require(spec.model()) {
            Ok(root) => root,
            Err(e) => return Outcome::Err(e),
        };
        let spec = spec.clone().filter(Cond::field(root.pk_name()).eq(pk));
        self.fetch_one(cx, &spec).await
    }

    /// Count matching roots, honoring the spec's filters but not its
    /// ordering or paging.
    #[tracing::instrument(level = "debug", skip(self, cx, spec), fields(model = %spec.model()))]
    pub async fn count(&self, cx: &Cx, spec: &QuerySpec) -> Outcome<u64, Error> {
        let stmt = match Planner::new(self.registry).plan_count(spec) {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.count(&stmt);
        let rows = match self.driver.fetch(cx, &query).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(Error::query_driver(spec.model(), e)),
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };
        let count = rows
            .first()
            .and_then(|row| row.value_at(0))
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok());
        match count {
            Some(n) => Outcome::Ok(n),
            None => Outcome::Err(Error::hydration(
                spec.model(),
                None,
                "count query returned no usable value",
            )),
        }
    }

    /// True when at least one root matches.
    #[tracing::instrument(level = "debug", skip(self, cx, spec), fields(model = %spec.model()))]
    pub async fn exists(&self, cx: &Cx, spec: &QuerySpec) -> Outcome<bool, Error> {
        let stmt = match Planner::new(self.registry).plan_count(spec) {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.exists(&stmt);
        let rows = match self.driver.fetch(cx, &query).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(Error::query_driver(spec.model(), e)),
            Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => return Outcome::Panicked(payload),
        };
        let found = match rows.first().and_then(|row| row.value_at(0)) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(i)) => *i != 0,
            Some(Value::BigInt(i)) => *i != 0,
            _ => {
                return Outcome::Err(Error::hydration(
                    spec.model(),
                    None,
                    "exists query returned no usable value",
                ));
            }
        };
        Outcome::Ok(found)
    }

    /// Bulk UPDATE: validate each assignment, plan against the root table,
    /// execute. Returns the affected-row count.
    #[tracing::instrument(level = "debug", skip(self, cx, spec, sets), fields(model = %spec.model()))]
    pub async fn update_where(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
        sets: Assignments,
    ) -> Outcome<u64, Error> {
        let root = match self.registry.require(spec.model()) {
            Ok(root) => root,
            Err(e) => return Outcome::Err(e),
        };
        let mut validated = Vec::with_capacity(sets.pairs.len());
        for (field, value) in sets.pairs {
            let Some(desc) = root.field(&field) else {
                return Outcome::Err(Error::config_for(
                    &root.name,
                    format!("no field `{field}` to assign"),
                ));
            };
            match self.validator.check(&root.name, desc, value) {
                Ok(value) => validated.push((field, value)),
                Err(fault) => {
                    return Outcome::Err(Error::write_validation(
                        &root.name,
                        WriteOperation::Update,
                        fault.field,
                        fault.message,
                    ));
                }
            }
        }
        let stmt = match Planner::new(self.registry).plan_update(spec, validated) {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.update(&stmt);
        match self.driver.execute(cx, &query).await {
            Outcome::Ok(n) => Outcome::Ok(n),
            Outcome::Err(e) => {
                Outcome::Err(Error::write_driver(&root.name, WriteOperation::Update, e))
            }
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    /// Bulk DELETE against the root table. Returns the affected-row count.
    #[tracing::instrument(level = "debug", skip(self, cx, spec), fields(model = %spec.model()))]
    pub async fn delete_where(&self, cx: &Cx, spec: &QuerySpec) -> Outcome<u64, Error> {
        let stmt = match Planner::new(self.registry).plan_delete(spec) {
            Ok(stmt) => stmt,
            Err(e) => return Outcome::Err(e),
        };
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let query = self.compiler.delete(&stmt);
        match self.driver.execute(cx, &query).await {
            Outcome::Ok(n) => Outcome::Ok(n),
            Outcome::Err(e) => {
                Outcome::Err(Error::write_driver(spec.model(), WriteOperation::Delete, e))
            }
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }

    /// Run one prefetch level for `parents`, then recurse into its
    /// children. Boxed because the plan tree nests arbitrarily deep.
    fn run_prefetch<'a>(
        &'a self,
        cx: &'a Cx,
        parents: &'a mut [Instance],
        plan: &'a PrefetchPlan,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Outcome<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut seen = HashSet::new();
            let mut keys = Vec::new();
            for parent in parents.iter() {
                let Some(value) = parent.get(&plan.parent_field) else {
                    continue;
                };
                let Some(key) = value.dedup_key() else {
                    continue;
                };
                if seen.insert(key) {
                    keys.push(value.clone());
                }
            }
            if keys.is_empty() {
                hydrate::attach_empty(parents, plan);
                return Outcome::Ok(());
            }
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }

            let mut statement = plan.statement.clone();
            statement.restrict(Predicate::In {
                column: plan.key_column.clone(),
                values: keys,
            });
            let query = self.compiler.select(&statement);
            tracing::debug!(segment = %plan.segment, model = %plan.model, "prefetching relation");
            let rows = match self.driver.fetch(cx, &query).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => return Outcome::Err(Error::query_driver(&plan.model, e)),
                Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                Outcome::Panicked(payload) => return Outcome::Panicked(payload),
            };
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            let hydrator = Hydrator::new(self.registry, self.validator);
            let batch = match hydrator.prefetch_batch(plan, &rows) {
                Ok(batch) => batch,
                Err(e) => return Outcome::Err(e),
            };
            let (keys_of, mut children): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
            for level in &plan.children {
                match self.run_prefetch(cx, &mut children, level).await {
                    Outcome::Ok(()) => {}
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                    Outcome::Panicked(payload) => return Outcome::Panicked(payload),
                }
            }
            hydrate::attach_prefetched(parents, plan, &keys_of, &children);
            Outcome::Ok(())
        })
    }
}
