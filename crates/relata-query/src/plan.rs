//! Query planning: an immutable spec plus a sealed registry become
//! executable statements.
//!
//! # Role
//!
//! The planner resolves every field path against the relation graph,
//! assigns table aliases and output-column positions, and produces a
//! [`QueryPlan`]: the root SELECT (covering `select_related` joins and
//! filter/order joins), a positional field manifest for hydration, and a
//! template per `prefetch_related` path for the executor to key with
//! parent values at run time. All path and selection mistakes surface
//! here, before anything touches the driver.

use crate::filter::{CmpOp, FieldPath, Filter};
use crate::queryset::QuerySpec;
use crate::stmt::{
    ColumnRef, DeleteStatement, Join, JoinKind, OrderTerm, Predicate, SelectColumn,
    SelectStatement, UpdateStatement,
};
use relata_core::error::{Error, Result};
use relata_core::field::FieldDescriptor;
use relata_core::graph::{JoinKeys, RelationStep};
use relata_core::model::ModelDescriptor;
use relata_core::path::RelationPath;
use relata_core::registry::ModelRegistry;
use relata_core::value::Value;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Plan shapes
// ============================================================================

/// One field of a hydrated instance and the result-row position holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub field: String,
    pub index: usize,
}

/// One `select_related` hop: where its columns live in the root rows and
/// which hops hang below it.
#[derive(Debug, Clone)]
pub struct EagerNode {
    pub segment: String,
    pub model: String,
    /// Position of this target's primary key; `Null` there means the outer
    /// join found no row and the reference hydrates to `None`.
    pub pk_slot: usize,
    pub fields: Vec<FieldSlot>,
    pub children: Vec<EagerNode>,
}

/// One `prefetch_related` hop: a follow-up statement template plus the
/// wiring to key it by parent values and partition its rows back out.
#[derive(Debug, Clone)]
pub struct PrefetchPlan {
    pub segment: String,
    pub model: String,
    /// Attach as `Related::One` (to-one hop) instead of `Related::Many`.
    pub to_one: bool,
    /// Field on the parent instance whose values key the follow-up
    /// (the primary key, or the foreign-key field for forward hops).
    pub parent_field: String,
    /// The follow-up SELECT without its `IN` restriction; the executor
    /// adds `key_column IN (parent values)` per batch.
    pub statement: SelectStatement,
    pub key_column: ColumnRef,
    /// Position of the linking value in each fetched row.
    pub key_index: usize,
    /// Position of the child's own primary key.
    pub pk_index: usize,
    pub fields: Vec<FieldSlot>,
    pub children: Vec<PrefetchPlan>,
}

/// Everything the executor needs for one query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub model: String,
    pub statement: SelectStatement,
    /// Position of the root primary key in each row.
    pub pk_index: usize,
    pub fields: Vec<FieldSlot>,
    pub eager: Vec<EagerNode>,
    pub prefetch: Vec<PrefetchPlan>,
}

// ============================================================================
// Path tries
// ============================================================================

/// Requested paths merged segment-wise, preserving first-seen order so
/// aliases and statement order stay deterministic.
#[derive(Debug, Default)]
struct PathTrie {
    nodes: Vec<TrieNode>,
}

#[derive(Debug)]
struct TrieNode {
    segment: String,
    children: PathTrie,
}

impl PathTrie {
    fn from_paths(paths: &[RelationPath]) -> Self {
        let mut trie = Self::default();
        for path in paths {
            trie.insert(path.segments());
        }
        trie
    }

    fn insert(&mut self, segments: &[String]) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        let idx = match self.nodes.iter().position(|n| n.segment == *first) {
            Some(idx) => idx,
            None => {
                self.nodes.push(TrieNode {
                    segment: first.clone(),
                    children: PathTrie::default(),
                });
                self.nodes.len() - 1
            }
        };
        self.nodes[idx].children.insert(rest);
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================================
// Join bookkeeping
// ============================================================================

/// Mutable join state while lowering one query: the alias table keyed by
/// relation-path prefix, the accumulated join clauses, and the DISTINCT
/// flag raised by to-many filter hops.
struct JoinContext<'r> {
    registry: &'r ModelRegistry,
    root_model: String,
    root_alias: String,
    aliases: BTreeMap<String, (String, String)>,
    joins: Vec<Join>,
    next: usize,
    distinct: bool,
}

impl<'r> JoinContext<'r> {
    fn new(registry: &'r ModelRegistry, root_model: &str, root_alias: &str) -> Self {
        Self {
            registry,
            root_model: root_model.to_string(),
            root_alias: root_alias.to_string(),
            aliases: BTreeMap::new(),
            joins: Vec::new(),
            next: 0,
            distinct: false,
        }
    }

    fn alloc(&mut self) -> String {
        self.next += 1;
        format!("j{}", self.next)
    }

    /// Append the join clause(s) for one resolved hop and return the alias
    /// the hop's target is reachable under.
    fn join_for_step(&mut self, parent_alias: &str, step: &RelationStep) -> Result<String> {
        let target = self.registry.require(&step.target)?;
        match &step.join {
            JoinKeys::ForeignKey { column, target_pk } => {
                let alias = self.alloc();
                self.joins.push(Join {
                    kind: JoinKind::Left,
                    table: target.table.clone(),
                    alias: alias.clone(),
                    left: ColumnRef::new(parent_alias, column),
                    right: ColumnRef::new(&alias, target_pk),
                });
                Ok(alias)
            }
            JoinKeys::ReverseKey { source_pk, column } => {
                let alias = self.alloc();
                self.joins.push(Join {
                    kind: JoinKind::Left,
                    table: target.table.clone(),
                    alias: alias.clone(),
                    left: ColumnRef::new(parent_alias, source_pk),
                    right: ColumnRef::new(&alias, column),
                });
                Ok(alias)
            }
            JoinKeys::Link {
                table,
                source_column,
                target_column,
                source_pk,
                target_pk,
            } => {
                let link_alias = self.alloc();
                let alias = self.alloc();
                self.joins.push(Join {
                    kind: JoinKind::Left,
                    table: table.clone(),
                    alias: link_alias.clone(),
                    left: ColumnRef::new(parent_alias, source_pk),
                    right: ColumnRef::new(&link_alias, source_column),
                });
                self.joins.push(Join {
                    kind: JoinKind::Left,
                    table: target.table.clone(),
                    alias: alias.clone(),
                    left: ColumnRef::new(&link_alias, target_column),
                    right: ColumnRef::new(&alias, target_pk),
                });
                Ok(alias)
            }
        }
    }

    /// Walk a relation path, reusing or creating joins, and return the
    /// alias and model name the path lands on.
    fn resolve_relations(
        &mut self,
        relations: &RelationPath,
        allow_to_many: bool,
        usage: &str,
    ) -> Result<(String, String)> {
        let mut current_alias = self.root_alias.clone();
        let mut current_model = self.root_model.clone();
        let mut prefix = String::new();
        for segment in relations.segments() {
            if prefix.is_empty() {
                prefix.clone_from(segment);
            } else {
                prefix = format!("{prefix}.{segment}");
            }
            if let Some((alias, model)) = self.aliases.get(&prefix) {
                current_alias.clone_from(alias);
                current_model.clone_from(model);
                continue;
            }
            let graph = self.registry.graph();
            let steps = graph.resolve_path(
                &current_model,
                &RelationPath::from_segments(vec![segment.clone()]),
            )?;
            let Some(step) = steps.first() else {
                continue;
            };
            if step.kind.is_to_many() {
                if !allow_to_many {
                    return Err(Error::config_for(
                        &self.root_model,
                        format!("{usage} path `{prefix}` traverses a to-many relation"),
                    ));
                }
                self.distinct = true;
            }
            let alias = self.join_for_step(&current_alias, step)?;
            self.aliases
                .insert(prefix.clone(), (alias.clone(), step.target.clone()));
            current_alias = alias;
            current_model = step.target.clone();
        }
        Ok((current_alias, current_model))
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Plans query specs against a sealed registry.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'r> {
    registry: &'r ModelRegistry,
}

impl<'r> Planner<'r> {
    pub fn new(registry: &'r ModelRegistry) -> Self {
        Self { registry }
    }

    /// Plan a read: root statement, hydration manifest, prefetch templates.
    #[tracing::instrument(level = "debug", skip(self, spec), fields(model = %spec.model()))]
    pub fn plan(&self, spec: &QuerySpec) -> Result<QueryPlan> {
        let root = self.registry.require(&spec.model)?;

        let prefetch = self.build_prefetch(&PathTrie::from_paths(&spec.prefetch), &root.name)?;
        let mut keep: BTreeSet<String> = BTreeSet::new();
        keep.insert(root.pk_name().to_string());
        for node in &prefetch {
            keep.insert(node.parent_field.clone());
        }

        let selected = self.root_selection(root, spec, &keep)?;
        let mut columns = Vec::new();
        let mut fields = Vec::new();
        let mut pk_index = 0;
        for field in &selected {
            let index = columns.len();
            columns.push(SelectColumn::new(
                ColumnRef::new(&root.table, &field.column),
                field.column.clone(),
            ));
            if field.name == root.pk_name() {
                pk_index = index;
            }
            fields.push(FieldSlot {
                field: field.name.clone(),
                index,
            });
        }

        let mut ctx = JoinContext::new(self.registry, &root.name, &root.table);
        let eager = self.build_eager(
            &mut ctx,
            &PathTrie::from_paths(&spec.select_related),
            &root.name,
            &root.table,
            "",
            &mut columns,
        )?;

        let predicate = match &spec.filter {
            Some(filter) => Some(self.lower_filter(&mut ctx, filter)?),
            None => None,
        };

        let mut order = Vec::new();
        for term in &spec.order {
            let (column, _) = self.resolve_field(&mut ctx, &term.target, false, "order_by")?;
            order.push(OrderTerm {
                column,
                direction: term.direction,
            });
        }
        if ctx.distinct {
            // DISTINCT requires every ordered column in the output.
            for (i, term) in order.iter().enumerate() {
                if !columns.iter().any(|c| c.source == term.column) {
                    columns.push(SelectColumn::new(term.column.clone(), format!("o{i}")));
                }
            }
        }

        let statement = SelectStatement {
            table: root.table.clone(),
            alias: root.table.clone(),
            distinct: ctx.distinct,
            columns,
            joins: ctx.joins,
            predicate,
            order,
            limit: spec.limit,
            offset: spec.offset,
        };

        tracing::debug!(
            model = %root.name,
            joins = statement.joins.len(),
            prefetch = prefetch.len(),
            distinct = statement.distinct,
            "planned query"
        );

        Ok(QueryPlan {
            model: root.name.clone(),
            statement,
            pk_index,
            fields,
            eager,
            prefetch,
        })
    }

    /// Plan a count: same row set, reduced to the root primary key with
    /// ordering and paging stripped.
    pub fn plan_count(&self, spec: &QuerySpec) -> Result<SelectStatement> {
        let plan = self.plan(spec)?;
        let mut stmt = plan.statement;
        let pk_source = stmt.columns[plan.pk_index].source.clone();
        stmt.columns = vec![SelectColumn::new(pk_source, "pk")];
        stmt.order.clear();
        stmt.limit = None;
        stmt.offset = None;
        Ok(stmt)
    }

    /// Plan a bulk UPDATE against the root table. Assignments are field
    /// names with already-validated values; the filter may not cross
    /// relations.
    pub fn plan_update(
        &self,
        spec: &QuerySpec,
        assignments: Vec<(String, Value)>,
    ) -> Result<UpdateStatement> {
        let root = self.registry.require(&spec.model)?;
        if assignments.is_empty() {
            return Err(Error::config_for(
                &root.name,
                "bulk update requires at least one assignment",
            ));
        }
        let mut sets = Vec::new();
        for (field, value) in assignments {
            let Some(desc) = root.field(&field) else {
                return Err(Error::config_for(
                    &root.name,
                    format!("no field `{field}` to assign"),
                ));
            };
            sets.push((desc.column.clone(), value));
        }
        let predicate = self.root_only_predicate(root, spec, "update")?;
        Ok(UpdateStatement {
            table: root.table.clone(),
            assignments: sets,
            predicate,
        })
    }

    /// Plan a bulk DELETE against the root table; the filter may not cross
    /// relations.
    pub fn plan_delete(&self, spec: &QuerySpec) -> Result<DeleteStatement> {
        let root = self.registry.require(&spec.model)?;
        let predicate = self.root_only_predicate(root, spec, "delete")?;
        Ok(DeleteStatement {
            table: root.table.clone(),
            predicate,
        })
    }

    /// Root fields in declaration order, honoring `only`/`exclude_fields`
    /// with the primary key and prefetch foreign keys always retained.
    fn root_selection(
        &self,
        root: &'r ModelDescriptor,
        spec: &QuerySpec,
        keep: &BTreeSet<String>,
    ) -> Result<Vec<&'r FieldDescriptor>> {
        if !spec.only.is_empty() && !spec.exclude_fields.is_empty() {
            return Err(Error::config_for(
                &root.name,
                "`only` and `exclude_fields` cannot be combined in one query",
            ));
        }
        for name in spec.only.iter().chain(&spec.exclude_fields) {
            if root.field(name).is_none() {
                return Err(Error::config_for(
                    &root.name,
                    format!("unknown field `{name}` in field selection"),
                ));
            }
        }
        Ok(root
            .fields
            .iter()
            .filter(|f| {
                if keep.contains(&f.name) {
                    true
                } else if !spec.only.is_empty() {
                    spec.only.contains(&f.name)
                } else {
                    !spec.exclude_fields.contains(&f.name)
                }
            })
            .collect())
    }

    /// Depth-first `select_related` lowering: every hop must be to-one and
    /// contributes a join plus a full set of output columns.
    fn build_eager(
        &self,
        ctx: &mut JoinContext<'r>,
        trie: &PathTrie,
        parent_model: &str,
        parent_alias: &str,
        prefix: &str,
        columns: &mut Vec<SelectColumn>,
    ) -> Result<Vec<EagerNode>> {
        let mut nodes = Vec::new();
        for entry in &trie.nodes {
            let path_str = if prefix.is_empty() {
                entry.segment.clone()
            } else {
                format!("{prefix}.{}", entry.segment)
            };
            let graph = self.registry.graph();
            let steps = graph.resolve_path(
                parent_model,
                &RelationPath::from_segments(vec![entry.segment.clone()]),
            )?;
            let Some(step) = steps.first() else {
                continue;
            };
            if step.kind.is_to_many() {
                return Err(Error::config_for(
                    &ctx.root_model,
                    format!(
                        "select_related path `{path_str}` traverses a to-many relation; \
                         use prefetch_related"
                    ),
                ));
            }
            let alias = ctx.join_for_step(parent_alias, step)?;
            ctx.aliases
                .insert(path_str.clone(), (alias.clone(), step.target.clone()));

            let target = self.registry.require(&step.target)?;
            let mut fields = Vec::new();
            let mut pk_slot = 0;
            for field in &target.fields {
                let index = columns.len();
                columns.push(SelectColumn::new(
                    ColumnRef::new(&alias, &field.column),
                    format!("{alias}_{}", field.column),
                ));
                if field.name == target.pk_name() {
                    pk_slot = index;
                }
                fields.push(FieldSlot {
                    field: field.name.clone(),
                    index,
                });
            }

            let children = self.build_eager(
                ctx,
                &entry.children,
                &step.target,
                &alias,
                &path_str,
                columns,
            )?;
            nodes.push(EagerNode {
                segment: entry.segment.clone(),
                model: step.target.clone(),
                pk_slot,
                fields,
                children,
            });
        }
        Ok(nodes)
    }

    /// Lower the user's predicate tree onto resolved columns.
    fn lower_filter(&self, ctx: &mut JoinContext<'r>, filter: &Filter) -> Result<Predicate> {
        match filter {
            Filter::Cmp { target, op, value } => {
                let (column, field) = self.resolve_field(ctx, target, true, "filter")?;
                let value = if *op == CmpOp::Contains {
                    like_pattern(&ctx.root_model, field, value)?
                } else {
                    value.clone()
                };
                Ok(Predicate::Cmp {
                    column,
                    op: *op,
                    value,
                })
            }
            Filter::In { target, values } => {
                let (column, _) = self.resolve_field(ctx, target, true, "filter")?;
                Ok(Predicate::In {
                    column,
                    values: values.clone(),
                })
            }
            Filter::IsNull { target } => {
                let (column, _) = self.resolve_field(ctx, target, true, "filter")?;
                Ok(Predicate::IsNull { column })
            }
            Filter::And(parts) => Ok(Predicate::And(
                parts
                    .iter()
                    .map(|p| self.lower_filter(ctx, p))
                    .collect::<Result<_>>()?,
            )),
            Filter::Or(parts) => Ok(Predicate::Or(
                parts
                    .iter()
                    .map(|p| self.lower_filter(ctx, p))
                    .collect::<Result<_>>()?,
            )),
            Filter::Not(inner) => Ok(Predicate::Not(Box::new(self.lower_filter(ctx, inner)?))),
        }
    }

    /// Resolve one dotted field reference to a concrete column.
    fn resolve_field(
        &self,
        ctx: &mut JoinContext<'r>,
        path: &FieldPath,
        allow_to_many: bool,
        usage: &str,
    ) -> Result<(ColumnRef, &'r FieldDescriptor)> {
        let (alias, model_name) = ctx.resolve_relations(path.relations(), allow_to_many, usage)?;
        let model = self.registry.require(&model_name)?;
        let Some(field) = model.field(path.field()) else {
            return Err(Error::config_for(
                &model.name,
                format!("no field `{}` referenced by {usage} path `{path}`", path.field()),
            ));
        };
        Ok((ColumnRef::new(alias, &field.column), field))
    }

    /// Lower a bulk-write filter: root fields only, bare column references.
    fn root_only_predicate(
        &self,
        root: &ModelDescriptor,
        spec: &QuerySpec,
        usage: &str,
    ) -> Result<Option<Predicate>> {
        let Some(filter) = &spec.filter else {
            return Ok(None);
        };
        let mut crossing = None;
        filter.walk_paths(&mut |p| {
            if !p.is_root() && crossing.is_none() {
                crossing = Some(p.to_string());
            }
        });
        if let Some(path) = crossing {
            return Err(Error::config_for(
                &root.name,
                format!("bulk {usage} cannot filter across relations (path `{path}`)"),
            ));
        }
        let mut ctx = JoinContext::new(self.registry, &root.name, "");
        Ok(Some(self.lower_filter(&mut ctx, filter)?))
    }

    /// Build prefetch templates for one trie level rooted at `parent_model`.
    fn build_prefetch(&self, trie: &PathTrie, parent_model: &str) -> Result<Vec<PrefetchPlan>> {
        if trie.is_empty() {
            return Ok(Vec::new());
        }
        let parent = self.registry.require(parent_model)?;
        let mut plans = Vec::new();
        for entry in &trie.nodes {
            let graph = self.registry.graph();
            let steps = graph.resolve_path(
                parent_model,
                &RelationPath::from_segments(vec![entry.segment.clone()]),
            )?;
            let Some(step) = steps.first() else {
                continue;
            };
            let target = self.registry.require(&step.target)?;
            let alias = target.table.clone();

            let mut statement = SelectStatement::new(&target.table, &alias);
            let mut fields = Vec::new();
            let mut pk_index = 0;
            for field in &target.fields {
                let index = statement.columns.len();
                statement.columns.push(SelectColumn::new(
                    ColumnRef::new(&alias, &field.column),
                    field.column.clone(),
                ));
                if field.name == target.pk_name() {
                    pk_index = index;
                }
                fields.push(FieldSlot {
                    field: field.name.clone(),
                    index,
                });
            }

            let (parent_field, key_column, key_index) = match &step.join {
                JoinKeys::ForeignKey { column, target_pk } => {
                    let Some(fk_field) = parent.field_by_column(column) else {
                        return Err(Error::config_for(
                            parent_model,
                            format!("relation `{}` lost its foreign-key field", step.segment),
                        ));
                    };
                    (
                        fk_field.name.clone(),
                        ColumnRef::new(&alias, target_pk),
                        pk_index,
                    )
                }
                JoinKeys::ReverseKey { source_pk: _, column } => {
                    let Some(slot) = fields.iter().find(|s| {
                        target.field(&s.field).is_some_and(|f| f.column == *column)
                    }) else {
                        return Err(Error::config_for(
                            &target.name,
                            format!(
                                "model has no column `{column}` linking back to `{parent_model}`"
                            ),
                        ));
                    };
                    (
                        parent.pk_name().to_string(),
                        ColumnRef::new(&alias, column),
                        slot.index,
                    )
                }
                JoinKeys::Link {
                    table,
                    source_column,
                    target_column,
                    source_pk: _,
                    target_pk,
                } => {
                    statement.joins.push(Join {
                        kind: JoinKind::Inner,
                        table: table.clone(),
                        alias: table.clone(),
                        left: ColumnRef::new(&alias, target_pk),
                        right: ColumnRef::new(table, target_column),
                    });
                    let key_index = statement.columns.len();
                    statement.columns.push(SelectColumn::new(
                        ColumnRef::new(table, source_column),
                        format!("{table}_{source_column}"),
                    ));
                    (
                        parent.pk_name().to_string(),
                        ColumnRef::new(table, source_column),
                        key_index,
                    )
                }
            };

            let children = self.build_prefetch(&entry.children, &step.target)?;
            plans.push(PrefetchPlan {
                segment: entry.segment.clone(),
                model: step.target.clone(),
                to_one: step.kind.is_to_one(),
                parent_field,
                statement,
                key_column,
                key_index,
                pk_index,
                fields,
                children,
            });
        }
        Ok(plans)
    }
}

fn like_pattern(root_model: &str, field: &FieldDescriptor, value: &Value) -> Result<Value> {
    if !field.field_type.is_textual() {
        return Err(Error::config_for(
            root_model,
            format!(
                "`contains` requires a textual field, `{}` is {}",
                field.name, field.field_type
            ),
        ));
    }
    match value {
        Value::Text(s) => Ok(Value::Text(format!("%{s}%"))),
        other => Err(Error::config_for(
            root_model,
            format!("`contains` requires a text value, got {}", other.type_name()),
        )),
    }
}
