//! Turning flat result rows into instance graphs.
//!
//! # Role
//!
//! The planner records where every field landed in the row
//! ([`FieldSlot`](crate::plan::FieldSlot) positions); hydration reads those
//! positions back out, pushes each value through the validator, and
//! assembles [`Instance`] trees. Root rows deduplicate by primary key in
//! first-seen order, so a to-many filter join that multiplies rows never
//! multiplies instances. Eager (`select_related`) columns hydrate inline;
//! prefetch batches hydrate flat and are partitioned back onto their
//! parents by linking value.

use crate::plan::{EagerNode, FieldSlot, PrefetchPlan, QueryPlan};
use relata_core::error::{Error, Result};
use relata_core::instance::{Instance, Related};
use relata_core::model::ModelDescriptor;
use relata_core::registry::ModelRegistry;
use relata_core::row::Row;
use relata_core::validate::Validator;
use relata_core::value::Value;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A fully assembled result: root instances with their requested relations
/// attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydratedGraph {
    pub model: String,
    pub roots: Vec<Instance>,
}

/// Row-to-instance assembly against one registry and validator.
pub struct Hydrator<'a, V> {
    registry: &'a ModelRegistry,
    validator: &'a V,
}

impl<'a, V: Validator> Hydrator<'a, V> {
    pub fn new(registry: &'a ModelRegistry, validator: &'a V) -> Self {
        Self {
            registry,
            validator,
        }
    }

    /// Hydrate root rows: one instance per distinct primary key in
    /// first-seen order, with every eager node attached from the first row
    /// that carried the key.
    pub fn roots(&self, plan: &QueryPlan, rows: &[Row]) -> Result<Vec<Instance>> {
        let model = self.registry.require(&plan.model)?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut roots = Vec::new();
        for row in rows {
            let pk = row.value_at(plan.pk_index).cloned().unwrap_or(Value::Null);
            let Some(key) = pk.dedup_key() else {
                return Err(Error::hydration(
                    &model.name,
                    Some(model.pk_name().to_string()),
                    "row carried a NULL primary key",
                ));
            };
            if !seen.insert(key) {
                continue;
            }
            let mut instance = self.construct(model, &plan.fields, row)?;
            self.attach_eager(&mut instance, &plan.eager, row)?;
            roots.push(instance);
        }
        tracing::trace!(model = %plan.model, rows = rows.len(), roots = roots.len(), "hydrated roots");
        Ok(roots)
    }

    /// Hydrate one prefetch batch flat: `(linking key, child)` pairs in
    /// result order. Rows whose linking value is NULL belong to nobody and
    /// are dropped.
    pub fn prefetch_batch(
        &self,
        plan: &PrefetchPlan,
        rows: &[Row],
    ) -> Result<Vec<(String, Instance)>> {
        let model = self.registry.require(&plan.model)?;
        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            let link = row.value_at(plan.key_index).cloned().unwrap_or(Value::Null);
            let Some(key) = link.dedup_key() else {
                continue;
            };
            batch.push((key, self.construct(model, &plan.fields, row)?));
        }
        Ok(batch)
    }

    fn construct(
        &self,
        model: &ModelDescriptor,
        fields: &[FieldSlot],
        row: &Row,
    ) -> Result<Instance> {
        let mut values = Vec::with_capacity(fields.len());
        for slot in fields {
            let Some(value) = row.value_at(slot.index) else {
                return Err(Error::hydration(
                    &model.name,
                    Some(slot.field.clone()),
                    format!("row has no column at position {}", slot.index),
                ));
            };
            values.push((slot.field.clone(), value.clone()));
        }
        self.validator
            .construct(model, values)
            .map_err(|fault| Error::hydration(&model.name, fault.field, fault.message))
    }

    fn attach_eager(&self, parent: &mut Instance, nodes: &[EagerNode], row: &Row) -> Result<()> {
        for node in nodes {
            let present = row.value_at(node.pk_slot).is_some_and(|v| !v.is_null());
            if !present {
                parent.set_related(&node.segment, Related::One(None));
                continue;
            }
            let model = self.registry.require(&node.model)?;
            let mut child = self.construct(model, &node.fields, row)?;
            self.attach_eager(&mut child, &node.children, row)?;
            parent.set_related(&node.segment, Related::One(Some(Box::new(child))));
        }
        Ok(())
    }
}

/// Partition a hydrated prefetch batch onto its parents. Every parent gets
/// an entry for the segment: matched children (cloned per parent, since a
/// many-to-many child may belong to several), or the empty value.
pub fn attach_prefetched(
    parents: &mut [Instance],
    plan: &PrefetchPlan,
    keys: &[String],
    children: &[Instance],
) {
    let mut buckets: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, key) in keys.iter().enumerate() {
        buckets.entry(key.as_str()).or_default().push(idx);
    }
    for parent in parents {
        let matched = parent
            .get(&plan.parent_field)
            .and_then(Value::dedup_key)
            .and_then(|key| buckets.get(key.as_str()));
        let related = match matched {
            Some(indices) if plan.to_one => {
                Related::One(indices.first().map(|&i| Box::new(children[i].clone())))
            }
            Some(indices) => {
                Related::Many(indices.iter().map(|&i| children[i].clone()).collect())
            }
            None if plan.to_one => Related::One(None),
            None => Related::Many(Vec::new()),
        };
        parent.set_related(&plan.segment, related);
    }
}

/// Attach the empty value for a prefetch level that fetched nothing.
pub fn attach_empty(parents: &mut [Instance], plan: &PrefetchPlan) {
    for parent in parents {
        let related = if plan.to_one {
            Related::One(None)
        } else {
            Related::Many(Vec::new())
        };
        parent.set_related(&plan.segment, related);
    }
}
