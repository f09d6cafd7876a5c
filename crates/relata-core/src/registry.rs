//! The model registry: two-phase registration with finalize-time resolution.
//!
//! # Role
//!
//! [`RegistryBuilder`] accepts [`ModelDecl`]s in any order, validating each
//! declaration in isolation. [`RegistryBuilder::finalize`] then resolves
//! forward references, synthesizes foreign-key columns and missing
//! associative models, wires reverse accessors, and seals everything into an
//! immutable [`ModelRegistry`]. Every later component takes the sealed
//! registry by shared reference; nothing mutates it after finalize.
//!
//! # Example
//!
//! ```
//! use relata_core::field::{FieldDecl, FieldType};
//! use relata_core::model::ModelDecl;
//! use relata_core::registry::RegistryBuilder;
//! use relata_core::relation::RelationDecl;
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register(
//!     ModelDecl::new("Author", "authors")
//!         .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
//!         .field(FieldDecl::new("name", FieldType::Text)),
//! )?;
//! builder.register(
//!     ModelDecl::new("Book", "books")
//!         .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
//!         .field(FieldDecl::new("title", FieldType::Text))
//!         .relation(RelationDecl::many_to_one("author", "Author")),
//! )?;
//! let registry = builder.finalize()?;
//! assert!(registry.get("Author").unwrap().reverse_relation("books").is_some());
//! # Ok::<(), relata_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::field::{FieldDecl, FieldDescriptor, FieldType, ForeignKeyRef};
use crate::model::{ModelDecl, ModelDescriptor};
use crate::relation::{
    default_reverse_name, LinkInfo, RelationDecl, RelationDescriptor, RelationKind,
    ReverseRelationDescriptor, ReverseSpec,
};
use std::collections::{BTreeMap, HashMap, HashSet};

// ============================================================================
// Builder phase
// ============================================================================

/// Mutable accumulator for model declarations.
///
/// Not safe for concurrent registration; callers serialize startup
/// registration externally, then share the sealed registry freely.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    decls: Vec<ModelDecl>,
    names: HashSet<String>,
    tables: HashSet<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate one declaration in isolation and queue it for finalize.
    ///
    /// Relation targets are not resolved here; forward references are the
    /// normal case and are checked by [`finalize`](Self::finalize).
    pub fn register(&mut self, decl: ModelDecl) -> Result<()> {
        validate_decl(&decl)?;
        if self.names.contains(&decl.name) {
            return Err(Error::config_for(
                &decl.name,
                format!("model `{}` is already registered", decl.name),
            ));
        }
        if self.tables.contains(&decl.table) {
            return Err(Error::config_for(
                &decl.name,
                format!("table `{}` is already mapped by another model", decl.table),
            ));
        }
        tracing::debug!(model = %decl.name, table = %decl.table, "model registered");
        self.names.insert(decl.name.clone());
        self.tables.insert(decl.table.clone());
        self.decls.push(decl);
        Ok(())
    }

    /// Number of queued declarations.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Resolve everything and seal the registry.
    #[tracing::instrument(level = "debug", skip(self), fields(models = self.decls.len()))]
    pub fn finalize(mut self) -> Result<ModelRegistry> {
        self.synthesize_through_models()?;

        let index: HashMap<String, usize> = self
            .decls
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();

        let mut descs = base_descriptors(&self.decls)?;
        resolve_to_one(&self.decls, &index, &mut descs)?;
        resolve_many_to_many(&self.decls, &index, &mut descs)?;
        synthesize_reverses(&self.decls, &index, &mut descs)?;

        let order: Vec<String> = self.decls.iter().map(|d| d.name.clone()).collect();
        let models: BTreeMap<String, ModelDescriptor> =
            descs.into_iter().map(|d| (d.name.clone(), d)).collect();
        tracing::debug!(models = order.len(), "registry sealed");
        Ok(ModelRegistry { order, models })
    }

    /// Register associative models for many-to-many declarations that did
    /// not name one. The synthesized model gets a surrogate key and two
    /// reverse-suppressed to-one relations.
    fn synthesize_through_models(&mut self) -> Result<()> {
        let mut synthesized: Vec<ModelDecl> = Vec::new();
        for i in 0..self.decls.len() {
            let source_name = self.decls[i].name.clone();
            let source_table = self.decls[i].table.clone();
            for j in 0..self.decls[i].relations.len() {
                let rel = &self.decls[i].relations[j];
                if rel.kind != RelationKind::ManyToMany || rel.through.is_some() {
                    continue;
                }
                if rel.target == source_name {
                    return Err(Error::config_for(
                        &source_name,
                        format!(
                            "self-referential many-to-many `{}` requires an explicit through model",
                            rel.name
                        ),
                    ));
                }
                let target = rel.target.clone();
                let target_idx = self.decls.iter().position(|d| d.name == target);
                let Some(target_idx) = target_idx else {
                    return Err(Error::config_for(
                        &source_name,
                        format!(
                            "relation `{}` targets unregistered model `{target}`",
                            rel.name
                        ),
                    ));
                };
                let link_name = format!("{source_name}{target}Link");
                let link_table = format!("{source_table}_{}", self.decls[target_idx].table);
                if self.names.contains(&link_name)
                    || synthesized.iter().any(|d| d.name == link_name)
                {
                    return Err(Error::config_for(
                        &source_name,
                        format!(
                            "cannot synthesize through model `{link_name}`: the name is taken; \
                             declare the relation with an explicit through model"
                        ),
                    ));
                }
                tracing::debug!(
                    model = %source_name,
                    relation = %rel.name,
                    through = %link_name,
                    "synthesizing associative model"
                );
                let link = ModelDecl::new(link_name.as_str(), link_table.as_str())
                    .field(
                        FieldDecl::new("id", FieldType::BigInteger)
                            .primary_key(true)
                            .auto_increment(true),
                    )
                    .relation(
                        RelationDecl::many_to_one(source_name.to_lowercase(), source_name.as_str())
                            .suppress_reverse(),
                    )
                    .relation(
                        RelationDecl::many_to_one(target.to_lowercase(), target.as_str())
                            .suppress_reverse(),
                    );
                synthesized.push(link);
                self.decls[i].relations[j].through = Some(link_name);
            }
        }
        for link in synthesized {
            self.register(link)?;
        }
        Ok(())
    }
}

/// Declaration-local checks: primary key shape, member-name uniqueness,
/// per-kind option validity.
fn validate_decl(decl: &ModelDecl) -> Result<()> {
    if decl.name.is_empty() || decl.table.is_empty() {
        return Err(Error::config("model name and table must be non-empty"));
    }

    let pk_count = decl.fields.iter().filter(|f| f.primary_key).count();
    if pk_count == 0 {
        return Err(Error::config_for(&decl.name, "no primary key declared"));
    }
    if pk_count > 1 {
        return Err(Error::config_for(
            &decl.name,
            "multiple primary-key fields declared; exactly one is supported",
        ));
    }

    let mut seen = HashSet::new();
    for field in &decl.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(Error::config_for(
                &decl.name,
                format!("duplicate field `{}`", field.name),
            ));
        }
        if field.auto_increment && !field.field_type.is_integer() {
            return Err(Error::config_for(
                &decl.name,
                format!(
                    "field `{}` is auto-increment but not an integer type",
                    field.name
                ),
            ));
        }
        if let Some(pattern) = &field.pattern {
            if !matches!(field.field_type, FieldType::String { .. } | FieldType::Text) {
                return Err(Error::config_for(
                    &decl.name,
                    format!(
                        "field `{}` declares a pattern but is not string-typed",
                        field.name
                    ),
                ));
            }
            if let Some(problem) = crate::validate::validate_pattern(pattern) {
                return Err(Error::config_for(
                    &decl.name,
                    format!("field `{}`: {problem}", field.name),
                ));
            }
        }
    }
    for rel in &decl.relations {
        if !seen.insert(rel.name.as_str()) {
            return Err(Error::config_for(
                &decl.name,
                format!("relation `{}` collides with another member", rel.name),
            ));
        }
        if rel.kind == RelationKind::OneToMany {
            return Err(Error::config_for(
                &decl.name,
                format!(
                    "relation `{}` declares one-to-many directly; declare many-to-one \
                     on `{}` and use the synthesized reverse accessor",
                    rel.name, rel.target
                ),
            ));
        }
        if rel.kind == RelationKind::ManyToMany && rel.fk_column.is_some() {
            return Err(Error::config_for(
                &decl.name,
                format!(
                    "relation `{}`: fk_column applies only to to-one relations",
                    rel.name
                ),
            ));
        }
    }
    Ok(())
}

/// Fields and primary-key index per model, before any relation work.
fn base_descriptors(decls: &[ModelDecl]) -> Result<Vec<ModelDescriptor>> {
    decls
        .iter()
        .map(|decl| {
            let fields: Vec<FieldDescriptor> = decl
                .fields
                .iter()
                .cloned()
                .map(FieldDescriptor::from_decl)
                .collect();
            // validate_decl guaranteed exactly one primary key.
            let pk_index = fields
                .iter()
                .position(|f| f.primary_key)
                .ok_or_else(|| Error::config_for(&decl.name, "no primary key declared"))?;
            Ok(ModelDescriptor {
                name: decl.name.clone(),
                table: decl.table.clone(),
                fields,
                pk_index,
                relations: BTreeMap::new(),
                reverse_relations: BTreeMap::new(),
            })
        })
        .collect()
}

/// Resolve to-one relations: check targets, synthesize foreign-key columns
/// typed after the target's primary key, and record the descriptors.
fn resolve_to_one(
    decls: &[ModelDecl],
    index: &HashMap<String, usize>,
    descs: &mut [ModelDescriptor],
) -> Result<()> {
    for (i, decl) in decls.iter().enumerate() {
        for rel in &decl.relations {
            if !rel.kind.is_to_one() {
                continue;
            }
            let Some(&target_idx) = index.get(&rel.target) else {
                return Err(Error::config_for(
                    &decl.name,
                    format!(
                        "relation `{}` targets model `{}`, which was never registered",
                        rel.name, rel.target
                    ),
                ));
            };
            let target_pk = descs[target_idx].pk_field();
            let fk_type = target_pk.field_type;
            let target_pk_name = target_pk.name.clone();

            let fk_name = rel
                .fk_column
                .clone()
                .unwrap_or_else(|| format!("{}_id", rel.name));
            if descs[i].fields.iter().any(|f| f.name == fk_name) {
                return Err(Error::config_for(
                    &decl.name,
                    format!(
                        "relation `{}` needs column `{fk_name}`, which is already a field",
                        rel.name
                    ),
                ));
            }

            descs[i].fields.push(FieldDescriptor {
                name: fk_name.clone(),
                column: fk_name.clone(),
                field_type: fk_type,
                nullable: rel.nullable,
                primary_key: false,
                auto_increment: false,
                unique: rel.kind == RelationKind::OneToOne,
                default: None,
                pattern: None,
                references: Some(ForeignKeyRef {
                    model: rel.target.clone(),
                    field: target_pk_name,
                    relation: rel.name.clone(),
                }),
            });
            descs[i].relations.insert(
                rel.name.clone(),
                RelationDescriptor {
                    name: rel.name.clone(),
                    source: decl.name.clone(),
                    target: rel.target.clone(),
                    kind: rel.kind,
                    nullable: rel.nullable,
                    on_delete: rel.on_delete,
                    fk_field: Some(fk_name),
                    link: None,
                    reverse_name: None,
                },
            );
        }
    }
    Ok(())
}

/// Wire many-to-many relations to their associative models, reading the two
/// link columns off the through model's freshly synthesized foreign keys.
fn resolve_many_to_many(
    decls: &[ModelDecl],
    index: &HashMap<String, usize>,
    descs: &mut [ModelDescriptor],
) -> Result<()> {
    for (i, decl) in decls.iter().enumerate() {
        for rel in &decl.relations {
            if rel.kind != RelationKind::ManyToMany {
                continue;
            }
            if !index.contains_key(&rel.target) {
                return Err(Error::config_for(
                    &decl.name,
                    format!(
                        "relation `{}` targets model `{}`, which was never registered",
                        rel.name, rel.target
                    ),
                ));
            }
            // synthesize_through_models filled this in for the implicit case.
            let Some(through_name) = rel.through.as_ref() else {
                return Err(Error::config_for(
                    &decl.name,
                    format!("relation `{}` has no through model", rel.name),
                ));
            };
            let Some(&through_idx) = index.get(through_name) else {
                return Err(Error::config_for(
                    &decl.name,
                    format!(
                        "relation `{}` names through model `{through_name}`, \
                         which was never registered",
                        rel.name
                    ),
                ));
            };

            let link = link_info(
                &decls[through_idx],
                &descs[through_idx],
                &decl.name,
                &rel.target,
            )
            .ok_or_else(|| {
                Error::config_for(
                    &decl.name,
                    format!(
                        "through model `{through_name}` must declare to-one relations \
                         to both `{}` and `{}`",
                        decl.name, rel.target
                    ),
                )
            })?;

            descs[i].relations.insert(
                rel.name.clone(),
                RelationDescriptor {
                    name: rel.name.clone(),
                    source: decl.name.clone(),
                    target: rel.target.clone(),
                    kind: RelationKind::ManyToMany,
                    nullable: false,
                    on_delete: rel.on_delete,
                    fk_field: None,
                    link: Some(link),
                    reverse_name: None,
                },
            );
        }
    }
    Ok(())
}

/// Extract link columns from a through model, walking its relations in
/// declaration order so self-referential pairs resolve deterministically.
fn link_info(
    through_decl: &ModelDecl,
    through_desc: &ModelDescriptor,
    source: &str,
    target: &str,
) -> Option<LinkInfo> {
    let mut source_column = None;
    let mut target_column = None;
    for rel in &through_decl.relations {
        if !rel.kind.is_to_one() {
            continue;
        }
        let column = through_desc
            .relations
            .get(&rel.name)
            .and_then(|r| r.fk_field.as_deref())
            .and_then(|f| through_desc.field(f))
            .map(|f| f.column.clone())?;
        if rel.target == source && source_column.is_none() {
            source_column = Some(column);
        } else if rel.target == target && target_column.is_none() {
            target_column = Some(column);
        }
    }
    Some(LinkInfo {
        model: through_decl.name.clone(),
        table: through_decl.table.clone(),
        source_column: source_column?,
        target_column: target_column?,
    })
}

/// Synthesize reverse accessors on relation targets, rejecting collisions.
fn synthesize_reverses(
    decls: &[ModelDecl],
    index: &HashMap<String, usize>,
    descs: &mut [ModelDescriptor],
) -> Result<()> {
    let mut planned: Vec<(usize, ReverseRelationDescriptor)> = Vec::new();
    let mut taken: HashSet<(usize, String)> = HashSet::new();

    for decl in decls {
        let source_idx = index[&decl.name];
        for rel in &decl.relations {
            let reverse_name = match &rel.reverse {
                ReverseSpec::Suppressed => continue,
                ReverseSpec::Named(name) => name.clone(),
                ReverseSpec::Default => default_reverse_name(&decl.name),
            };
            let target_idx = index[&rel.target];
            if descs[target_idx].has_member(&reverse_name)
                || !taken.insert((target_idx, reverse_name.clone()))
            {
                return Err(Error::config_for(
                    &rel.target,
                    format!(
                        "reverse accessor `{reverse_name}` (from `{}.{}`) collides with \
                         an existing member; set an explicit reverse name or suppress it",
                        decl.name, rel.name
                    ),
                ));
            }
            tracing::debug!(
                model = %rel.target,
                accessor = %reverse_name,
                source = %decl.name,
                relation = %rel.name,
                "reverse accessor synthesized"
            );
            planned.push((
                target_idx,
                ReverseRelationDescriptor {
                    name: reverse_name.clone(),
                    model: rel.target.clone(),
                    target: decl.name.clone(),
                    kind: rel.kind.reverse(),
                    forward_relation: rel.name.clone(),
                },
            ));
            if let Some(forward) = descs[source_idx].relations.get_mut(&rel.name) {
                forward.reverse_name = Some(reverse_name);
            }
        }
    }

    for (target_idx, reverse) in planned {
        descs[target_idx]
            .reverse_relations
            .insert(reverse.name.clone(), reverse);
    }
    Ok(())
}

// ============================================================================
// Sealed phase
// ============================================================================

/// The sealed, read-only model registry.
///
/// Constructed once at startup via [`RegistryBuilder::finalize`] and shared
/// by reference afterwards. Test harnesses reset by building a fresh one.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    order: Vec<String>,
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn get(&self, model: &str) -> Option<&ModelDescriptor> {
        self.models.get(model)
    }

    /// Like [`get`](Self::get) but failing with a configuration error, for
    /// call sites where an unknown model is a caller bug.
    pub fn require(&self, model: &str) -> Result<&ModelDescriptor> {
        self.models
            .get(model)
            .ok_or_else(|| Error::config(format!("model `{model}` is not registered")))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Descriptors in registration order (synthesized models last).
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.order.iter().filter_map(|name| self.models.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDecl, FieldType};
    use crate::relation::DeleteRule;

    fn author_decl() -> ModelDecl {
        ModelDecl::new("Author", "authors")
            .field(
                FieldDecl::new("id", FieldType::BigInteger)
                    .primary_key(true)
                    .auto_increment(true),
            )
            .field(FieldDecl::new("name", FieldType::Text))
    }

    fn book_decl() -> ModelDecl {
        ModelDecl::new("Book", "books")
            .field(
                FieldDecl::new("id", FieldType::BigInteger)
                    .primary_key(true)
                    .auto_increment(true),
            )
            .field(FieldDecl::new("title", FieldType::Text))
            .relation(RelationDecl::many_to_one("author", "Author"))
    }

    #[test]
    fn test_round_trip_registration() {
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        builder.register(book_decl()).unwrap();
        let registry = builder.finalize().unwrap();

        let book = registry.get("Book").unwrap();
        assert_eq!(book.table, "books");
        assert_eq!(book.pk_name(), "id");

        let author_rel = book.relation("author").unwrap();
        assert_eq!(author_rel.target, "Author");
        assert_eq!(author_rel.fk_field.as_deref(), Some("author_id"));
        assert_eq!(author_rel.reverse_name.as_deref(), Some("books"));

        let fk = book.field("author_id").unwrap();
        assert!(fk.is_foreign_key());
        assert_eq!(fk.field_type, FieldType::BigInteger);
        assert_eq!(fk.references.as_ref().unwrap().model, "Author");
    }

    #[test]
    fn test_forward_reference_resolves_at_finalize() {
        // Book registered before Author.
        let mut builder = RegistryBuilder::new();
        builder.register(book_decl()).unwrap();
        builder.register(author_decl()).unwrap();
        let registry = builder.finalize().unwrap();
        assert!(registry.get("Author").unwrap().reverse_relation("books").is_some());
    }

    #[test]
    fn test_unresolved_target_is_fatal() {
        let mut builder = RegistryBuilder::new();
        builder.register(book_decl()).unwrap();
        let err = builder.finalize().unwrap_err();
        assert!(err.to_string().contains("never registered"), "{err}");
    }

    #[test]
    fn test_every_many_to_one_gets_exactly_one_reverse() {
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        builder.register(book_decl()).unwrap();
        let registry = builder.finalize().unwrap();

        let author = registry.get("Author").unwrap();
        let reverses: Vec<_> = author.reverse_relations.values().collect();
        assert_eq!(reverses.len(), 1);
        assert_eq!(reverses[0].name, "books");
        assert_eq!(reverses[0].kind, RelationKind::OneToMany);
        assert_eq!(reverses[0].forward_relation, "author");
    }

    #[test]
    fn test_suppressed_reverse_is_absent() {
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        let mut book = book_decl();
        book.relations[0] = RelationDecl::many_to_one("author", "Author").suppress_reverse();
        builder.register(book).unwrap();
        let registry = builder.finalize().unwrap();
        assert!(registry.get("Author").unwrap().reverse_relations.is_empty());
    }

    #[test]
    fn test_duplicate_model_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        let err = builder.register(author_decl()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        let mut twin = author_decl();
        twin.name = "Writer".into();
        let err = builder.register(twin).unwrap_err();
        assert!(err.to_string().contains("already mapped"), "{err}");
    }

    #[test]
    fn test_missing_primary_key_rejected() {
        let decl = ModelDecl::new("Note", "notes").field(FieldDecl::new("body", FieldType::Text));
        let err = RegistryBuilder::new().register(decl).unwrap_err();
        assert!(err.to_string().contains("no primary key"), "{err}");
    }

    #[test]
    fn test_relation_field_collision_rejected() {
        let decl = ModelDecl::new("Book", "books")
            .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
            .field(FieldDecl::new("author", FieldType::Text))
            .relation(RelationDecl::many_to_one("author", "Author"));
        let err = RegistryBuilder::new().register(decl).unwrap_err();
        assert!(err.to_string().contains("collides"), "{err}");
    }

    #[test]
    fn test_relation_redefinition_rejected() {
        let decl = ModelDecl::new("Book", "books")
            .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
            .relation(RelationDecl::many_to_one("author", "Author"))
            .relation(RelationDecl::one_to_one("author", "Author"));
        let err = RegistryBuilder::new().register(decl).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_direct_one_to_many_rejected() {
        let rel = RelationDecl {
            kind: RelationKind::OneToMany,
            ..RelationDecl::many_to_one("books", "Book")
        };
        let decl = ModelDecl::new("Author", "authors")
            .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
            .relation(rel);
        let err = RegistryBuilder::new().register(decl).unwrap_err();
        assert!(err.to_string().contains("one-to-many"), "{err}");
    }

    #[test]
    fn test_default_reverse_collision_needs_override() {
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        let decl = ModelDecl::new("Book", "books")
            .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
            .relation(RelationDecl::many_to_one("author", "Author"))
            .relation(RelationDecl::many_to_one("editor", "Author"));
        builder.register(decl).unwrap();
        let err = builder.finalize().unwrap_err();
        assert!(err.to_string().contains("reverse accessor `books`"), "{err}");

        // Same shape with an explicit name on the second edge succeeds.
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        let decl = ModelDecl::new("Book", "books")
            .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
            .relation(RelationDecl::many_to_one("author", "Author"))
            .relation(RelationDecl::many_to_one("editor", "Author").reverse_name("edited_books"));
        builder.register(decl).unwrap();
        let registry = builder.finalize().unwrap();
        let author = registry.get("Author").unwrap();
        assert!(author.reverse_relation("books").is_some());
        assert!(author.reverse_relation("edited_books").is_some());
    }

    #[test]
    fn test_self_reference_allows_cycles() {
        let decl = ModelDecl::new("Category", "categories")
            .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
            .field(FieldDecl::new("name", FieldType::Text))
            .relation(
                RelationDecl::many_to_one("parent", "Category")
                    .nullable(true)
                    .reverse_name("children"),
            );
        let mut builder = RegistryBuilder::new();
        builder.register(decl).unwrap();
        let registry = builder.finalize().unwrap();
        let category = registry.get("Category").unwrap();
        assert_eq!(category.relation("parent").unwrap().target, "Category");
        assert_eq!(
            category.reverse_relation("children").unwrap().target,
            "Category"
        );
    }

    #[test]
    fn test_many_to_many_synthesizes_through_model() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ModelDecl::new("Book", "books")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .relation(RelationDecl::many_to_many("tags", "Tag")),
            )
            .unwrap();
        builder
            .register(
                ModelDecl::new("Tag", "tags")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .field(FieldDecl::new("label", FieldType::Text)),
            )
            .unwrap();
        let registry = builder.finalize().unwrap();

        let link = registry.get("BookTagLink").unwrap();
        assert_eq!(link.table, "books_tags");
        assert!(link.field("book_id").is_some());
        assert!(link.field("tag_id").is_some());

        let rel = registry.get("Book").unwrap().relation("tags").unwrap();
        let info = rel.link.as_ref().unwrap();
        assert_eq!(info.model, "BookTagLink");
        assert_eq!(info.source_column, "book_id");
        assert_eq!(info.target_column, "tag_id");
    }

    #[test]
    fn test_explicit_through_model() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ModelDecl::new("Book", "books")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .relation(RelationDecl::many_to_many("tags", "Tag").through("BookTag")),
            )
            .unwrap();
        builder
            .register(
                ModelDecl::new("Tag", "tags")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true)),
            )
            .unwrap();
        builder
            .register(
                ModelDecl::new("BookTag", "book_tags")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .relation(RelationDecl::many_to_one("book", "Book").suppress_reverse())
                    .relation(RelationDecl::many_to_one("tag", "Tag").suppress_reverse()),
            )
            .unwrap();
        let registry = builder.finalize().unwrap();
        let info = registry
            .get("Book")
            .unwrap()
            .relation("tags")
            .unwrap()
            .link
            .clone()
            .unwrap();
        assert_eq!(info.table, "book_tags");
        assert_eq!(info.source_column, "book_id");
        assert_eq!(info.target_column, "tag_id");
    }

    #[test]
    fn test_through_model_missing_endpoint_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ModelDecl::new("Book", "books")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .relation(RelationDecl::many_to_many("tags", "Tag").through("BookTag")),
            )
            .unwrap();
        builder
            .register(
                ModelDecl::new("Tag", "tags")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true)),
            )
            .unwrap();
        builder
            .register(
                ModelDecl::new("BookTag", "book_tags")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .relation(RelationDecl::many_to_one("book", "Book").suppress_reverse()),
            )
            .unwrap();
        let err = builder.finalize().unwrap_err();
        assert!(err.to_string().contains("through model"), "{err}");
    }

    #[test]
    fn test_on_delete_recorded() {
        let mut builder = RegistryBuilder::new();
        builder.register(author_decl()).unwrap();
        let mut book = book_decl();
        book.relations[0] =
            RelationDecl::many_to_one("author", "Author").on_delete(DeleteRule::Cascade);
        builder.register(book).unwrap();
        let registry = builder.finalize().unwrap();
        assert_eq!(
            registry
                .get("Book")
                .unwrap()
                .relation("author")
                .unwrap()
                .on_delete,
            DeleteRule::Cascade
        );
    }

    #[test]
    fn test_iteration_in_registration_order() {
        let mut builder = RegistryBuilder::new();
        builder.register(book_decl()).unwrap();
        builder.register(author_decl()).unwrap();
        let registry = builder.finalize().unwrap();
        let names: Vec<_> = registry.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Book", "Author"]);
    }

    #[test]
    fn test_require_unknown_model() {
        let registry = RegistryBuilder::new().finalize().unwrap();
        let err = registry.require("Ghost").unwrap_err();
        assert!(err.to_string().contains("not registered"), "{err}");
    }
}
