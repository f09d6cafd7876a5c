//! Relation graph traversal over the sealed registry.
//!
//! # Role
//!
//! [`RelationGraph`] is a borrowed view that answers two questions: which
//! edges leave/enter a model, and what exact hop sequence a dot path
//! denotes. Resolution follows only the segments it is given, so cyclic
//! graphs (self-referential `parent` relations and the like) are harmless;
//! depth is always bounded by the path the caller wrote.

use crate::error::{Error, Result};
use crate::path::RelationPath;
use crate::registry::ModelRegistry;
use crate::relation::{RelationDescriptor, RelationKind, ReverseRelationDescriptor};

/// One resolved hop of a relation path.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationStep {
    /// The path segment that produced this hop.
    pub segment: String,
    /// Model at the start of the hop.
    pub source: String,
    /// Model reached by the hop.
    pub target: String,
    /// Cardinality as traversed (reverse hops are already inverted).
    pub kind: RelationKind,
    pub join: JoinKeys,
}

/// Physical join wiring for one hop, in column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKeys {
    /// Foreign key on the source table referencing the target's primary key.
    ForeignKey { column: String, target_pk: String },
    /// Foreign key on the target table referencing the source's primary key.
    ReverseKey { source_pk: String, column: String },
    /// Hop through an associative table.
    Link {
        table: String,
        /// Link column referencing the source side.
        source_column: String,
        /// Link column referencing the target side.
        target_column: String,
        source_pk: String,
        target_pk: String,
    },
}

/// Borrowed graph view over a sealed registry.
#[derive(Debug, Clone, Copy)]
pub struct RelationGraph<'r> {
    registry: &'r ModelRegistry,
}

impl<'r> RelationGraph<'r> {
    pub fn new(registry: &'r ModelRegistry) -> Self {
        Self { registry }
    }

    /// Relations declared on `model`.
    pub fn outgoing(&self, model: &str) -> Result<impl Iterator<Item = &'r RelationDescriptor>> {
        Ok(self.registry.require(model)?.relations.values())
    }

    /// Reverse accessors synthesized onto `model`.
    pub fn incoming(
        &self,
        model: &str,
    ) -> Result<impl Iterator<Item = &'r ReverseRelationDescriptor>> {
        Ok(self.registry.require(model)?.reverse_relations.values())
    }

    /// Resolve a dot path rooted at `model` into ordered hops.
    ///
    /// Each segment must name a forward relation or a reverse accessor on
    /// the model reached so far; anything else is an
    /// [`UnknownRelationError`](crate::error::UnknownRelationError).
    pub fn resolve_path(&self, model: &str, path: &RelationPath) -> Result<Vec<RelationStep>> {
        let mut steps = Vec::with_capacity(path.len());
        let mut current = self.registry.require(model)?;
        for segment in path.segments() {
            let step = if let Some(rel) = current.relation(segment) {
                self.forward_step(segment, rel)?
            } else if let Some(rev) = current.reverse_relation(segment) {
                self.reverse_step(segment, rev)?
            } else {
                return Err(Error::unknown_relation(
                    &current.name,
                    segment,
                    path.to_string(),
                ));
            };
            current = self.registry.require(&step.target)?;
            steps.push(step);
        }
        Ok(steps)
    }

    /// True when every hop of the path is to-one (joinable in one trip).
    pub fn path_is_to_one(&self, model: &str, path: &RelationPath) -> Result<bool> {
        Ok(self
            .resolve_path(model, path)?
            .iter()
            .all(|s| s.kind.is_to_one()))
    }

    fn forward_step(&self, segment: &str, rel: &RelationDescriptor) -> Result<RelationStep> {
        let target = self.registry.require(&rel.target)?;
        let join = match rel.kind {
            RelationKind::OneToOne | RelationKind::ManyToOne => {
                let column = self.fk_column(rel)?;
                JoinKeys::ForeignKey {
                    column,
                    target_pk: target.pk_field().column.clone(),
                }
            }
            RelationKind::ManyToMany => {
                let source = self.registry.require(&rel.source)?;
                let link = rel.link.as_ref().ok_or_else(|| {
                    Error::config_for(
                        &rel.source,
                        format!("relation `{}` lost its link wiring", rel.name),
                    )
                })?;
                JoinKeys::Link {
                    table: link.table.clone(),
                    source_column: link.source_column.clone(),
                    target_column: link.target_column.clone(),
                    source_pk: source.pk_field().column.clone(),
                    target_pk: target.pk_field().column.clone(),
                }
            }
            // Forward descriptors are never one-to-many; the registry only
            // creates that cardinality on the reverse side.
            RelationKind::OneToMany => {
                return Err(Error::config_for(
                    &rel.source,
                    format!("relation `{}` has impossible forward cardinality", rel.name),
                ));
            }
        };
        Ok(RelationStep {
            segment: segment.to_string(),
            source: rel.source.clone(),
            target: rel.target.clone(),
            kind: rel.kind,
            join,
        })
    }

    fn reverse_step(&self, segment: &str, rev: &ReverseRelationDescriptor) -> Result<RelationStep> {
        let owner = self.registry.require(&rev.model)?;
        let far = self.registry.require(&rev.target)?;
        let forward = far.relation(&rev.forward_relation).ok_or_else(|| {
            Error::config_for(
                &rev.target,
                format!(
                    "reverse accessor `{}` references missing relation `{}`",
                    rev.name, rev.forward_relation
                ),
            )
        })?;
        let join = match forward.kind {
            RelationKind::OneToOne | RelationKind::ManyToOne => JoinKeys::ReverseKey {
                source_pk: owner.pk_field().column.clone(),
                column: self.fk_column(forward)?,
            },
            RelationKind::ManyToMany => {
                let link = forward.link.as_ref().ok_or_else(|| {
                    Error::config_for(
                        &forward.source,
                        format!("relation `{}` lost its link wiring", forward.name),
                    )
                })?;
                // Seen from this side the link columns swap roles.
                JoinKeys::Link {
                    table: link.table.clone(),
                    source_column: link.target_column.clone(),
                    target_column: link.source_column.clone(),
                    source_pk: owner.pk_field().column.clone(),
                    target_pk: far.pk_field().column.clone(),
                }
            }
            RelationKind::OneToMany => {
                return Err(Error::config_for(
                    &forward.source,
                    format!(
                        "relation `{}` has impossible forward cardinality",
                        forward.name
                    ),
                ));
            }
        };
        Ok(RelationStep {
            segment: segment.to_string(),
            source: rev.model.clone(),
            target: rev.target.clone(),
            kind: rev.kind,
            join,
        })
    }

    /// Column of the foreign-key field backing a to-one relation.
    fn fk_column(&self, rel: &RelationDescriptor) -> Result<String> {
        let source = self.registry.require(&rel.source)?;
        rel.fk_field
            .as_deref()
            .and_then(|f| source.field(f))
            .map(|f| f.column.clone())
            .ok_or_else(|| {
                Error::config_for(
                    &rel.source,
                    format!("relation `{}` lost its foreign-key field", rel.name),
                )
            })
    }
}

impl ModelRegistry {
    /// Graph view over this registry.
    pub fn graph(&self) -> RelationGraph<'_> {
        RelationGraph::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDecl, FieldType};
    use crate::model::ModelDecl;
    use crate::registry::RegistryBuilder;
    use crate::relation::RelationDecl;

    fn library_registry() -> ModelRegistry {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ModelDecl::new("Publisher", "publishers")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .field(FieldDecl::new("name", FieldType::Text)),
            )
            .unwrap();
        builder
            .register(
                ModelDecl::new("Author", "authors")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .field(FieldDecl::new("name", FieldType::Text))
                    .relation(RelationDecl::many_to_one("publisher", "Publisher")),
            )
            .unwrap();
        builder
            .register(
                ModelDecl::new("Book", "books")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .field(FieldDecl::new("title", FieldType::Text))
                    .relation(RelationDecl::many_to_one("author", "Author"))
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
        builder.finalize().unwrap()
    }

    #[test]
    fn test_forward_nested_path() {
        let registry = library_registry();
        let steps = registry
            .graph()
            .resolve_path("Book", &RelationPath::parse("author.publisher"))
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].source, "Book");
        assert_eq!(steps[0].target, "Author");
        assert_eq!(
            steps[0].join,
            JoinKeys::ForeignKey {
                column: "author_id".into(),
                target_pk: "id".into()
            }
        );
        assert_eq!(steps[1].target, "Publisher");
        assert!(steps.iter().all(|s| s.kind.is_to_one()));
    }

    #[test]
    fn test_reverse_path() {
        let registry = library_registry();
        let steps = registry
            .graph()
            .resolve_path("Author", &RelationPath::parse("books"))
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, RelationKind::OneToMany);
        assert_eq!(
            steps[0].join,
            JoinKeys::ReverseKey {
                source_pk: "id".into(),
                column: "author_id".into()
            }
        );
    }

    #[test]
    fn test_many_to_many_paths_swap_link_columns() {
        let registry = library_registry();
        let graph = registry.graph();

        let forward = graph
            .resolve_path("Book", &RelationPath::parse("tags"))
            .unwrap();
        let JoinKeys::Link {
            source_column,
            target_column,
            ..
        } = &forward[0].join
        else {
            panic!("expected link join");
        };
        assert_eq!(source_column, "book_id");
        assert_eq!(target_column, "tag_id");

        let reverse = graph
            .resolve_path("Tag", &RelationPath::parse("books"))
            .unwrap();
        let JoinKeys::Link {
            source_column,
            target_column,
            ..
        } = &reverse[0].join
        else {
            panic!("expected link join");
        };
        assert_eq!(source_column, "tag_id");
        assert_eq!(target_column, "book_id");
    }

    #[test]
    fn test_unknown_segment_reports_position() {
        let registry = library_registry();
        let err = registry
            .graph()
            .resolve_path("Book", &RelationPath::parse("author.publishers"))
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("`publishers`"), "{text}");
        assert!(text.contains("`Author`"), "{text}");
        assert!(text.contains("`author.publishers`"), "{text}");
    }

    #[test]
    fn test_cycles_bounded_by_path() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                ModelDecl::new("Category", "categories")
                    .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
                    .relation(
                        RelationDecl::many_to_one("parent", "Category")
                            .nullable(true)
                            .reverse_name("children"),
                    ),
            )
            .unwrap();
        let registry = builder.finalize().unwrap();
        let steps = registry
            .graph()
            .resolve_path("Category", &RelationPath::parse("parent.parent.children"))
            .unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].kind, RelationKind::OneToMany);
    }

    #[test]
    fn test_to_one_classification() {
        let registry = library_registry();
        let graph = registry.graph();
        assert!(graph
            .path_is_to_one("Book", &RelationPath::parse("author.publisher"))
            .unwrap());
        assert!(!graph
            .path_is_to_one("Author", &RelationPath::parse("books"))
            .unwrap());
    }

    #[test]
    fn test_outgoing_incoming_views() {
        let registry = library_registry();
        let graph = registry.graph();
        let outgoing: Vec<_> = graph
            .outgoing("Book")
            .unwrap()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(outgoing, vec!["author".to_string(), "tags".to_string()]);
        let incoming: Vec<_> = graph
            .incoming("Author")
            .unwrap()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(incoming, vec!["books".to_string()]);
    }
}
