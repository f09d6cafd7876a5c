//! Model declarations and sealed model descriptors.
//!
//! A [`ModelDecl`] is the plain configuration value application code builds
//! at startup: a name, a table, fields, relations. Registration turns it
//! into a [`ModelDescriptor`], which adds synthesized foreign-key columns,
//! resolved relation edges, and reverse accessors. Descriptors live in the
//! registry arena and refer to one another by model name only.

use crate::field::{FieldDecl, FieldDescriptor};
use crate::relation::{RelationDecl, RelationDescriptor, ReverseRelationDescriptor};
use std::collections::BTreeMap;

/// One model as declared by application code.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDecl {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDecl>,
    pub relations: Vec<RelationDecl>,
}

impl ModelDecl {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDecl) -> Self {
        self.relations.push(relation);
        self
    }
}

/// Registered schema and relation metadata for one model.
///
/// Field order is declaration order with synthesized foreign-key columns
/// appended; relation maps are name-keyed for deterministic iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
    /// Index into `fields` of the primary-key field.
    pub pk_index: usize,
    pub relations: BTreeMap<String, RelationDescriptor>,
    pub reverse_relations: BTreeMap<String, ReverseRelationDescriptor>,
}

impl ModelDescriptor {
    /// The primary-key field. Registration guarantees exactly one exists.
    pub fn pk_field(&self) -> &FieldDescriptor {
        &self.fields[self.pk_index]
    }

    /// Name of the primary-key field.
    pub fn pk_name(&self) -> &str {
        &self.pk_field().name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    pub fn reverse_relation(&self, name: &str) -> Option<&ReverseRelationDescriptor> {
        self.reverse_relations.get(name)
    }

    /// True when `name` is taken by a field, relation, or reverse accessor.
    pub fn has_member(&self, name: &str) -> bool {
        self.field(name).is_some()
            || self.relations.contains_key(name)
            || self.reverse_relations.contains_key(name)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDecl, FieldType};
    use crate::relation::RelationDecl;

    fn sample_descriptor() -> ModelDescriptor {
        ModelDescriptor {
            name: "Book".into(),
            table: "books".into(),
            fields: vec![
                FieldDescriptor::from_decl(
                    FieldDecl::new("id", FieldType::BigInteger).primary_key(true),
                ),
                FieldDescriptor::from_decl(FieldDecl::new("title", FieldType::Text)),
            ],
            pk_index: 0,
            relations: BTreeMap::new(),
            reverse_relations: BTreeMap::new(),
        }
    }

    #[test]
    fn test_decl_accumulates_members() {
        let decl = ModelDecl::new("Book", "books")
            .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true))
            .field(FieldDecl::new("title", FieldType::Text))
            .relation(RelationDecl::many_to_one("author", "Author"));
        assert_eq!(decl.fields.len(), 2);
        assert_eq!(decl.relations.len(), 1);
    }

    #[test]
    fn test_pk_lookup() {
        let desc = sample_descriptor();
        assert_eq!(desc.pk_name(), "id");
        assert!(desc.pk_field().primary_key);
    }

    #[test]
    fn test_member_lookup() {
        let desc = sample_descriptor();
        assert!(desc.has_member("title"));
        assert!(!desc.has_member("author"));
        assert_eq!(desc.field("title").map(|f| f.column.as_str()), Some("title"));
    }
}
