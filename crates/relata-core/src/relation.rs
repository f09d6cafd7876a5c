//! Relation declarations and descriptors.
//!
//! # Role
//!
//! Relations are declared on the side that owns the foreign key (to-one) or
//! on either side (many-to-many, via an associative model). The registry
//! turns declarations into [`RelationDescriptor`]s, synthesizes the
//! foreign-key column on the source model, and, unless suppressed, a
//! [`ReverseRelationDescriptor`] on the target so paths can be traversed in
//! both directions.
//!
//! # Example
//!
//! ```
//! use relata_core::relation::{DeleteRule, RelationDecl};
//!
//! let author = RelationDecl::many_to_one("author", "Author")
//!     .on_delete(DeleteRule::Restrict);
//! let tags = RelationDecl::many_to_many("tags", "Tag").through("BookTag");
//! ```

use std::fmt;

// ============================================================================
// Cardinality
// ============================================================================

/// Cardinality of a relation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationKind {
    /// Exactly one on both sides; foreign key on the declaring side.
    OneToOne,
    /// Many declaring rows point at one target row (foreign key here).
    #[default]
    ManyToOne,
    /// Reverse of many-to-one; never declared directly.
    OneToMany,
    /// Linked through an associative table.
    ManyToMany,
}

impl RelationKind {
    /// True when at most one related instance exists (joinable in one trip).
    pub fn is_to_one(&self) -> bool {
        matches!(self, RelationKind::OneToOne | RelationKind::ManyToOne)
    }

    /// True when the related side is a collection.
    pub fn is_to_many(&self) -> bool {
        !self.is_to_one()
    }

    /// Cardinality seen from the other end of the edge.
    pub fn reverse(&self) -> Self {
        match self {
            RelationKind::OneToOne => RelationKind::OneToOne,
            RelationKind::ManyToOne => RelationKind::OneToMany,
            RelationKind::OneToMany => RelationKind::ManyToOne,
            RelationKind::ManyToMany => RelationKind::ManyToMany,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneToOne => "one-to-one",
            RelationKind::ManyToOne => "many-to-one",
            RelationKind::OneToMany => "one-to-many",
            RelationKind::ManyToMany => "many-to-many",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the database should do with dependent rows when the target row is
/// deleted. Enforcement lives in the database; the descriptor only records
/// the declared intent for schema tooling and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteRule {
    #[default]
    Restrict,
    Cascade,
    SetNull,
}

impl DeleteRule {
    pub fn as_sql(&self) -> &'static str {
        match self {
            DeleteRule::Restrict => "RESTRICT",
            DeleteRule::Cascade => "CASCADE",
            DeleteRule::SetNull => "SET NULL",
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// How the reverse accessor on the target model should be named.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReverseSpec {
    /// Source model name lowercased + `"s"`.
    #[default]
    Default,
    /// Explicit accessor name.
    Named(String),
    /// No reverse accessor at all.
    Suppressed,
}

/// One relation as declared by application code.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDecl {
    pub name: String,
    /// Target model name; may be registered later (forward reference).
    pub target: String,
    pub kind: RelationKind,
    /// Foreign-key column override; defaults to `"{name}_id"`.
    pub fk_column: Option<String>,
    /// Whether the synthesized foreign-key column accepts NULL.
    pub nullable: bool,
    pub on_delete: DeleteRule,
    pub reverse: ReverseSpec,
    /// Associative model for many-to-many; `None` asks the registry to
    /// synthesize one at finalize time.
    pub through: Option<String>,
}

impl RelationDecl {
    fn new(name: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
            fk_column: None,
            nullable: false,
            on_delete: DeleteRule::default(),
            reverse: ReverseSpec::default(),
            through: None,
        }
    }

    /// Foreign key on this model, one target row per source row.
    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, RelationKind::ManyToOne)
    }

    /// Foreign key on this model with a uniqueness contract.
    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, RelationKind::OneToOne)
    }

    /// Linked through an associative model.
    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, RelationKind::ManyToMany)
    }

    #[must_use]
    pub fn fk_column(mut self, column: impl Into<String>) -> Self {
        self.fk_column = Some(column.into());
        self
    }

    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    #[must_use]
    pub fn on_delete(mut self, rule: DeleteRule) -> Self {
        self.on_delete = rule;
        self
    }

    /// Name the reverse accessor instead of the default.
    #[must_use]
    pub fn reverse_name(mut self, name: impl Into<String>) -> Self {
        self.reverse = ReverseSpec::Named(name.into());
        self
    }

    /// Do not synthesize a reverse accessor.
    #[must_use]
    pub fn suppress_reverse(mut self) -> Self {
        self.reverse = ReverseSpec::Suppressed;
        self
    }

    /// Use an explicitly registered associative model.
    #[must_use]
    pub fn through(mut self, model: impl Into<String>) -> Self {
        self.through = Some(model.into());
        self
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Associative-table wiring for a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// The associative model's name.
    pub model: String,
    /// The associative model's table.
    pub table: String,
    /// Column on the associative table referencing the source model's key.
    pub source_column: String,
    /// Column on the associative table referencing the target model's key.
    pub target_column: String,
}

/// A sealed, registry-owned relation edge.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDescriptor {
    pub name: String,
    /// Model the relation is declared on.
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
    pub nullable: bool,
    pub on_delete: DeleteRule,
    /// Field on the source model holding the foreign key (to-one only).
    pub fk_field: Option<String>,
    /// Associative wiring (many-to-many only).
    pub link: Option<LinkInfo>,
    /// Accessor synthesized on the target; `None` when suppressed.
    pub reverse_name: Option<String>,
}

/// The incoming side of a relation, synthesized on the target model.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseRelationDescriptor {
    /// Accessor name on the owning (target) model.
    pub name: String,
    /// Model this reverse accessor lives on.
    pub model: String,
    /// Model reached by traversing the accessor.
    pub target: String,
    /// Cardinality as seen from this side.
    pub kind: RelationKind,
    /// Name of the forward relation on `target` that produced this accessor.
    pub forward_relation: String,
}

/// Default reverse-accessor name for a relation declared on `source_model`.
pub fn default_reverse_name(source_model: &str) -> String {
    let mut name = source_model.to_lowercase();
    name.push('s');
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_reverse_pairs() {
        assert_eq!(RelationKind::ManyToOne.reverse(), RelationKind::OneToMany);
        assert_eq!(RelationKind::OneToMany.reverse(), RelationKind::ManyToOne);
        assert_eq!(RelationKind::OneToOne.reverse(), RelationKind::OneToOne);
        assert_eq!(RelationKind::ManyToMany.reverse(), RelationKind::ManyToMany);
    }

    #[test]
    fn test_kind_classification() {
        assert!(RelationKind::ManyToOne.is_to_one());
        assert!(RelationKind::OneToOne.is_to_one());
        assert!(RelationKind::OneToMany.is_to_many());
        assert!(RelationKind::ManyToMany.is_to_many());
    }

    #[test]
    fn test_decl_builders() {
        let rel = RelationDecl::many_to_one("author", "Author")
            .fk_column("written_by")
            .nullable(true)
            .on_delete(DeleteRule::Cascade)
            .reverse_name("books");
        assert_eq!(rel.kind, RelationKind::ManyToOne);
        assert_eq!(rel.fk_column.as_deref(), Some("written_by"));
        assert!(rel.nullable);
        assert_eq!(rel.on_delete, DeleteRule::Cascade);
        assert_eq!(rel.reverse, ReverseSpec::Named("books".into()));
    }

    #[test]
    fn test_many_to_many_through() {
        let rel = RelationDecl::many_to_many("tags", "Tag").through("BookTag");
        assert_eq!(rel.through.as_deref(), Some("BookTag"));
        assert_eq!(rel.kind, RelationKind::ManyToMany);
    }

    #[test]
    fn test_default_reverse_name() {
        assert_eq!(default_reverse_name("Book"), "books");
        assert_eq!(default_reverse_name("Category"), "categorys");
    }

    #[test]
    fn test_delete_rule_sql() {
        assert_eq!(DeleteRule::Restrict.as_sql(), "RESTRICT");
        assert_eq!(DeleteRule::SetNull.as_sql(), "SET NULL");
    }
}
