//! relata: a runtime-registered relational mapper core.
//!
//! Models are declared at startup as plain data, sealed into a
//! [`ModelRegistry`], and driven through an [`Engine`] that pairs the
//! registry with three pluggable collaborators: a [`Validator`], a
//! [`StatementCompiler`], and an async [`Driver`]. Reads plan into
//! parameterized statements with eager joins and batched prefetches; rows
//! hydrate back into dynamic [`Instance`] graphs.
//!
//! This facade re-exports the public surface of the workspace crates so
//! applications depend on `relata` alone:
//!
//! - `relata-core`: declarations, registry, relation graph, values,
//!   instances, rows, errors, and the collaborator traits
//! - `relata-query`: the query builder, planner, ANSI compiler, executor,
//!   and hydrator
//! - `relata-session`: the write engine, related-save cascade, link
//!   maintenance, and lifecycle signals
//!
//! # Example
//!
//! ```ignore
//! use relata::prelude::*;
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register(
//!     ModelDecl::new("Author", "authors")
//!         .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true).auto_increment(true))
//!         .field(FieldDecl::new("name", FieldType::Text)),
//! )?;
//! builder.register(
//!     ModelDecl::new("Book", "books")
//!         .field(FieldDecl::new("id", FieldType::BigInteger).primary_key(true).auto_increment(true))
//!         .field(FieldDecl::new("title", FieldType::Text))
//!         .relation(RelationDecl::many_to_one("author", "Author")),
//! )?;
//! let registry = builder.finalize()?;
//!
//! let engine = Engine::new(registry, driver, AnsiCompiler::default(), SchemaValidator::new());
//! let books = engine
//!     .find("Book")
//!     .filter(Cond::field("author.name").contains("Guin"))
//!     .select_related("author")
//!     .order_by(Order::asc("title"))
//!     .fetch_all(&cx)
//!     .await;
//! ```

pub use relata_core::{
    Budget, ConfigurationError, Cx, DeleteRule, Driver, DriverError, DriverErrorKind, Error,
    FieldDecl, FieldDescriptor, FieldType, ForeignKeyRef, HydrationError, Instance, JoinKeys,
    LinkInfo, ModelDecl, ModelDescriptor, ModelRegistry, Outcome, PersistFailure,
    PersistenceError, QueryExecutionError, QueryFailure, RegistryBuilder, Related, RelationDecl,
    RelationDescriptor, RelationGraph, RelationKind, RelationPath, RelationStep, Result,
    ReverseRelationDescriptor, ReverseSpec, Row, SchemaValidator, SqlQuery, UnknownRelationError,
    ValidateOptions, ValidationFault, Validator, Value, WriteOperation,
};
pub use relata_query::{
    AnsiCompiler, Assignments, CmpOp, ColumnRef, Cond, DeleteStatement, Dialect, Direction,
    EagerNode, FieldPath, FieldSlot, Filter, HydratedGraph, Hydrator, InsertStatement, Join,
    JoinKind, Order, OrderTerm, Planner, Predicate, PrefetchPlan, QueryContext, QueryPlan,
    QuerySet, QuerySpec, SelectColumn, SelectStatement, StatementCompiler, UpdateStatement,
};
pub use relata_session::{Engine, EngineBuilder, Handler, Signal, Signals};

/// Everything an application touches day to day.
pub mod prelude {
    pub use relata_core::{
        Cx, Driver, Error, FieldDecl, FieldType, Instance, ModelDecl, ModelRegistry, Outcome,
        RegistryBuilder, Related, RelationDecl, Result, SchemaValidator, Validator, Value,
    };
    pub use relata_query::{
        AnsiCompiler, Cond, Filter, Order, QuerySet, QuerySpec, StatementCompiler,
    };
    pub use relata_session::{Engine, Signal, Signals};
}
