//! Core types and traits for Relata.
//!
//! `relata-core` is the **foundation layer** for the entire ecosystem. It defines
//! the schema metadata, runtime values, and collaborator traits that all other
//! crates build on.
//!
//! # Role In The Architecture
//!
//! - **Schema layer**: [`RegistryBuilder`] collects model declarations at startup
//!   and seals them into an immutable [`ModelRegistry`]; [`RelationGraph`] walks
//!   the relations between registered models.
//! - **Data model**: [`Row`], [`Value`], and [`Instance`] represent query
//!   inputs/outputs and hydrated records shared across the query and session
//!   crates.
//! - **Contract layer**: [`Driver`] and [`Validator`] are the seams where
//!   database backends and validation plug in.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so
//!   every async database operation is cancel-correct and budget-aware.
//!
//! # Who Uses This Crate
//!
//! - `relata-query` consumes registry metadata and [`Value`] to plan and compile
//!   statements.
//! - `relata-session` depends on [`Driver`], [`Instance`], and the registry for
//!   persistence flows.
//! - Driver crates implement [`Driver`] and operate on [`Row`]/[`Value`].
//!
//! Most applications should use the `relata` facade; reach for `relata-core`
//! directly when writing drivers or advanced integrations.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Budget, Cx, Outcome, RegionId, TaskId};

pub mod driver;
pub mod error;
pub mod field;
pub mod graph;
pub mod instance;
pub mod model;
pub mod path;
pub mod registry;
pub mod relation;
pub mod row;
pub mod validate;
pub mod value;

pub use driver::{Driver, SqlQuery};
pub use error::{
    ConfigurationError, DriverError, DriverErrorKind, Error, HydrationError, PersistFailure,
    PersistenceError, QueryExecutionError, QueryFailure, Result, UnknownRelationError,
    WriteOperation,
};
pub use field::{FieldDecl, FieldDescriptor, FieldType, ForeignKeyRef};
pub use graph::{JoinKeys, RelationGraph, RelationStep};
pub use instance::{Instance, Related};
pub use model::{ModelDecl, ModelDescriptor};
pub use path::RelationPath;
pub use registry::{ModelRegistry, RegistryBuilder};
pub use relation::{
    DeleteRule, LinkInfo, RelationDecl, RelationDescriptor, RelationKind,
    ReverseRelationDescriptor, ReverseSpec, default_reverse_name,
};
pub use row::Row;
pub use validate::{
    SchemaValidator, ValidateOptions, ValidationFault, Validator, matches_pattern,
    validate_pattern,
};
pub use value::Value;
