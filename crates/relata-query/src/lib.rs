//! Query building, planning, compilation, execution, and hydration.
//!
//! `relata-query` is the read/bulk-write engine of the ecosystem. It turns
//! pure [`QuerySpec`] values into executed, hydrated instance graphs by
//! composing the collaborators declared in `relata-core`.
//!
//! # Pipeline
//!
//! - **Build**: [`QuerySpec`] / [`QuerySet`] accumulate filters, ordering,
//!   paging, field selections, and relation loads without touching the
//!   registry. [`Cond`] builds predicate trees over dotted field paths.
//! - **Plan**: [`Planner`] resolves every path against the sealed registry,
//!   assigns join aliases and row positions, and emits a [`QueryPlan`] plus
//!   prefetch templates.
//! - **Compile**: a [`StatementCompiler`] renders planned statements into
//!   parameterized SQL; [`AnsiCompiler`] ships as the reference
//!   implementation over three [`Dialect`]s.
//! - **Execute and hydrate**: [`QueryContext`] drives the compiled
//!   statements through the driver and assembles [`HydratedGraph`]s.
//!
//! Planning failures (unknown relations, to-many misuse, conflicting field
//! selections) surface from the executing terminals before any statement
//! reaches the driver.

pub mod compiler;
pub mod executor;
pub mod filter;
pub mod hydrate;
pub mod plan;
pub mod queryset;
pub mod stmt;

pub use compiler::{AnsiCompiler, Dialect, StatementCompiler};
pub use executor::QueryContext;
pub use filter::{CmpOp, Cond, FieldPath, Filter};
pub use hydrate::{HydratedGraph, Hydrator};
pub use plan::{EagerNode, FieldSlot, Planner, PrefetchPlan, QueryPlan};
pub use queryset::{Assignments, Direction, Order, QuerySet, QuerySpec};
pub use stmt::{
    ColumnRef, DeleteStatement, InsertStatement, Join, JoinKind, OrderTerm, Predicate,
    SelectColumn, SelectStatement, UpdateStatement,
};
