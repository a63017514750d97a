//! Reactive Statement Scheduler
//!
//! This module implements dependency-ordered recomputation for declarative
//! "recompute when inputs change" statements.
//!
//! # Overview
//!
//! The scheduler operates over a graph of **cells** (named mutable
//! bindings) and **statements** (bodies that read some cells and write
//! others). Unlike the store primitives, which push each change eagerly,
//! the scheduler batches: one external unit of work — a **tick** — writes
//! some cells, and on completion the minimal set of affected statements
//! runs, each exactly once, in dependency order.
//!
//! # Design Decisions
//!
//! 1. Read/write sets are declared at registration rather than discovered
//!    by instrumenting bodies. Declarations make the dependency graph
//!    explicit, buildable once, and checkable: cycles are rejected when
//!    the closing statement is registered instead of looping at runtime.
//!
//! 2. We maintain both forward (cell -> reading statements) and reverse
//!    (cell -> writing statements) edges to traverse the graph cheaply in
//!    both directions during planning.
//!
//! 3. Execution order is total and deterministic: topological order first,
//!    declaration order between independent statements.

mod cell;
mod graph;
mod statement;

pub use cell::CellId;
pub use graph::{ReactiveGraph, Transaction};
pub use statement::{StatementId, TickContext};
