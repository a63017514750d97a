//! Statements
//!
//! A statement is a unit of reactive work: an executable body plus the
//! declared sets of cells it reads and writes. The declarations are made
//! once, at registration, and are the complete dependency information the
//! scheduler uses; bodies are never introspected.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::cell::{Cell, CellId};
use crate::error::BoxError;

/// Identifier of a statement within one graph.
///
/// Allocated sequentially by the owning graph, so the numeric order of
/// statement IDs is their declaration order. The scheduler relies on this
/// for its deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub(crate) u64);

impl StatementId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Executable statement body. Receives scoped access to the graph's cells.
pub(crate) type BodyFn<V> =
    Arc<dyn Fn(&mut TickContext<'_, V>) -> Result<(), BoxError> + Send + Sync>;

/// A registered statement.
pub(crate) struct Statement<V> {
    /// Diagnostic label, used in logs and cycle errors.
    label: String,

    /// Cells this statement declared it reads.
    reads: SmallVec<[CellId; 4]>,

    /// Cells this statement declared it writes.
    writes: SmallVec<[CellId; 4]>,

    /// The executable body.
    body: BodyFn<V>,
}

impl<V> Statement<V> {
    pub(crate) fn new(
        label: String,
        reads: SmallVec<[CellId; 4]>,
        writes: SmallVec<[CellId; 4]>,
        body: BodyFn<V>,
    ) -> Self {
        Self {
            label,
            reads,
            writes,
            body,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn reads(&self) -> &[CellId] {
        &self.reads
    }

    pub(crate) fn writes(&self) -> &[CellId] {
        &self.writes
    }

    pub(crate) fn body(&self) -> BodyFn<V> {
        Arc::clone(&self.body)
    }
}

/// Cell access handed to a statement body during a flush.
///
/// Reads and writes are checked (in debug builds) against the statement's
/// declared sets; the declaration is the contract the schedule was built
/// from.
pub struct TickContext<'a, V> {
    cells: &'a mut IndexMap<CellId, Cell<V>>,
    reads: &'a [CellId],
    writes: &'a [CellId],
}

impl<'a, V> TickContext<'a, V> {
    pub(crate) fn new(
        cells: &'a mut IndexMap<CellId, Cell<V>>,
        reads: &'a [CellId],
        writes: &'a [CellId],
    ) -> Self {
        Self {
            cells,
            reads,
            writes,
        }
    }

    /// Read a cell's current value.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not registered with this graph.
    pub fn get(&self, cell: CellId) -> V
    where
        V: Clone,
    {
        debug_assert!(
            self.reads.contains(&cell),
            "cell read outside the statement's declared read set"
        );
        self.cells
            .get(&cell)
            .expect("cell is not registered with this graph")
            .value()
            .clone()
    }

    /// Write a cell's value.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not registered with this graph.
    pub fn set(&mut self, cell: CellId, value: V) {
        debug_assert!(
            self.writes.contains(&cell),
            "cell written outside the statement's declared write set"
        );
        self.cells
            .get_mut(&cell)
            .expect("cell is not registered with this graph")
            .set_value(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_ids_order_by_declaration() {
        assert!(StatementId(0) < StatementId(1));
        assert!(StatementId(1) < StatementId(7));
    }

    #[test]
    fn tick_context_reads_and_writes_cells() {
        let mut cells: IndexMap<CellId, Cell<i64>> = IndexMap::new();
        let a = CellId(0);
        let b = CellId(1);
        cells.insert(a, Cell::new("a".into(), 2));
        cells.insert(b, Cell::new("b".into(), 0));

        let reads = [a];
        let writes = [b];
        let mut ctx = TickContext::new(&mut cells, &reads, &writes);

        let doubled = ctx.get(a) * 2;
        ctx.set(b, doubled);
        assert_eq!(*cells[&b].value(), 4);
    }
}
