//! Reactive Graph
//!
//! The graph owns cells and statements and coordinates ticks.
//!
//! # Algorithm
//!
//! A tick processes one external unit of work:
//!
//! 1. While the `transact` closure runs, direct cell writes apply
//!    immediately and the written set is recorded (Collecting).
//! 2. On return, compute the forward closure: statements reading a written
//!    cell, the cells those statements write, statements reading *those*,
//!    and so on (Flushing).
//! 3. Sort the closure topologically: a statement runs only after every
//!    scheduled statement that writes a cell it reads. Ties between
//!    mutually-independent statements resolve by declaration order, so a
//!    tick's execution order is fully deterministic.
//! 4. Run each scheduled statement exactly once, even when it is reachable
//!    along several paths.
//!
//! Cycles through two or more statements are rejected when the closing
//! statement is registered, so step 3 always terminates. A statement whose
//! write feeds a cell it also reads is fine; it runs once per tick like
//! everything else.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use super::cell::{Cell, CellId};
use super::statement::{Statement, StatementId, TickContext};
use crate::error::{BoxError, Error};

/// Tick state. Every public entry point starts and ends at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickPhase {
    Idle,
    Collecting,
    Flushing,
}

/// A dependency-ordered scheduler over named cells and statements.
///
/// # Example
///
/// ```rust,ignore
/// use weft_core::scheduler::ReactiveGraph;
///
/// let mut graph = ReactiveGraph::new();
/// let a = graph.add_cell("a", 1i64);
/// let b = graph.add_cell("b", 0i64);
///
/// graph.add_statement("b = a + 1", &[a], &[b], move |cx| {
///     let next = cx.get(a) + 1;
///     cx.set(b, next);
///     Ok(())
/// })?;
///
/// graph.set(a, 5)?;
/// assert_eq!(graph.get(b), 6);
/// ```
pub struct ReactiveGraph<V> {
    /// All cells, indexed by ID. Insertion order is registration order.
    cells: IndexMap<CellId, Cell<V>>,

    /// All statements, indexed by ID. IDs ascend in declaration order.
    statements: IndexMap<StatementId, Statement<V>>,

    next_cell: u64,
    next_statement: u64,
    phase: TickPhase,
}

impl<V> ReactiveGraph<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            cells: IndexMap::new(),
            statements: IndexMap::new(),
            next_cell: 0,
            next_statement: 0,
            phase: TickPhase::Idle,
        }
    }

    /// Register a cell with an initial value.
    pub fn add_cell(&mut self, name: impl Into<String>, initial: V) -> CellId {
        let id = CellId(self.next_cell);
        self.next_cell += 1;
        let cell = Cell::new(name.into(), initial);
        tracing::trace!(cell = cell.name(), "cell registered");
        self.cells.insert(id, cell);
        id
    }

    /// Register a statement with its declared read and write sets.
    ///
    /// Edges are built from the declarations here, once. Registration fails
    /// with [`Error::CyclicDependency`] if the statement would close a
    /// dependency cycle through two or more statements.
    ///
    /// # Panics
    ///
    /// Panics if a declared cell is not registered with this graph.
    pub fn add_statement<F>(
        &mut self,
        label: impl Into<String>,
        reads: &[CellId],
        writes: &[CellId],
        body: F,
    ) -> Result<StatementId, Error>
    where
        F: Fn(&mut TickContext<'_, V>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let label = label.into();
        for cell in reads.iter().chain(writes.iter()) {
            assert!(
                self.cells.contains_key(cell),
                "cell is not registered with this graph"
            );
        }

        let id = StatementId(self.next_statement);
        self.next_statement += 1;

        let statement = Statement::new(
            label,
            SmallVec::from_slice(reads),
            SmallVec::from_slice(writes),
            Arc::new(body),
        );
        for cell in statement.reads() {
            self.cells[cell].add_reader(id);
        }
        for cell in statement.writes() {
            self.cells[cell].add_writer(id);
        }
        self.statements.insert(id, statement);

        if self.creates_cycle(id) {
            // Roll the registration back; the graph is untouched on error.
            let statement = self
                .statements
                .shift_remove(&id)
                .expect("statement was just inserted");
            for cell in statement.reads().iter().chain(statement.writes()) {
                self.cells[cell].remove_statement(id);
            }
            self.next_statement -= 1;
            return Err(Error::CyclicDependency {
                label: statement.label().to_string(),
            });
        }

        Ok(id)
    }

    /// Whether `origin` can reach itself through statement -> written cell
    /// -> reading statement edges. Self-edges are skipped: a statement
    /// reading its own output is not a cycle.
    fn creates_cycle(&self, origin: StatementId) -> bool {
        let mut stack: Vec<StatementId> = vec![origin];
        let mut visited: HashSet<StatementId> = HashSet::new();

        while let Some(current) = stack.pop() {
            for cell in self.statements[&current].writes() {
                for &reader in self.cells[cell].readers() {
                    if reader == current {
                        continue;
                    }
                    if reader == origin {
                        return true;
                    }
                    if visited.insert(reader) {
                        stack.push(reader);
                    }
                }
            }
        }
        false
    }

    /// Read a cell's current value.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not registered with this graph.
    pub fn get(&self, cell: CellId) -> V {
        self.cells
            .get(&cell)
            .expect("cell is not registered with this graph")
            .value()
            .clone()
    }

    /// Write one cell and run the resulting tick.
    pub fn set(&mut self, cell: CellId, value: V) -> Result<(), Error> {
        self.transact(move |tx| tx.set(cell, value))
    }

    /// Run a unit of work that may write several cells, then flush the
    /// single resulting tick.
    ///
    /// Statement failures abort the remainder of the flush and surface as
    /// [`Error::ComputationFailure`]; writes made by statements that
    /// already ran stay in place, and the graph returns to idle.
    pub fn transact<R, F>(&mut self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Transaction<'_, V>) -> R,
    {
        debug_assert!(self.phase == TickPhase::Idle, "tick already in progress");
        self.phase = TickPhase::Collecting;

        let (result, written) = {
            let mut tx = Transaction {
                cells: &mut self.cells,
                written: IndexSet::new(),
            };
            let result = f(&mut tx);
            (result, tx.written)
        };

        let outcome = self.flush(written);
        self.phase = TickPhase::Idle;
        outcome.map(|()| result)
    }

    /// Execute the tick for the given directly-written cells.
    fn flush(&mut self, written: IndexSet<CellId>) -> Result<(), Error> {
        self.phase = TickPhase::Flushing;
        if written.is_empty() {
            return Ok(());
        }

        let plan = self.plan(&written);
        if plan.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            written_cells = written.len(),
            statements = plan.len(),
            "flushing tick"
        );

        let Self {
            cells, statements, ..
        } = self;
        for id in plan {
            let statement = statements.get(&id).expect("scheduled statement exists");
            let mut ctx = TickContext::new(cells, statement.reads(), statement.writes());
            (statement.body())(&mut ctx).map_err(Error::ComputationFailure)?;
            tracing::trace!(statement = statement.label(), "statement ran");
        }
        Ok(())
    }

    /// Compute the set of statements this tick must run, in execution
    /// order.
    fn plan(&self, written: &IndexSet<CellId>) -> Vec<StatementId> {
        // Forward closure over read edges and the written cells they lead
        // to. Each statement is collected once no matter how many paths
        // reach it.
        let mut scheduled: IndexSet<StatementId> = IndexSet::new();
        let mut seen_cells: HashSet<CellId> = written.iter().copied().collect();
        let mut cell_queue: VecDeque<CellId> = written.iter().copied().collect();

        while let Some(cell) = cell_queue.pop_front() {
            for &reader in self.cells[&cell].readers() {
                if scheduled.insert(reader) {
                    for &downstream in self.statements[&reader].writes() {
                        if seen_cells.insert(downstream) {
                            cell_queue.push_back(downstream);
                        }
                    }
                }
            }
        }
        if scheduled.is_empty() {
            return Vec::new();
        }

        // In-degrees restricted to the scheduled set: a statement waits for
        // every scheduled statement that writes a cell it reads.
        let mut indegree: HashMap<StatementId, usize> = HashMap::new();
        let mut successors: HashMap<StatementId, Vec<StatementId>> = HashMap::new();
        for &id in &scheduled {
            let mut predecessors: HashSet<StatementId> = HashSet::new();
            for cell in self.statements[&id].reads() {
                for &writer in self.cells[cell].writers() {
                    if writer != id && scheduled.contains(&writer) {
                        predecessors.insert(writer);
                    }
                }
            }
            indegree.insert(id, predecessors.len());
            for predecessor in predecessors {
                successors.entry(predecessor).or_default().push(id);
            }
        }

        // Kahn's algorithm with a min-heap, so mutually-independent
        // statements drain in declaration order.
        let mut ready: BinaryHeap<Reverse<StatementId>> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();
        let mut order = Vec::with_capacity(scheduled.len());

        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            if let Some(next) = successors.get(&id) {
                for &successor in next {
                    let degree = indegree
                        .get_mut(&successor)
                        .expect("scheduled statement has a degree");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(successor));
                    }
                }
            }
        }

        debug_assert_eq!(
            order.len(),
            scheduled.len(),
            "registration-time cycle check missed a cycle"
        );
        order
    }

    /// Number of registered cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of registered statements.
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

impl<V> Default for ReactiveGraph<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ReactiveGraph<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveGraph")
            .field("cells", &self.cells.len())
            .field("statements", &self.statements.len())
            .field("phase", &self.phase)
            .finish()
    }
}

/// Write recorder handed to [`transact`](ReactiveGraph::transact) closures.
///
/// Writes apply to cells immediately and are recorded as the tick's
/// directly-written set.
pub struct Transaction<'a, V> {
    cells: &'a mut IndexMap<CellId, Cell<V>>,
    written: IndexSet<CellId>,
}

impl<'a, V> Transaction<'a, V> {
    /// Write a cell.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not registered with this graph.
    pub fn set(&mut self, cell: CellId, value: V) {
        self.cells
            .get_mut(&cell)
            .expect("cell is not registered with this graph")
            .set_value(value);
        self.written.insert(cell);
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
        self.cells
            .get(&cell)
            .expect("cell is not registered with this graph")
            .value()
            .clone()
    }
}
