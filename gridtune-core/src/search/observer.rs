//! Sweep progress callbacks.

use crate::search::CellOutcome;
use crate::search::selection::BestSelection;

/// Receives sweep events in grid order. Observers cannot influence the sweep.
pub trait SweepObserver {
    /// Called once, before the first cell runs.
    fn on_sweep_start(&mut self, _total_cells: usize) {}

    /// Called with every cell outcome, in grid order.
    fn on_cell_complete(&mut self, _index: usize, _outcome: &CellOutcome) {}

    /// Called whenever the best selection changes.
    fn on_new_best(&mut self, _best: &BestSelection) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SweepObserver for NoopObserver {}
