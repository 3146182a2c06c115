//! Per-cell progress lines on stderr.

use gridtune_core::{BestSelection, CellOutcome, SweepObserver};
use std::io::Write;

pub struct ProgressPrinter<W: Write> {
    out: W,
    total: usize,
}

impl<W: Write> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, total: 0 }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SweepObserver for ProgressPrinter<W> {
    fn on_sweep_start(&mut self, total_cells: usize) {
        self.total = total_cells;
        let _ = writeln!(self.out, "Searching {total_cells} configurations");
    }

    fn on_cell_complete(&mut self, index: usize, outcome: &CellOutcome) {
        let width = self.total.to_string().len();
        let position = format!("[{:>width$}/{}]", index + 1, self.total);
        let _ = match outcome {
            CellOutcome::Completed(r) => writeln!(
                self.out,
                "{position} {}  loss={:.4} accuracy={:.4}",
                r.config, r.test_loss, r.test_accuracy
            ),
            CellOutcome::Failed(f) => writeln!(
                self.out,
                "{position} {}  FAILED ({}: {})",
                f.config, f.stage, f.reason
            ),
        };
    }

    fn on_new_best(&mut self, best: &BestSelection) {
        let _ = writeln!(self.out, "        new best: {}", best.config);
    }
}
