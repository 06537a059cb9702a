use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use populate_core::EntityKind;

use crate::model::PhaseReport;

/// Status emitted after each successful batch flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseProgress {
    pub phase: EntityKind,
    /// Records of this phase persisted so far, including this batch.
    pub persisted: u64,
    pub target: u64,
    pub batch_index: u64,
    pub batch_rows: u64,
}

/// Observer of a running generation. Must return quickly: it is called
/// inline on the generation path once per batch.
pub trait ProgressReporter: Send + Sync {
    fn phase_started(&self, _phase: EntityKind, _target: u64) {}

    fn batch_persisted(&self, progress: &PhaseProgress);

    fn phase_finished(&self, _report: &PhaseReport) {}
}

/// Human-readable progress on standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn phase_started(&self, phase: EntityKind, target: u64) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "Generating {phase} ({target} expected)...");
    }

    fn batch_persisted(&self, progress: &PhaseProgress) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(
            out,
            "  Created {}/{} {}...",
            progress.persisted, progress.target, progress.phase
        );
    }

    fn phase_finished(&self, report: &PhaseReport) {
        let mut out = std::io::stdout().lock();
        let _ = if report.skipped {
            writeln!(out, "Phase {} skipped (no parent records)", report.phase)
        } else {
            writeln!(
                out,
                "Phase {} complete: {} rows in {:.2}s",
                report.phase,
                report.rows_persisted,
                report.duration_ms as f64 / 1000.0
            )
        };
    }
}

/// Structured progress events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn phase_started(&self, phase: EntityKind, target: u64) {
        info!(phase = %phase, target, "phase started");
    }

    fn batch_persisted(&self, progress: &PhaseProgress) {
        info!(
            phase = %progress.phase,
            batch = progress.batch_index,
            rows = progress.batch_rows,
            persisted = progress.persisted,
            target = progress.target,
            "batch persisted"
        );
    }

    fn phase_finished(&self, report: &PhaseReport) {
        info!(
            phase = %report.phase,
            rows = report.rows_persisted,
            batches = report.batches,
            retries = report.retries,
            duration_ms = report.duration_ms,
            skipped = report.skipped,
            "phase finished"
        );
    }
}

/// Forwards every callback to each inner reporter in order.
#[derive(Default, Clone)]
pub struct CompositeReporter {
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl CompositeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl ProgressReporter for CompositeReporter {
    fn phase_started(&self, phase: EntityKind, target: u64) {
        for reporter in &self.reporters {
            reporter.phase_started(phase, target);
        }
    }

    fn batch_persisted(&self, progress: &PhaseProgress) {
        for reporter in &self.reporters {
            reporter.batch_persisted(progress);
        }
    }

    fn phase_finished(&self, report: &PhaseReport) {
        for reporter in &self.reporters {
            reporter.phase_finished(report);
        }
    }
}
