//! Diagnostic report emitted when a phase stalls.

use crate::wait_for::WaitForGraph;
use gridlock_core::WorkerBoard;
use gridlock_types::{WorkerId, WorkerSnapshot};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Snapshot of every worker at the moment a stall was declared, with the
/// wait-for cycles derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct StallReport {
    /// Configured stall timeout, in seconds.
    pub stall_timeout_secs: f64,
    /// How long the counter had been flat when the stall was declared.
    pub idle_secs: f64,
    /// Counter value when the stall was declared.
    pub total_completed_ops: u64,
    /// One record per worker, in worker order.
    pub workers: Vec<WorkerSnapshot>,
    /// Wait-for cycles, each starting at its lowest worker id.
    pub cycles: Vec<Vec<WorkerId>>,
}

impl StallReport {
    /// Capture the board. Reads atomics only.
    pub fn capture(
        board: &WorkerBoard,
        stall_timeout: Duration,
        idle: Duration,
        total_completed_ops: u64,
    ) -> Self {
        Self::from_snapshots(
            board.snapshot_all(),
            stall_timeout,
            idle,
            total_completed_ops,
        )
    }

    /// Build a report from snapshots taken elsewhere.
    pub fn from_snapshots(
        workers: Vec<WorkerSnapshot>,
        stall_timeout: Duration,
        idle: Duration,
        total_completed_ops: u64,
    ) -> Self {
        let cycles = WaitForGraph::from_snapshots(&workers).cycles();
        Self {
            stall_timeout_secs: stall_timeout.as_secs_f64(),
            idle_secs: idle.as_secs_f64(),
            total_completed_ops,
            workers,
            cycles,
        }
    }

    /// Rebuild the wait-for graph for this report.
    pub fn wait_for_graph(&self) -> WaitForGraph {
        WaitForGraph::from_snapshots(&self.workers)
    }

    /// Workers that hold one resource and wait for another.
    pub fn hold_and_wait(&self) -> impl Iterator<Item = &WorkerSnapshot> {
        self.workers.iter().filter(|w| w.is_hold_and_wait())
    }

    /// Whether a circular wait was found.
    pub fn is_deadlock(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Emit the report through `tracing`, one event per worker.
    pub fn log(&self) {
        warn!(
            idle_secs = self.idle_secs,
            stall_timeout_secs = self.stall_timeout_secs,
            total_completed_ops = self.total_completed_ops,
            "No progress for the stall timeout, possible deadlock"
        );
        for snap in &self.workers {
            warn!(
                worker = %snap.worker,
                held = %snap.held,
                awaiting = ?snap.awaiting.map(|r| r.index()),
                last_progress_secs = snap.seconds_since_last_progress,
                ops = snap.completed_ops,
                "Worker state at stall"
            );
        }
        for cycle in &self.cycles {
            warn!(cycle = %format_cycle(cycle), "Circular wait");
        }
    }
}

fn format_cycle(cycle: &[WorkerId]) -> String {
    cycle
        .iter()
        .chain(cycle.first())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[monitor] No progress for {:.1}s (timeout {:.0}s). Possible deadlock.",
            self.idle_secs, self.stall_timeout_secs
        )?;
        writeln!(f, "[monitor] Worker states (worker: hold | wait):")?;
        for snap in &self.workers {
            writeln!(f, "  {snap}")?;
        }
        for cycle in &self.cycles {
            writeln!(f, "  cycle: {}", format_cycle(cycle))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlock_types::{Held, ResourceId};
    use tracing_test::traced_test;

    fn deadlocked_pair() -> Vec<WorkerSnapshot> {
        vec![
            WorkerSnapshot {
                worker: WorkerId(0),
                held: Held::One(ResourceId(0)),
                awaiting: Some(ResourceId(1)),
                seconds_since_last_progress: 3.4,
                completed_ops: 10,
            },
            WorkerSnapshot {
                worker: WorkerId(1),
                held: Held::One(ResourceId(1)),
                awaiting: Some(ResourceId(0)),
                seconds_since_last_progress: 3.3,
                completed_ops: 12,
            },
        ]
    }

    #[test]
    fn test_report_finds_cycle() {
        let report = StallReport::from_snapshots(
            deadlocked_pair(),
            Duration::from_secs(3),
            Duration::from_millis(3200),
            22,
        );
        assert!(report.is_deadlock());
        assert_eq!(report.cycles, vec![vec![WorkerId(0), WorkerId(1)]]);
        assert_eq!(report.hold_and_wait().count(), 2);
        assert!(report.wait_for_graph().has_two_cycle());

        let text = report.to_string();
        assert!(text.contains("W00: hold=(0,-) wait=1"));
        assert!(text.contains("cycle: W00 -> W01 -> W00"));
    }

    #[traced_test]
    #[test]
    fn test_report_logs_every_worker() {
        let report = StallReport::from_snapshots(
            deadlocked_pair(),
            Duration::from_secs(3),
            Duration::from_secs(3),
            22,
        );
        report.log();
        assert!(logs_contain("possible deadlock"));
        assert!(logs_contain("worker=W00"));
        assert!(logs_contain("worker=W01"));
        assert!(logs_contain("Circular wait"));
    }

    #[test]
    fn test_capture_idle_board() {
        let (board, _slots) = WorkerBoard::new(3);
        let report = StallReport::capture(&board, Duration::from_secs(1), Duration::from_secs(1), 0);
        assert_eq!(report.workers.len(), 3);
        assert!(!report.is_deadlock());
        assert_eq!(report.hold_and_wait().count(), 0);
    }
}
