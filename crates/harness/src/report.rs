//! Per-phase summary.

use gridlock_monitor::StallReport;
use gridlock_types::{AcquisitionMode, Held, PairingRule, ResourceId, StopReason, WorkerId};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// A worker that had not exited when the join grace period ran out.
///
/// Its resources were never released. The phase ends anyway; the thread is
/// detached and its lock state is reported here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedWorker {
    /// The stuck worker.
    pub worker: WorkerId,
    /// Resources it still held.
    pub held: Held,
    /// Resource it was blocked on, if any.
    pub awaiting: Option<ResourceId>,
}

impl fmt::Display for AbandonedWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: hold={} wait=", self.worker, self.held)?;
        match self.awaiting {
            Some(r) => write!(f, "{}", r.index()),
            None => write!(f, "-"),
        }
    }
}

/// Result of one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    /// Acquisition mode.
    pub mode: AcquisitionMode,
    /// Pairing rule.
    pub pairing: PairingRule,
    /// Resource count (R).
    pub resources: usize,
    /// Worker count (W).
    pub workers: usize,
    /// Stall timeout (T), in seconds.
    pub stall_timeout_secs: f64,
    /// Configured duration (D), in seconds.
    pub duration_secs: f64,
    /// Cycles completed by all workers.
    pub total_completed_ops: u64,
    /// Cycles completed per worker, in worker order.
    pub per_worker_ops: Vec<u64>,
    /// Time from start until stop was requested, in seconds.
    pub elapsed_secs: f64,
    /// `total_completed_ops / elapsed_secs`.
    pub ops_per_second: f64,
    /// Why the phase stopped.
    pub stop_reason: StopReason,
    /// The monitor's diagnostic, if it declared a stall.
    pub stall: Option<StallReport>,
    /// Workers left blocked at teardown.
    pub abandoned: Vec<AbandonedWorker>,
}

impl PhaseSummary {
    /// Whether the monitor declared a stall.
    pub fn is_stalled(&self) -> bool {
        self.stall.is_some()
    }

    /// Whether the global counter matches the per-worker counts.
    pub fn is_consistent(&self) -> bool {
        self.per_worker_ops.iter().sum::<u64>() == self.total_completed_ops
    }

    /// Emit the summary through `tracing`.
    pub fn log(&self) {
        info!(
            mode = %self.mode,
            resources = self.resources,
            workers = self.workers,
            ops = self.total_completed_ops,
            elapsed_secs = self.elapsed_secs,
            ops_per_second = self.ops_per_second,
            stop_reason = %self.stop_reason,
            "Phase complete"
        );
        for abandoned in &self.abandoned {
            warn!(
                worker = %abandoned.worker,
                held = %abandoned.held,
                awaiting = ?abandoned.awaiting.map(|r| r.index()),
                "Worker abandoned with resources held"
            );
        }
    }
}

pub(crate) fn ops_per_second(ops: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        ops as f64 / elapsed_secs
    } else {
        0.0
    }
}

impl fmt::Display for PhaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: ops={} in {:.2}s ({:.1} ops/s), stopped by {}",
            self.mode,
            self.total_completed_ops,
            self.elapsed_secs,
            self.ops_per_second,
            self.stop_reason
        )?;
        if !self.abandoned.is_empty() {
            write!(f, "\n  abandoned {} worker(s):", self.abandoned.len())?;
            for abandoned in &self.abandoned {
                write!(f, "\n    {abandoned}")?;
            }
        }
        Ok(())
    }
}
