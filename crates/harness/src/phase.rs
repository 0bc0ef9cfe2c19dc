//! One timed contention run.

use crate::config::PhaseConfig;
use crate::error::PhaseError;
use crate::report::{ops_per_second, AbandonedWorker, PhaseSummary};
use crate::worker::Worker;
use crate::workload::SleepWork;
use gridlock_core::{
    policy_for, CriticalSection, PhaseSignals, ResourcePool, StopHandle, WorkerBoard,
};
use gridlock_monitor::{MonitorOutcome, ProgressMonitor, StallReport};
use gridlock_types::{StopReason, WorkerId};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often teardown checks whether workers have exited.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A running phase: the pool, the workers, the monitor and the shared
/// signals they coordinate through.
///
/// Each phase owns all of its state, so phases run back to back never see
/// each other's counters or locks.
pub struct Phase {
    config: PhaseConfig,
    pool: Arc<ResourcePool>,
    board: Arc<WorkerBoard>,
    signals: Arc<PhaseSignals>,
    workers: Vec<(WorkerId, JoinHandle<u64>)>,
    monitor: Option<JoinHandle<MonitorOutcome>>,
    started: Instant,
    deadline: Instant,
}

impl Phase {
    /// Validate `config` and start a phase with the default sleeping
    /// critical section.
    pub fn start(config: PhaseConfig) -> Result<Self, PhaseError> {
        let section = Arc::new(SleepWork::new(config.workload.work));
        Self::start_with_workload(config, section)
    }

    /// Start a phase running `section` inside every critical section.
    ///
    /// `config` is clamped to the documented minimums first, see
    /// [`PhaseConfig::validated`].
    pub fn start_with_workload(
        config: PhaseConfig,
        section: Arc<dyn CriticalSection>,
    ) -> Result<Self, PhaseError> {
        let (config, _) = config.validated();
        let pool = Arc::new(ResourcePool::new(config.resources));
        let signals = Arc::new(PhaseSignals::new());
        let (board, slots) = WorkerBoard::new(config.workers);
        let policy = policy_for(config.mode);

        info!(
            mode = %config.mode,
            pairing = %config.pairing,
            resources = config.resources,
            workers = config.workers,
            stall_timeout = ?config.stall_timeout,
            duration = ?config.duration,
            "Starting phase"
        );

        let started = Instant::now();
        let mut phase = Self {
            deadline: started + config.duration,
            config,
            pool: Arc::clone(&pool),
            board: Arc::clone(&board),
            signals: Arc::clone(&signals),
            workers: Vec::with_capacity(slots.len()),
            monitor: None,
            started,
        };

        for slot in slots {
            let id = slot.worker();
            let worker = Worker::new(
                slot,
                Arc::clone(&pool),
                Arc::clone(&signals),
                Arc::clone(&policy),
                Arc::clone(&section),
                &phase.config,
            );
            let handle = worker.spawn().map_err(|source| PhaseError::Spawn {
                role: format!("worker {id}"),
                source,
            })?;
            phase.workers.push((id, handle));
        }

        let monitor = ProgressMonitor::new(phase.config.monitor_config(), board, signals);
        phase.monitor = Some(monitor.spawn().map_err(|source| PhaseError::Spawn {
            role: "monitor".to_string(),
            source,
        })?);

        Ok(phase)
    }

    /// Configuration this phase runs with.
    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    /// Read-only view of the workers' lock state.
    pub fn board(&self) -> &Arc<WorkerBoard> {
        &self.board
    }

    /// Handle an embedding host can use to stop the phase early.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.signals))
    }

    /// Completed cycles so far.
    pub fn total_completed_ops(&self) -> u64 {
        self.signals.total_completed_ops()
    }

    /// Block until the deadline, a stall or an operator stop, then tear the
    /// phase down and summarise it.
    ///
    /// Workers get the configured join grace to exit. Any still running
    /// after that are abandoned: their threads are detached and their lock
    /// state is reported in [`PhaseSummary::abandoned`].
    pub fn await_completion(mut self) -> PhaseSummary {
        if self.signals.wait_until(self.deadline).is_none() {
            self.signals.request_stop(StopReason::Deadline);
        }
        let elapsed = self.started.elapsed();
        let stop_reason = self.signals.stop_reason().unwrap_or(StopReason::Deadline);
        debug!(reason = %stop_reason, ?elapsed, "Phase stopping");

        let stall = self.join_monitor();
        let abandoned = self.join_workers();

        let elapsed_secs = elapsed.as_secs_f64();
        let total_completed_ops = self.signals.total_completed_ops();
        let summary = PhaseSummary {
            mode: self.config.mode,
            pairing: self.config.pairing,
            resources: self.config.resources,
            workers: self.config.workers,
            stall_timeout_secs: self.config.stall_timeout.as_secs_f64(),
            duration_secs: self.config.duration.as_secs_f64(),
            total_completed_ops,
            per_worker_ops: self.board.completed_ops_by_worker(),
            elapsed_secs,
            ops_per_second: ops_per_second(total_completed_ops, elapsed_secs),
            stop_reason,
            stall,
            abandoned,
        };
        summary.log();
        summary
    }

    fn join_monitor(&mut self) -> Option<StallReport> {
        let handle = self.monitor.take()?;
        match handle.join() {
            Ok(MonitorOutcome::Stalled(report)) => Some(report),
            Ok(MonitorOutcome::Stopped) => None,
            Err(_) => {
                warn!("Monitor thread panicked");
                None
            }
        }
    }

    /// Join every worker that exits within the grace period; report the
    /// rest.
    fn join_workers(&mut self) -> Vec<AbandonedWorker> {
        let grace_deadline = Instant::now() + self.config.join_grace;
        let mut pending = mem::take(&mut self.workers);

        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(_, h)| h.is_finished());
            for (id, handle) in finished {
                match handle.join() {
                    Ok(ops) => debug!(worker = %id, ops, "Worker joined"),
                    Err(_) => warn!(worker = %id, "Worker thread panicked"),
                }
            }
            pending = running;
            if pending.is_empty() || Instant::now() >= grace_deadline {
                break;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        pending
            .into_iter()
            .filter_map(|(id, _detached)| self.board.snapshot(id))
            .map(|snap| AbandonedWorker {
                worker: snap.worker,
                held: snap.held,
                awaiting: snap.awaiting,
            })
            .collect()
    }
}

impl Drop for Phase {
    fn drop(&mut self) {
        if !self.signals.is_stop_requested() {
            self.signals.request_stop(StopReason::Operator);
        }
    }
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("mode", &self.config.mode)
            .field("resources", &self.pool.len())
            .field("workers", &self.board.len())
            .field("stopped", &self.signals.is_stop_requested())
            .finish()
    }
}
