//! Background progress monitor.

use crate::detector::{MonitorState, StallDetector};
use crate::report::StallReport;
use gridlock_core::{PhaseSignals, WorkerBoard};
use gridlock_types::StopReason;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// Configuration for the progress monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How long the counter may stay flat before the phase is declared
    /// stalled.
    pub stall_timeout: Duration,

    /// Time between samples.
    ///
    /// A stall is declared at most one interval after the timeout is
    /// reached, and recovery that begins inside that interval is not seen.
    pub sample_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(3),
            sample_interval: Duration::from_millis(200),
        }
    }
}

impl MonitorConfig {
    /// Create a config with the given stall timeout and the default interval.
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            stall_timeout,
            ..Default::default()
        }
    }

    /// Set the sample interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

/// How the monitor finished.
#[derive(Debug, Clone)]
pub enum MonitorOutcome {
    /// The monitor declared a stall and stopped the phase.
    Stalled(StallReport),
    /// The phase was stopped for another reason first.
    Stopped,
}

impl MonitorOutcome {
    /// The stall report, if the monitor declared a stall.
    pub fn stall_report(&self) -> Option<&StallReport> {
        match self {
            MonitorOutcome::Stalled(report) => Some(report),
            MonitorOutcome::Stopped => None,
        }
    }
}

/// Watches the phase counter and stops the phase if it stops moving.
///
/// Holds the board and the signals only. It has no resource pool and no
/// worker slot, so it cannot block on a resource or disturb the lock state
/// it reports on. Its only blocking point is the sample sleep, which also
/// wakes early on stop.
pub struct ProgressMonitor {
    config: MonitorConfig,
    board: Arc<WorkerBoard>,
    signals: Arc<PhaseSignals>,
}

impl ProgressMonitor {
    /// Create a monitor over a phase's board and signals.
    pub fn new(config: MonitorConfig, board: Arc<WorkerBoard>, signals: Arc<PhaseSignals>) -> Self {
        Self {
            config,
            board,
            signals,
        }
    }

    /// Run the monitor on a dedicated thread.
    pub fn spawn(self) -> io::Result<JoinHandle<MonitorOutcome>> {
        thread::Builder::new()
            .name("gridlock-monitor".into())
            .spawn(move || self.run())
    }

    /// Run the monitor on the current thread until the phase stops.
    pub fn run(self) -> MonitorOutcome {
        let span = info_span!("monitor");
        let _enter = span.enter();

        let epoch = Instant::now();
        let mut detector = StallDetector::new(
            self.config.stall_timeout,
            self.signals.total_completed_ops(),
            Duration::ZERO,
        );
        info!(
            stall_timeout = ?self.config.stall_timeout,
            sample_interval = ?self.config.sample_interval,
            "Monitor watching"
        );

        loop {
            if self.signals.wait_for_stop(self.config.sample_interval) {
                detector.finish();
                debug!(
                    ops = self.signals.total_completed_ops(),
                    "Phase stopped before any stall"
                );
                return MonitorOutcome::Stopped;
            }

            let count = self.signals.total_completed_ops();
            if detector.on_sample(epoch.elapsed(), count) != MonitorState::Stalled {
                continue;
            }

            let report = StallReport::capture(
                &self.board,
                self.config.stall_timeout,
                detector.idle(),
                count,
            );
            report.log();
            if !self.signals.request_stop(StopReason::Stalled) {
                warn!("Stall declared after the phase was already stopping");
            }
            detector.finish();
            return MonitorOutcome::Stalled(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlock_test_helpers::ForcedCycle;
    use gridlock_types::{ResourceId, WorkerId};
    use tracing_test::traced_test;

    fn fast_config(timeout_ms: u64) -> MonitorConfig {
        MonitorConfig::new(Duration::from_millis(timeout_ms))
            .with_sample_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_external_stop_ends_watching() {
        let (board, _slots) = WorkerBoard::new(2);
        let signals = Arc::new(PhaseSignals::new());
        let handle = ProgressMonitor::new(fast_config(10_000), board, Arc::clone(&signals))
            .spawn()
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        signals.request_stop(StopReason::Deadline);

        let outcome = handle.join().unwrap();
        assert!(outcome.stall_report().is_none());
        assert_eq!(signals.stop_reason(), Some(StopReason::Deadline));
    }

    #[test]
    fn test_progress_prevents_stall() {
        let (board, _slots) = WorkerBoard::new(1);
        let signals = Arc::new(PhaseSignals::new());
        let handle = ProgressMonitor::new(fast_config(100), board, Arc::clone(&signals))
            .spawn()
            .unwrap();

        for _ in 0..30 {
            signals.record_completed_op();
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!signals.is_stop_requested());
        signals.request_stop(StopReason::Deadline);
        assert!(handle.join().unwrap().stall_report().is_none());
    }

    #[traced_test]
    #[test]
    fn test_idle_phase_is_declared_stalled() {
        let (board, _slots) = WorkerBoard::new(2);
        let signals = Arc::new(PhaseSignals::new());
        let outcome = ProgressMonitor::new(fast_config(100), board, Arc::clone(&signals)).run();

        let report = outcome.stall_report().expect("monitor should stall");
        assert_eq!(report.workers.len(), 2);
        assert!(report.idle_secs >= 0.1);
        assert!(!report.is_deadlock());
        assert_eq!(signals.stop_reason(), Some(StopReason::Stalled));
        assert!(logs_contain("possible deadlock"));
    }

    #[test]
    fn test_forced_cycle_is_attributed() {
        let cycle = ForcedCycle::spawn();
        assert!(cycle.wait_until_blocked(Duration::from_secs(5)));
        assert!(cycle.pool().is_held(ResourceId(0)));
        assert!(cycle.pool().is_held(ResourceId(1)));

        let outcome = ProgressMonitor::new(
            fast_config(200),
            Arc::clone(cycle.board()),
            Arc::new(PhaseSignals::new()),
        )
        .run();

        let report = outcome.stall_report().expect("monitor should stall");
        assert!(report.is_deadlock());
        assert_eq!(report.cycles, vec![vec![WorkerId(0), WorkerId(1)]]);
        assert_eq!(report.hold_and_wait().count(), 2);
    }
}
