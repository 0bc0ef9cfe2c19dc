//! Phase-wide progress counter and stop signal.

use gridlock_types::StopReason;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shared counters for one phase.
///
/// `total_completed_ops` only ever grows. `stop_requested` is set once and
/// never cleared; the first request also records its [`StopReason`], later
/// requests are no-ops.
///
/// Workers poll the stop flag with a plain atomic load between cycles.
/// The mutex and condvar exist only so the phase and the monitor can sleep
/// until stop instead of polling; neither is ever held while a resource is
/// being acquired.
#[derive(Debug, Default)]
pub struct PhaseSignals {
    total_completed_ops: AtomicU64,
    stop_requested: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    stopped: Condvar,
}

impl PhaseSignals {
    /// Create fresh signals: zero operations, not stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed operation. Returns the new total.
    pub fn record_completed_op(&self) -> u64 {
        self.total_completed_ops.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Total operations completed so far.
    pub fn total_completed_ops(&self) -> u64 {
        self.total_completed_ops.load(Ordering::Acquire)
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// The reason recorded by the winning stop request.
    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.reason.lock()
    }

    /// Request a stop.
    ///
    /// Returns `true` if this call set the flag, `false` if a stop had
    /// already been requested. Safe to call from any number of threads.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        let mut recorded = self.reason.lock();
        if let Some(existing) = *recorded {
            debug!(requested = %reason, existing = %existing, "Stop already requested");
            return false;
        }
        *recorded = Some(reason);
        self.stop_requested.store(true, Ordering::Release);
        self.stopped.notify_all();
        info!(reason = %reason, "Stop requested");
        true
    }

    /// Sleep until a stop is requested or `timeout` elapses.
    ///
    /// Returns `true` if stopped.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout).is_some()
    }

    /// Sleep until a stop is requested or `deadline` passes.
    ///
    /// Returns the stop reason, or `None` on timeout.
    pub fn wait_until(&self, deadline: Instant) -> Option<StopReason> {
        let mut recorded = self.reason.lock();
        while recorded.is_none() {
            if self.stopped.wait_until(&mut recorded, deadline).timed_out() {
                break;
            }
        }
        *recorded
    }
}

/// Cloneable handle that lets a host stop a running phase.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signals: Arc<PhaseSignals>,
}

impl StopHandle {
    /// Create a handle over the given signals.
    pub fn new(signals: Arc<PhaseSignals>) -> Self {
        Self { signals }
    }

    /// Request an operator stop. Returns `true` if this call won.
    pub fn stop(&self) -> bool {
        self.signals.request_stop(StopReason::Operator)
    }

    /// Whether the phase has been asked to stop, for any reason.
    pub fn is_stopped(&self) -> bool {
        self.signals.is_stop_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_first_stop_wins() {
        let signals = PhaseSignals::new();
        assert!(!signals.is_stop_requested());
        assert_eq!(signals.stop_reason(), None);

        assert!(signals.request_stop(StopReason::Stalled));
        assert!(!signals.request_stop(StopReason::Deadline));
        assert!(signals.is_stop_requested());
        assert_eq!(signals.stop_reason(), Some(StopReason::Stalled));
        assert!(logs_contain("Stop requested"));
    }

    #[test]
    fn test_concurrent_stops_are_idempotent() {
        let signals = Arc::new(PhaseSignals::new());
        let counters: Vec<_> = (0..4)
            .map(|_| {
                let signals = Arc::clone(&signals);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        signals.record_completed_op();
                    }
                })
            })
            .collect();
        let stoppers: Vec<_> = (0..8)
            .map(|_| {
                let signals = Arc::clone(&signals);
                thread::spawn(move || signals.request_stop(StopReason::Operator))
            })
            .collect();

        let winners = stoppers
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        for h in counters {
            h.join().unwrap();
        }

        assert_eq!(winners, 1);
        assert!(signals.is_stop_requested());
        assert_eq!(signals.total_completed_ops(), 4000);
    }

    #[test]
    fn test_wait_times_out_without_stop() {
        let signals = PhaseSignals::new();
        let started = Instant::now();
        assert!(!signals.wait_for_stop(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_wakes_on_stop() {
        let signals = Arc::new(PhaseSignals::new());
        let handle = StopHandle::new(Arc::clone(&signals));

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.stop()
        });

        let reason = signals.wait_until(Instant::now() + Duration::from_secs(10));
        assert_eq!(reason, Some(StopReason::Operator));
        assert!(stopper.join().unwrap());
    }
}
