//! Stall detection state machine.
//!
//! Pure and deterministic: the caller supplies the sample time and the
//! counter value, so every transition can be exercised without threads.

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Monitor lifecycle.
///
/// ```text
/// Watching ──no progress for ≥ timeout──▶ Stalled ──finish()──▶ Done
///     │                                                           ▲
///     └──────────────── stop requested elsewhere ─────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorState {
    /// Sampling the counter.
    Watching,
    /// No progress for at least the stall timeout.
    Stalled,
    /// Terminal.
    Done,
}

/// Tracks the last counter change and decides when the phase has stalled.
#[derive(Debug)]
pub struct StallDetector {
    /// How long the counter may stay flat before declaring a stall.
    timeout: Duration,

    /// Current state.
    state: MonitorState,

    /// Counter value at the last change.
    last_seen_count: u64,

    /// Sample time of the last change.
    last_change_time: Duration,

    /// Sample time of the most recent observation.
    now: Duration,
}

impl StallDetector {
    /// Create a detector that starts watching at `now` with the given count.
    pub fn new(timeout: Duration, initial_count: u64, now: Duration) -> Self {
        Self {
            timeout,
            state: MonitorState::Watching,
            last_seen_count: initial_count,
            last_change_time: now,
            now,
        }
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Configured stall timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Counter value at the last observed change.
    pub fn last_seen_count(&self) -> u64 {
        self.last_seen_count
    }

    /// Time without progress as of the latest sample.
    pub fn idle(&self) -> Duration {
        self.now.saturating_sub(self.last_change_time)
    }

    /// Feed one sample.
    ///
    /// Only acts while `Watching`; any other state is returned unchanged.
    pub fn on_sample(&mut self, now: Duration, count: u64) -> MonitorState {
        if self.state != MonitorState::Watching {
            return self.state;
        }
        self.now = now;

        if count != self.last_seen_count {
            self.last_seen_count = count;
            self.last_change_time = now;
            return self.state;
        }

        if self.idle() >= self.timeout {
            debug!(
                count,
                idle = ?self.idle(),
                timeout = ?self.timeout,
                "Counter flat for the stall timeout"
            );
            self.state = MonitorState::Stalled;
        }
        self.state
    }

    /// Move to `Done`. Called after the stall has been reported, or when a
    /// stop was requested for another reason. Idempotent.
    pub fn finish(&mut self) {
        self.state = MonitorState::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_progress_keeps_watching() {
        let mut detector = StallDetector::new(Duration::from_secs(1), 0, ms(0));
        for (i, t) in (200..=5000).step_by(200).enumerate() {
            assert_eq!(detector.on_sample(ms(t), i as u64 + 1), MonitorState::Watching);
        }
        assert_eq!(detector.idle(), Duration::ZERO);
    }

    #[test]
    fn test_stall_after_timeout() {
        let mut detector = StallDetector::new(Duration::from_secs(1), 7, ms(0));
        assert_eq!(detector.timeout(), Duration::from_secs(1));
        assert_eq!(detector.on_sample(ms(200), 7), MonitorState::Watching);
        assert_eq!(detector.on_sample(ms(800), 7), MonitorState::Watching);
        assert_eq!(detector.on_sample(ms(1000), 7), MonitorState::Stalled);
        assert_eq!(detector.idle(), ms(1000));
    }

    #[test]
    fn test_change_resets_idle() {
        let mut detector = StallDetector::new(Duration::from_secs(1), 0, ms(0));
        detector.on_sample(ms(900), 0);
        assert_eq!(detector.on_sample(ms(950), 1), MonitorState::Watching);
        // 1800ms since start, but only 850ms since the change.
        assert_eq!(detector.on_sample(ms(1800), 1), MonitorState::Watching);
        assert_eq!(detector.on_sample(ms(1950), 1), MonitorState::Stalled);
    }

    #[test]
    fn test_stalled_is_sticky_until_finish() {
        let mut detector = StallDetector::new(ms(400), 0, ms(0));
        assert_eq!(detector.on_sample(ms(400), 0), MonitorState::Stalled);
        // Late progress does not un-stall.
        assert_eq!(detector.on_sample(ms(600), 5), MonitorState::Stalled);
        detector.finish();
        assert_eq!(detector.state(), MonitorState::Done);
        assert_eq!(detector.on_sample(ms(800), 9), MonitorState::Done);
    }

    #[test]
    fn test_done_from_watching() {
        let mut detector = StallDetector::new(Duration::from_secs(3), 0, ms(0));
        detector.on_sample(ms(200), 3);
        detector.finish();
        assert_eq!(detector.state(), MonitorState::Done);
        assert_eq!(detector.on_sample(ms(10_000), 3), MonitorState::Done);
        assert_eq!(detector.last_seen_count(), 3);
    }
}
