//! Configuration types for contention phases.

use gridlock_monitor::MonitorConfig;
use gridlock_types::{AcquisitionMode, PairingRule};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Fewest resources a phase runs with.
pub const MIN_RESOURCES: usize = 2;
/// Fewest workers a phase runs with.
pub const MIN_WORKERS: usize = 2;
/// Shortest stall timeout.
pub const MIN_STALL_TIMEOUT: Duration = Duration::from_secs(1);
/// Shortest phase duration.
pub const MIN_DURATION: Duration = Duration::from_secs(3);

/// A configuration value below its documented minimum.
///
/// Never fatal: [`PhaseConfig::validated`] clamps the value and reports
/// the correction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("resource count {requested} is below the minimum of {MIN_RESOURCES}")]
    TooFewResources { requested: usize },

    #[error("worker count {requested} is below the minimum of {MIN_WORKERS}")]
    TooFewWorkers { requested: usize },

    #[error("stall timeout {requested:?} is below the minimum of {MIN_STALL_TIMEOUT:?}")]
    StallTimeoutTooShort { requested: Duration },

    #[error("phase duration {requested:?} is below the minimum of {MIN_DURATION:?}")]
    DurationTooShort { requested: Duration },
}

/// Configuration for one timed phase.
#[derive(Clone, Debug)]
pub struct PhaseConfig {
    /// Number of resources (R).
    pub resources: usize,

    /// Number of workers (W).
    pub workers: usize,

    /// Time without progress before the monitor declares a stall (T).
    pub stall_timeout: Duration,

    /// Wall-clock length of the phase (D).
    pub duration: Duration,

    /// Acquisition policy.
    pub mode: AcquisitionMode,

    /// Rule mapping each worker to its two resources.
    pub pairing: PairingRule,

    /// Monitor sample interval.
    pub sample_interval: Duration,

    /// How long to wait for workers to exit after stop before abandoning
    /// them.
    pub join_grace: Duration,

    /// Seed for the per-worker delay generators.
    pub seed: u64,

    /// Delay ranges for each step of the worker loop.
    pub workload: WorkloadConfig,
}

impl PhaseConfig {
    /// Create a configuration with `resources` and `workers` and defaults
    /// for everything else.
    pub fn new(resources: usize, workers: usize) -> Self {
        Self {
            resources,
            workers,
            stall_timeout: Duration::from_secs(3),
            duration: Duration::from_secs(12),
            mode: AcquisitionMode::default(),
            pairing: PairingRule::default(),
            sample_interval: Duration::from_millis(200),
            join_grace: Duration::from_secs(2),
            seed: 12345,
            workload: WorkloadConfig::default(),
        }
    }

    /// Set the stall timeout.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the phase duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the acquisition mode.
    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pairing rule.
    pub fn with_pairing(mut self, pairing: PairingRule) -> Self {
        self.pairing = pairing;
        self
    }

    /// Set the monitor sample interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the join grace period.
    pub fn with_join_grace(mut self, grace: Duration) -> Self {
        self.join_grace = grace;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the workload delays.
    pub fn with_workload(mut self, workload: WorkloadConfig) -> Self {
        self.workload = workload;
        self
    }

    /// Clamp every field to its minimum.
    ///
    /// Returns the corrected configuration and one [`ConfigError`] per
    /// clamped field. Each correction is also logged.
    pub fn validated(mut self) -> (Self, Vec<ConfigError>) {
        let mut issues = Vec::new();

        if self.resources < MIN_RESOURCES {
            issues.push(ConfigError::TooFewResources {
                requested: self.resources,
            });
            self.resources = MIN_RESOURCES;
        }
        if self.workers < MIN_WORKERS {
            issues.push(ConfigError::TooFewWorkers {
                requested: self.workers,
            });
            self.workers = MIN_WORKERS;
        }
        if self.stall_timeout < MIN_STALL_TIMEOUT {
            issues.push(ConfigError::StallTimeoutTooShort {
                requested: self.stall_timeout,
            });
            self.stall_timeout = MIN_STALL_TIMEOUT;
        }
        if self.duration < MIN_DURATION {
            issues.push(ConfigError::DurationTooShort {
                requested: self.duration,
            });
            self.duration = MIN_DURATION;
        }

        for issue in &issues {
            warn!(error = %issue, "Configuration clamped");
        }
        (self, issues)
    }

    /// Monitor configuration for this phase.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new(self.stall_timeout).with_sample_interval(self.sample_interval)
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self::new(5, 5)
    }
}

/// Inclusive range for a random delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayRange {
    /// Shortest delay.
    pub min: Duration,
    /// Longest delay.
    pub max: Duration,
}

impl DelayRange {
    /// Range in whole milliseconds.
    pub const fn millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    /// No delay at all.
    pub const ZERO: Self = Self::millis(0, 0);

    /// Draw a delay from the range. A reversed range yields `min`.
    pub fn sample(&self, rng: &mut (impl Rng + ?Sized)) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = u64::try_from((self.max - self.min).as_nanos()).unwrap_or(u64::MAX);
        self.min + Duration::from_nanos(rng.gen_range(0..=span))
    }
}

/// Delay ranges for the steps of the worker loop.
///
/// The small gaps widen the window in which two workers interleave their
/// lock requests, which is what makes the unordered hazard show up quickly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Before the first acquire.
    pub think: DelayRange,
    /// Between the first and the second acquire.
    pub gap: DelayRange,
    /// Inside the critical section.
    pub work: DelayRange,
    /// After releasing, before the next cycle.
    pub rest: DelayRange,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            think: DelayRange::millis(1, 3),
            gap: DelayRange::millis(1, 2),
            work: DelayRange::millis(1, 2),
            rest: DelayRange::millis(1, 2),
        }
    }
}

impl WorkloadConfig {
    /// Set the pre-acquire delay.
    pub fn with_think(mut self, think: DelayRange) -> Self {
        self.think = think;
        self
    }

    /// Set the delay between the two acquires.
    pub fn with_gap(mut self, gap: DelayRange) -> Self {
        self.gap = gap;
        self
    }

    /// Set the critical-section duration.
    pub fn with_work(mut self, work: DelayRange) -> Self {
        self.work = work;
        self
    }

    /// Set the rest delay.
    pub fn with_rest(mut self, rest: DelayRange) -> Self {
        self.rest = rest;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tracing_test::traced_test;

    #[test]
    fn test_defaults_match_demo() {
        let config = PhaseConfig::default();
        assert_eq!(config.resources, 5);
        assert_eq!(config.workers, 5);
        assert_eq!(config.stall_timeout, Duration::from_secs(3));
        assert_eq!(config.duration, Duration::from_secs(12));
        assert_eq!(config.mode, AcquisitionMode::Unordered);
        assert_eq!(config.sample_interval, Duration::from_millis(200));

        let (validated, issues) = config.clone().validated();
        assert!(issues.is_empty());
        assert_eq!(validated.resources, config.resources);
    }

    #[traced_test]
    #[test]
    fn test_validated_clamps_everything() {
        let (config, issues) = PhaseConfig::new(0, 1)
            .with_stall_timeout(Duration::ZERO)
            .with_duration(Duration::from_secs(1))
            .validated();

        assert_eq!(config.resources, MIN_RESOURCES);
        assert_eq!(config.workers, MIN_WORKERS);
        assert_eq!(config.stall_timeout, MIN_STALL_TIMEOUT);
        assert_eq!(config.duration, MIN_DURATION);
        assert_eq!(
            issues,
            vec![
                ConfigError::TooFewResources { requested: 0 },
                ConfigError::TooFewWorkers { requested: 1 },
                ConfigError::StallTimeoutTooShort {
                    requested: Duration::ZERO
                },
                ConfigError::DurationTooShort {
                    requested: Duration::from_secs(1)
                },
            ]
        );
        assert!(logs_contain("Configuration clamped"));
    }

    #[test]
    fn test_monitor_config_follows_phase() {
        let config = PhaseConfig::default()
            .with_stall_timeout(Duration::from_secs(4))
            .with_sample_interval(Duration::from_millis(50));
        let monitor = config.monitor_config();
        assert_eq!(monitor.stall_timeout, Duration::from_secs(4));
        assert_eq!(monitor.sample_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_delay_range_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let range = DelayRange::millis(1, 3);
        for _ in 0..1000 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_millis(1) && d <= Duration::from_millis(3));
        }
        assert_eq!(DelayRange::ZERO.sample(&mut rng), Duration::ZERO);
        assert_eq!(
            DelayRange::millis(5, 2).sample(&mut rng),
            Duration::from_millis(5)
        );
    }
}
