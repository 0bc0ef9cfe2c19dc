//! Gridlock harness
//!
//! Runs timed contention phases: a pool of exclusive resources, a set of
//! workers that each take two of them per cycle, and a progress monitor
//! that reports a circular wait when the workers stop making progress.
//!
//! # Architecture
//!
//! The harness builds on `gridlock-core` and `gridlock-monitor`:
//!
//! - **Configuration**: [`PhaseConfig`] with clamping to documented minimums
//! - **Workers**: the acquire, work, release, rest loop
//! - **Workloads**: what runs inside the critical section
//! - **Phase**: start, await completion, bounded teardown, summary
//!
//! # Example
//!
//! ```no_run
//! use gridlock_harness::{Phase, PhaseConfig};
//! use gridlock_types::AcquisitionMode;
//! use std::time::Duration;
//!
//! let config = PhaseConfig::new(5, 5)
//!     .with_mode(AcquisitionMode::TotalOrder)
//!     .with_duration(Duration::from_secs(5));
//!
//! let phase = Phase::start(config)?;
//! let summary = phase.await_completion();
//! println!("{summary}");
//! # Ok::<(), gridlock_harness::PhaseError>(())
//! ```

pub mod config;
pub mod error;
pub mod phase;
pub mod report;
pub mod worker;
pub mod workload;

pub use config::{ConfigError, DelayRange, PhaseConfig, WorkloadConfig};
pub use error::PhaseError;
pub use phase::Phase;
pub use report::{AbandonedWorker, PhaseSummary};
pub use worker::Worker;
pub use workload::{CriticalSection, SleepWork};
