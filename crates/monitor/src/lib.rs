//! Progress monitoring and deadlock diagnosis.
//!
//! The monitor samples a phase's completed-operation counter. If the counter
//! stays flat for the stall timeout it snapshots every worker's lock state,
//! derives the wait-for graph, reports any circular waits and stops the
//! phase. It never breaks the deadlock; it only makes it visible.
//!
//! # Components
//!
//! - [`StallDetector`] - Pure `Watching -> Stalled -> Done` state machine
//! - [`WaitForGraph`] - Ownership/blocking relations and cycle search
//! - [`StallReport`] - Per-worker diagnostic records plus cycles
//! - [`ProgressMonitor`] - The sampling thread

mod detector;
mod monitor;
mod report;
mod wait_for;

pub use detector::{MonitorState, StallDetector};
pub use monitor::{MonitorConfig, MonitorOutcome, ProgressMonitor};
pub use report::StallReport;
pub use wait_for::WaitForGraph;
