//! Why a phase stopped.

use serde::Serialize;
use std::fmt;

/// The reason recorded by whichever stop request won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The phase duration elapsed.
    Deadline,
    /// The progress monitor saw no completed operation for the stall timeout.
    Stalled,
    /// The host asked the phase to stop.
    Operator,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Deadline => write!(f, "deadline"),
            StopReason::Stalled => write!(f, "stalled"),
            StopReason::Operator => write!(f, "operator"),
        }
    }
}
