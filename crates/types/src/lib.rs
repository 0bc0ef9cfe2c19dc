//! Core types for the gridlock contention harness.
//!
//! Identifiers, acquisition modes, pairing rules and the diagnostic
//! snapshot shape shared by the pool, the monitor and the harness.

mod identifiers;
mod mode;
mod snapshot;
mod stop;

pub use identifiers::{ResourceId, WorkerId};
pub use mode::{AcquisitionMode, PairingRule, ParseModeError};
pub use snapshot::{Held, WorkerSnapshot};
pub use stop::StopReason;
