//! Resource pool, per-worker lock state and acquisition policies.
//!
//! # Architecture
//!
//! ```text
//!   Worker ──order()──▶ AcquisitionPolicy
//!     │
//!     │ WorkerSlot::acquire / release        (write capability, one per worker)
//!     ▼
//!   ResourcePool ◀── blocking lock per resource
//!     │
//!     ▼
//!   WorkerBoard  ──snapshot()──▶ ProgressMonitor   (read only)
//!   PhaseSignals ──counter / stop──▶ everyone
//! ```
//!
//! The monitor is handed the board and the signals, never a slot, so it has
//! no path to the pool's acquire.

mod board;
mod policy;
mod pool;
mod signal;
mod traits;

pub use board::{WorkerBoard, WorkerSlot};
pub use policy::{policy_for, TotalOrder, Unordered};
pub use pool::{ResourceGuard, ResourcePool};
pub use signal::{PhaseSignals, StopHandle};
pub use traits::{AcquisitionPolicy, CriticalSection};
